use super::*;
use std::time::Duration;

#[test]
fn backend_status_and_message_pass_through() {
    let (status, body) = error_response(&GatewayError::Backend {
        status: 500,
        message: "LLM unavailable".into(),
    });
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, ApiError::new("LLM unavailable"));
}

#[test]
fn transport_failures_become_bad_gateway() {
    let (status, body) = error_response(&GatewayError::Network {
        endpoint: "orders/validate".into(),
        message: "connection refused".into(),
    });
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.detail.contains("connection refused"));

    let (status, _) = error_response(&GatewayError::Decode {
        status: 200,
        message: "expected value".into(),
    });
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[test]
fn expired_budget_is_gateway_timeout() {
    let (status, body) = error_response(&GatewayError::Timeout {
        endpoint: "orders/generate".into(),
        budget: Duration::from_secs(30),
    });
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body.detail.contains("orders/generate"));
}

#[test]
fn routes_live_under_api_prefix() {
    for route in [
        validate_route(),
        generate_route(),
        export_route(),
        export_stats_route(),
    ] {
        assert!(route.starts_with("/api/orders/"), "{route}");
    }
}
