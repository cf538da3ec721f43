use super::*;
use std::{collections::HashMap, time::Duration};

use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn spawn_backend(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/api")
}

fn sample_order() -> OrderRequest {
    OrderRequest {
        patient_first_name: "Jane".into(),
        patient_last_name: "Doe".into(),
        patient_mrn: "123456".into(),
        provider_name: "Dr. Smith".into(),
        provider_npi: "1234567890".into(),
        primary_diagnosis: "G70.00".into(),
        medication_name: "IVIG".into(),
        additional_diagnoses: vec!["G70.01".into(), "E11.9".into()],
        medication_history: Vec::new(),
        patient_records: "Progressive weakness.".into(),
    }
}

#[test]
fn base_url_keeps_its_path_prefix() {
    let base = normalize_base_url("http://127.0.0.1:8000/api").expect("url");
    assert_eq!(base.as_str(), "http://127.0.0.1:8000/api/");
    assert_eq!(
        base.join(VALIDATE_ENDPOINT).expect("join").as_str(),
        "http://127.0.0.1:8000/api/orders/validate"
    );
    assert!(matches!(
        normalize_base_url("not a url"),
        Err(GatewayError::InvalidUrl { .. })
    ));
}

#[tokio::test]
async fn validate_decodes_warnings_from_backend() {
    let app = Router::new().route(
        "/api/orders/validate",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["patient_mrn"], "123456");
            Json(json!({
                "valid": true,
                "warnings": [{
                    "type": "duplicate_patient",
                    "message": "Patient MRN 123456 already exists"
                }]
            }))
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let outcome = gateway.validate(&sample_order()).await.expect("validate");
    assert!(outcome.valid);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(
        outcome.warnings[0].message,
        "Patient MRN 123456 already exists"
    );
}

#[tokio::test]
async fn forward_reports_backend_success_status_verbatim() {
    let app = Router::new().route(
        "/api/orders/generate",
        post(|| async {
            (
                StatusCode::CREATED,
                Json(json!({ "order_id": 9, "care_plan": "Plan" })),
            )
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let forwarded = gateway
        .forward(GENERATE_ENDPOINT, &sample_order())
        .await
        .expect("forward");
    assert_eq!(forwarded.status, 201);
    let response: CarePlanResponse = forwarded.decode().expect("decode");
    assert_eq!(response.order_id.to_string(), "9");
}

#[tokio::test]
async fn backend_detail_is_surfaced_with_status() {
    let app = Router::new().route(
        "/api/orders/generate",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "LLM unavailable" })),
            )
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let err = gateway
        .generate(&sample_order(), &CallBudget::new(Duration::from_secs(5)))
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        GatewayError::Backend {
            status: 500,
            message: "LLM unavailable".into()
        }
    );
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn unparseable_error_body_falls_back_to_status_message() {
    let app = Router::new().route(
        "/api/orders/validate",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let err = gateway
        .validate(&sample_order())
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        GatewayError::Backend {
            status: 502,
            message: "request to orders/validate failed with status code 502".into()
        }
    );
}

#[tokio::test]
async fn field_errors_are_reported_as_backend_message() {
    let app = Router::new().route(
        "/api/orders/validate",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "patient_mrn": ["MRN must be exactly 6 digits"] })),
            )
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let err = gateway
        .validate(&sample_order())
        .await
        .expect_err("must fail");
    assert_eq!(err.status(), Some(400));
    assert!(err
        .to_string()
        .contains("patient_mrn: MRN must be exactly 6 digits"));
}

#[tokio::test]
async fn success_with_malformed_body_is_a_decode_error() {
    let app = Router::new().route(
        "/api/orders/validate",
        post(|| async { Json(json!({ "unexpected": true })) }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let err = gateway
        .validate(&sample_order())
        .await
        .expect_err("must fail");
    assert!(matches!(err, GatewayError::Decode { status: 200, .. }));
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = HttpGateway::new(&format!("http://{addr}/api")).expect("gateway");
    let err = gateway
        .validate(&sample_order())
        .await
        .expect_err("must fail");
    assert!(err.is_transport(), "unexpected error: {err}");
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn generate_budget_aborts_slow_backend() {
    let app = Router::new().route(
        "/api/orders/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({ "order_id": 1, "care_plan": "too late" }))
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");
    let budget = CallBudget::new(Duration::from_millis(150));
    let token = budget.token();

    let started = std::time::Instant::now();
    let err = gateway
        .generate(&sample_order(), &budget)
        .await
        .expect_err("must time out");

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(token.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn export_uses_disposition_filename() {
    let app = Router::new().route(
        "/api/orders/export",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q.get("format").map(String::as_str), Some("csv"));
            (
                [(
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"care_plans_export_20240101_000000.csv\"",
                )],
                "order_id,mrn\n1,123456\n",
            )
                .into_response()
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let file = gateway
        .export(ExportFormat::Csv, &ExportFilters::default())
        .await
        .expect("export");
    assert_eq!(file.filename, "care_plans_export_20240101_000000.csv");
    assert_eq!(file.content_type, "text/csv");
    assert_eq!(file.bytes, b"order_id,mrn\n1,123456\n".to_vec());
}

#[tokio::test]
async fn export_without_disposition_uses_default_name() {
    let app = Router::new().route(
        "/api/orders/export",
        get(|| async { vec![1u8, 2, 3] }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let file = gateway
        .export(ExportFormat::Xlsx, &ExportFilters::default())
        .await
        .expect("export");
    assert_eq!(file.filename, "export.xlsx");
    assert_eq!(file.bytes, vec![1, 2, 3]);
}

#[tokio::test]
async fn export_error_detail_is_surfaced() {
    let app = Router::new().route(
        "/api/orders/export",
        get(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Invalid start_date format" })),
            )
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let err = gateway
        .export(ExportFormat::Csv, &ExportFilters::default())
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        GatewayError::Backend {
            status: 400,
            message: "Invalid start_date format".into()
        }
    );
}

#[tokio::test]
async fn stats_forward_only_present_filters() {
    let app = Router::new().route(
        "/api/orders/export/stats",
        get(|Query(q): Query<HashMap<String, String>>| async move {
            assert_eq!(q.get("provider_npi").map(String::as_str), Some("1234567890"));
            assert!(!q.contains_key("start_date"));
            assert!(!q.contains_key("diagnosis"));
            Json(json!({
                "total_orders": 3,
                "care_plans_generated": 2,
                "date_range": "All time",
                "providers": ["Dr. Smith"],
                "diagnoses": ["G70.00"]
            }))
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let stats = gateway
        .export_stats(&ExportFilters {
            provider_npi: Some("1234567890".into()),
            ..ExportFilters::default()
        })
        .await
        .expect("stats");
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.care_plans_generated, 2);
    assert_eq!(stats.providers, vec!["Dr. Smith"]);
}

#[tokio::test]
async fn relay_keeps_error_status_and_body() {
    let app = Router::new().route(
        "/api/orders/validate",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "provider_npi": ["NPI must be exactly 10 digits"] })),
            )
        }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let relayed = gateway
        .relay(VALIDATE_ENDPOINT, &json!({ "provider_npi": "1" }))
        .await
        .expect("relay");
    assert_eq!(relayed.status, 400);
    assert_eq!(
        relayed.body,
        json!({ "provider_npi": ["NPI must be exactly 10 digits"] })
    );
}

#[tokio::test]
async fn relay_rejects_non_json_error_body() {
    let app = Router::new().route(
        "/api/orders/export/stats",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "<html>down</html>") }),
    );
    let gateway = HttpGateway::new(&spawn_backend(app).await).expect("gateway");

    let err = gateway
        .relay_query(EXPORT_STATS_ENDPOINT, &ExportFilters::default())
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        GatewayError::Backend {
            status: 503,
            message: "request to orders/export/stats failed with status code 503".into()
        }
    );
}
