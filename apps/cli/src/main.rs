use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    completion_summary, export_care_plan, generate_timeout_from_secs, load_client_settings,
    load_client_settings_from, render_care_plan, render_stats, ExportClient, OrderForm, SubmissionController,
    SubmissionEvent, SubmissionState,
};
use gateway::HttpGateway;
use shared::protocol::{ExportFilters, ExportFormat};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "careplan", about = "Submit clinical orders and export care plans")]
struct Cli {
    /// Overrides the configured backend base URL.
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// Client config file; defaults to ./careplan.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an order and generate its care plan.
    Submit {
        /// TOML file with the order form fields.
        #[arg(long)]
        order: PathBuf,
        /// Proceed past validation warnings without prompting.
        #[arg(long)]
        yes: bool,
        /// Directory to save the care plan text file in.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Generation budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Preview what an export would contain.
    Stats {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Download stored orders as CSV or Excel.
    Export {
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Skip the stats preview used for the completion summary.
        #[arg(long)]
        no_preview: bool,
        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    start_date: Option<NaiveDate>,
    #[arg(long)]
    end_date: Option<NaiveDate>,
    #[arg(long)]
    provider_npi: Option<String>,
    #[arg(long)]
    diagnosis: Option<String>,
}

impl From<FilterArgs> for ExportFilters {
    fn from(args: FilterArgs) -> Self {
        ExportFilters {
            start_date: args.start_date,
            end_date: args.end_date,
            provider_npi: args.provider_npi.filter(|v| !v.trim().is_empty()),
            diagnosis: args.diagnosis.filter(|v| !v.trim().is_empty()),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Csv,
    Xlsx,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Xlsx => ExportFormat::Xlsx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_client_settings_from(path),
        None => load_client_settings(),
    };
    if let Some(url) = cli.backend_url {
        settings.backend_url = url;
    }
    let gateway = HttpGateway::new(&settings.backend_url)
        .with_context(|| format!("invalid backend url '{}'", settings.backend_url))?;

    match cli.command {
        Command::Submit {
            order,
            yes,
            out_dir,
            timeout_secs,
        } => {
            let timeout = match timeout_secs {
                Some(secs) => generate_timeout_from_secs(secs)
                    .context("--timeout-secs must be greater than zero")?,
                None => settings.generate_timeout,
            };
            submit(gateway, order, yes, out_dir, timeout).await
        }
        Command::Stats { filters } => {
            let stats = ExportClient::new(gateway)
                .fetch_stats(&filters.into())
                .await?;
            println!("{}", render_stats(&stats));
            Ok(())
        }
        Command::Export {
            format,
            out_dir,
            no_preview,
            filters,
        } => {
            let client = ExportClient::new(gateway);
            let filters: ExportFilters = filters.into();
            let stats = if no_preview {
                None
            } else {
                match client.fetch_stats(&filters).await {
                    Ok(stats) => Some(stats),
                    Err(err) => {
                        warn!(error = %err, "stats preview failed; continuing with export");
                        None
                    }
                }
            };
            let saved = client.download(format.into(), &filters, &out_dir).await?;
            println!("{}", completion_summary(stats.as_ref()));
            println!("Saved {} ({} bytes)", saved.path.display(), saved.size_bytes);
            Ok(())
        }
    }
}

async fn submit(
    gateway: HttpGateway,
    order: PathBuf,
    auto_proceed: bool,
    out_dir: Option<PathBuf>,
    generate_timeout: Duration,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(&order)
        .await
        .with_context(|| format!("failed to read order file '{}'", order.display()))?;
    let form = OrderForm::from_toml_str(&raw)
        .with_context(|| format!("'{}' is not a valid order form", order.display()))?;
    let input = match form.into_input() {
        Ok(input) => input,
        Err(errors) => {
            for error in &errors.0 {
                eprintln!("  {error}");
            }
            bail!("order form has {} invalid field(s)", errors.0.len());
        }
    };

    let mut controller =
        SubmissionController::new(Arc::new(gateway)).with_generate_timeout(generate_timeout);
    let progress = tokio::spawn(report_progress(controller.subscribe_events()));

    if interrupted(controller.submit(input)).await {
        bail!("interrupted; the pending request was dropped");
    }

    if controller.state() == &SubmissionState::AwaitingConfirmation {
        eprint!("{}", controller.gate().render());
        if auto_proceed || confirm().await? {
            if interrupted(controller.proceed()).await {
                bail!("interrupted; the pending request was dropped");
            }
        } else {
            controller.cancel();
            eprintln!("Submission cancelled.");
        }
    }

    let outcome = match controller.state() {
        SubmissionState::Succeeded => {
            if let Some(artifact) = controller.artifact() {
                println!("{}", render_care_plan(artifact));
            }
            if let Some(dir) = out_dir {
                let today = Local::now().date_naive();
                if let Some(path) = export_care_plan(controller.artifact(), &dir, today).await? {
                    eprintln!("Care plan saved to {}", path.display());
                }
            }
            Ok(())
        }
        SubmissionState::Failed(error) => Err(anyhow::anyhow!(error.user_message())),
        SubmissionState::Idle => match controller.last_error() {
            Some(error) => Err(anyhow::anyhow!(error.user_message())),
            None => Ok(()),
        },
        other => Err(anyhow::anyhow!(
            "submission stopped in unexpected state '{}'",
            other.name()
        )),
    };

    drop(controller);
    let _ = progress.await;
    outcome
}

/// Runs `work` unless Ctrl-C arrives first, in which case `work` is dropped.
async fn interrupted<F: std::future::Future<Output = ()>>(work: F) -> bool {
    tokio::select! {
        _ = work => false,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted by user");
            true
        }
    }
}

async fn confirm() -> Result<bool> {
    let answer = tokio::task::spawn_blocking(|| -> io::Result<String> {
        eprint!("Proceed anyway? [y/N] ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("prompt task panicked")?
    .context("failed to read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "p" | "proceed"
    ))
}

async fn report_progress(mut events: broadcast::Receiver<SubmissionEvent>) {
    loop {
        match events.recv().await {
            Ok(SubmissionEvent::StateChanged { state, .. }) => match state {
                SubmissionState::Validating => eprintln!("Validating order..."),
                SubmissionState::Generating => eprintln!("Generating care plan..."),
                _ => {}
            },
            Ok(SubmissionEvent::ArtifactReady { artifact, .. }) => {
                info!(order_id = %artifact.order_id, "care plan received");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "progress reporter fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
