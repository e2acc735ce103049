use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docflow::completion::build_completion_client;
use docflow::handler::{DocumentHandler, InvocationApi, UploadEvent};
use docflow::ocr::{DisabledTextDetector, HttpTextDetector, TextDetector};
use docflow::processing::{DocumentPipeline, PipelineKind, TokenEstimator};
use docflow::storage::LocalObjectStore;
use docflow::{api, config, logging};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docflow",
    about = "PII masking and summarization pipelines for uploaded documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve upload events over HTTP.
    Serve {
        /// Port to bind; overrides SERVER_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one invocation against the configured store and print its result.
    Invoke {
        /// Pipeline to run (`mask` or `summarize`).
        #[arg(long)]
        pipeline: PipelineKind,
        /// Bucket holding the uploaded document.
        #[arg(long)]
        bucket: String,
        /// Key of the uploaded document, for example `documents/report.pdf`.
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();
    let handler = Arc::new(build_handler()?);

    match cli.command {
        Command::Serve { port } => {
            let app = api::create_router(handler);
            let (listener, port) = bind_listener(port)
                .await
                .context("Failed to bind listener")?;
            tracing::info!("Listening on http://0.0.0.0:{}", port);
            axum::serve(listener, app).await.context("Server error")?;
        }
        Command::Invoke {
            pipeline,
            bucket,
            key,
        } => {
            let result = handler
                .handle(pipeline, &UploadEvent::new(bucket, key))
                .await;
            println!("{}", serde_json::to_string(&result)?);
            if !result.is_success() {
                bail!("invocation failed: {}", result.body);
            }
        }
    }
    Ok(())
}

fn build_handler() -> Result<DocumentHandler> {
    let config = config::get_config();
    let client = build_completion_client(config).context("Failed to build completion client")?;
    let estimator =
        TokenEstimator::new(&config.tokenizer_encoding).context("Failed to load tokenizer")?;
    tracing::info!(encoding = estimator.name(), "Tokenizer loaded");
    let pipeline = DocumentPipeline::new(client, estimator, config.budget);
    let store = Arc::new(LocalObjectStore::new(config.storage_root.clone()));
    let detector: Arc<dyn TextDetector> = match config.ocr_url.as_deref() {
        Some(url) => Arc::new(HttpTextDetector::new(url).context("Failed to build OCR client")?),
        None => Arc::new(DisabledTextDetector),
    };
    Ok(DocumentHandler::new(store, detector, pipeline))
}

async fn bind_listener(port_override: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port_override.or(config::get_config().server_port) {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
