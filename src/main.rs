mod batch;
mod config;
mod error;
mod extractor;
mod heuristics;
mod llm_extract;
mod pdf_text;
mod server;
mod sheet;

use clap::{Parser, Subcommand};
use config::{Config, LlmBackend};
use heuristics::{AddressStrategy, AddressTerminator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Extract order and invoice fields from invoice PDFs into a spreadsheet.
#[derive(Parser)]
#[command(name = "invoice_sheet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "invoice_sheet.toml")]
    config: PathBuf,

    /// Extraction backend (overrides the config file)
    #[arg(long, global = true, value_enum)]
    backend: Option<LlmBackend>,

    /// Where address blocks end
    #[arg(long, global = true, value_enum)]
    terminator: Option<AddressTerminator>,

    /// How the address field is rebuilt
    #[arg(long, global = true, value_enum)]
    address_strategy: Option<AddressStrategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every PDF in a directory into one sheet
    Extract {
        #[arg(short, long)]
        input_dir: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the upload form
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the text and extraction result for a single PDF
    Inspect { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    if let Some(backend) = cli.backend {
        cfg.llm.backend = backend;
    }
    if let Some(terminator) = cli.terminator {
        cfg.extraction.terminator = terminator;
    }
    if let Some(strategy) = cli.address_strategy {
        cfg.extraction.address_strategy = strategy;
    }

    match cli.command {
        Commands::Extract { input_dir, output } => {
            let input_dir = input_dir.unwrap_or(cfg.input_dir.clone());
            let output = output.unwrap_or(cfg.output_path.clone());

            let extractor = extractor::build_extractor(&cfg).await?;
            let summary = batch::extract_directory(extractor.as_ref(), &input_dir, &output).await?;

            info!(
                documents = summary.documents,
                rows = summary.rows,
                failures = summary.failures,
                "Extraction finished"
            );
            println!(
                "✅ Extraction complete! Spreadsheet saved at: {}",
                output.display()
            );
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(cfg.server.host.clone());
            let port = port.unwrap_or(cfg.server.port);

            let extractor = extractor::build_extractor(&cfg).await?;
            let state = server::AppState {
                extractor: Arc::from(extractor),
                max_file_bytes: cfg.server.max_file_bytes,
            };
            let app = server::router(state, cfg.server.max_request_bytes);

            let addr = format!("{host}:{port}");
            info!(backend = ?cfg.llm.backend, "Server listening on http://{}/upload", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Inspect { file } => inspect(&cfg, &file).await?,
    }

    Ok(())
}

/// Print the extracted text and both extraction results for one PDF.
async fn inspect(cfg: &Config, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    info!(file = %file.display(), pdf_bytes = bytes.len(), "Inspecting PDF");

    let text = match pdf_text::extract_text_from_pdf(&bytes) {
        pdf_text::PdfContent::Text(text) => text,
        pdf_text::PdfContent::ScannedImage => {
            println!("\n⚠ PDF is scanned/image-only — cannot extract text.\n");
            return Ok(());
        }
        pdf_text::PdfContent::Error(e) => {
            println!("\n✗ Error: {e}\n");
            return Ok(());
        }
    };

    let preview: String = text.chars().take(2000).collect();
    println!("\n--- Extracted Text (first 2000 chars) ---");
    println!("{preview}");
    println!("--- End ---\n");

    println!("--- Pattern Extraction ---");
    let header = heuristics::extract_invoice(&text, &cfg.extraction);
    let (filled, total) = header.coverage();
    println!("{}", serde_json::to_string_pretty(&header)?);
    println!("--- End Pattern ({filled}/{total} fields) ---\n");

    if cfg.llm.backend == LlmBackend::Pattern {
        return Ok(());
    }

    println!("--- AI-Assisted Extraction ({:?}) ---", cfg.llm.backend);
    let llm = llm_extract::LlmExtractor::new(&cfg.llm, cfg.llm_credentials())?;
    llm.check_health().await?;
    match llm.extract(&text).await {
        Ok(result) => {
            let (filled, total) = result.header.coverage();
            println!("{}", serde_json::to_string_pretty(&result)?);
            println!(
                "--- End AI-Assisted ({filled}/{total} fields, {} items) ---\n",
                result.items.len()
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "AI-assisted extraction failed");
            println!("✗ AI-assisted error: {e}\n");
        }
    }

    Ok(())
}
