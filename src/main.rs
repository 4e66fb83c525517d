use anyhow::Context;
use clap::{Parser, Subcommand};
use image::ImageReader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

use docfraud::Config;
use docfraud::copilot::Copilot;
use docfraud::core::db::{CompanyRepository, FraudDb, NewCompany, ScanRepository};
use docfraud::core::evidence::EvidenceStore;
use docfraud::detection::DocumentAnalyzer;
use docfraud::detection::ocr::{self, DisabledExtractor, TextExtractor};
use docfraud::server::{self, AppState};

#[derive(Parser)]
#[command(name = "docfraud")]
#[command(about = "Detect tampered document images with ELA, OCR and layout checks")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Analyze one document image
    Analyze {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Save ELA intermediate images to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Skip OCR (ELA and scoring only)
        #[arg(long)]
        skip_ocr: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage client companies and their credits
    Company {
        #[command(subcommand)]
        command: CompanyCommand,
    },

    /// List recorded scans, newest first
    Scans {
        /// Only scans charged to this company
        #[arg(long, value_name = "NAME")]
        company: Option<String>,
    },

    /// Pack the stored evidence of a document into a tar.zst bundle
    Export {
        #[arg(value_name = "DOCUMENT_ID")]
        document_id: String,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Ask the policy copilot a question
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,
    },
}

#[derive(Subcommand)]
enum CompanyCommand {
    /// Register a company and print its API key
    Add {
        name: String,
        #[arg(long, default_value_t = 100)]
        credits: i64,
    },
    List,
    /// Add credits to a company
    TopUp { name: String, credits: i64 },
}

async fn open_db(config: &Config) -> anyhow::Result<FraudDb> {
    FraudDb::new(config.storage.database_path()?).await
}

fn analyze(
    config: &Config,
    image_path: PathBuf,
    debug_out: Option<PathBuf>,
    skip_ocr: bool,
    json: bool,
) -> anyhow::Result<()> {
    let extractor: Arc<dyn TextExtractor> = if skip_ocr {
        Arc::new(DisabledExtractor)
    } else {
        ocr::extractor_for(&config.ocr)
    };
    let mut analyzer = DocumentAnalyzer::new(config.analyzer_settings(), extractor);
    if let Some(dir) = debug_out {
        analyzer = analyzer.with_debug(dir);
    }

    let img = ImageReader::open(&image_path)
        .with_context(|| format!("Failed to open {:?}", image_path))?
        .with_guessed_format()?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    let filename = image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report = analyzer
        .analyze(&img, &filename, &Uuid::new_v4().to_string())?
        .report;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n=== Document Analysis ===");
    println!("File:           {}", report.filename);
    println!("Classification: {}", report.classification);
    println!("Final score:    {:.2}%", report.final_score);
    println!("ELA score:      {:.4}", report.anomaly_score);
    println!("Layout score:   {:.4}", report.layout_score);

    if !report.suspicious_regions.is_empty() {
        println!("\nSuspicious regions:");
        for region in &report.suspicious_regions {
            println!(
                "  {}x{} at ({}, {}) - mean level: {:.1}",
                region.width, region.height, region.x, region.y, region.mean_level
            );
        }
    }

    let entities = &report.extracted_entities;
    for (label, value) in [
        ("Name", &entities.person_name),
        ("Address", &entities.address),
        ("Date", &entities.date),
    ] {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }

    println!("\nText lines: {}", report.ocr_data.len());
    for line in &report.ocr_data {
        println!("  {}", line.text);
    }
    Ok(())
}

async fn company(config: &Config, command: CompanyCommand) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    match command {
        CompanyCommand::Add { name, credits } => {
            let company = db.add_company(&NewCompany { name, credits }).await?;
            println!("Registered {} with {} credits", company.name, company.credits_remaining);
            println!("API key: {}", company.api_key);
        }
        CompanyCommand::List => {
            let companies = db.get_companies().await?;
            if companies.is_empty() {
                println!("No companies registered.");
            }
            for company in companies {
                println!("{:>4}  {:<30} {:>8} credits  {}", company.id, company.name, company.credits_remaining, company.api_key);
            }
        }
        CompanyCommand::TopUp { name, credits } => {
            let company = db
                .top_up_credits(&name, credits)
                .await?
                .with_context(|| format!("Unknown company: {}", name))?;
            println!("{} now has {} credits", company.name, company.credits_remaining);
        }
    }
    db.close().await
}

async fn scans(config: &Config, company: Option<String>) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let company_id = match company {
        Some(name) => Some(
            db.get_company_by_name(&name)
                .await?
                .with_context(|| format!("Unknown company: {}", name))?
                .id,
        ),
        None => None,
    };

    let records = db.get_scans(company_id).await?;
    if records.is_empty() {
        println!("No scans recorded.");
    }
    for scan in records {
        println!(
            "{}  {}  {:<14} {:>6.2}%  {}",
            scan.timestamp, scan.document_id, scan.classification.as_str(), scan.confidence_score, scan.filename
        );
    }
    db.close().await
}

async fn ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let copilot = Copilot::init(&db, &config.copilot).await?;
    let response = copilot.query(question);
    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!("\nSources: {}", response.sources.join(", "));
    }
    db.close().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let mut config = Config::load(args.config.as_deref())?;
    docfraud::logging::init_logger(&config.logging, args.verbose);

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            let state = AppState::from_config(config).await?;
            server::serve(listener, state).await
        }
        Command::Analyze {
            image_path,
            debug_out,
            skip_ocr,
            json,
        } => analyze(&config, image_path, debug_out, skip_ocr, json),
        Command::Company { command } => company(&config, command).await,
        Command::Scans { company } => scans(&config, company).await,
        Command::Export { document_id, out } => {
            let store = EvidenceStore::new(config.storage.upload_dir.clone());
            store.export_bundle(&document_id, &out)?;
            println!("Wrote {}", out.display());
            Ok(())
        }
        Command::Ask { question } => ask(&config, &question).await,
    }
}
