//! Warden CLI - operator interface for the inspection pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use warden_core::{PolicyDocument, Warden, WardenConfig};
use warden_semantic::HashingEmbedder;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - tiered admission control for LLM traffic")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run one text through the pipeline and print the verdict
    Scan {
        /// The text to inspect
        text: String,
        /// Policy file to load before scanning
        #[arg(short, long)]
        policy: Option<PathBuf>,
        /// Also print the nearest exemplars
        #[arg(long)]
        explain: bool,
    },
    /// Validate a policy file without serving traffic
    Check {
        /// Policy file path
        #[arg(short, long, default_value = "config/policy.yaml")]
        policy: PathBuf,
    },
    /// Show pipeline configuration and index statistics
    Status {
        /// Policy file to load first
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Some(Commands::Scan {
            text,
            policy,
            explain,
        }) => {
            let warden = build_warden(policy.as_deref()).await?;
            let inspection = warden.inspect(&text, HashMap::new()).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "request_id": inspection.request_id.to_string(),
                    "verdict": inspection.verdict,
                }))?
            );
            if explain {
                let neighbors = warden.explain(&text, 3).await?;
                println!("{}", serde_json::to_string_pretty(&neighbors)?);
            }
        }
        Some(Commands::Check { policy }) => {
            let yaml = std::fs::read_to_string(&policy)?;
            let document = PolicyDocument::parse(&yaml)?;
            // Building the pipeline compiles every pattern and encodes
            // every exemplar, so this catches exactly what a hot reload
            // would reject.
            let warden = Warden::with_parts(
                WardenConfig::from_env(),
                document,
                Arc::new(HashingEmbedder::default()),
                None,
                None,
            )
            .await?;
            let stats = warden.snapshot().index.stats();
            println!("policy ok: {}", serde_json::to_string(&stats)?);
        }
        Some(Commands::Status { policy }) => {
            let warden = build_warden(policy.as_deref()).await?;
            let snapshot = warden.snapshot();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "health": warden.health(),
                    "index": snapshot.index.stats(),
                    "patterns": snapshot.patterns.len(),
                    "snapshot_version": snapshot.version,
                }))?
            );
        }
        None => {
            println!("warden - use --help for commands");
        }
    }

    Ok(())
}

async fn build_warden(policy: Option<&std::path::Path>) -> anyhow::Result<Warden> {
    let document = match policy {
        Some(path) => PolicyDocument::parse(&std::fs::read_to_string(path)?)?,
        None => PolicyDocument::default(),
    };
    Ok(Warden::with_parts(
        WardenConfig::from_env(),
        document,
        Arc::new(HashingEmbedder::default()),
        None,
        None,
    )
    .await?)
}
