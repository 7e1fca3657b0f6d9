use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[zbus::proxy(
    interface = "org.footfall.Footfall1",
    default_service = "org.footfall.Footfall1",
    default_path = "/org/footfall/Footfall1"
)]
trait Footfall {
    async fn stats(&self) -> zbus::Result<String>;
    async fn recent(&self, limit: u32) -> zbus::Result<String>;
    async fn clear(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "footfall", about = "Footfall visitor analytics CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show aggregate detection counters
    Stats,
    /// List recent detections, newest first
    Recent {
        /// Maximum rows to return (0 = daemon default)
        #[arg(short, long, default_value_t = 0)]
        limit: u32,
    },
    /// Delete all stored detections
    Clear {
        /// Required confirmation flag
        #[arg(long)]
        yes: bool,
    },
    /// Show daemon status
    Status,
}

/// Re-indent a daemon JSON reply for the terminal.
fn pretty(raw: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("daemon returned malformed JSON")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = FootfallProxy::new(&conn)
        .await
        .context("building org.footfall.Footfall1 proxy — is footfalld running?")?;

    match cli.command {
        Commands::Stats => {
            let reply = proxy.stats().await.context("calling Footfall1.Stats")?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Recent { limit } => {
            let reply = proxy.recent(limit).await.context("calling Footfall1.Recent")?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to delete all detections without --yes");
            }
            let reply = proxy.clear().await.context("calling Footfall1.Clear")?;
            println!("{}", pretty(&reply)?);
        }
        Commands::Status => {
            let reply = proxy.status().await.context("calling Footfall1.Status")?;
            println!("{}", pretty(&reply)?);
        }
    }

    Ok(())
}
