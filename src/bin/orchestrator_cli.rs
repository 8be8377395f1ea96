//! hearthroute-cli — thin admin client for a running hearthroute server.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Base URL of the hearthroute server
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered agents
    Agents,
    /// Show prompt cache hit/miss statistics
    CacheStats,
    /// Dump a session's transcript by context id
    Session {
        context_id: String,
    },
    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let http = reqwest::Client::new();

    let path = match &args.command {
        Command::Agents => "/admin/agents".to_string(),
        Command::CacheStats => "/admin/cache/stats".to_string(),
        Command::Session { context_id } => format!("/admin/sessions/{context_id}"),
        Command::Health => "/health".to_string(),
    };

    let response = http.get(format!("{}{path}", args.url)).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        println!("{body}");
    } else {
        eprintln!("{status}: {body}");
        std::process::exit(1);
    }

    Ok(())
}
