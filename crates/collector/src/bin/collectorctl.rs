//! collectorctl: control a running git-metadata-collector.
//!
//! ```bash
//! collectorctl status
//! collectorctl add https://github.com/rust-lang/cargo
//! collectorctl --addr 10.0.0.5:20324 stop
//! ```

use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use harvest_rpc::{ControlClient, QueryCurrentReply};

#[derive(Parser, Debug)]
#[command(name = "collectorctl", version, about = "Control a running git-metadata-collector")]
struct Cli {
    /// Control-plane address of the daemon.
    #[arg(long, env = "COLLECTOR_ADDR", default_value = "127.0.0.1:20324")]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resume handing out tasks.
    Start,
    /// Pause workers after their current task.
    Stop,
    /// Queue links ahead of the ranked backlog.
    Add {
        #[arg(required = true)]
        links: Vec<String>,
    },
    /// Show running and pending tasks.
    Status {
        /// Print the raw reply as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut client = ControlClient::connect(cli.addr.as_str())
        .await
        .with_context(|| format!("control plane unreachable at {}", cli.addr))?;

    match cli.command {
        Command::Start => {
            client.start().await?;
            println!("collector started");
        }
        Command::Stop => {
            client.stop().await?;
            println!("collector stopped");
        }
        Command::Add { links } => {
            for link in &links {
                client
                    .add_manual_task(link)
                    .await
                    .with_context(|| format!("failed to queue {link}"))?;
                println!("queued {link}");
            }
        }
        Command::Status { json } => {
            let reply = client.query_current().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                print!("{}", render_status(&reply, Utc::now()));
            }
        }
    }
    Ok(())
}

fn render_status(reply: &QueryCurrentReply, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let state = if reply.is_running { "running" } else { "stopped" };
    let _ = writeln!(out, "state:   {state}");
    let _ = writeln!(out, "running: {}", reply.current_tasks.len());
    for task in &reply.current_tasks {
        let secs = (now - task.start).num_seconds().max(0);
        let _ = writeln!(out, "  {} ({secs}s)", task.link);
        if !task.progress.is_empty() {
            let last = task.progress.lines().last().unwrap_or_default();
            let _ = writeln!(out, "    {last}");
        }
    }
    let _ = writeln!(out, "pending: {}", reply.pending_tasks.len());
    for link in &reply.pending_tasks {
        let _ = writeln!(out, "  {link}");
    }
    out
}
