//! # Collaborative Canvas
//!
//! Command-line driver for the canvas synchronization engine. Every client
//! runs against a shared in-memory remote store, so the commands show how
//! local edits, coalesced writes and advisory locks behave without a real
//! backend.
//!
//! ```text
//! collab-canvas demo                      two clients drag and lock a shape
//! collab-canvas stress --clients 8        simulated drag sessions
//! RUST_LOG=canvas_sync=debug collab-canvas demo
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use stress_test::{run_demo, run_stress_test, StressConfig};
use tracing_subscriber::EnvFilter;

pub mod stress_test;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "collab-canvas")]
#[command(about = "Collaborative canvas sync engine (memory-backed simulation)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two clients share a canvas: create, drag, lock contention, release
    Demo,
    /// Many clients drag objects concurrently; reports write coalescing
    Stress {
        /// Number of simulated clients
        #[arg(long, default_value_t = 4)]
        clients: usize,
        /// Objects on the canvas
        #[arg(long, default_value_t = 8)]
        objects: usize,
        /// Drag gestures per client
        #[arg(long, default_value_t = 10)]
        drags: usize,
        /// Pointer moves per drag gesture
        #[arg(long, default_value_t = 30)]
        steps: usize,
        /// Milliseconds between pointer moves
        #[arg(long, default_value_t = 16)]
        interval: u64,
        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo => {
            println!("{}", "═══ Collaborative canvas demo ═══".bold().cyan());
            run_demo().await;
        }
        Commands::Stress {
            clients,
            objects,
            drags,
            steps,
            interval,
            seed,
            json,
        } => {
            let config = StressConfig {
                clients,
                objects,
                drags_per_client: drags,
                steps_per_drag: steps,
                step_interval_ms: interval,
                seed,
            };
            let stats = run_stress_test(&config).await;
            if json {
                match serde_json::to_string_pretty(&stats.to_json()) {
                    Ok(text) => println!("{}", text),
                    Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
                }
            } else {
                stats.print();
            }
            if !stats.converged {
                std::process::exit(1);
            }
        }
    }
}
