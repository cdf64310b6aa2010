//! trailseal: operator CLI for the tamper-evident audit trail.
//!
//! Records events, verifies the chain, and exports entries for compliance.
//!
//! Usage:
//!   trailseal --store var/audit.jsonl record u1 complaint.submit complaint c-100
//!   trailseal --store var/audit.jsonl verify
//!   trailseal --store var/audit.jsonl verify --from 120 --seed <hash-of-119>
//!   trailseal --config trailseal.toml export --from 0 > audit-export.jsonl
//!   trailseal --store var/audit.jsonl stress --threads 8 --events 100

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trailseal_audit::{AuditTrail, TrailConfig};
use trailseal_contracts::{entry::SYSTEM_ACTOR, error::AuditResult};

// ── CLI definition ────────────────────────────────────────────────────────────

/// trailseal: tamper-evident, hash-chained audit trail.
#[derive(Parser)]
#[command(
    name = "trailseal",
    about = "Tamper-evident audit trail operator tool",
    long_about = "Records audit events into a SHA-256 hash chain, verifies the chain\n\
                  end-to-end or incrementally, and exports entries verbatim."
)]
struct Cli {
    /// TOML configuration file.  Takes precedence over --store.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON Lines store file, used when no --config is given.
    #[arg(long, global = true, default_value = "audit.jsonl")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one event to the chain.
    Record {
        actor_id: String,
        action: String,
        entity_type: String,
        entity_id: String,
    },
    /// Verify the chain and print the report as JSON.
    Verify {
        /// First index to verify (default: first stored entry).
        #[arg(long)]
        from: Option<u64>,
        /// Previously verified curr_hash of the entry at from - 1.
        #[arg(long)]
        seed: Option<String>,
    },
    /// Write stored entries as JSON Lines to stdout.
    Export {
        #[arg(long, default_value_t = 0)]
        from: u64,
    },
    /// Print the current chain head.
    Head,
    /// Append a checkpoint sealing the current head.
    Checkpoint {
        #[arg(long, default_value = SYSTEM_ACTOR)]
        actor: String,
    },
    /// Record events from many threads at once, then verify.
    Stress {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        /// Events per thread.
        #[arg(long, default_value_t = 100)]
        events: usize,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output;
    // integrity alerts are logged on the `trailseal::security` target.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("trailseal error: {}", e);
            if e.is_integrity() {
                eprintln!("the audit chain failed an integrity check; do not repair it by hand");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> AuditResult<ExitCode> {
    let config = match &cli.config {
        Some(path) => TrailConfig::from_file(path)?,
        None => TrailConfig::file(&cli.store),
    };
    let trail = AuditTrail::open(&config)?;

    match cli.command {
        Command::Record {
            actor_id,
            action,
            entity_type,
            entity_id,
        } => {
            let entry = trail.record_event(&actor_id, &action, &entity_type, &entity_id)?;
            print_json(&entry);
        }
        Command::Verify { from, seed } => {
            let report = trail.verify_chain(from, seed.as_deref())?;
            print_json(&report);
            if !report.valid {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Export { from } => {
            let count = trail.write_export(from, io::stdout().lock())?;
            eprintln!("exported {} entries", count);
        }
        Command::Head => {
            let head = trail.head();
            print_json(&serde_json::json!({
                "last_sequence_index": head.last_sequence_index,
                "last_hash": head.last_hash,
                "last_timestamp": head.last_timestamp,
                "next_index": head.next_index(),
            }));
        }
        Command::Checkpoint { actor } => {
            let entry = trail.record_checkpoint(&actor)?;
            print_json(&entry);
        }
        Command::Stress { threads, events } => return stress(&trail, threads, events),
    }

    Ok(ExitCode::SUCCESS)
}

// ── Stress run ────────────────────────────────────────────────────────────────

fn stress(trail: &AuditTrail, threads: usize, events: usize) -> AuditResult<ExitCode> {
    let start_index = trail.head().next_index();
    let started = Instant::now();

    let failures: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                s.spawn(move || {
                    (0..events)
                        .filter(|i| {
                            trail
                                .record_event(
                                    &format!("stress-{}", t),
                                    "stress.record",
                                    "stress",
                                    &format!("{}-{}", t, i),
                                )
                                .is_err()
                        })
                        .count()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(events))
            .sum()
    });
    let elapsed = started.elapsed();

    let report = trail.verify_chain(None, None)?;
    let end_index = trail.head().next_index();
    print_json(&serde_json::json!({
        "threads": threads,
        "events_per_thread": events,
        "recorded": end_index - start_index,
        "failed": failures,
        "elapsed_ms": elapsed.as_millis() as u64,
        "chain_valid": report.valid,
        "entries_checked": report.entries_checked,
    }));

    Ok(if report.valid && failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to render output: {}", e),
    }
}
