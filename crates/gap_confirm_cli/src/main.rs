//! gap-confirm CLI: watch, notify, fetch, history, report.

use clap::{Parser, Subcommand};
use gap_confirm::flow::detect::uid_present;
use gap_confirm::flow::CancelToken;
use gap_confirm::indexer::{parse_tx_hash, parse_uid};
use gap_confirm::{
    wait_until_indexed, IndexerClient, IndexerConfig, Journal, PollBudget, PollTarget, ReportData,
    WaitOutcome,
};
use gap_confirm_report::render_report;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Watch(args) => run_watch(args),
        Command::Notify(args) => run_notify(args),
        Command::Fetch(args) => run_fetch(args),
        Command::History(args) => run_history(args),
        Command::Report(args) => run_report(args),
    }
}

#[derive(Parser)]
#[command(name = "gap-confirm")]
#[command(about = "Attestation confirmation tooling for Karma GAP (indexer polling, journal, reports)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll a target resource until an attestation UID appears in it.
    Watch(WatchArgs),
    /// Send a best-effort listener notification for a submitted transaction.
    Notify(NotifyArgs),
    /// Fetch a target resource snapshot and print it as JSON.
    Fetch(FetchArgs),
    /// Print recent flow runs from the journal.
    History(HistoryArgs),
    /// Generate an HTML report from the journal.
    Report(ReportArgs),
}

/// Target syntax: `project:<uid>`, `community:<uid>`, `grant:<uid>`,
/// `project-milestones:<project-uid>`, `community-grants:<community-uid>`.
fn parse_target(s: &str) -> Result<PollTarget, String> {
    let (kind, id) = s
        .split_once(':')
        .ok_or_else(|| format!("expected <kind>:<uid>, got {s}"))?;
    let id = id.to_string();
    match kind {
        "project" => Ok(PollTarget::Project { uid: id }),
        "community" => Ok(PollTarget::Community { uid: id }),
        "grant" => Ok(PollTarget::Grant { uid: id }),
        "project-milestones" => Ok(PollTarget::ProjectMilestones { project_uid: id }),
        "community-grants" => Ok(PollTarget::CommunityGrants { community_uid: id }),
        other => Err(format!("unknown target kind: {other}")),
    }
}

#[derive(Parser)]
struct WatchArgs {
    /// Resource to poll, e.g. `project-milestones:0x...`.
    #[arg(long, value_parser = parse_target)]
    target: PollTarget,
    /// Attestation UID expected to appear in the target.
    #[arg(long)]
    uid: String,
    #[arg(long, default_value_t = 1000)]
    max_attempts: u32,
    #[arg(long, default_value_t = 1500)]
    interval_ms: u64,
    #[arg(long, default_value = "https://gapapi.karmahq.xyz")]
    base_url: String,
    #[arg(long)]
    chain_id: Option<u64>,
    #[arg(long, default_value = "./data")]
    journal_dir: PathBuf,
}

#[derive(Parser)]
struct NotifyArgs {
    #[arg(long)]
    tx_hash: String,
    #[arg(long)]
    chain_id: u64,
    #[arg(long, default_value = "https://gapapi.karmahq.xyz")]
    base_url: String,
}

#[derive(Parser)]
struct FetchArgs {
    #[arg(long, value_parser = parse_target)]
    target: PollTarget,
    #[arg(long, default_value = "https://gapapi.karmahq.xyz")]
    base_url: String,
}

#[derive(Parser)]
struct HistoryArgs {
    #[arg(long, default_value_t = 20)]
    limit: u32,
    #[arg(long, default_value = "./data")]
    journal_dir: PathBuf,
}

#[derive(Parser)]
struct ReportArgs {
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value = "./reports")]
    reports_dir: PathBuf,
    #[arg(long, default_value_t = 200)]
    limit: u32,
    #[arg(long, default_value = "./data")]
    journal_dir: PathBuf,
}

fn journal_path(dir: &std::path::Path) -> PathBuf {
    dir.join("journal.sqlite")
}

fn client_for(base_url: &str) -> Result<IndexerClient, Box<dyn std::error::Error>> {
    let config = IndexerConfig {
        base_url: base_url.to_string(),
        ..Default::default()
    };
    Ok(IndexerClient::new(config)?)
}

fn run_watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let uid = parse_uid(&args.uid)?;
    let client = client_for(&args.base_url)?;
    let budget = PollBudget {
        max_attempts: args.max_attempts,
        interval: Duration::from_millis(args.interval_ms),
    };
    let rt = tokio::runtime::Runtime::new()?;
    let started = time::OffsetDateTime::now_utc().unix_timestamp();
    let mut token = CancelToken::never();
    let outcome = rt.block_on(async {
        wait_until_indexed(&client, &args.target, uid_present(&uid), budget, &mut token).await
    });
    info!(requests = client.request_count(), "watch finished");

    let journal = Journal::open(journal_path(&args.journal_dir))?;
    let (outcome_label, attempts) = match outcome {
        WaitOutcome::Reflected { attempts } => ("indexed", attempts),
        WaitOutcome::Exhausted { attempts } => ("exhausted", attempts),
        WaitOutcome::Cancelled { attempts } => ("cancelled", attempts),
    };
    journal.record(&gap_confirm::FlowRecord {
        key: Journal::key_for(&format!("watch:{}:{}", args.target.path(), uid)),
        entity_kind: args.target.kind().to_string(),
        entity_uid: Some(uid.clone()),
        tx_hash: None,
        chain_id: args.chain_id.unwrap_or_default(),
        operation: "watch".to_string(),
        outcome: outcome_label.to_string(),
        attempts,
        started_utc: started,
        finished_utc: time::OffsetDateTime::now_utc().unix_timestamp(),
    })?;

    match outcome {
        WaitOutcome::Reflected { attempts } => {
            println!("indexed\t{}\tattempts={}", uid, attempts);
            Ok(())
        }
        WaitOutcome::Exhausted { attempts } => {
            eprintln!("exhausted\t{}\tattempts={}", uid, attempts);
            std::process::exit(1);
        }
        WaitOutcome::Cancelled { attempts } => {
            eprintln!("cancelled\t{}\tattempts={}", uid, attempts);
            std::process::exit(2);
        }
    }
}

fn run_notify(args: NotifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tx_hash = parse_tx_hash(&args.tx_hash)?;
    let client = client_for(&args.base_url)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { client.post_listener(&tx_hash, args.chain_id).await })?;
    println!("notified\t{}\tchain={}", tx_hash, args.chain_id);
    Ok(())
}

fn run_fetch(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = client_for(&args.base_url)?;
    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt.block_on(async { client.fetch_snapshot(&args.target).await })?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn run_history(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let journal = Journal::open(journal_path(&args.journal_dir))?;
    let runs = journal.recent(args.limit)?;
    for run in &runs {
        let when = time::OffsetDateTime::from_unix_timestamp(run.started_utc)
            .ok()
            .and_then(|t| {
                t.format(&time::format_description::well_known::Rfc3339)
                    .ok()
            })
            .unwrap_or_else(|| run.started_utc.to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}\tattempts={}",
            when,
            run.operation,
            run.entity_kind,
            run.entity_uid.as_deref().unwrap_or("-"),
            run.outcome,
            run.attempts,
        );
    }
    info!(count = runs.len(), "history printed");
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let journal = Journal::open(journal_path(&args.journal_dir))?;
    let runs = journal.recent(args.limit)?;
    let data = ReportData::new(runs);
    std::fs::create_dir_all(&args.reports_dir)?;
    let html_path = args
        .out
        .unwrap_or_else(|| args.reports_dir.join("confirmations.html"));
    render_report(&data, &html_path)?;
    info!(?html_path, runs = data.runs.len(), "report complete");
    println!("Report written to {}", html_path.display());
    Ok(())
}
