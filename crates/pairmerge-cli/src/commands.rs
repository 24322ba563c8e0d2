use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use pairmerge_channel::{FileTransport, LineTransport, StreamTransport};
use pairmerge_engine::{run_pair, FileOutput, MergedOutput, SharedOutput, Worker, WorkerConfig, WorkerReport};
use pairmerge_protocol::{LineCodec, Message};
use pairmerge_types::{SortedList, TieBreak, WorkerId};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Worker(args) => cmd_worker(args, &cli.format).await,
        Command::Merge(args) => cmd_merge(args, &cli.format).await,
        Command::Decode(args) => cmd_decode(args, &cli.format),
    }
}

/// Read whitespace-separated integers from `path`, sorted.
pub fn load_values(path: &Path) -> anyhow::Result<SortedList<i64>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let values = parse_values(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(SortedList::from_unsorted(values))
}

fn parse_values(raw: &str) -> anyhow::Result<Vec<i64>> {
    raw.split_whitespace()
        .map(|tok| tok.parse::<i64>().with_context(|| format!("not an integer: {tok:?}")))
        .collect()
}

/// Config file values, overridden by flags.
fn worker_config(args: &WorkerArgs) -> anyhow::Result<WorkerConfig> {
    let base = match &args.config {
        Some(path) => Some(WorkerConfig::load(path)?),
        None => None,
    };
    let id = match (&args.id, &base) {
        (Some(id), _) => id.parse::<WorkerId>()?,
        (None, Some(base)) => base.id.clone(),
        (None, None) => bail!("--id is required without --config"),
    };
    let partner = match (&args.partner, &base) {
        (Some(partner), _) => partner.parse::<WorkerId>()?,
        (None, Some(base)) => base.partner.clone(),
        (None, None) => bail!("--partner is required without --config"),
    };
    let mut config = WorkerConfig::new(id, partner);
    if let Some(base) = base {
        config.tie_break = base.tie_break;
        config.stall_timeout_ms = base.stall_timeout_ms;
    }
    if args.priority {
        config.tie_break = Some(TieBreak::Priority);
    } else if args.defer {
        config.tie_break = Some(TieBreak::Defer);
    }
    if args.stall_timeout_ms.is_some() {
        config.stall_timeout_ms = args.stall_timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

async fn open_transport(args: &WorkerArgs) -> anyhow::Result<Box<dyn LineTransport>> {
    if let (Some(inbox), Some(outbox)) = (&args.inbox, &args.outbox) {
        let mut transport = FileTransport::new(inbox.clone(), outbox.clone());
        if let Some(ms) = args.poll_interval_ms {
            transport = transport.with_poll_interval(Duration::from_millis(ms));
        }
        return Ok(Box::new(transport));
    }
    if let Some(addr) = &args.listen {
        let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
        info!(%addr, "waiting for partner");
        let (stream, peer) = listener.accept().await.context("accepting partner connection")?;
        info!(%peer, "partner connected");
        return Ok(Box::new(StreamTransport::from_tcp(stream)));
    }
    if let Some(addr) = &args.connect {
        let stream = TcpStream::connect(addr).await.with_context(|| format!("connecting to {addr}"))?;
        return Ok(Box::new(StreamTransport::from_tcp(stream)));
    }
    bail!("one of --inbox/--outbox, --listen or --connect is required")
}

async fn run_worker<O: MergedOutput<i64>>(
    config: WorkerConfig,
    list: SortedList<i64>,
    transport: Box<dyn LineTransport>,
    output: O,
    state: Option<&Path>,
) -> anyhow::Result<WorkerReport> {
    let mut worker = Worker::new(config, list, transport, output)?;
    if let Some(path) = state {
        worker = worker
            .with_checkpoint(path)
            .await
            .with_context(|| format!("loading checkpoint {}", path.display()))?;
    }
    Ok(worker.run().await?)
}

async fn cmd_worker(args: WorkerArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = worker_config(&args)?;
    let list = load_values(&args.input)?;
    let transport = open_transport(&args).await?;
    let (report, emitted) = match &args.output {
        Some(path) => {
            let output = FileOutput::open(path)?;
            (run_worker(config, list, transport, output, args.state.as_deref()).await?, None)
        }
        None => {
            let output = SharedOutput::new();
            let report = run_worker(config, list, transport, output.clone(), args.state.as_deref()).await?;
            (report, Some(output.snapshot()?))
        }
    };

    match format {
        OutputFormat::Json => {
            println!("{}", json!({ "report": report, "emitted": emitted }));
        }
        OutputFormat::Text => {
            println!("{} Worker {} reached {}", "✓".green().bold(), report.id.to_string().bold(), report.phase);
            if let Some(values) = &emitted {
                println!("  Emitted: {}", join(values).cyan());
            }
            print_report(&report);
        }
    }
    Ok(())
}

async fn cmd_merge(args: MergeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let left = load_values(&args.left)?;
    let right = load_values(&args.right)?;
    let outcome = run_pair(left, right).await?;
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                json!({ "merged": outcome.merged, "left": outcome.left, "right": outcome.right })
            );
        }
        OutputFormat::Text => {
            println!("{} Merged {} values", "✓".green().bold(), outcome.merged.len());
            println!("  {}", join(&outcome.merged).cyan());
            print_report(&outcome.left);
            print_report(&outcome.right);
        }
    }
    Ok(())
}

fn cmd_decode(args: DecodeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let msg: Message<i64> = LineCodec::decode(&args.line).context("invalid wire line")?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "msg_type": msg.kind().as_str(), "message": msg })),
        OutputFormat::Text => println!("{} {}", msg.kind().as_str().yellow().bold(), describe(&msg)),
    }
    Ok(())
}

fn describe(msg: &Message<i64>) -> String {
    match msg {
        Message::Rang(summary) if summary.is_empty() => "empty list".into(),
        Message::Rang(summary) => format!(
            "min={} max={} count={}",
            summary.min.map_or("-".into(), |v| v.to_string()),
            summary.max.map_or("-".into(), |v| v.to_string()),
            summary.count
        ),
        Message::Head(v) => format!("head={v}"),
        Message::End => "sender exhausted".into(),
        Message::Take => "receiver should emit its head".into(),
    }
}

fn print_report(report: &WorkerReport) {
    println!("  {} ({:?})", report.id.to_string().bold(), report.tie_break);
    println!(
        "    emitted {}  sent {} ({} TAKE)  received {}  comparisons {}",
        report.stats.values_output,
        report.stats.messages_sent,
        report.stats.takes_sent,
        report.stats.messages_received,
        report.stats.comparisons
    );
}

fn join(values: &[i64]) -> String {
    values.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
}
