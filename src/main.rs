//! dbwire replay tool
//!
//! Replays captured fragments (one JSON object per line) through the
//! classification engine and prints what happened to each of them.

use clap::Parser;
use log::{debug, info};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dbwire::common::{init_logger, ConnectionId, DbwireError, Direction, PacketType, Result, TraceParent};
use dbwire::config::{
    log_config, ClassifierConfig, ConfigLoader, ConfigMerger, ConfigValidator, DEFAULT_CONFIG_FILE, LARGE_BUFFER_MAX,
};
use dbwire::emit::{record_channel, LargeBufferCollector, RecordReceiver};
use dbwire::protocol::{DispatchOutcome, Dispatcher};
use dbwire::{APP_NAME, VERSION};

/// Trace id stamped on replayed fragments
const REPLAY_TRACE_ID: [u8; 16] = *b"dbwire-replay\0\0\0";

/// Upper bound on a reassembled payload
const COLLECTED_PAYLOAD_MAX: usize = LARGE_BUFFER_MAX * 16;

/// dbwire: replay captured fragments through the protocol classifier
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Fragment file (JSON lines), `-` for stdin
    #[clap(short, long)]
    input: PathBuf,

    /// Load configuration from a file
    #[clap(long)]
    config_file: Option<PathBuf>,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,

    /// Load configuration from environment variables
    #[clap(long)]
    from_env: bool,
}

/// One captured fragment
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Fragment {
    conn: ConnectionId,
    direction: Direction,
    /// Raw bytes
    #[serde(default)]
    data: Option<Vec<u8>>,
    /// Bytes given as UTF-8 text, used when `data` is absent
    #[serde(default)]
    text: Option<String>,
    /// Span the fragment belongs to
    #[serde(default)]
    span: Option<u64>,
    /// Forget the connection after this fragment
    #[serde(default)]
    close: bool,
}

impl Fragment {
    fn bytes(&self, line: usize) -> Result<&[u8]> {
        match (&self.data, &self.text) {
            (Some(data), _) => Ok(data.as_slice()),
            (None, Some(text)) => Ok(text.as_bytes()),
            (None, None) => Err(DbwireError::Input {
                line,
                message: "fragment has neither `data` nor `text`".to_string(),
            }),
        }
    }

    fn trace_parent(&self) -> TraceParent {
        match self.span {
            Some(span) => TraceParent::new(REPLAY_TRACE_ID, span.to_be_bytes()),
            None => TraceParent::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    fragments: usize,
    classified: usize,
    pending: usize,
    unclassified: usize,
    records: usize,
    truncated: usize,
}

fn load_config(args: &Args) -> Result<ClassifierConfig> {
    let mut config = ClassifierConfig::default();

    // Load from configuration file if specified
    if let Some(path) = &args.config_file {
        config = config.merge(ClassifierConfig::from_file(path)?);
    } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
        config = config.merge(ClassifierConfig::from_file(DEFAULT_CONFIG_FILE)?);
    }

    // Load from environment variables if specified
    if args.from_env {
        config = config.merge(ClassifierConfig::from_env()?);
    }

    // Command line wins
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    Ok(Box::new(BufReader::new(File::open(path)?)))
}

fn drain(records: &mut RecordReceiver, collector: &mut LargeBufferCollector, summary: &mut Summary) {
    while let Some(record) = records.try_recv() {
        debug!("record: {:?}", record);
        summary.records += 1;
        if record.truncated {
            summary.truncated += 1;
        }
        collector.collect(record);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    // 日誌級別以最終配置為準
    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);
    log_config(&config);
    config.check();

    let (sink, mut records) = record_channel(config.output_queue_capacity);
    let dispatcher = Dispatcher::new(&config, Arc::new(sink));
    let mut collector = LargeBufferCollector::new(config.max_concurrent_requests, COLLECTED_PAYLOAD_MAX);

    let mut summary = Summary::default();
    let mut spans: Vec<(u64, PacketType)> = Vec::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (index, line) in open_input(&args.input)?.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fragment: Fragment = serde_json::from_str(&line).map_err(|e| DbwireError::Input {
            line: line_no,
            message: e.to_string(),
        })?;
        let data = fragment.bytes(line_no)?;

        let outcome = dispatcher.deliver_traced(&fragment.conn, fragment.direction, data, &fragment.trace_parent());
        summary.fragments += 1;
        match outcome {
            DispatchOutcome::Classified { .. } => summary.classified += 1,
            DispatchOutcome::Pending => summary.pending += 1,
            DispatchOutcome::Unclassified => summary.unclassified += 1,
        }
        if let Some(span) = fragment.span {
            let key = (span, PacketType::from(fragment.direction));
            if !spans.contains(&key) {
                spans.push(key);
            }
        }

        let report = serde_json::json!({
            "line": line_no,
            "conn": fragment.conn.to_string(),
            "bytes": data.len(),
            "result": outcome,
        });
        writeln!(out, "{}", report)?;

        drain(&mut records, &mut collector, &mut summary);
        if fragment.close {
            dispatcher.close(&fragment.conn);
        }
    }

    for (span, packet_type) in spans {
        if let Some(payload) = collector.extract(REPLAY_TRACE_ID, span.to_be_bytes(), packet_type) {
            let report = serde_json::json!({
                "span": span,
                "packet_type": packet_type,
                "reassembled": payload.len(),
                "preview": String::from_utf8_lossy(&payload[..payload.len().min(64)]),
            });
            writeln!(out, "{}", report)?;
        }
    }

    info!(
        "Replayed {} fragments: {} classified, {} pending, {} unclassified; {} large buffers ({} truncated)",
        summary.fragments, summary.classified, summary.pending, summary.unclassified, summary.records, summary.truncated
    );

    Ok(())
}
