use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use pcap2ip_core::{PipelineConfig, PipelineError, PipelineStats, SourceError, rewrite_stream};

#[derive(Parser, Debug)]
#[command(name = "pcap2ip")]
#[command(version)]
#[command(
    about = "Rewrite a packet capture into a raw-IP capture of checksum-valid TCP/UDP packets.",
    long_about = "Reads a pcap or pcapng capture on stdin and writes a pcap capture with link type RAW \
                  to stdout. Link-layer framing (Ethernet, VLAN, PPPoE, loopback) is stripped; \
                  packets that are not IPv4 TCP/UDP or whose checksums fail are dropped.",
    after_help = "Examples:\n  pcap2ip < capture.pcapng > ip.pcap\n  zcat capture.pcap.gz | pcap2ip --dns dns.pcap --stats | gzip > ip.pcap.gz\n  pcap2ip --filter 'tcp and not port 22' < capture.pcap > ip.pcap"
)]
struct Cli {
    /// Capture whose DNS packets (UDP port 53) are merged into the output in time order
    #[arg(long, value_name = "PCAP")]
    dns: Option<PathBuf>,

    /// Filter applied to the input, e.g. "tcp and port 443"
    #[arg(long, value_name = "EXPR")]
    filter: Option<String>,

    /// Only verify IPv4 header checksums
    #[arg(long)]
    no_transport_checksum: bool,

    /// Print pipeline statistics as JSON on stderr
    #[arg(long)]
    stats: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    match cmd_rewrite(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logger(verbose: u8, quiet: bool) {
    let log_level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, 2) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        let hint = match &err {
            PipelineError::Source(SourceError::Filter(_)) => {
                "see `pcap2ip --help` for the filter syntax"
            }
            PipelineError::Source(SourceError::Pcap(_)) => {
                "stdin must carry a .pcap or .pcapng capture"
            }
            PipelineError::Source(SourceError::Io(_)) => {
                "check that the capture is complete and readable"
            }
            PipelineError::Writer(_) => "check that stdout is writable",
        };
        CliError::new(err.to_string(), Some(hint.to_string()))
    }
}

fn cmd_rewrite(cli: Cli) -> Result<(), CliError> {
    if let Some(dns) = cli.dns.as_ref() {
        validate_dns_capture(dns)?;
    }

    let config = PipelineConfig {
        verify_transport: !cli.no_transport_checksum,
        dns_capture: cli.dns,
        traffic_filter: cli.filter,
        ..PipelineConfig::default()
    };

    let stdout = io::stdout().lock();
    let (mut stdout, stats) = rewrite_stream(io::stdin(), stdout, &config)?;
    stdout.flush().context("failed to flush stdout")?;

    if cli.stats {
        print_stats(&stats)?;
    }
    Ok(())
}

fn validate_dns_capture(path: &Path) -> Result<(), CliError> {
    if !path.is_file() {
        return Err(CliError::new(
            format!("DNS capture not found: {}", path.display()),
            Some("pass a .pcap or .pcapng file to --dns".to_string()),
        ));
    }
    Ok(())
}

fn print_stats(stats: &PipelineStats) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(stats).context("JSON serialization failed")?;
    eprintln!("{json}");
    Ok(())
}
