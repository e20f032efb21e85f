//! thermolog - Serial Temperature Logger Binary
//!
//! Reads a temperature sensor's text stream from a device file (or stdin),
//! and either prints debounced readings, samples them into a data log, or
//! serves them over HTTP/WebSocket.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use std::time::Duration;
use thermolog::{
    start_web_server, unit_channel, LogEntry, PipelineConfig, ReaderSource, Sampler, SessionHandle,
    StreamError, StreamPipeline, Unit, WebConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_LOG_INTERVAL_MS,
    DEFAULT_WEB_PORT,
};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type DeviceSource = ReaderSource<Box<dyn AsyncRead + Unpin + Send>>;

#[derive(Parser)]
#[command(name = "thermolog")]
#[command(about = "🌡️ thermolog - Serial Temperature Logger")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Reads line-delimited readings from a serial temperature sensor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0", global = true)]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT, global = true)]
    port: u16,

    /// Quiet period before a reading is delivered, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS, global = true)]
    debounce_ms: u64,

    /// Display unit: °C / C / celsius or °F / F / fahrenheit
    #[arg(short, long, default_value = "°C", value_parser = parse_unit, global = true)]
    unit: Unit,

    /// Deliver repeated values instead of dropping them
    #[arg(long, global = true)]
    keep_duplicates: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve readings over HTTP and WebSocket
    Serve(DeviceArgs),

    /// Print each delivered reading
    Watch(WatchArgs),

    /// Sample the latest reading at a fixed interval and print the log
    Log(LogArgs),
}

#[derive(Args)]
struct DeviceArgs {
    /// Already-configured serial device to read from, or "-" for stdin.
    /// A reading still inside the debounce window when the stream ends is
    /// discarded, so a capture file read in one go needs `--debounce-ms 0`
    #[arg(long, default_value = "-")]
    device: String,
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    input: DeviceArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

#[derive(Args)]
struct LogArgs {
    #[command(flatten)]
    input: DeviceArgs,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_LOG_INTERVAL_MS)]
    frequency_ms: u64,

    /// Stop after this many seconds (default: until end of stream or Ctrl-C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn parse_unit(tag: &str) -> std::result::Result<Unit, String> {
    tag.parse().map_err(|e: StreamError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    // Banner goes to stderr so stdout stays machine-readable
    print_banner();

    match &cli.command {
        Commands::Serve(args) => serve_command(&cli, args).await,
        Commands::Watch(args) => watch_command(&cli, args).await,
        Commands::Log(args) => log_command(&cli, args).await,
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    eprintln!("🌡️  thermolog - Serial Temperature Logger");
    eprintln!("   Version: {}", env!("CARGO_PKG_VERSION"));
    eprintln!();
}

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    PipelineConfig::new()
        .with_debounce_ms(cli.debounce_ms)
        .with_duplicate_suppression(!cli.keep_duplicates)
        .with_initial_unit(cli.unit)
}

/// Wrap an already-open device (or stdin) as a byte source.
async fn open_device(args: &DeviceArgs) -> Result<DeviceSource> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = if args.device == "-" {
        info!("Reading from stdin");
        Box::new(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(&args.device)
            .await
            .with_context(|| format!("Failed to open device {}", args.device))?;
        info!("Reading from {}", args.device);
        Box::new(file)
    };
    Ok(ReaderSource::new(reader))
}

/// Close the session on Ctrl-C.
fn close_on_ctrl_c(handle: SessionHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing session");
            handle.close();
        }
    });
}

async fn serve_command(cli: &Cli, args: &DeviceArgs) -> Result<()> {
    info!("Starting thermolog server...");

    let config = pipeline_config(cli);
    let (units, signal) = unit_channel(config.initial_unit);
    let pipeline = StreamPipeline::new(config, signal);

    let (tx, rx) = mpsc::unbounded_channel();
    let source = open_device(args).await?;
    let session = pipeline.open(source, move |value| {
        let _ = tx.send(value);
    })?;

    tokio::spawn(async move {
        match session.join().await {
            Ok(stats) => info!("Sensor stream ended after {} lines", stats.lines),
            Err(e) => error!("Sensor stream failed: {}", e),
        }
    });

    let web_config = WebConfig::new(&cli.host, cli.port);
    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - Debounce: {}ms", pipeline.config().debounce_ms);
    info!("  - Unit: {}", pipeline.config().initial_unit);

    let readings = UnboundedReceiverStream::new(rx).boxed();
    start_web_server(web_config, readings, units, pipeline.subscribe_state()).await?;

    Ok(())
}

async fn watch_command(cli: &Cli, args: &WatchArgs) -> Result<()> {
    let config = pipeline_config(cli);
    let pipeline = StreamPipeline::new(config, thermolog::UnitSignal::fixed(cli.unit));

    let format = args.format;
    let source = open_device(&args.input).await?;
    let session = pipeline.open(source, move |value| match format {
        OutputFormat::Json => match serde_json::to_string(&value) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize reading: {}", e),
        },
        OutputFormat::Pretty => println!("🌡️  {}", value),
    })?;
    close_on_ctrl_c(session.handle());

    let stats = session.join().await?;
    info!(
        "Done: {} lines, {} malformed, {} duplicates",
        stats.lines, stats.malformed, stats.duplicates
    );
    Ok(())
}

async fn log_command(cli: &Cli, args: &LogArgs) -> Result<()> {
    let config = pipeline_config(cli);
    let pipeline = StreamPipeline::new(config, thermolog::UnitSignal::fixed(cli.unit));

    let (latest_tx, latest_rx) = watch::channel(None);
    let source = open_device(&args.input).await?;
    let session = pipeline.open(source, move |value| {
        latest_tx.send_replace(Some(value));
    })?;
    let handle = session.handle();
    close_on_ctrl_c(handle.clone());

    let mut sampler = Sampler::new(Duration::from_millis(args.frequency_ms))?;
    info!(
        "Sampling every {}ms for {}",
        sampler.interval().as_millis(),
        args.duration_secs
            .map(|secs| format!("{}s", secs))
            .unwrap_or_else(|| "the whole stream".to_string())
    );
    sampler.start(latest_rx);

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let join = session.join();
    tokio::pin!(join);

    tokio::select! {
        result = &mut join => {
            result?;
        }
        _ = deadline => {
            info!("Logging duration elapsed, closing session");
            handle.close();
            (&mut join).await?;
        }
    }
    sampler.stop();

    print_log(&sampler.entries(), cli.unit, args.format)?;
    Ok(())
}

fn print_log(entries: &[LogEntry], unit: Unit, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(entries)?);
        }
        OutputFormat::Pretty => {
            println!("{:>10}  {:>16}", "Time (s)", format!("Temperature ({})", unit));
            for entry in entries {
                println!("{:>10.3}  {:>16.2}", entry.time, entry.temperature);
            }
            eprintln!("{} entries", entries.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["thermolog", "serve", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, 9090);
        assert!(matches!(cli.command, Commands::Serve(_)));
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["thermolog", "watch"]).unwrap();
        assert_eq!(cli.port, DEFAULT_WEB_PORT);
        assert_eq!(cli.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(cli.unit, Unit::Celsius);
        assert_eq!(cli.host, "0.0.0.0");
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.input.device, "-");
                assert_eq!(args.format, OutputFormat::Pretty);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_unit_flag() {
        let cli = Cli::try_parse_from(["thermolog", "log", "--unit", "F", "--frequency-ms", "250"])
            .unwrap();
        assert_eq!(cli.unit, Unit::Fahrenheit);
        match cli.command {
            Commands::Log(args) => assert_eq!(args.frequency_ms, 250),
            _ => panic!("expected log"),
        }

        assert!(Cli::try_parse_from(["thermolog", "watch", "--unit", "K"]).is_err());
    }

    #[test]
    fn test_device_help_mentions_end_of_stream() {
        let mut cli = Cli::command();
        let watch = cli.find_subcommand_mut("watch").unwrap();
        let help = watch.render_help().to_string();
        assert!(help.contains("discarded"));
        assert!(help.contains("--debounce-ms 0"));
    }
}
