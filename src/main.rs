use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mapeo::export::{export_clip, rows_to_csv, summary_rows, to_json};
use mapeo::remote::RemoteProcessor;
use mapeo::source::list_devices;
use mapeo::{analyze_clip, MapeoApp, MapeoConfig, RunOptions, SourceChoice};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "mapeo")]
#[command(about = "Frame-difference motion detection for cameras and video clips")]
#[command(version)]
#[command(long_about = "Samples frames from a live camera or a video file, compares each \
frame with the previous one on a coarse grid and highlights the cells that changed. \
Sessions report running statistics, can be exported as CSV or JSON, and clips can be \
summarized locally or by a remote processing service.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mapeo.toml")]
    config: String,

    /// Enable debug level logging
    #[arg(short, long)]
    debug: bool,

    /// Enable info level logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Also write daily rotated log files into this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Validate configuration file and exit
    #[arg(long)]
    validate_config: bool,

    /// Print the effective configuration in TOML format and exit
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run live detection (the default)
    Detect(DetectArgs),
    /// Serve stats and clip processing over HTTP without a live source
    Serve,
    /// Send a clip to the remote processing service
    Upload {
        path: PathBuf,
    },
    /// Summarize a clip locally
    Analyze {
        path: PathBuf,
        /// Print CSV rows instead of JSON
        #[arg(long)]
        csv: bool,
        /// Also write stats, per-cell detections and the heatmap into this directory
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// List capture devices
    Devices,
}

#[derive(clap::Args, Debug, Default)]
struct DetectArgs {
    /// Use a camera, optionally naming the device
    #[arg(long, value_name = "DEVICE", num_args = 0..=1, default_missing_value = "")]
    camera: Option<String>,

    /// Use a video file
    #[arg(long, conflicts_with = "camera")]
    file: Option<PathBuf>,

    /// Declared MIME type of --file
    #[arg(long, requires = "file")]
    mime: Option<String>,

    /// Use a generated moving test pattern
    #[arg(long, conflicts_with_all = ["camera", "file"])]
    synthetic: bool,

    /// Override the target detection rate
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS")]
    duration: Option<u64>,

    /// Serve stats over HTTP while detecting
    #[arg(long)]
    serve: bool,

    /// Disable terminal key controls
    #[arg(long)]
    no_keyboard: bool,
}

// Exit through the return value: `process::exit` would skip the log guard's flush
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = init_logging(&args)?;

    let mut config = MapeoConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    info!("Configuration file: {}", args.config);

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        return Ok(ExitCode::FAILURE);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    match args.command.unwrap_or(Command::Detect(DetectArgs::default())) {
        Command::Detect(detect) => {
            if let Some(fps) = detect.fps {
                if fps == 0 {
                    bail!("--fps must be greater than 0");
                }
                config.detection.target_fps = fps;
            }
            let exit_code = run_detection(config, detect).await?;
            Ok(exit_status(exit_code))
        }
        Command::Serve => serve(config).await.map(|()| ExitCode::SUCCESS),
        Command::Upload { path } => {
            let processor = RemoteProcessor::new(&config.remote);
            info!("Uploading {} to {}", path.display(), processor.endpoint());
            let result = processor.process_file_async(path).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze { path, csv, output } => {
            let detection = config.detection.clone();
            let analysis =
                tokio::task::spawn_blocking(move || analyze_clip(&path, &detection)).await??;
            if csv {
                print!("{}", rows_to_csv(&summary_rows(&analysis.summary))?);
            } else {
                println!("{}", to_json(&analysis.summary)?);
            }
            if let Some(dir) = output {
                let written =
                    tokio::task::spawn_blocking(move || export_clip(&dir, &analysis)).await??;
                for path in written {
                    eprintln!("wrote {}", path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Devices => {
            for device in list_devices()? {
                let path = device.path.as_deref().unwrap_or("-");
                println!("{}\t{}\t{}", path, device.class, device.name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Exit statuses outside 0..=255 collapse to a generic failure
fn exit_status(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}

async fn run_detection(config: MapeoConfig, detect: DetectArgs) -> Result<i32> {
    let source = match (detect.camera, detect.file) {
        (_, Some(path)) => SourceChoice::File {
            path,
            mime: detect.mime,
        },
        (Some(device), None) => {
            SourceChoice::Camera(Some(device).filter(|d| !d.trim().is_empty()))
        }
        (None, None) if detect.synthetic => {
            let (width, height) = config.display.resolution.unwrap_or((640, 480));
            SourceChoice::Synthetic { width, height }
        }
        (None, None) => SourceChoice::Camera(None),
    };

    let options = RunOptions {
        source,
        serve: detect.serve,
        keyboard: !detect.no_keyboard,
        duration: detect.duration.map(Duration::from_secs),
        ..RunOptions::default()
    };

    let mut app = MapeoApp::new(config, options).inspect_err(|e| {
        error!("Failed to create application: {}", e);
    })?;
    app.initialize().await?;
    app.start().await.inspect_err(|e| {
        error!("Failed to start: {}", e);
    })?;

    let exit_code = app.run().await.inspect_err(|e| {
        error!("System error during execution: {}", e);
    })?;
    info!("mapeo exited with code: {}", exit_code);
    Ok(exit_code)
}

#[cfg(feature = "server")]
async fn serve(config: MapeoConfig) -> Result<()> {
    use mapeo::StatsServerBuilder;
    use tokio_util::sync::CancellationToken;

    let server = StatsServerBuilder::new()
        .config(config.server.clone())
        .detection(config.detection.clone())
        .build()?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            signal_token.cancel();
        }
    });

    server.start(shutdown).await?;
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn serve(_config: MapeoConfig) -> Result<()> {
    bail!("built without the server feature")
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mapeo={}", log_level)));

    let fmt_layer = match args.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
    };

    // Raw terminal mode eats newlines, so files get their own plain writer
    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mapeo.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
