//! Ammeter data logger CLI.
//!
//! Connects to the ammeter over serial, initializes it if needed, runs one
//! sampling session and writes the readings to a CSV file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use ammeter_logger::{report, telemetry, AmmeterClient, ClientConfig, ClientError, SerialSettings, DEFAULT_BAUD_RATE};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;

/// Time between progress messages while a run is in progress.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Slack added to the capture time before giving up on the run.
const RUN_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for the closing STOP record once the device is READY.
const STOP_WAIT: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "ammeter-logger")]
#[command(about = "Collect current readings from the ammeter (requires the MicroPython sender on the microcontroller)")]
#[command(version)]
struct Cli {
    /// Serial device connected to the microcontroller (e.g. /dev/ttyUSB0)
    #[arg(value_name = "DEVICE")]
    device: String,

    /// File to save captured data to
    #[arg(value_name = "OUTPUT_FILE")]
    output_file: PathBuf,

    /// Print the configuration from the microcontroller and quit
    #[arg(long)]
    get_config: bool,

    /// Print the current status of the microcontroller and quit
    #[arg(long)]
    get_status: bool,

    /// Skip initializing the ammeter (not recommended)
    #[arg(long)]
    skip_init: bool,

    /// Initialize the ammeter even if it reports being initialized
    #[arg(long)]
    force_init: bool,

    /// Only initialize, print config and status, then quit (implies --force-init)
    #[arg(long)]
    init_only: bool,

    /// Sampling interval in seconds, overrides the microcontroller config
    #[arg(long, value_name = "SECONDS")]
    sample_interval: Option<u32>,

    /// Maximum capture time in seconds, overrides the microcontroller config
    #[arg(long, value_name = "SECONDS")]
    capture_time: Option<u32>,

    /// Baud rate of the serial interface
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// Console log level (trace, debug, info, warning, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also append log output to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match telemetry::parse_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Err(e) = telemetry::init(level, cli.log_file.as_deref()) {
        eprintln!("Error: {}", e);
        return ExitCode::from(2);
    }
    ammeter_metrics::describe_metrics();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(device = %cli.device, error = %e, "ammeter logger failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, ClientError> {
    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    }) {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
    }

    let serial = SerialSettings::new(&cli.device, cli.baudrate);
    let client = AmmeterClient::open(&serial, ClientConfig::default())?;
    let result = session(&client, cli, &interrupt_rx);
    client.shutdown();
    result
}

fn session(client: &AmmeterClient, cli: &Cli, interrupt_rx: &Receiver<()>) -> Result<ExitCode, ClientError> {
    if cli.get_config || cli.get_status {
        if cli.get_config {
            println!("Current Config: {}", to_json(&client.config()?));
        }
        if cli.get_status {
            println!("Current Status: {}", to_json(&client.status()?));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let needs_init = !cli.skip_init && !client.is_initialized()?;
    if needs_init || cli.force_init || cli.init_only {
        println!("Initializing ammeter...");
        match client.init()? {
            Some(status) => println!("Ammeter initialized. Current status: {}", to_json(&status)),
            None => {
                println!("Ammeter is not ready! Current status: {}", to_json(&client.status()?));
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    if cli.init_only {
        println!("Current Config: {}", to_json(&client.config()?));
        println!("Current Status: {}", to_json(&client.status()?));
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(seconds) = cli.sample_interval.filter(|&s| s > 0) {
        if !client.set_interval(seconds)? {
            println!("Could not set the sampling interval to {} seconds", seconds);
            return Ok(ExitCode::FAILURE);
        }
    }

    let capture_time = match client.capture_time(cli.capture_time)? {
        Some(seconds) => seconds,
        None => {
            println!("Could not read the capture time from the ammeter; pass --capture-time to override");
            return Ok(ExitCode::FAILURE);
        }
    };

    if !client.start(cli.capture_time)? {
        println!("Error starting the ammeter! Current status: {}", to_json(&client.status()?));
        return Ok(ExitCode::FAILURE);
    }
    println!(
        "Starting data collection. Collection will run for {} seconds. \
         You can stop at any point and write the captured data using CTRL+C.",
        capture_time
    );

    let deadline = Instant::now() + Duration::from_secs(u64::from(capture_time)) + RUN_GRACE;
    loop {
        match interrupt_rx.recv_timeout(PROGRESS_INTERVAL) {
            Ok(()) => {
                println!("Caught Ctrl+C. Stopping data collection...");
                if !client.stop()? {
                    println!("Error stopping the ammeter! Current status: {}", to_json(&client.last_status()));
                    return Ok(ExitCode::FAILURE);
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(PROGRESS_INTERVAL),
        }

        let status = client.status()?;
        match status.as_ref() {
            Some(status) if status.is_running() => {
                let last_read = client.state().latest_reading().map_or(0.0, |r| r.average);
                println!(
                    "Waiting for logging run to complete. Last amp read: {}. Current status: {}",
                    last_read,
                    to_json(status)
                );
            }
            Some(status) if status.is_ready() => {
                println!(
                    "Logging run complete. Current status: {}. Captured {} intervals",
                    to_json(status),
                    client.state().reading_count()
                );
                break;
            }
            _ => {
                println!(
                    "Microcontroller reporting an unexpected state: {}. Check and try again.",
                    to_json(&status)
                );
                return Ok(ExitCode::FAILURE);
            }
        }

        if Instant::now() >= deadline {
            tracing::warn!("capture time elapsed without the run completing");
            break;
        }
    }

    let (window, readings) = match client.report(STOP_WAIT) {
        Some(report) => (report.window, report.readings),
        None => (client.window(), client.readings()),
    };
    println!("Writing log to file {}...", cli.output_file.display());
    report::write_csv_file(&cli.output_file, &readings, &window)?;
    println!("Writing complete.");

    Ok(ExitCode::SUCCESS)
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}
