//! Smokin'Pi — Main Entry Point
//!
//! Fixed-rate tasks around one shared control record.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  acquisition (10 ms)  ──raw set──▶  SharedControl            │
//! │  conditioner (on new set) ◀──────┘   │  ▲                    │
//! │                                      ▼  │                    │
//! │  control (5 ms): PID · servo · flame override                │
//! │  monitor (100 ms): flame FSM ──▶ notifier ──▶ log / mail     │
//! │  data log (15 s) · console · command pipe · TCP commands     │
//! │                                                              │
//! │  ─────────── port boundary ───────────                       │
//! │  pigpiod (SPI + servo)   or   simulated smoker               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use embedded_hal::spi::SpiDevice;
use log::{error, info, warn};

use smokinpi::adapters::console::{spawn_console, spawn_fifo};
use smokinpi::adapters::data_log::DataLogger;
use smokinpi::adapters::log_sink::LogNotificationSink;
use smokinpi::adapters::mail::MailSink;
use smokinpi::adapters::net::{CommandServer, LISTEN_PORT, spawn_server};
use smokinpi::adapters::notifier;
use smokinpi::adapters::sim::SimulatedSmoker;
use smokinpi::app::ports::{NotificationSink, ServoOutput};
use smokinpi::app::service::ControlLoop;
use smokinpi::config::SystemConfig;
use smokinpi::drivers::pigpio::{PigpioClient, PigpioServo, PigpioSpi};
use smokinpi::drivers::task::{ShutdownFlag, install_signal_handlers, spawn_named, spawn_periodic};
use smokinpi::error::{Error, TransportError};
use smokinpi::monitor::FlameMonitor;
use smokinpi::pins::{ADC_SPI_BAUD, ADC_SPI_CHANNEL, ADC_SPI_FLAGS, PIGPIOD_DEFAULT_ADDR, SERVO_GPIO};
use smokinpi::sensors::SignalConditioner;
use smokinpi::sensors::tlc1543::AcquisitionDriver;
use smokinpi::state::SharedControl;

/// Propane smoker temperature controller.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file (missing file means defaults)
    #[arg(long, default_value = "smokinpi.json")]
    config: PathBuf,

    /// Run against the built-in thermal simulation instead of pigpiod
    #[arg(long)]
    simulate: bool,

    /// pigpiod socket address
    #[arg(long, default_value = PIGPIOD_DEFAULT_ADDR)]
    pigpiod: String,

    /// Named pipe to read commands from
    #[arg(long)]
    fifo: Option<PathBuf>,

    /// Directory for the daily CSV logs
    #[arg(long, default_value = ".")]
    data_log: PathBuf,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Address for the framed TCP command server
    #[arg(long, default_value_t = format!("0.0.0.0:{LISTEN_PORT}"))]
    listen: String,

    /// Do not start the TCP command server
    #[arg(long)]
    no_network: bool,
}

/// Conditioner wait before rechecking shutdown.
const CONDITIONER_POLL: Duration = Duration::from_millis(100);
/// Main thread shutdown poll.
const IDLE_POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    // ── 1. Logging + CLI ──────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("Smokin'Pi v{}", env!("CARGO_PKG_VERSION"));

    install_signal_handlers().context("installing signal handlers")?;

    // ── 2. Configuration ──────────────────────────────────────
    let config = SystemConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate().context("invalid configuration")?;

    // ── 3. Hardware or simulation ─────────────────────────────
    if cli.simulate {
        info!("Running against the simulated smoker");
        let smoker = SimulatedSmoker::new();
        run(&cli, &config, smoker.adc(), smoker.servo(), |_| {})
    } else {
        info!("Connecting to pigpiod at {}", cli.pigpiod);
        let client = PigpioClient::connect(&cli.pigpiod)
            .with_context(|| format!("connecting to pigpiod at {}", cli.pigpiod))?;
        let client = Arc::new(Mutex::new(client));
        let spi = PigpioSpi::open(Arc::clone(&client), ADC_SPI_CHANNEL, ADC_SPI_BAUD, ADC_SPI_FLAGS)
            .map_err(Error::from)
            .context("opening the ADC SPI channel")?;
        let servo = PigpioServo::new(client, SERVO_GPIO);
        run(&cli, &config, spi, servo, PigpioSpi::close)
    }
}

/// Spawn every task, wait for shutdown, then stop in order: tasks joined,
/// servo de-asserted, SPI handed to `close_spi`.
fn run<SPI, O>(
    cli: &Cli,
    config: &SystemConfig,
    spi: SPI,
    servo: O,
    close_spi: impl FnOnce(SPI),
) -> Result<()>
where
    SPI: SpiDevice + Send + 'static,
    SPI::Error: Into<TransportError>,
    O: ServoOutput + Send + 'static,
{
    let shared = SharedControl::new(config);
    let shutdown = ShutdownFlag::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // ── 4. Notification delivery ──────────────────────────────
    let (notify_tx, notify_rx) = notifier::channel();
    let mut sinks: Vec<Box<dyn NotificationSink + Send>> = vec![Box::new(LogNotificationSink::new())];
    if let Some(addr) = &config.notification_email {
        info!("Mailing notifications to {addr}");
        sinks.push(Box::new(MailSink::new(addr.clone())));
    }
    let delivery = notifier::spawn_delivery(notify_rx, sinks)?;

    // ── 5. Acquisition + conditioning ─────────────────────────
    let acquisition = Arc::new(Mutex::new(AcquisitionDriver::new(spi)));
    {
        let acquisition = Arc::clone(&acquisition);
        let shared = shared.clone();
        tasks.push(spawn_periodic(
            "acquire",
            Duration::from_millis(u64::from(config.acquisition_interval_ms)),
            shutdown.clone(),
            move || {
                let mut driver = acquisition.lock().unwrap_or_else(PoisonError::into_inner);
                // Failures are logged by the driver on link state changes.
                let _ = driver.cycle(&shared);
            },
        )?);
    }
    {
        let shared = shared.clone();
        let shutdown = shutdown.clone();
        tasks.push(spawn_named("condition", move || {
            let mut conditioner = SignalConditioner::new();
            while !shutdown.is_set() {
                conditioner.service(&shared, CONDITIONER_POLL);
            }
        })?);
    }

    // ── 6. Control loop ───────────────────────────────────────
    let control = Arc::new(Mutex::new(ControlLoop::new(config, servo)));
    {
        let control = Arc::clone(&control);
        let shared = shared.clone();
        tasks.push(spawn_periodic(
            "control",
            Duration::from_millis(u64::from(config.control_tick_ms)),
            shutdown.clone(),
            move || {
                control.lock().unwrap_or_else(PoisonError::into_inner).tick(&shared);
            },
        )?);
    }

    // ── 7. Flame monitor ──────────────────────────────────────
    {
        let mut monitor = FlameMonitor::new(config)?;
        let mut sink = notify_tx.clone();
        monitor.start(&shared, &mut sink);
        let shared = shared.clone();
        tasks.push(spawn_periodic(
            "monitor",
            Duration::from_millis(u64::from(config.monitor_interval_ms)),
            shutdown.clone(),
            move || monitor.tick(&shared, &mut sink),
        )?);
    }

    // ── 8. Data log ───────────────────────────────────────────
    {
        let logger = DataLogger::new(cli.data_log.clone());
        let shared = shared.clone();
        tasks.push(spawn_periodic(
            "datalog",
            Duration::from_secs(u64::from(config.data_log_interval_secs)),
            shutdown.clone(),
            move || logger.service(&shared),
        )?);
    }

    // ── 9. Command surfaces ───────────────────────────────────
    // Not joined: all three block in reads or accepts that shutdown
    // cannot interrupt.
    if !cli.no_console {
        spawn_console(shared.clone(), shutdown.clone())?;
    }
    if let Some(path) = &cli.fifo {
        spawn_fifo(path.clone(), shared.clone(), shutdown.clone())?;
    }
    if !cli.no_network {
        let server = CommandServer::new(shared.clone(), shutdown.clone(), config);
        spawn_server(cli.listen.clone(), server)
            .with_context(|| format!("listening on {}", cli.listen))?;
    }

    // ── 10. Wait for EXIT or a signal ─────────────────────────
    while !shutdown.is_set() {
        std::thread::sleep(IDLE_POLL);
    }
    shutdown.request();
    info!("Shutting down");

    for task in tasks {
        if task.join().is_err() {
            error!("A task panicked during shutdown");
        }
    }

    control.lock().unwrap_or_else(PoisonError::into_inner).shutdown();

    match Arc::try_unwrap(acquisition) {
        Ok(driver) => close_spi(driver.into_inner().unwrap_or_else(PoisonError::into_inner).release()),
        Err(_) => warn!("ADC still shared at exit; leaving SPI handle open"),
    }

    drop(notify_tx);
    if delivery.join().is_err() {
        error!("Notification delivery panicked");
    }

    info!("Stopped");
    Ok(())
}
