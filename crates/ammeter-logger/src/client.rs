//! Command channel to the ammeter.
//!
//! [`AmmeterClient`] writes commands to the device and waits, bounded by a
//! deadline, for the receive loop to deliver the matching state update. A
//! command that gets no answer is reported as `Ok(None)` / `Ok(false)`, never
//! as an error; only transport failures are errors.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ammeter_metrics::metric_defs;
use ammeter_protocol::{Command, DeviceConfig, DeviceStatus, StatusKind};

use crate::config::{ClientConfig, SerialSettings};
use crate::error::{ClientError, Result};
use crate::receiver::Receiver;
use crate::state::{Reading, SamplingWindow, SessionReport, SessionState};
use crate::transport::{self, SerialTransport, SharedTransport, Transport};

/// Client for one ammeter.
///
/// Commands are expected to be issued one at a time; overlapping commands
/// from several threads on one client may observe each other's answers.
pub struct AmmeterClient {
    transport: SharedTransport,
    state: Arc<SessionState>,
    receiver: Option<Receiver>,
    settings: ClientConfig,
    description: String,
}

impl AmmeterClient {
    /// Wrap a transport and start the receive loop.
    pub fn new<T: Transport + 'static>(transport: T, settings: ClientConfig) -> Result<Self> {
        let transport = transport::shared(transport);
        let description = transport.lock().describe();
        let state = Arc::new(SessionState::new());
        let receiver = Receiver::spawn(Arc::clone(&transport), Arc::clone(&state), &settings)?;

        tracing::info!(transport = %description, "client started");

        Ok(AmmeterClient {
            transport,
            state,
            receiver: Some(receiver),
            settings,
            description,
        })
    }

    /// Open a serial port and start the receive loop.
    pub fn open(serial: &SerialSettings, settings: ClientConfig) -> Result<Self> {
        let transport = SerialTransport::open(&serial.path, serial.baud_rate)?;
        Self::new(transport, settings)
    }

    /// The transport description used in log messages.
    pub fn describe(&self) -> &str {
        &self.description
    }

    /// The timing configuration.
    pub fn settings(&self) -> &ClientConfig {
        &self.settings
    }

    /// The shared session state.
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Query the device status.
    pub fn status(&self) -> Result<Option<DeviceStatus>> {
        let deadline = Instant::now() + self.settings.response_timeout;
        self.query_status(deadline)
    }

    /// Query the device configuration.
    pub fn config(&self) -> Result<Option<DeviceConfig>> {
        self.state.clear_config();
        let started = Instant::now();
        self.send(Command::Config)?;

        let deadline = started + self.settings.response_timeout;
        match self.state.wait_config(deadline, self.settings.command_poll_interval) {
            Some(config) => {
                record_latency(Command::Config, started);
                Ok(Some(config))
            }
            None => self.no_response(Command::Config, None),
        }
    }

    /// Check that the device has its baselines; an unanswered query counts
    /// as initialized.
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self
            .status()?
            .map_or(true, |status| status.status != StatusKind::NoInit))
    }

    /// Check if a sampling run is in progress.
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.status()?.is_some_and(|status| status.is_running()))
    }

    /// Check if the device is ready to start sampling.
    pub fn is_ready(&self) -> Result<bool> {
        Ok(self.status()?.is_some_and(|status| status.is_ready()))
    }

    /// Query the sampling interval in seconds.
    pub fn interval(&self) -> Result<Option<u32>> {
        Ok(self.config()?.map(|config| config.interval))
    }

    /// Capture time of the next run in seconds: `requested` if given,
    /// otherwise the device default. `None` if the device does not answer.
    pub fn capture_time(&self, requested: Option<u32>) -> Result<Option<u32>> {
        match requested {
            Some(seconds) => Ok(Some(seconds)),
            None => Ok(self.config()?.map(|config| config.timeout)),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Change the sampling interval; true if the device reports the new value.
    pub fn set_interval(&self, seconds: u32) -> Result<bool> {
        self.send(Command::Interval { seconds })?;
        thread::sleep(self.settings.interval_settle);

        let applied = self.config()?.is_some_and(|config| config.interval == seconds);
        if !applied {
            tracing::warn!(transport = %self.description, seconds, "interval change not confirmed");
        }
        Ok(applied)
    }

    /// Measure pin baselines; returns the final status once the device is
    /// READY (or RUNNING), or `None` if it does not get there in time.
    pub fn init(&self) -> Result<Option<DeviceStatus>> {
        let init_timeout = match self.config()? {
            Some(config) => Duration::from_secs(u64::from(config.init_timeout)),
            None => self.settings.default_init_timeout,
        };

        self.send(Command::Init)?;
        tracing::info!(transport = %self.description, timeout = ?init_timeout, "initializing");

        let deadline = Instant::now() + init_timeout + self.settings.init_grace;
        let status = self.poll_status_until(deadline, |status| status.is_ready() || status.is_running())?;
        match status {
            Some(status) => Ok(Some(status)),
            None => self.no_response(Command::Init, None),
        }
    }

    /// Start sampling; true once the device reports RUNNING.
    pub fn start(&self, timeout: Option<u32>) -> Result<bool> {
        self.send(Command::Start { timeout })?;

        let deadline = Instant::now() + self.settings.response_timeout;
        match self.poll_status_until(deadline, DeviceStatus::is_running)? {
            Some(_) => Ok(true),
            None => self.no_response(Command::Start { timeout }, false),
        }
    }

    /// Stop sampling; true once the device no longer reports RUNNING.
    pub fn stop(&self) -> Result<bool> {
        self.send(Command::Stop)?;

        let deadline = Instant::now() + self.settings.response_timeout;
        match self.poll_status_until(deadline, |status| !status.is_running())? {
            Some(_) => Ok(true),
            None => self.no_response(Command::Stop, false),
        }
    }

    /// Take one reading.
    ///
    /// While sampling, the latest reading is returned without asking the
    /// device; otherwise `CMD:ONE` is sent and the next reading awaited.
    pub fn read_once(&self) -> Result<Option<Reading>> {
        let sampling = self.state.window().is_open()
            || self.state.status().is_some_and(|status| status.is_running());
        if sampling {
            return Ok(self.state.latest_reading());
        }

        let before = self.state.reading_count();
        let started = Instant::now();
        self.send(Command::ReadOnce)?;

        let deadline = started + self.settings.response_timeout;
        let reading = self
            .state
            .wait_readings(deadline, self.settings.command_poll_interval, |log| {
                if log.readings.len() > before {
                    log.readings.last().cloned()
                } else {
                    None
                }
            });
        match reading {
            Some(reading) => {
                record_latency(Command::ReadOnce, started);
                Ok(Some(reading))
            }
            None => self.no_response(Command::ReadOnce, None),
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Readings of the current window.
    pub fn readings(&self) -> Vec<Reading> {
        self.state.readings()
    }

    /// Bounds of the current window.
    pub fn window(&self) -> SamplingWindow {
        self.state.window()
    }

    /// Last status received, without querying the device.
    pub fn last_status(&self) -> Option<DeviceStatus> {
        self.state.status()
    }

    /// Last config received, without querying the device.
    pub fn last_config(&self) -> Option<DeviceConfig> {
        self.state.config()
    }

    /// Wait up to `wait` for the current window to close, then return it
    /// with its readings.
    pub fn report(&self, wait: Duration) -> Option<SessionReport> {
        let deadline = Instant::now() + wait;
        self.state
            .wait_readings(deadline, self.settings.command_poll_interval, |log| {
                log.window.is_closed().then(|| SessionReport {
                    window: log.window,
                    readings: log.readings.clone(),
                })
            })
    }

    /// Check if the receive loop is still running.
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(Receiver::is_running)
    }

    /// Stop the receive loop and wait for it to exit.
    pub fn shutdown(mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.stop();
        }
        tracing::info!(transport = %self.description, "client stopped");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn send(&self, command: Command) -> Result<()> {
        self.check_receiver()?;

        self.transport
            .lock()
            .write(&command.encode())
            .map_err(ClientError::Transport)?;

        metrics::counter!(metric_defs::COMMANDS_SENT.name, "command" => command.name()).increment(1);
        tracing::debug!(transport = %self.description, command = %command, "command sent");
        Ok(())
    }

    fn check_receiver(&self) -> Result<()> {
        match self.state.failure() {
            Some(reason) => Err(ClientError::ReceiverStopped(reason)),
            None => Ok(()),
        }
    }

    fn query_status(&self, deadline: Instant) -> Result<Option<DeviceStatus>> {
        self.state.clear_status();
        let started = Instant::now();
        self.send(Command::Status)?;

        match self.state.wait_status(deadline, self.settings.command_poll_interval, |_| true) {
            Some(status) => {
                record_latency(Command::Status, started);
                Ok(Some(status))
            }
            None => self.no_response(Command::Status, None),
        }
    }

    /// Query status repeatedly until `accept` matches or the deadline passes.
    fn poll_status_until(
        &self,
        deadline: Instant,
        mut accept: impl FnMut(&DeviceStatus) -> bool,
    ) -> Result<Option<DeviceStatus>> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let query_deadline = deadline.min(now + self.settings.response_timeout);
            if let Some(status) = self.query_status(query_deadline)? {
                if accept(&status) {
                    return Ok(Some(status));
                }
                tracing::debug!(transport = %self.description, status = %status.status, "waiting for device");
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(self.settings.command_poll_interval.min(remaining));
        }
    }

    /// Report an unanswered command, unless the receive loop has died.
    fn no_response<T>(&self, command: Command, none: T) -> Result<T> {
        self.check_receiver()?;
        metrics::counter!(metric_defs::COMMAND_TIMEOUTS.name, "command" => command.name()).increment(1);
        tracing::warn!(transport = %self.description, command = %command, "no response from device");
        Ok(none)
    }
}

impl Drop for AmmeterClient {
    fn drop(&mut self) {
        // Receiver's own Drop signals the loop without joining.
        self.receiver.take();
    }
}

fn record_latency(command: Command, started: Instant) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!(metric_defs::COMMAND_LATENCY.name, "command" => command.name()).record(elapsed_ms);
}
