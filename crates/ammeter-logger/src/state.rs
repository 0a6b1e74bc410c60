//! Shared session state written by the receive loop and read by callers.
//!
//! State is split into three partitions (readings, config, status), each with
//! its own lock and condition variable, so a burst of `DATA` records never
//! delays a caller waiting on a `STATUS` answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ammeter_protocol::{DataPoint, DeviceConfig, DeviceStatus, Record};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;

/// Current wall clock as fractional seconds since the Unix epoch.
pub fn epoch_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A value guarded by a mutex, paired with a condition variable that is
/// notified on every write.
#[derive(Debug, Default)]
pub struct Partition<T> {
    value: Mutex<T>,
    changed: Condvar,
}

impl<T> Partition<T> {
    /// Create a partition holding `value`.
    pub fn new(value: T) -> Self {
        Partition {
            value: Mutex::new(value),
            changed: Condvar::new(),
        }
    }

    /// Read the value under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.value.lock();
        f(&*guard)
    }

    /// Modify the value under the lock and wake every waiter.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.value.lock();
        let result = f(&mut *guard);
        self.changed.notify_all();
        result
    }

    /// Wake every waiter without changing the value.
    pub fn notify(&self) {
        let _guard = self.value.lock();
        self.changed.notify_all();
    }

    /// Block until `check` accepts the value, the deadline passes, or
    /// `abort` is set.
    ///
    /// The value is re-checked on every notification and at least once per
    /// `poll` interval.
    pub fn wait_for<R>(
        &self,
        deadline: Instant,
        poll: Duration,
        abort: &AtomicBool,
        mut check: impl FnMut(&T) -> Option<R>,
    ) -> Option<R> {
        let mut guard = self.value.lock();
        loop {
            if let Some(found) = check(&*guard) {
                return Some(found);
            }
            if abort.load(Ordering::Acquire) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wake = deadline.min(now + poll);
            self.changed.wait_until(&mut guard, wake);
        }
    }
}

/// A reading stamped with the local time it was received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Local receive time, seconds since the Unix epoch.
    pub received_epoch: f64,
    pub name: String,
    pub ticks: i64,
    pub current_amps: f64,
    pub last_reads: Vec<f64>,
    pub average: f64,
}

impl Reading {
    /// Stamp a parsed data point.
    pub fn from_point(point: DataPoint, received_epoch: f64) -> Self {
        Reading {
            received_epoch,
            name: point.name,
            ticks: point.ticks,
            current_amps: point.current_amps,
            last_reads: point.last_reads,
            average: point.average,
        }
    }
}

/// One end of a sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowMark {
    /// Device epoch from the `START`/`STOP` record.
    pub reported: i64,
    /// Local receive time of the record.
    pub local: f64,
}

/// Bounds of the current sampling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SamplingWindow {
    pub start: Option<WindowMark>,
    pub stop: Option<WindowMark>,
}

impl SamplingWindow {
    /// Run time by device clock, if both ends are known.
    pub fn runtime_reported(&self) -> Option<i64> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Some(stop.reported - start.reported),
            _ => None,
        }
    }

    /// Run time by local clock, if both ends are known.
    pub fn runtime_local(&self) -> Option<f64> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Some(stop.local - start.local),
            _ => None,
        }
    }

    /// A window is open between its `START` and `STOP`.
    pub fn is_open(&self) -> bool {
        self.start.is_some() && self.stop.is_none()
    }

    /// Set once a `STOP` has been seen.
    pub fn is_closed(&self) -> bool {
        self.stop.is_some()
    }
}

/// Readings of the current sampling window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionLog {
    pub readings: Vec<Reading>,
    pub window: SamplingWindow,
}

impl SessionLog {
    /// Append a reading.
    pub fn append(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    /// Drop all readings and open a new window.
    pub fn reset_for_new_window(&mut self, start: WindowMark) {
        self.readings.clear();
        self.window = SamplingWindow {
            start: Some(start),
            stop: None,
        };
    }

    /// Close the current window.
    pub fn close_window(&mut self, stop: WindowMark) {
        self.window.stop = Some(stop);
    }
}

/// A finished sampling window with its readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub window: SamplingWindow,
    pub readings: Vec<Reading>,
}

/// What [`SessionState::apply`] did with a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// A reading was appended; carries the new reading count.
    Reading(usize),
    /// Readings were reset and a window opened.
    WindowOpened,
    /// The window was closed; carries the device-clock run time.
    WindowClosed(Option<i64>),
    /// A `STOP` arrived with no `START` on record.
    StopWithoutStart,
    Config,
    Status,
    /// Nothing to apply (blank or unrecognized line).
    Ignored,
}

/// Live view of one device.
#[derive(Debug, Default)]
pub struct SessionState {
    log: Partition<SessionLog>,
    config: Partition<Option<DeviceConfig>>,
    status: Partition<Option<DeviceStatus>>,
    failed: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl SessionState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a parsed record to its partition.
    pub fn apply(&self, record: Record, received_epoch: f64) -> Applied {
        match record {
            Record::Data(point) => {
                let reading = Reading::from_point(point, received_epoch);
                self.append_reading(reading)
            }
            Record::Start { reported } => {
                self.start_window(WindowMark {
                    reported,
                    local: received_epoch,
                });
                Applied::WindowOpened
            }
            Record::Stop { reported } => self.stop_window(WindowMark {
                reported,
                local: received_epoch,
            }),
            Record::Config(config) => {
                self.set_config(config);
                Applied::Config
            }
            Record::Status(status) => {
                self.set_status(status);
                Applied::Status
            }
            Record::Blank | Record::Unrecognized(_) => Applied::Ignored,
        }
    }

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    /// Append a reading; returns the new reading count.
    pub fn append_reading(&self, reading: Reading) -> Applied {
        self.log.update(|log| {
            log.append(reading);
            Applied::Reading(log.readings.len())
        })
    }

    /// Reset readings and open a window at `start`.
    pub fn start_window(&self, start: WindowMark) {
        self.log.update(|log| log.reset_for_new_window(start));
    }

    /// Close the open window at `stop`.
    ///
    /// A `STOP` with no open window never touches an already closed window;
    /// with no window at all, the stop mark is kept with both runtimes
    /// undefined.
    pub fn stop_window(&self, stop: WindowMark) -> Applied {
        self.log.update(|log| {
            if log.window.is_open() {
                log.close_window(stop);
                Applied::WindowClosed(log.window.runtime_reported())
            } else {
                if log.window.start.is_none() {
                    log.close_window(stop);
                }
                Applied::StopWithoutStart
            }
        })
    }

    /// Snapshot of the readings.
    pub fn readings(&self) -> Vec<Reading> {
        self.log.with(|log| log.readings.clone())
    }

    /// Snapshot of the window bounds.
    pub fn window(&self) -> SamplingWindow {
        self.log.with(|log| log.window)
    }

    pub fn reading_count(&self) -> usize {
        self.log.with(|log| log.readings.len())
    }

    pub fn latest_reading(&self) -> Option<Reading> {
        self.log.with(|log| log.readings.last().cloned())
    }

    /// Wait until `check` accepts the session log.
    pub fn wait_readings<R>(
        &self,
        deadline: Instant,
        poll: Duration,
        check: impl FnMut(&SessionLog) -> Option<R>,
    ) -> Option<R> {
        self.log.wait_for(deadline, poll, &self.failed, check)
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    pub fn set_config(&self, config: DeviceConfig) {
        self.config.update(|slot| *slot = Some(config));
    }

    pub fn config(&self) -> Option<DeviceConfig> {
        self.config.with(Clone::clone)
    }

    /// Reset to the "no response yet" sentinel.
    pub fn clear_config(&self) {
        self.config.update(|slot| *slot = None);
    }

    /// Wait until a config has been received.
    pub fn wait_config(&self, deadline: Instant, poll: Duration) -> Option<DeviceConfig> {
        self.config.wait_for(deadline, poll, &self.failed, Clone::clone)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn set_status(&self, status: DeviceStatus) {
        self.status.update(|slot| *slot = Some(status));
    }

    pub fn status(&self) -> Option<DeviceStatus> {
        self.status.with(Clone::clone)
    }

    /// Reset to the "no response yet" sentinel.
    pub fn clear_status(&self) {
        self.status.update(|slot| *slot = None);
    }

    /// Wait until a status accepted by `accept` has been received.
    pub fn wait_status(
        &self,
        deadline: Instant,
        poll: Duration,
        mut accept: impl FnMut(&DeviceStatus) -> bool,
    ) -> Option<DeviceStatus> {
        self.status.wait_for(deadline, poll, &self.failed, |slot| {
            slot.as_ref().filter(|&status| accept(status)).cloned()
        })
    }

    // ------------------------------------------------------------------
    // Receiver failure
    // ------------------------------------------------------------------

    /// Record a fatal receive-loop error and wake every waiter.
    pub fn record_failure(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
        self.failed.store(true, Ordering::Release);
        self.log.notify();
        self.config.notify();
        self.status.notify();
    }

    /// The recorded receive-loop failure, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use ammeter_protocol::StatusKind;

    use super::*;

    fn data(ticks: i64) -> Record {
        Record::Data(DataPoint {
            name: "ch1".to_string(),
            ticks,
            current_amps: 0.5,
            last_reads: vec![0.5],
            average: 0.5,
        })
    }

    #[test]
    fn test_data_appends_reading() {
        let state = SessionState::new();
        assert_eq!(state.apply(data(120), 10.0), Applied::Reading(1));
        assert_eq!(state.apply(data(220), 11.0), Applied::Reading(2));

        let latest = state.latest_reading().unwrap();
        assert_eq!(latest.ticks, 220);
        assert_eq!(latest.received_epoch, 11.0);
    }

    #[test]
    fn test_start_resets_readings() {
        let state = SessionState::new();
        state.apply(data(1), 1.0);
        state.apply(data(2), 2.0);

        assert_eq!(state.apply(Record::Start { reported: 100 }, 3.0), Applied::WindowOpened);
        assert_eq!(state.reading_count(), 0);

        let window = state.window();
        assert!(window.is_open());
        assert_eq!(window.start, Some(WindowMark { reported: 100, local: 3.0 }));
        assert_eq!(window.stop, None);
    }

    #[test]
    fn test_stop_closes_window() {
        let state = SessionState::new();
        state.apply(Record::Start { reported: 100 }, 3.0);
        state.apply(data(1), 4.0);

        assert_eq!(
            state.apply(Record::Stop { reported: 160 }, 63.5),
            Applied::WindowClosed(Some(60))
        );
        let window = state.window();
        assert!(!window.is_open());
        assert_eq!(window.runtime_reported(), Some(60));
        assert_eq!(window.runtime_local(), Some(60.5));
        assert_eq!(state.reading_count(), 1);
    }

    #[test]
    fn test_stop_without_start() {
        let state = SessionState::new();
        assert_eq!(state.apply(Record::Stop { reported: 5 }, 1.0), Applied::StopWithoutStart);

        let window = state.window();
        assert_eq!(window.runtime_reported(), None);
        assert_eq!(window.runtime_local(), None);
        assert!(window.is_closed());
    }

    #[test]
    fn test_repeated_stop_keeps_closed_window() {
        let state = SessionState::new();
        state.apply(Record::Start { reported: 100 }, 3.0);
        state.apply(Record::Stop { reported: 160 }, 63.0);

        assert_eq!(state.apply(Record::Stop { reported: 500 }, 400.0), Applied::StopWithoutStart);

        let window = state.window();
        assert_eq!(window.stop, Some(WindowMark { reported: 160, local: 63.0 }));
        assert_eq!(window.runtime_reported(), Some(60));
        assert_eq!(window.runtime_local(), Some(60.0));
    }

    #[test]
    fn test_status_sentinel() {
        let state = SessionState::new();
        assert_eq!(state.status(), None);

        state.apply(Record::Status(DeviceStatus::new(StatusKind::Ready)), 1.0);
        assert!(state.status().unwrap().is_ready());

        state.clear_status();
        assert_eq!(state.status(), None);
    }

    #[test]
    fn test_blank_and_unrecognized_are_ignored() {
        let state = SessionState::new();
        assert_eq!(state.apply(Record::Blank, 1.0), Applied::Ignored);
        assert_eq!(
            state.apply(Record::Unrecognized("HELLO".to_string()), 1.0),
            Applied::Ignored
        );
        assert_eq!(state.reading_count(), 0);
    }

    #[test]
    fn test_wait_wakes_on_update() {
        let state = Arc::new(SessionState::new());
        let writer = Arc::clone(&state);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.set_status(DeviceStatus::new(StatusKind::Running));
        });

        let status = state.wait_status(
            Instant::now() + Duration::from_secs(2),
            Duration::from_secs(1),
            DeviceStatus::is_running,
        );
        handle.join().unwrap();
        assert!(status.unwrap().is_running());
    }

    #[test]
    fn test_wait_times_out() {
        let state = SessionState::new();
        let started = Instant::now();

        let config = state.wait_config(
            Instant::now() + Duration::from_millis(50),
            Duration::from_millis(10),
        );

        assert!(config.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_failure_wakes_waiters() {
        let state = Arc::new(SessionState::new());
        let writer = Arc::clone(&state);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.record_failure("port closed");
        });

        let started = Instant::now();
        let status = state.wait_status(
            Instant::now() + Duration::from_secs(5),
            Duration::from_secs(5),
            |_| true,
        );
        handle.join().unwrap();

        assert!(status.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(state.failure().as_deref(), Some("port closed"));
    }
}
