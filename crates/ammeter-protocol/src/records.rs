//! Record parsing for device output.
//!
//! Each record is one line of colon-separated tokens. The first token names
//! the record kind, which fixes how many tokens the line must carry:
//!
//! - `DATA`: exactly 6
//! - `START` / `STOP`: exactly 2
//! - `CONFIG`: 7, plus any number of further `{pin, name, baseline}` triples
//! - `STATUS`: at least 2
//!
//! Classification happens before validation so that a broken line of a known
//! kind ([`ProtocolError`]) can be told apart from a line that belongs to no
//! kind at all ([`Record::Unrecognized`]).

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Field separator within a record.
pub const FIELD_SEPARATOR: char = ':';

/// Number of tokens in a `CONFIG` record carrying a single pin.
pub const CONFIG_BASE_TOKENS: usize = 7;

/// Number of tokens per additional pin in a `CONFIG` record.
pub const CONFIG_PIN_TOKENS: usize = 3;

/// The kind of a device record, selected by its first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Periodic current reading.
    Data,
    /// A sampling window was opened.
    Start,
    /// A sampling window was closed.
    Stop,
    /// Device configuration.
    Config,
    /// Device status.
    Status,
}

impl RecordKind {
    /// Get the token used on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Data => "DATA",
            RecordKind::Start => "START",
            RecordKind::Stop => "STOP",
            RecordKind::Config => "CONFIG",
            RecordKind::Status => "STATUS",
        }
    }

    /// Classify a record by its first token.
    pub fn from_token(token: &str) -> Option<RecordKind> {
        match token {
            "DATA" => Some(RecordKind::Data),
            "START" => Some(RecordKind::Start),
            "STOP" => Some(RecordKind::Stop),
            "CONFIG" => Some(RecordKind::Config),
            "STATUS" => Some(RecordKind::Status),
            _ => None,
        }
    }

    /// Validate the number of tokens (kind token included) for this kind.
    pub fn check_field_count(&self, count: usize) -> ProtocolResult<()> {
        let (valid, expected) = match self {
            RecordKind::Data => (count == 6, "exactly 6"),
            RecordKind::Start | RecordKind::Stop => (count == 2, "exactly 2"),
            RecordKind::Config => (
                count >= CONFIG_BASE_TOKENS
                    && (count - CONFIG_BASE_TOKENS) % CONFIG_PIN_TOKENS == 0,
                "7 plus a multiple of 3",
            ),
            RecordKind::Status => (count >= 2, "at least 2"),
        };

        if valid {
            Ok(())
        } else {
            Err(ProtocolError::FieldCount {
                kind: self.as_str(),
                expected,
                actual: count,
            })
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `DATA` record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataPoint {
    /// Channel label.
    pub name: String,
    /// Device tick counter (milliseconds since the run started).
    pub ticks: i64,
    /// Latest current reading in amps.
    pub current_amps: f64,
    /// Samples backing the running average, oldest first.
    pub last_reads: Vec<f64>,
    /// Running average in amps.
    pub average: f64,
}

/// Configuration of one measured pin.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinConfig {
    /// ADC pin number.
    pub pin: u32,
    /// Channel label.
    pub name: String,
    /// Zero-current baseline measured during initialization.
    pub baseline: i64,
}

/// Device configuration from a `CONFIG` record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceConfig {
    /// Sampling interval in seconds.
    pub interval: u32,
    /// Default capture time in seconds.
    pub timeout: u32,
    /// Time the device needs to initialize, in seconds.
    pub init_timeout: u32,
    /// Measured pins, in device order.
    pub pins: Vec<PinConfig>,
}

/// Device state reported in a `STATUS` record.
///
/// Values the client does not know are passed through as [`StatusKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StatusKind {
    /// Baselines have not been measured yet.
    NoInit,
    /// Baselines are being measured.
    Initializing,
    /// Ready to start sampling.
    Ready,
    /// A sampling run is in progress.
    Running,
    /// Any other device-defined state.
    Other(String),
}

impl StatusKind {
    /// Get the token used on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            StatusKind::NoInit => "NOINIT",
            StatusKind::Initializing => "INITIALIZING",
            StatusKind::Ready => "READY",
            StatusKind::Running => "RUNNING",
            StatusKind::Other(other) => other,
        }
    }

    /// Parse a status token; never fails.
    pub fn from_token(token: &str) -> StatusKind {
        match token {
            "NOINIT" => StatusKind::NoInit,
            "INITIALIZING" => StatusKind::Initializing,
            "READY" => StatusKind::Ready,
            "RUNNING" => StatusKind::Running,
            other => StatusKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device status from a `STATUS` record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatus {
    /// Current device state.
    pub status: StatusKind,
    /// Seconds remaining; only meaningful while initializing or running.
    pub timeout: u32,
    /// Pin that is missing its baseline; only set when not initialized.
    pub noinit_pin: Option<String>,
}

impl DeviceStatus {
    /// Create a status with no extra fields.
    pub fn new(status: StatusKind) -> Self {
        DeviceStatus {
            status,
            timeout: 0,
            noinit_pin: None,
        }
    }

    /// Check if a sampling run is in progress.
    pub fn is_running(&self) -> bool {
        self.status == StatusKind::Running
    }

    /// Check if the device is ready to start sampling.
    pub fn is_ready(&self) -> bool {
        self.status == StatusKind::Ready
    }
}

/// Parsed record from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Blank line; nothing to apply.
    Blank,

    /// A current reading.
    Data(DataPoint),

    /// A sampling window was opened at the given device epoch.
    Start {
        /// Device epoch in seconds.
        reported: i64,
    },

    /// The sampling window was closed at the given device epoch.
    Stop {
        /// Device epoch in seconds.
        reported: i64,
    },

    /// Device configuration.
    Config(DeviceConfig),

    /// Device status.
    Status(DeviceStatus),

    /// The first token names no known record kind.
    Unrecognized(String),
}

impl Record {
    /// Parse a record line (without its terminator).
    ///
    /// A recognized kind with the wrong number of fields, or with a field
    /// that does not convert, is an error. An unknown kind is not an error;
    /// it is returned as [`Record::Unrecognized`] so the caller can decide
    /// whether the line is noise.
    pub fn parse(line: &str) -> ProtocolResult<Record> {
        if line.trim().is_empty() {
            return Ok(Record::Blank);
        }

        let tokens: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        let kind = match RecordKind::from_token(tokens[0].trim()) {
            Some(kind) => kind,
            None => return Ok(Record::Unrecognized(line.to_string())),
        };

        kind.check_field_count(tokens.len())?;
        log::trace!("parsing {} record with {} fields", kind, tokens.len());

        match kind {
            RecordKind::Data => Self::parse_data(&tokens).map(Record::Data),
            RecordKind::Start => Ok(Record::Start {
                reported: parse_field(kind, "epoch", tokens[1])?,
            }),
            RecordKind::Stop => Ok(Record::Stop {
                reported: parse_field(kind, "epoch", tokens[1])?,
            }),
            RecordKind::Config => Self::parse_config(&tokens).map(Record::Config),
            RecordKind::Status => Self::parse_status(&tokens).map(Record::Status),
        }
    }

    /// Get the kind of this record, if it is a typed record.
    pub fn kind(&self) -> Option<RecordKind> {
        match self {
            Record::Data(_) => Some(RecordKind::Data),
            Record::Start { .. } => Some(RecordKind::Start),
            Record::Stop { .. } => Some(RecordKind::Stop),
            Record::Config(_) => Some(RecordKind::Config),
            Record::Status(_) => Some(RecordKind::Status),
            Record::Blank | Record::Unrecognized(_) => None,
        }
    }

    fn parse_data(tokens: &[&str]) -> ProtocolResult<DataPoint> {
        let kind = RecordKind::Data;
        Ok(DataPoint {
            name: tokens[1].to_string(),
            ticks: parse_field(kind, "ticks", tokens[2])?,
            current_amps: parse_field(kind, "current", tokens[3])?,
            last_reads: parse_reads(tokens[4])?,
            average: parse_field(kind, "average", tokens[5])?,
        })
    }

    fn parse_config(tokens: &[&str]) -> ProtocolResult<DeviceConfig> {
        let kind = RecordKind::Config;
        let pins = tokens[4..]
            .chunks_exact(CONFIG_PIN_TOKENS)
            .map(|group| {
                Ok(PinConfig {
                    pin: parse_field(kind, "pin", group[0])?,
                    name: group[1].to_string(),
                    baseline: parse_field(kind, "baseline", group[2])?,
                })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        Ok(DeviceConfig {
            interval: parse_field(kind, "interval", tokens[1])?,
            timeout: parse_field(kind, "timeout", tokens[2])?,
            init_timeout: parse_field(kind, "init timeout", tokens[3])?,
            pins,
        })
    }

    fn parse_status(tokens: &[&str]) -> ProtocolResult<DeviceStatus> {
        let status = StatusKind::from_token(tokens[1].trim());
        let extra = tokens.get(2).map(|s| s.trim()).filter(|s| !s.is_empty());

        let timeout = match (&status, extra) {
            (StatusKind::Initializing | StatusKind::Running, Some(value)) => {
                parse_field(RecordKind::Status, "timeout", value)?
            }
            _ => 0,
        };
        let noinit_pin = match status {
            StatusKind::NoInit => extra.map(str::to_string),
            _ => None,
        };

        Ok(DeviceStatus {
            status,
            timeout,
            noinit_pin,
        })
    }
}

/// Convert a single numeric field.
fn parse_field<T: FromStr>(kind: RecordKind, field: &'static str, value: &str) -> ProtocolResult<T> {
    value.trim().parse().map_err(|_| ProtocolError::InvalidField {
        kind: kind.as_str(),
        field,
        value: value.to_string(),
    })
}

/// Parse a bracketed list literal such as `[0.1,0.2,0.3]`.
///
/// Parentheses are accepted as well, and so is an empty list.
fn parse_reads(value: &str) -> ProtocolResult<Vec<f64>> {
    let invalid = || ProtocolError::InvalidField {
        kind: RecordKind::Data.as_str(),
        field: "last reads",
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
        .ok_or_else(invalid)?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| invalid()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data() {
        let record = Record::parse("DATA:ch1:120:0.532:[0.1,0.2,0.3]:0.2210").unwrap();
        assert_eq!(
            record,
            Record::Data(DataPoint {
                name: "ch1".to_string(),
                ticks: 120,
                current_amps: 0.532,
                last_reads: vec![0.1, 0.2, 0.3],
                average: 0.221,
            })
        );
        assert_eq!(record.kind(), Some(RecordKind::Data));
    }

    #[test]
    fn test_parse_data_empty_and_tuple_reads() {
        match Record::parse("DATA:ch1:1:0.5:[]:0.5").unwrap() {
            Record::Data(point) => assert!(point.last_reads.is_empty()),
            other => panic!("unexpected record: {:?}", other),
        }
        match Record::parse("DATA:ch1:1:0.5:(0.25, 0.75):0.5").unwrap() {
            Record::Data(point) => assert_eq!(point.last_reads, vec![0.25, 0.75]),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_parse_data_wrong_field_count() {
        let err = Record::parse("DATA:ch1:120:0.532").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FieldCount {
                kind: "DATA",
                expected: "exactly 6",
                actual: 4,
            }
        );
    }

    #[test]
    fn test_parse_data_invalid_ticks() {
        let err = Record::parse("DATA:ch1:abc:0.532:[0.1]:0.1").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "ticks", .. }));
    }

    #[test]
    fn test_parse_data_invalid_reads() {
        let err = Record::parse("DATA:ch1:1:0.5:0.1,0.2:0.5").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "last reads", .. }));
    }

    #[test]
    fn test_parse_start_stop() {
        assert_eq!(Record::parse("START:1000").unwrap(), Record::Start { reported: 1000 });
        assert_eq!(Record::parse("STOP:1060").unwrap(), Record::Stop { reported: 1060 });
        assert!(Record::parse("START").is_err());
        assert!(Record::parse("STOP:1:2").is_err());
    }

    #[test]
    fn test_parse_config_single_pin() {
        let record = Record::parse("CONFIG:5:60:10:26:main:2048").unwrap();
        assert_eq!(
            record,
            Record::Config(DeviceConfig {
                interval: 5,
                timeout: 60,
                init_timeout: 10,
                pins: vec![PinConfig {
                    pin: 26,
                    name: "main".to_string(),
                    baseline: 2048,
                }],
            })
        );
    }

    #[test]
    fn test_parse_config_pin_groups() {
        let base = "CONFIG:5:60:10:26:main:2048";
        for k in 0..4 {
            let mut line = base.to_string();
            for i in 0..k {
                line.push_str(&format!(":{}:aux{}:{}", 27 + i, i, 2000 + i));
            }
            match Record::parse(&line).unwrap() {
                Record::Config(config) => {
                    assert_eq!(config.pins.len(), 1 + k);
                    for i in 0..k {
                        let pin = &config.pins[1 + i];
                        assert_eq!(pin.pin, 27 + i as u32);
                        assert_eq!(pin.name, format!("aux{}", i));
                        assert_eq!(pin.baseline, 2000 + i as i64);
                    }
                }
                other => panic!("unexpected record: {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_config_partial_group_rejected() {
        let err = Record::parse("CONFIG:5:60:10:26:main:2048:27").unwrap_err();
        assert!(matches!(err, ProtocolError::FieldCount { kind: "CONFIG", actual: 8, .. }));

        assert!(Record::parse("CONFIG:5:60:10:26:main").is_err());
    }

    #[test]
    fn test_parse_status_ready() {
        assert_eq!(
            Record::parse("STATUS:READY").unwrap(),
            Record::Status(DeviceStatus {
                status: StatusKind::Ready,
                timeout: 0,
                noinit_pin: None,
            })
        );
    }

    #[test]
    fn test_parse_status_running() {
        assert_eq!(
            Record::parse("STATUS:RUNNING:30").unwrap(),
            Record::Status(DeviceStatus {
                status: StatusKind::Running,
                timeout: 30,
                noinit_pin: None,
            })
        );
    }

    #[test]
    fn test_parse_status_noinit() {
        assert_eq!(
            Record::parse("STATUS:NOINIT:26").unwrap(),
            Record::Status(DeviceStatus {
                status: StatusKind::NoInit,
                timeout: 0,
                noinit_pin: Some("26".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_status_unknown_passthrough() {
        match Record::parse("STATUS:CALIBRATING:7").unwrap() {
            Record::Status(status) => {
                assert_eq!(status.status, StatusKind::Other("CALIBRATING".to_string()));
                assert_eq!(status.timeout, 0);
                assert_eq!(status.noinit_pin, None);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_parse_status_running_without_timeout() {
        match Record::parse("STATUS:RUNNING").unwrap() {
            Record::Status(status) => {
                assert!(status.is_running());
                assert_eq!(status.timeout, 0);
            }
            other => panic!("unexpected record: {:?}", other),
        }
        assert!(Record::parse("STATUS").is_err());
    }

    #[test]
    fn test_parse_blank_and_unrecognized() {
        assert_eq!(Record::parse("").unwrap(), Record::Blank);
        assert_eq!(
            Record::parse("MicroPython v1.22").unwrap(),
            Record::Unrecognized("MicroPython v1.22".to_string())
        );
        assert_eq!(Record::parse("data:ch1").unwrap().kind(), None);
    }

    #[test]
    fn test_status_kind_round_trip_names() {
        for kind in [
            StatusKind::NoInit,
            StatusKind::Initializing,
            StatusKind::Ready,
            StatusKind::Running,
        ] {
            assert_eq!(StatusKind::from_token(kind.as_str()), kind);
        }
    }
}
