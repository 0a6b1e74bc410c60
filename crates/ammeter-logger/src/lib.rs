//! Serial client and data logger for the MicroPython ammeter.
//!
//! [`AmmeterClient`] owns a [`Transport`] and a background receive loop that
//! keeps a live [`SessionState`]: the last reported status and configuration
//! plus the readings of the current sampling window. Commands are written
//! directly and answered through that state.
//!
//! # Example
//!
//! ```rust
//! use ammeter_logger::{AmmeterClient, ClientConfig, MockTransport};
//!
//! let device = MockTransport::with_responder(|cmd| match cmd {
//!     b"CMD:STATUS\n" => Some(b"STATUS:READY\n".to_vec()),
//!     _ => None,
//! });
//!
//! let client = AmmeterClient::new(device, ClientConfig::default()).unwrap();
//! let status = client.status().unwrap().expect("device answered");
//! assert!(status.is_ready());
//! client.shutdown();
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod receiver;
pub mod report;
pub mod state;
pub mod telemetry;
pub mod transport;

pub use client::AmmeterClient;
pub use config::{ClientConfig, SerialSettings, DEFAULT_BAUD_RATE};
pub use error::{ClientError, Result};
pub use receiver::Receiver;
pub use state::{Reading, SamplingWindow, SessionReport, SessionState, WindowMark};
pub use transport::{MockTransport, SerialTransport, SharedTransport, Transport};

pub use ammeter_protocol::{Command, DeviceConfig, DeviceStatus, PinConfig, Record, StatusKind};
