//! Ammeter Serial Protocol
//!
//! This crate provides types and utilities for talking to the MicroPython
//! ammeter over its serial console. The device speaks a simple line-based
//! text protocol where every record is a `\n`-terminated line of
//! colon-separated fields.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): `CMD:<NAME>[:<arg>]` terminated with `\n`
//! - **Records** (device → host): `<KIND>:<field>:<field>...` terminated with `\n`
//!
//! # Record Kinds
//!
//! | Kind     | Fields after the kind token                                   |
//! |----------|---------------------------------------------------------------|
//! | `DATA`   | name, ticks, current, `[last reads]`, average                 |
//! | `START`  | device epoch                                                  |
//! | `STOP`   | device epoch                                                  |
//! | `CONFIG` | interval, timeout, init timeout, then `{pin, name, baseline}`+ |
//! | `STATUS` | status, then timeout or NOINIT pin                            |
//!
//! # Example
//!
//! ```rust
//! use ammeter_protocol::{Command, LineCodec, Record};
//!
//! let mut codec = LineCodec::new();
//! codec.push(b"STATUS:RUNNING:30\n");
//!
//! let line = codec.decode_line().unwrap().unwrap();
//! let record = Record::parse(&line).unwrap();
//! assert!(matches!(record, Record::Status(_)));
//!
//! assert_eq!(Command::Status.encode(), b"CMD:STATUS\n");
//! ```

mod codec;
mod commands;
mod error;
mod records;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use records::*;
