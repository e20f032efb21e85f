//! # thermolog - Serial Temperature Logger
//!
//! Turns the raw text stream of a serial temperature sensor into debounced,
//! unit-converted readings. The device prints one decimal Celsius value per
//! `\r\n`-terminated line; reads arrive in arbitrary chunks.
//!
//! ## Pipeline
//!
//! - **Framing**: reassemble complete lines across chunk boundaries
//! - **Parsing**: accept whole decimal numbers, skip anything else
//! - **Conversion**: into the unit currently selected, rounded to 2 places
//! - **Duplicate suppression**: drop repeats of the last value
//! - **Debounce**: deliver the latest value after a short quiet period
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use thermolog::{unit_channel, PipelineConfig, ReaderSource, StreamPipeline, Unit};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = tokio::fs::File::open("/dev/ttyACM0").await?;
//!     let (units, signal) = unit_channel(Unit::Celsius);
//!
//!     let pipeline = StreamPipeline::new(PipelineConfig::default(), signal);
//!     let session = pipeline.open(ReaderSource::new(device), |value| {
//!         println!("{}", value);
//!     })?;
//!
//!     units.set(Unit::Fahrenheit);
//!     session.join().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logger;
pub mod pipeline;
pub mod reading;
pub mod web;

// Re-export public API
pub use error::{Result, StreamError};
pub use logger::{LogEntry, Sampler};
pub use pipeline::{
    ByteSource, ChannelSource, Debouncer, PipelineConfig, ReaderSource, Session, SessionHandle,
    SessionState, SessionStats, StreamPipeline,
};
pub use reading::{
    convert, convert_tagged, parse, unit_channel, ConvertedValue, LineFramer, Reading, Unit,
    UnitControl, UnitSignal,
};
pub use web::{start_web_server, WebConfig};

/// The default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// The default data logging interval in milliseconds
pub const DEFAULT_LOG_INTERVAL_MS: u64 = 500;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;
