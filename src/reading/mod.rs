//! Turning raw device text into converted readings.
//!
//! This module holds the synchronous stages of the pipeline: framing chunks
//! into lines, parsing lines into readings, and converting readings into the
//! display unit.

pub mod data;
pub mod framer;
pub mod parser;
pub mod units;

// Re-export commonly used items
pub use data::{ConvertedValue, Reading};
pub use framer::{LineFramer, Lines, TERMINATOR};
pub use parser::parse;
pub use units::{convert, convert_tagged, unit_channel, Unit, UnitControl, UnitSignal};
