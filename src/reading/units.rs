//! Unit conversion and the live target-unit signal.

use crate::error::{Result, StreamError};
use crate::reading::data::ConvertedValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

/// Temperature unit understood by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Native unit reported by the sensor
    #[default]
    #[serde(rename = "°C")]
    Celsius,
    /// Linearly derived display unit
    #[serde(rename = "°F")]
    Fahrenheit,
}

impl Unit {
    /// Display symbol, as shown next to a value.
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Fahrenheit => "°F",
        }
    }

    /// Whether this is the unit the device measures in.
    pub fn is_native(&self) -> bool {
        matches!(self, Unit::Celsius)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = StreamError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim() {
            "°C" | "C" => Ok(Unit::Celsius),
            "°F" | "F" => Ok(Unit::Fahrenheit),
            other => match other.to_ascii_lowercase().as_str() {
                "celsius" | "native" => Ok(Unit::Celsius),
                "fahrenheit" | "derived" => Ok(Unit::Fahrenheit),
                _ => Err(StreamError::invalid_unit(tag)),
            },
        }
    }
}

/// Magnitude beyond which an `f64` has no fractional digits left to round.
const ROUNDING_LIMIT: f64 = 1e15;

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    if value.abs() >= ROUNDING_LIMIT {
        return value;
    }
    (value * 100.0).round() / 100.0
}

/// Convert a native (Celsius) value into `unit`, rounded to 2 decimal places.
pub fn convert(value: f64, unit: Unit) -> f64 {
    let converted = if unit.is_native() {
        value
    } else {
        value * 1.8 + 32.0
    };
    round2(converted)
}

/// Convert a native value into the unit named by `tag`.
///
/// Unknown tags are a caller defect and fail with [`StreamError::InvalidUnit`]
/// instead of falling back to a default.
pub fn convert_tagged(value: f64, tag: &str) -> Result<ConvertedValue> {
    let unit: Unit = tag.parse()?;
    Ok(ConvertedValue::new(convert(value, unit), unit))
}

/// Read side of the externally-owned target unit.
///
/// The pipeline calls [`UnitSignal::current`] at the moment of each
/// conversion, so a change takes effect on the next reading.
#[derive(Debug, Clone)]
pub struct UnitSignal {
    rx: watch::Receiver<Unit>,
}

/// Write side of the target unit, held by whatever owns the display.
#[derive(Debug, Clone)]
pub struct UnitControl {
    tx: Arc<watch::Sender<Unit>>,
}

/// Create a linked unit control/signal pair starting at `initial`.
pub fn unit_channel(initial: Unit) -> (UnitControl, UnitSignal) {
    let (tx, rx) = watch::channel(initial);
    (UnitControl { tx: Arc::new(tx) }, UnitSignal { rx })
}

impl UnitSignal {
    /// A signal that never changes.
    pub fn fixed(unit: Unit) -> Self {
        unit_channel(unit).1
    }

    /// Unit in effect right now.
    pub fn current(&self) -> Unit {
        *self.rx.borrow()
    }
}

impl UnitControl {
    /// Change the target unit. Takes effect on the next conversion.
    pub fn set(&self, unit: Unit) {
        self.tx.send_replace(unit);
    }

    /// Change the target unit by tag.
    pub fn set_tag(&self, tag: &str) -> Result<Unit> {
        let unit = tag.parse()?;
        self.set(unit);
        Ok(unit)
    }

    pub fn current(&self) -> Unit {
        *self.tx.borrow()
    }

    /// A new read handle onto this control.
    pub fn signal(&self) -> UnitSignal {
        UnitSignal {
            rx: self.tx.subscribe(),
        }
    }
}
