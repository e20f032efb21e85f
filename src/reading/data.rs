//! Data structures for sensor readings.

use crate::reading::units::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated numeric reading in the device's native unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Measured value
    pub value: f64,
    /// Unit the value was measured in (always native)
    pub unit: Unit,
}

/// A reading after unit conversion and 2-decimal rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvertedValue {
    /// Converted, rounded value
    pub value: f64,
    /// Unit the value is expressed in
    pub unit: Unit,
}

impl Reading {
    /// Create a reading in the native unit.
    pub fn native(value: f64) -> Self {
        Self {
            value,
            unit: Unit::Celsius,
        }
    }
}

impl ConvertedValue {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }
}

impl fmt::Display for ConvertedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}{}", self.value, self.unit)
    }
}
