// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod spi_pwm;

use crate::signals::{LineState, OutputPins};

/// A clocked device under test, reachable only through its pins.
pub trait Device: std::fmt::Debug + Send {
    /// Return every register and counter to its reset value.
    fn reset(&mut self);
    /// Sample `inputs` on a reference-clock edge and update internal state.
    fn tick(&mut self, inputs: LineState);
    fn outputs(&self) -> OutputPins;
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
