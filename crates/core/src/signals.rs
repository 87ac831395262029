// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    pub fn inverted(self) -> Self {
        match self {
            DigitalLevel::Low => DigitalLevel::High,
            DigitalLevel::High => DigitalLevel::Low,
        }
    }
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

impl fmt::Display for DigitalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitalLevel::Low => write!(f, "0"),
            DigitalLevel::High => write!(f, "1"),
        }
    }
}

bitflags::bitflags! {
    /// Bit positions of the serial lines inside the peripheral input byte (`ui_in`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputPins: u8 {
        const SCLK = 1 << 0;
        const COPI = 1 << 1;
        const NCS = 1 << 2;
    }
}

/// Instantaneous value of the three lines driven into the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineState {
    pins: InputPins,
}

impl LineState {
    pub fn new(ncs: DigitalLevel, copi: DigitalLevel, sclk: DigitalLevel) -> Self {
        let mut pins = InputPins::empty();
        pins.set(InputPins::NCS, ncs.into());
        pins.set(InputPins::COPI, copi.into());
        pins.set(InputPins::SCLK, sclk.into());
        Self { pins }
    }

    /// Chip-select released, clock idle low, data low.
    pub fn idle() -> Self {
        Self::new(DigitalLevel::High, DigitalLevel::Low, DigitalLevel::Low)
    }

    pub fn from_ui_in(value: u8) -> Self {
        Self {
            pins: InputPins::from_bits_truncate(value),
        }
    }

    pub fn ui_in(&self) -> u8 {
        self.pins.bits()
    }

    pub fn ncs(&self) -> DigitalLevel {
        self.pins.contains(InputPins::NCS).into()
    }

    pub fn copi(&self) -> DigitalLevel {
        self.pins.contains(InputPins::COPI).into()
    }

    pub fn sclk(&self) -> DigitalLevel {
        self.pins.contains(InputPins::SCLK).into()
    }

    /// Chip-select is active low.
    pub fn is_selected(&self) -> bool {
        self.ncs() == DigitalLevel::Low
    }

    pub fn with_copi(mut self, level: DigitalLevel) -> Self {
        self.pins.set(InputPins::COPI, level.into());
        self
    }

    pub fn with_sclk(mut self, level: DigitalLevel) -> Self {
        self.pins.set(InputPins::SCLK, level.into());
        self
    }
}

impl Default for LineState {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ncs={} copi={} sclk={}",
            self.ncs(),
            self.copi(),
            self.sclk()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    UoOut,
    UioOut,
}

/// Output bytes exposed by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct OutputPins {
    pub uo_out: u8,
    pub uio_out: u8,
}

impl OutputPins {
    pub fn port(&self, port: OutputPort) -> u8 {
        match port {
            OutputPort::UoOut => self.uo_out,
            OutputPort::UioOut => self.uio_out,
        }
    }
}

/// Selects the single monitored line among the peripheral outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Probe {
    port: OutputPort,
    bit: u8,
}

impl Probe {
    pub fn new(port: OutputPort, bit: u8) -> Self {
        Self {
            port,
            bit: bit & 0x7,
        }
    }

    pub fn port(&self) -> OutputPort {
        self.port
    }

    /// Bit index as configured. Deserialized probes are not masked, so callers
    /// validating configuration see the raw value.
    pub fn bit(&self) -> u8 {
        self.bit
    }

    pub fn level(&self, outputs: OutputPins) -> DigitalLevel {
        ((outputs.port(self.port) >> (self.bit & 0x7)) & 1 == 1).into()
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new(OutputPort::UoOut, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Level the line settles at after this edge.
    pub fn target(self) -> DigitalLevel {
        match self {
            Edge::Rising => DigitalLevel::High,
            Edge::Falling => DigitalLevel::Low,
        }
    }
}

/// An observed transition of the monitored line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub timestamp_ns: u64,
    pub level: DigitalLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_level() {
        let b: bool = DigitalLevel::High.into();
        assert!(b);
        assert_eq!(DigitalLevel::from(false), DigitalLevel::Low);
        assert_eq!(DigitalLevel::Low.inverted(), DigitalLevel::High);
    }

    #[test]
    fn test_line_state_packing() {
        // ui_in = 00000{ncs}{copi}{sclk}
        let lines = LineState::new(DigitalLevel::High, DigitalLevel::Low, DigitalLevel::Low);
        assert_eq!(lines.ui_in(), 0b100);
        assert_eq!(lines, LineState::idle());

        let lines = LineState::new(DigitalLevel::Low, DigitalLevel::High, DigitalLevel::High);
        assert_eq!(lines.ui_in(), 0b011);
        assert!(lines.is_selected());
        assert_eq!(LineState::from_ui_in(0b011), lines);
        assert_eq!(LineState::from_ui_in(0xF8), LineState::from_ui_in(0));
    }

    #[test]
    fn test_probe_selects_bit() {
        let outputs = OutputPins {
            uo_out: 0b0000_0100,
            uio_out: 0x80,
        };
        assert_eq!(
            Probe::new(OutputPort::UoOut, 2).level(outputs),
            DigitalLevel::High
        );
        assert_eq!(Probe::default().level(outputs), DigitalLevel::Low);
        assert_eq!(
            Probe::new(OutputPort::UioOut, 7).level(outputs),
            DigitalLevel::High
        );
    }

    #[test]
    fn test_deserialized_bit_out_of_range_is_masked() {
        let probe: Probe = serde_json::from_str(r#"{"port":"uio_out","bit":200}"#).unwrap();
        assert_eq!(probe.port(), OutputPort::UioOut);
        assert_eq!(probe.bit(), 200);

        let outputs = OutputPins {
            uo_out: 0,
            uio_out: 0x01,
        };
        assert_eq!(probe.level(outputs), DigitalLevel::High);
        assert_eq!(Probe::new(OutputPort::UoOut, 9).bit(), 1);
    }
}
