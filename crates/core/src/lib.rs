// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bench;
pub mod clock;
pub mod metrics;
pub mod observer;
pub mod peripherals;
pub mod signals;
pub mod spi;

pub use bench::{Bench, BenchObserver};
pub use clock::{Clocked, LineDriver, ReferenceClock, SignalView};
pub use observer::{Measurement, SignalObserver};
pub use signals::{DigitalLevel, Edge, EdgeEvent, LineState, OutputPins, OutputPort, Probe};
pub use spi::{Direction, SpiMaster, SpiTiming, Transaction};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarnessError {
    #[error("Address {0:#x} does not fit in 7 bits")]
    InvalidAddress(u32),
    #[error("Data {0:#x} does not fit in 8 bits")]
    InvalidData(u32),
    #[error("Transaction started while lines were not idle ({lines})")]
    ProtocolViolation { lines: LineState },
    #[error("Timeout: line never reached {expected} within {waited_ticks} ticks; stuck at {stuck}")]
    Timeout {
        expected: DigitalLevel,
        stuck: DigitalLevel,
        waited_ticks: u32,
    },
    #[error("Non-monotonic edge timestamps: rising={rising_ns}ns falling={falling_ns}ns next_rising={next_rising_ns}ns")]
    InvalidEdgeSequence {
        rising_ns: u64,
        falling_ns: u64,
        next_rising_ns: u64,
    },
    #[error("Line expected constant {expected} but read {observed} at {at_ns}ns")]
    LevelMismatch {
        expected: DigitalLevel,
        observed: DigitalLevel,
        at_ns: u64,
    },
    #[error("Invalid timing parameter: {0}")]
    InvalidTiming(String),
    #[error("Tick budget exhausted at {at_ns}ns")]
    TickLimit { at_ns: u64 },
}

pub type HarnessResult<T> = Result<T, HarnessError>;
