// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::{LineState, OutputPins};

/// Free-running reference clock. All harness time is a multiple of its period.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReferenceClock {
    period_ns: u64,
    ticks: u64,
}

impl ReferenceClock {
    pub fn new(period_ns: u64) -> Self {
        Self {
            period_ns: period_ns.max(1),
            ticks: 0,
        }
    }

    pub fn advance(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    pub fn now_ns(&self) -> u64 {
        self.ticks.saturating_mul(self.period_ns)
    }

    pub fn frequency_hz(&self) -> f64 {
        1e9 / self.period_ns as f64
    }

    /// Number of ticks needed to cover at least `ns`.
    pub fn ticks_for_ns(&self, ns: u64) -> u64 {
        ns.div_ceil(self.period_ns)
    }
}

impl Default for ReferenceClock {
    fn default() -> Self {
        // 10 MHz
        Self::new(100)
    }
}

/// Anything that advances in lockstep with the reference clock.
pub trait Clocked {
    /// Wait one reference-clock tick.
    fn tick(&mut self);
    fn now_ns(&self) -> u64;

    /// True once the host will not grant another tick. Polling loops stop with
    /// [`crate::HarnessError::TickLimit`] instead of ticking past it.
    fn tick_budget_exhausted(&self) -> bool {
        false
    }
}

/// Write side of the serial lines. Owned by the SPI master for the duration of a frame.
pub trait LineDriver: Clocked {
    fn driven(&self) -> LineState;
    fn drive(&mut self, lines: LineState);
}

/// Read-only view of the peripheral outputs, handed to the signal observer.
pub trait SignalView: Clocked {
    fn outputs(&self) -> OutputPins;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_accounting() {
        let mut clk = ReferenceClock::new(100);
        assert_eq!(clk.now_ns(), 0);
        for _ in 0..50 {
            clk.advance();
        }
        assert_eq!(clk.ticks(), 50);
        assert_eq!(clk.now_ns(), 5000);
        assert_eq!(clk.frequency_hz(), 10_000_000.0);
    }

    #[test]
    fn test_ticks_for_ns_rounds_up() {
        let clk = ReferenceClock::new(100);
        assert_eq!(clk.ticks_for_ns(5000), 50);
        assert_eq!(clk.ticks_for_ns(5001), 51);
        assert_eq!(clk.ticks_for_ns(0), 0);
    }

    #[test]
    fn test_now_ns_saturates() {
        let mut clk = ReferenceClock::new(u64::MAX);
        clk.advance();
        clk.advance();
        assert_eq!(clk.now_ns(), u64::MAX);
    }
}
