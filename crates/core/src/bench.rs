// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::{Clocked, LineDriver, ReferenceClock, SignalView};
use crate::peripherals::Device;
use crate::signals::{LineState, OutputPins};
use std::sync::Arc;

/// Hooks for watching a bench run (waveform dumps, counters).
pub trait BenchObserver: std::fmt::Debug + Send + Sync {
    fn on_reset(&self, _now_ns: u64) {}
    fn on_tick(&self, _now_ns: u64) {}
    fn on_lines_driven(&self, _now_ns: u64, _lines: LineState) {}
    fn on_outputs_changed(&self, _now_ns: u64, _outputs: OutputPins) {}
}

/// Hosts a device under test on the reference clock.
///
/// The bench is the single point where the driven input lines meet the device:
/// the SPI master writes lines through [`LineDriver`], the observer reads outputs
/// through [`SignalView`], and neither sees the other's side.
pub struct Bench<D: Device> {
    clock: ReferenceClock,
    device: D,
    lines: LineState,
    outputs: OutputPins,
    tick_limit: Option<u64>,
    pub observers: Vec<Arc<dyn BenchObserver>>,
}

impl<D: Device> Bench<D> {
    pub fn new(clock: ReferenceClock, device: D) -> Self {
        let outputs = device.outputs();
        Self {
            clock,
            device,
            lines: LineState::idle(),
            outputs,
            tick_limit: None,
            observers: Vec::new(),
        }
    }

    /// Cap the total number of ticks this bench will run. `run` and `reset` stop
    /// at the cap; driver and observer loops fail with `TickLimit`.
    pub fn set_tick_limit(&mut self, limit: Option<u64>) {
        self.tick_limit = limit;
    }

    pub fn tick_limit(&self) -> Option<u64> {
        self.tick_limit
    }

    pub fn clock(&self) -> &ReferenceClock {
        &self.clock
    }

    pub fn ticks(&self) -> u64 {
        self.clock.ticks()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Pulse reset: lines idle, device held in reset for `hold_ticks`, then
    /// released and clocked for another `hold_ticks`.
    pub fn reset(&mut self, hold_ticks: u32) {
        self.drive(LineState::idle());
        for _ in 0..hold_ticks {
            if self.tick_budget_exhausted() {
                break;
            }
            self.clock.advance();
            self.device.reset();
            let now = self.clock.now_ns();
            for observer in &self.observers {
                observer.on_tick(now);
            }
        }
        self.device.reset();
        self.refresh_outputs();

        let now = self.clock.now_ns();
        for observer in &self.observers {
            observer.on_reset(now);
        }
        tracing::debug!("Reset released at {}ns", now);

        self.run(hold_ticks as u64);
    }

    /// Let the clock run for `ticks` with the lines unchanged. Returns the number
    /// of ticks actually run, which is short only when the tick limit is hit.
    pub fn run(&mut self, ticks: u64) -> u64 {
        let start = self.clock.ticks();
        for _ in 0..ticks {
            if self.tick_budget_exhausted() {
                break;
            }
            self.tick();
        }
        self.clock.ticks() - start
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "ticks": self.clock.ticks(),
            "now_ns": self.clock.now_ns(),
            "ui_in": self.lines.ui_in(),
            "outputs": self.outputs,
            "device": self.device.snapshot(),
        })
    }

    fn refresh_outputs(&mut self) {
        let outputs = self.device.outputs();
        if outputs != self.outputs {
            self.outputs = outputs;
            let now = self.clock.now_ns();
            for observer in &self.observers {
                observer.on_outputs_changed(now, outputs);
            }
        }
    }
}

impl<D: Device> Clocked for Bench<D> {
    fn tick(&mut self) {
        self.clock.advance();
        self.device.tick(self.lines);

        let now = self.clock.now_ns();
        for observer in &self.observers {
            observer.on_tick(now);
        }
        self.refresh_outputs();
    }

    fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    fn tick_budget_exhausted(&self) -> bool {
        self.tick_limit.is_some_and(|limit| self.clock.ticks() >= limit)
    }
}

impl<D: Device> LineDriver for Bench<D> {
    fn driven(&self) -> LineState {
        self.lines
    }

    fn drive(&mut self, lines: LineState) {
        if lines == self.lines {
            return;
        }
        self.lines = lines;
        let now = self.clock.now_ns();
        for observer in &self.observers {
            observer.on_lines_driven(now, lines);
        }
    }
}

impl<D: Device> SignalView for Bench<D> {
    fn outputs(&self) -> OutputPins {
        self.outputs
    }
}
