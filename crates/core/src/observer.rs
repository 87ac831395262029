// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Timing observer for a single peripheral output line.
//!
//! Every wait polls once per reference tick against an explicit tick budget, so a
//! line that never toggles surfaces as [`HarnessError::Timeout`] instead of a hang.

use crate::clock::SignalView;
use crate::signals::{DigitalLevel, Edge, EdgeEvent, Probe};
use crate::{HarnessError, HarnessResult};

/// Period and duty derived from a rising, falling, rising timestamp triple.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Measurement {
    pub rising_ns: u64,
    pub falling_ns: u64,
    pub next_rising_ns: u64,
    pub period_ns: u64,
    pub high_ns: u64,
    pub frequency_hz: f64,
    pub duty_pct: f64,
}

impl Measurement {
    pub fn from_timestamps(
        rising_ns: u64,
        falling_ns: u64,
        next_rising_ns: u64,
    ) -> HarnessResult<Self> {
        if !(rising_ns < falling_ns && falling_ns < next_rising_ns) {
            return Err(HarnessError::InvalidEdgeSequence {
                rising_ns,
                falling_ns,
                next_rising_ns,
            });
        }

        let period_ns = next_rising_ns - rising_ns;
        let high_ns = falling_ns - rising_ns;
        Ok(Self {
            rising_ns,
            falling_ns,
            next_rising_ns,
            period_ns,
            high_ns,
            frequency_hz: 1e9 / period_ns as f64,
            duty_pct: 100.0 * high_ns as f64 / period_ns as f64,
        })
    }

    pub fn frequency_within(&self, nominal_hz: f64, tolerance_pct: f64) -> bool {
        (self.frequency_hz - nominal_hz).abs() <= nominal_hz * tolerance_pct / 100.0
    }

    pub fn duty_within(&self, target_pct: f64, tolerance_pct: f64) -> bool {
        (self.duty_pct - target_pct).abs() <= tolerance_pct
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalObserver {
    probe: Probe,
}

impl SignalObserver {
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> Probe {
        self.probe
    }

    pub fn level<V: SignalView + ?Sized>(&self, view: &V) -> DigitalLevel {
        self.probe.level(view.outputs())
    }

    /// Tick until the monitored line reads `desired`, at most `max_wait` ticks.
    /// Returns the timestamp of the first matching sample.
    pub fn wait_for_level<V: SignalView + ?Sized>(
        &self,
        view: &mut V,
        desired: DigitalLevel,
        max_wait: u32,
    ) -> HarnessResult<u64> {
        for _ in 0..max_wait {
            tick_within_budget(view)?;
            if self.level(view) == desired {
                return Ok(view.now_ns());
            }
        }

        Err(self.timeout(desired, self.level(view), max_wait))
    }

    /// Tick until a transition matching `edge` is seen. A line already sitting at the
    /// target level does not count; it has to leave and come back.
    pub fn wait_for_edge<V: SignalView + ?Sized>(
        &self,
        view: &mut V,
        edge: Edge,
        max_wait: u32,
    ) -> HarnessResult<EdgeEvent> {
        let target = edge.target();
        let mut previous = self.level(view);
        for _ in 0..max_wait {
            tick_within_budget(view)?;
            let level = self.level(view);
            if level != previous && level == target {
                return Ok(EdgeEvent {
                    timestamp_ns: view.now_ns(),
                    level,
                });
            }
            previous = level;
        }

        Err(self.timeout(target, previous, max_wait))
    }

    fn timeout(&self, expected: DigitalLevel, stuck: DigitalLevel, max_wait: u32) -> HarnessError {
        tracing::warn!(
            "{:?} bit {} never reached {} in {} ticks (stuck at {})",
            self.probe.port(),
            self.probe.bit(),
            expected,
            max_wait,
            stuck
        );
        HarnessError::Timeout {
            expected,
            stuck,
            waited_ticks: max_wait,
        }
    }

    /// Measure one full period: rising, falling, rising. If the line is high on entry
    /// the observer first waits for it to drop, so the first timestamp is a true edge.
    pub fn measure_cycle<V: SignalView + ?Sized>(
        &self,
        view: &mut V,
        max_wait: u32,
    ) -> HarnessResult<Measurement> {
        if self.level(view) == DigitalLevel::High {
            self.wait_for_level(view, DigitalLevel::Low, max_wait)?;
        }

        let rising = self.wait_for_level(view, DigitalLevel::High, max_wait)?;
        let falling = self.wait_for_level(view, DigitalLevel::Low, max_wait)?;
        let next_rising = self.wait_for_level(view, DigitalLevel::High, max_wait)?;

        let m = Measurement::from_timestamps(rising, falling, next_rising)?;
        tracing::info!(
            "Measured {:.1} Hz, duty {:.1}% (period {}ns, high {}ns)",
            m.frequency_hz,
            m.duty_pct,
            m.period_ns,
            m.high_ns
        );
        Ok(m)
    }

    /// Sample the line now and every `stride_ticks` until `duration_ticks` have passed.
    /// Fails on the first sample that differs from `level`. Returns the sample count.
    pub fn assert_constant<V: SignalView + ?Sized>(
        &self,
        view: &mut V,
        level: DigitalLevel,
        duration_ticks: u64,
        stride_ticks: u64,
    ) -> HarnessResult<u64> {
        if stride_ticks == 0 {
            return Err(HarnessError::InvalidTiming(
                "sample stride must be at least one tick".to_string(),
            ));
        }

        let mut samples = 0;
        let mut elapsed = 0;
        loop {
            let observed = self.level(view);
            samples += 1;
            if observed != level {
                return Err(HarnessError::LevelMismatch {
                    expected: level,
                    observed,
                    at_ns: view.now_ns(),
                });
            }

            if elapsed >= duration_ticks {
                break;
            }
            let step = stride_ticks.min(duration_ticks - elapsed);
            for _ in 0..step {
                tick_within_budget(view)?;
            }
            elapsed += step;
        }

        tracing::debug!("Line held at {} for {} ticks", level, duration_ticks);
        Ok(samples)
    }
}

fn tick_within_budget<V: SignalView + ?Sized>(view: &mut V) -> HarnessResult<()> {
    if view.tick_budget_exhausted() {
        let at_ns = view.now_ns();
        tracing::warn!("Observer stopped at {}ns: tick budget exhausted", at_ns);
        return Err(HarnessError::TickLimit { at_ns });
    }
    view.tick();
    Ok(())
}
