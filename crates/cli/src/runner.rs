// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use spibench_config::{BenchConfig, ScenarioStep};
use spibench_core::observer::{Measurement, SignalObserver};
use spibench_core::peripherals::spi_pwm::SpiPwmPeripheral;
use spibench_core::spi::SpiMaster;
use spibench_core::{Bench, BenchObserver, Clocked, HarnessError, ReferenceClock, SignalView};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Script or bench config could not be loaded.
    ConfigError,
    Completed,
    AssertionFailed,
    RuntimeError,
    MaxTicks,
}

#[derive(Debug, Serialize, Clone)]
pub struct StepResult {
    pub index: usize,
    pub step: ScenarioStep,
    pub passed: bool,
    pub at_ns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stop_reason: StopReason,
    pub message: Option<String>,
    pub steps: Vec<StepResult>,
    pub ticks: u64,
    pub elapsed_ns: u64,
}

enum StepError {
    Assertion(String),
    Runtime(String),
    TickLimit(String),
}

impl From<HarnessError> for StepError {
    fn from(e: HarnessError) -> Self {
        match e {
            HarnessError::Timeout { .. }
            | HarnessError::InvalidEdgeSequence { .. }
            | HarnessError::LevelMismatch { .. } => StepError::Assertion(e.to_string()),
            HarnessError::TickLimit { .. } => StepError::TickLimit(e.to_string()),
            _ => StepError::Runtime(e.to_string()),
        }
    }
}

/// Executes scenario steps against the SPI/PWM peripheral model.
pub struct ScenarioRunner {
    bench: Bench<SpiPwmPeripheral>,
    spi: SpiMaster,
    observer: SignalObserver,
    config: BenchConfig,
    max_ticks: u64,
}

impl ScenarioRunner {
    pub fn new(config: BenchConfig, max_ticks: u64) -> anyhow::Result<Self> {
        config.validate()?;
        let mut bench = Bench::new(
            ReferenceClock::new(config.clock.period_ns),
            SpiPwmPeripheral::new(config.device.pwm_prescaler),
        );
        bench.set_tick_limit(Some(max_ticks));
        Ok(Self {
            bench,
            spi: SpiMaster::new(config.spi_timing()?),
            observer: SignalObserver::new(config.observer.probe),
            config,
            max_ticks,
        })
    }

    pub fn attach_observer(&mut self, observer: Arc<dyn BenchObserver>) {
        self.bench.observers.push(observer);
    }

    pub fn bench(&self) -> &Bench<SpiPwmPeripheral> {
        &self.bench
    }

    pub fn run(&mut self, steps: &[ScenarioStep]) -> RunReport {
        let mut results = Vec::with_capacity(steps.len());
        let mut stop_reason = StopReason::Completed;
        let mut message = None;

        for (index, step) in steps.iter().enumerate() {
            if self.bench.ticks() >= self.max_ticks {
                stop_reason = StopReason::MaxTicks;
                message = Some(format!(
                    "Tick limit {} reached before step {}",
                    self.max_ticks, index
                ));
                break;
            }

            tracing::debug!("Step {}: {:?}", index, step);
            let outcome = self.execute(step);
            let at_ns = self.bench.now_ns();
            match outcome {
                Ok(measurement) => results.push(StepResult {
                    index,
                    step: step.clone(),
                    passed: true,
                    at_ns,
                    message: None,
                    measurement,
                }),
                Err(e) => {
                    let (reason, msg) = match e {
                        StepError::Assertion(msg) => (StopReason::AssertionFailed, msg),
                        StepError::Runtime(msg) => (StopReason::RuntimeError, msg),
                        StepError::TickLimit(msg) => (StopReason::MaxTicks, msg),
                    };
                    tracing::error!("Step {} failed: {}", index, msg);
                    results.push(StepResult {
                        index,
                        step: step.clone(),
                        passed: false,
                        at_ns,
                        message: Some(msg.clone()),
                        measurement: None,
                    });
                    stop_reason = reason;
                    message = Some(msg);
                    break;
                }
            }
        }

        RunReport {
            stop_reason,
            message,
            steps: results,
            ticks: self.bench.ticks(),
            elapsed_ns: self.bench.now_ns(),
        }
    }

    fn execute(&mut self, step: &ScenarioStep) -> Result<Option<Measurement>, StepError> {
        match step {
            ScenarioStep::Reset(s) => {
                let hold = s.reset.hold_ticks.unwrap_or(self.config.device.reset_ticks);
                let start = self.bench.ticks();
                self.bench.reset(hold);
                if self.bench.ticks() - start < 2 * hold as u64 {
                    return Err(self.tick_limit_error());
                }
            }
            ScenarioStep::Write(s) => {
                self.spi
                    .write(&mut self.bench, s.write.address, s.write.data)?;
            }
            ScenarioStep::Read(s) => {
                self.spi.read(&mut self.bench, s.read.address, s.read.data)?;
            }
            ScenarioStep::Wait(s) => {
                if self.bench.run(s.wait.ticks) < s.wait.ticks {
                    return Err(self.tick_limit_error());
                }
            }
            ScenarioStep::ExpectOutput(s) => {
                let e = &s.expect_output;
                let mask = e.mask.unwrap_or(0xFF);
                let actual = self.bench.outputs().port(e.port) & mask;
                let expected = e.value & mask;
                if actual != expected {
                    return Err(StepError::Assertion(format!(
                        "Expected {:?} = {:#04x} (mask {:#04x}), got {:#04x}",
                        e.port, expected, mask, actual
                    )));
                }
            }
            ScenarioStep::MeasurePwm(s) => {
                let p = &s.measure_pwm;
                let max_wait = p.max_wait_ticks.unwrap_or(self.config.observer.max_wait_ticks);
                let m = self.observer.measure_cycle(&mut self.bench, max_wait)?;
                if !m.frequency_within(p.frequency_hz, p.frequency_tolerance_pct) {
                    return Err(StepError::Assertion(format!(
                        "Measured {:.1} Hz; expected {} Hz +-{}%",
                        m.frequency_hz, p.frequency_hz, p.frequency_tolerance_pct
                    )));
                }
                if !m.duty_within(p.duty_pct, p.duty_tolerance_pct) {
                    return Err(StepError::Assertion(format!(
                        "Measured duty {:.1}%; expected {}% +-{}%",
                        m.duty_pct, p.duty_pct, p.duty_tolerance_pct
                    )));
                }
                return Ok(Some(m));
            }
            ScenarioStep::ExpectConstant(s) => {
                let c = &s.expect_constant;
                self.observer
                    .assert_constant(&mut self.bench, c.level, c.ticks, c.stride)?;
            }
        }
        Ok(None)
    }

    fn tick_limit_error(&self) -> StepError {
        StepError::TickLimit(format!(
            "Tick limit {} reached at {}ns",
            self.max_ticks,
            self.bench.now_ns()
        ))
    }
}
