// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spibench_core::signals::{DigitalLevel, OutputPort, Probe};
use spibench_core::spi::SpiTiming;
use std::path::Path;

/// Upper bound for configured periods; keeps tick arithmetic far from u64 overflow.
pub const MAX_PERIOD_NS: u64 = 1_000_000_000;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_clock_period_ns() -> u64 {
    100
}

fn default_sclk_period_ns() -> u64 {
    10_000
}

fn default_select_lead_ticks() -> u32 {
    1
}

fn default_settle_ticks() -> u32 {
    600
}

fn default_max_wait_ticks() -> u32 {
    5000
}

fn default_pwm_prescaler() -> u32 {
    13
}

fn default_reset_ticks() -> u32 {
    5
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClockConfig {
    #[serde(default = "default_clock_period_ns")]
    pub period_ns: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period_ns: default_clock_period_ns(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpiConfig {
    /// Full SCLK period; each clock phase lasts half of it.
    #[serde(default = "default_sclk_period_ns")]
    pub sclk_period_ns: u64,
    #[serde(default = "default_select_lead_ticks")]
    pub select_lead_ticks: u32,
    #[serde(default = "default_settle_ticks")]
    pub settle_ticks: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            sclk_period_ns: default_sclk_period_ns(),
            select_lead_ticks: default_select_lead_ticks(),
            settle_ticks: default_settle_ticks(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ObserverConfig {
    #[serde(default = "default_max_wait_ticks")]
    pub max_wait_ticks: u32,
    #[serde(default)]
    pub probe: Probe,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            max_wait_ticks: default_max_wait_ticks(),
            probe: Probe::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    #[serde(default = "default_pwm_prescaler")]
    pub pwm_prescaler: u32,
    #[serde(default = "default_reset_ticks")]
    pub reset_ticks: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            pwm_prescaler: default_pwm_prescaler(),
            reset_ticks: default_reset_ticks(),
        }
    }
}

/// Timing of the bench: reference clock, SPI framing, observer bounds and device model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub spi: SpiConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            clock: ClockConfig::default(),
            spi: SpiConfig::default(),
            observer: ObserverConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bench config at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Bench Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.clock.period_ns == 0 {
            anyhow::bail!("Clock 'period_ns' must be greater than zero");
        }
        if self.clock.period_ns > MAX_PERIOD_NS {
            anyhow::bail!(
                "Clock 'period_ns' ({}) exceeds the {}ns maximum",
                self.clock.period_ns,
                MAX_PERIOD_NS
            );
        }
        if self.spi.sclk_period_ns > MAX_PERIOD_NS {
            anyhow::bail!(
                "SPI 'sclk_period_ns' ({}) exceeds the {}ns maximum",
                self.spi.sclk_period_ns,
                MAX_PERIOD_NS
            );
        }
        if self.spi.sclk_period_ns < self.clock.period_ns.saturating_mul(2) {
            anyhow::bail!(
                "SPI 'sclk_period_ns' ({}) must span at least two reference clock periods ({}ns)",
                self.spi.sclk_period_ns,
                self.clock.period_ns
            );
        }
        if self.observer.max_wait_ticks == 0 {
            anyhow::bail!("Observer 'max_wait_ticks' must be greater than zero");
        }
        if self.observer.probe.bit() > 7 {
            anyhow::bail!(
                "Observer probe bit {} is out of range 0..=7",
                self.observer.probe.bit()
            );
        }
        if self.device.pwm_prescaler == 0 {
            anyhow::bail!("Device 'pwm_prescaler' must be greater than zero");
        }
        Ok(())
    }

    pub fn spi_timing(&self) -> Result<SpiTiming> {
        let timing = SpiTiming::new(self.spi.sclk_period_ns)?
            .with_select_lead_ticks(self.spi.select_lead_ticks)
            .with_settle_ticks(self.spi.settle_ticks);
        Ok(timing)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioLimits {
    pub max_ticks: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ResetDetails {
    #[serde(default)]
    pub hold_ticks: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResetStep {
    pub reset: ResetDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransferDetails {
    pub address: u32,
    pub data: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WriteStep {
    pub write: TransferDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadStep {
    pub read: TransferDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WaitDetails {
    pub ticks: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WaitStep {
    pub wait: WaitDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputDetails {
    pub port: OutputPort,
    pub value: u8,
    #[serde(default)]
    pub mask: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExpectOutputStep {
    pub expect_output: OutputDetails,
}

fn default_tolerance_pct() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PwmDetails {
    pub frequency_hz: f64,
    #[serde(default = "default_tolerance_pct")]
    pub frequency_tolerance_pct: f64,
    pub duty_pct: f64,
    #[serde(default = "default_tolerance_pct")]
    pub duty_tolerance_pct: f64,
    #[serde(default)]
    pub max_wait_ticks: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MeasurePwmStep {
    pub measure_pwm: PwmDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConstantDetails {
    pub level: DigitalLevel,
    pub ticks: u64,
    #[serde(default = "default_stride")]
    pub stride: u64,
}

fn default_stride() -> u64 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExpectConstantStep {
    pub expect_constant: ConstantDetails,
}

/// One action of a scenario. Variants are distinguished by their single key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScenarioStep {
    Reset(ResetStep),
    Write(WriteStep),
    Read(ReadStep),
    Wait(WaitStep),
    ExpectOutput(ExpectOutputStep),
    MeasurePwm(MeasurePwmStep),
    ExpectConstant(ExpectConstantStep),
}

impl ScenarioStep {
    /// Steps that check the device rather than drive it.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            ScenarioStep::ExpectOutput(_)
                | ScenarioStep::MeasurePwm(_)
                | ScenarioStep::ExpectConstant(_)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioScript {
    pub schema_version: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Bench config path, relative to the script.
    #[serde(default)]
    pub bench: Option<String>,
    pub limits: ScenarioLimits,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario script at {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Scenario Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.limits.max_ticks == 0 {
            anyhow::bail!("Limit 'max_ticks' must be greater than zero");
        }

        if self.steps.is_empty() {
            tracing::warn!("Scenario has no steps");
        }

        for (i, step) in self.steps.iter().enumerate() {
            match step {
                ScenarioStep::MeasurePwm(m) => {
                    let m = &m.measure_pwm;
                    if m.frequency_hz <= 0.0 {
                        anyhow::bail!("Step {}: 'frequency_hz' must be positive", i);
                    }
                    if !(0.0..=100.0).contains(&m.duty_pct) {
                        anyhow::bail!("Step {}: 'duty_pct' must be within 0..=100", i);
                    }
                }
                ScenarioStep::ExpectConstant(c) if c.expect_constant.stride == 0 => {
                    anyhow::bail!("Step {}: 'stride' must be greater than zero", i);
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bench_config() {
        let cfg = BenchConfig::from_yaml("{}").unwrap();
        assert_eq!(cfg, BenchConfig::default());
        assert_eq!(cfg.clock.period_ns, 100);
        assert_eq!(cfg.spi.sclk_period_ns, 10_000);
        assert_eq!(cfg.spi.settle_ticks, 600);
        assert_eq!(cfg.observer.max_wait_ticks, 5000);
        assert_eq!(cfg.observer.probe, Probe::new(OutputPort::UoOut, 0));
        assert_eq!(cfg.device.pwm_prescaler, 13);

        let timing = cfg.spi_timing().unwrap();
        assert_eq!(timing.half_period_ns(), 5000);
    }

    #[test]
    fn test_partial_bench_config() {
        let yaml = r#"
clock:
  period_ns: 50
observer:
  probe:
    port: uio_out
    bit: 3
"#;
        let cfg = BenchConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.clock.period_ns, 50);
        assert_eq!(cfg.observer.probe.port(), OutputPort::UioOut);
        assert_eq!(cfg.observer.probe.bit(), 3);
        assert_eq!(cfg.observer.max_wait_ticks, 5000);
    }

    #[test]
    fn test_sclk_faster_than_reference_rejected() {
        let yaml = r#"
spi:
  sclk_period_ns: 100
"#;
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("sclk_period_ns"));
    }

    #[test]
    fn test_oversized_periods_rejected() {
        let yaml = r#"
clock:
  period_ns: 18446744073709551615
"#;
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("period_ns"));

        let yaml = r#"
spi:
  sclk_period_ns: 18446744073709551615
"#;
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("sclk_period_ns"));

        let yaml = r#"
clock:
  period_ns: 1000000000
spi:
  sclk_period_ns: 1000000000
"#;
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("two reference clock periods"));
    }

    #[test]
    fn test_monitored_bit_out_of_range_rejected() {
        let yaml = r#"
observer:
  probe:
    port: uo_out
    bit: 8
"#;
        let err = BenchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("probe bit 8"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(BenchConfig::from_yaml("clock:\n  freq: 1\n").is_err());
    }

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
name: "pwm"
limits:
  max_ticks: 1000000
steps:
  - reset: {}
  - write: { address: 0x02, data: 0x01 }
  - read: { address: 0x41, data: 0xEF }
  - wait: { ticks: 7000 }
  - expect_output: { port: uo_out, value: 0xF0 }
  - measure_pwm: { frequency_hz: 3000, duty_pct: 50 }
  - expect_constant: { level: low, ticks: 30000 }
"#;
        let script = ScenarioScript::from_yaml(yaml).unwrap();
        assert_eq!(script.steps.len(), 7);
        assert_eq!(
            script.steps[0],
            ScenarioStep::Reset(ResetStep {
                reset: ResetDetails::default()
            })
        );
        assert_eq!(
            script.steps[1],
            ScenarioStep::Write(WriteStep {
                write: TransferDetails {
                    address: 2,
                    data: 1
                }
            })
        );
        assert!(matches!(script.steps[2], ScenarioStep::Read(_)));
        match &script.steps[5] {
            ScenarioStep::MeasurePwm(m) => {
                assert_eq!(m.measure_pwm.frequency_tolerance_pct, 1.0);
                assert_eq!(m.measure_pwm.duty_tolerance_pct, 1.0);
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &script.steps[6] {
            ScenarioStep::ExpectConstant(c) => {
                assert_eq!(c.expect_constant.level, DigitalLevel::Low);
                assert_eq!(c.expect_constant.stride, 10);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(script.steps[4].is_assertion());
        assert!(!script.steps[3].is_assertion());
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
limits:
  max_ticks: 100
"#;
        let err = ScenarioScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_zero_max_ticks() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_ticks: 0
"#;
        let err = ScenarioScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("max_ticks"));
    }

    #[test]
    fn test_bad_duty_target() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_ticks: 100
steps:
  - measure_pwm: { frequency_hz: 3000, duty_pct: 150 }
"#;
        let err = ScenarioScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duty_pct"));
    }

    #[test]
    fn test_unknown_step_rejected() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_ticks: 100
steps:
  - poke: { address: 1 }
"#;
        assert!(ScenarioScript::from_yaml(yaml).is_err());
    }
}
