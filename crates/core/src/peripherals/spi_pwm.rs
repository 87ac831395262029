// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::Device;
use crate::signals::{DigitalLevel, LineState, OutputPins};

pub const REG_OUT_EN_LO: u8 = 0x00;
pub const REG_OUT_EN_HI: u8 = 0x01;
pub const REG_PWM_EN_LO: u8 = 0x02;
pub const REG_PWM_EN_HI: u8 = 0x03;
pub const REG_PWM_DUTY: u8 = 0x04;
pub const MAX_REGISTER: u8 = REG_PWM_DUTY;

/// Duty value that pins the PWM output high for the whole period.
pub const DUTY_ALWAYS_HIGH: u8 = 0xFF;

/// Behavioral model of an SPI-controlled PWM peripheral.
///
/// Frames are shifted in MSB first on SCLK rising edges while nCS is low and are
/// committed when nCS returns high. Only complete 16-bit write frames addressing
/// registers 0x00..=0x04 take effect; everything else is dropped.
///
/// Each output bit follows the PWM signal when its PWM enable bit is set, and its
/// output enable bit otherwise.
#[derive(Debug, serde::Serialize)]
pub struct SpiPwmPeripheral {
    regs: [u8; MAX_REGISTER as usize + 1],
    prescaler: u32,

    // Receiver
    prev_ncs: bool,
    prev_sclk: bool,
    shift: u16,
    bit_count: u8,

    // PWM generator
    div_count: u32,
    pwm_count: u8,
}

impl SpiPwmPeripheral {
    /// `prescaler` reference ticks per PWM counter step; the PWM period is
    /// `256 * prescaler` ticks.
    pub fn new(prescaler: u32) -> Self {
        Self {
            regs: [0; MAX_REGISTER as usize + 1],
            prescaler: prescaler.max(1),
            prev_ncs: true,
            prev_sclk: false,
            shift: 0,
            bit_count: 0,
            div_count: 0,
            pwm_count: 0,
        }
    }

    pub fn prescaler(&self) -> u32 {
        self.prescaler
    }

    pub fn register(&self, address: u8) -> Option<u8> {
        self.regs.get(address as usize).copied()
    }

    pub fn period_ticks(&self) -> u64 {
        256 * self.prescaler as u64
    }

    pub fn nominal_frequency_hz(&self, clock_period_ns: u64) -> f64 {
        1e9 / (clock_period_ns * self.period_ticks()) as f64
    }

    pub fn pwm_level(&self) -> DigitalLevel {
        let duty = self.regs[REG_PWM_DUTY as usize];
        (duty == DUTY_ALWAYS_HIGH || self.pwm_count < duty).into()
    }

    fn end_frame(&mut self) {
        if self.bit_count != 16 {
            tracing::debug!("Discarding {}-bit frame", self.bit_count);
            return;
        }

        let write = self.shift & 0x8000 != 0;
        let address = ((self.shift >> 8) & 0x7F) as u8;
        let data = (self.shift & 0xFF) as u8;
        if !write {
            tracing::debug!("Read frame addr={:#04x} ignored", address);
            return;
        }
        if address > MAX_REGISTER {
            tracing::debug!("Write to unmapped addr={:#04x} ignored", address);
            return;
        }

        self.regs[address as usize] = data;
        tracing::debug!("Register {:#04x} <= {:#04x}", address, data);
    }

    fn advance_pwm(&mut self) {
        self.div_count += 1;
        if self.div_count >= self.prescaler {
            self.div_count = 0;
            self.pwm_count = self.pwm_count.wrapping_add(1);
        }
    }
}

impl Default for SpiPwmPeripheral {
    fn default() -> Self {
        // ~3 kHz PWM from a 10 MHz reference
        Self::new(13)
    }
}

impl Device for SpiPwmPeripheral {
    fn reset(&mut self) {
        *self = Self::new(self.prescaler);
    }

    fn tick(&mut self, inputs: LineState) {
        let ncs = bool::from(inputs.ncs());
        let sclk = bool::from(inputs.sclk());

        if !ncs {
            if self.prev_ncs {
                self.shift = 0;
                self.bit_count = 0;
            }
            if sclk && !self.prev_sclk {
                if self.bit_count < 16 {
                    self.shift = (self.shift << 1) | bool::from(inputs.copi()) as u16;
                }
                self.bit_count = self.bit_count.saturating_add(1);
            }
        } else if !self.prev_ncs {
            self.end_frame();
        }

        self.prev_ncs = ncs;
        self.prev_sclk = sclk;
        self.advance_pwm();
    }

    fn outputs(&self) -> OutputPins {
        let pwm = if bool::from(self.pwm_level()) { 0xFF } else { 0x00 };
        let mix = |pwm_en: u8, out_en: u8| (pwm_en & pwm) | (!pwm_en & out_en);
        OutputPins {
            uo_out: mix(
                self.regs[REG_PWM_EN_LO as usize],
                self.regs[REG_OUT_EN_LO as usize],
            ),
            uio_out: mix(
                self.regs[REG_PWM_EN_HI as usize],
                self.regs[REG_OUT_EN_HI as usize],
            ),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit(frame: u16, i: u8) -> DigitalLevel {
        ((frame >> i) & 1 == 1).into()
    }

    /// Clock `bits` MSB-first bits of `frame` into the device, two ticks per phase.
    fn clock_frame(dev: &mut SpiPwmPeripheral, frame: u16, bits: u8) {
        let selected = LineState::new(DigitalLevel::Low, DigitalLevel::Low, DigitalLevel::Low);
        dev.tick(selected);
        for i in (16 - bits..16).rev() {
            let low = selected.with_copi(bit(frame, i));
            dev.tick(low);
            dev.tick(low);
            let high = low.with_sclk(DigitalLevel::High);
            dev.tick(high);
            dev.tick(high);
        }
        dev.tick(LineState::idle());
    }

    #[test]
    fn test_write_commits_on_deselect() {
        let mut dev = SpiPwmPeripheral::default();
        clock_frame(&mut dev, 0x80F0, 16);
        assert_eq!(dev.register(REG_OUT_EN_LO), Some(0xF0));
        assert_eq!(dev.outputs().uo_out, 0xF0);

        clock_frame(&mut dev, 0x81CC, 16);
        assert_eq!(dev.outputs().uio_out, 0xCC);
    }

    #[test]
    fn test_read_and_unmapped_frames_ignored() {
        let mut dev = SpiPwmPeripheral::default();
        clock_frame(&mut dev, 0x80F0, 16);
        clock_frame(&mut dev, 0xB0AA, 16); // write 0x30
        clock_frame(&mut dev, 0x30BE, 16); // read 0x30
        clock_frame(&mut dev, 0x41EF, 16); // read 0x41
        clock_frame(&mut dev, 0x0011, 16); // read 0x00
        assert_eq!(dev.register(REG_OUT_EN_LO), Some(0xF0));
        assert_eq!(dev.register(0x30), None);
    }

    #[test]
    fn test_short_frame_discarded() {
        let mut dev = SpiPwmPeripheral::default();
        clock_frame(&mut dev, 0x80F0, 15);
        assert_eq!(dev.register(REG_OUT_EN_LO), Some(0));
    }

    #[test]
    fn test_pwm_duty_extremes() {
        let mut dev = SpiPwmPeripheral::new(1);
        clock_frame(&mut dev, 0x8201, 16);

        let highs = |dev: &mut SpiPwmPeripheral| {
            (0..256)
                .filter(|_| {
                    dev.tick(LineState::idle());
                    dev.outputs().uo_out & 1 == 1
                })
                .count()
        };

        assert_eq!(highs(&mut dev), 0);

        clock_frame(&mut dev, 0x8480, 16);
        assert_eq!(highs(&mut dev), 128);

        clock_frame(&mut dev, 0x84FF, 16);
        assert_eq!(highs(&mut dev), 256);
    }

    #[test]
    fn test_nominal_frequency() {
        let dev = SpiPwmPeripheral::default();
        assert_eq!(dev.period_ticks(), 3328);
        let f = dev.nominal_frequency_hz(100);
        assert!((f - 3004.8).abs() < 0.1);
    }

    #[test]
    fn test_reset_clears_registers() {
        let mut dev = SpiPwmPeripheral::new(7);
        clock_frame(&mut dev, 0x80FF, 16);
        dev.reset();
        assert_eq!(dev.outputs(), OutputPins::default());
        assert_eq!(dev.prescaler(), 7);
        assert!(dev.snapshot().get("regs").is_some());
    }
}
