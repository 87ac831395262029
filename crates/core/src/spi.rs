// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Bit-banged SPI master (mode 0) for the peripheral register interface.
//!
//! A frame is 16 bits, MSB first: direction bit, 7-bit address, 8-bit data.
//! The master is an explicit state machine advanced once per reference-clock
//! tick, so it can be stepped synchronously without a live clock source.

use crate::clock::LineDriver;
use crate::signals::{DigitalLevel, LineState};
use crate::{HarnessError, HarnessResult};

pub const MAX_ADDRESS: u32 = 0x7F;
pub const MAX_DATA: u32 = 0xFF;
pub const FRAME_BITS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn bit(self) -> u8 {
        match self {
            Direction::Read => 0,
            Direction::Write => 1,
        }
    }
}

/// A single validated register access. Consumed by one call to [`SpiMaster::transfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    direction: Direction,
    address: u8,
    data: u8,
}

impl Transaction {
    pub fn new(direction: Direction, address: u32, data: u32) -> HarnessResult<Self> {
        if address > MAX_ADDRESS {
            return Err(HarnessError::InvalidAddress(address));
        }
        if data > MAX_DATA {
            return Err(HarnessError::InvalidData(data));
        }
        Ok(Self {
            direction,
            address: address as u8,
            data: data as u8,
        })
    }

    pub fn write(address: u32, data: u32) -> HarnessResult<Self> {
        Self::new(Direction::Write, address, data)
    }

    pub fn read(address: u32, data: u32) -> HarnessResult<Self> {
        Self::new(Direction::Read, address, data)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    /// `[(direction << 7) | address, data]`
    pub fn bytes(&self) -> [u8; 2] {
        [(self.direction.bit() << 7) | self.address, self.data]
    }

    pub fn frame(&self) -> u16 {
        u16::from_be_bytes(self.bytes())
    }

    /// Frame bits in wire order (MSB first).
    pub fn bits(&self) -> impl Iterator<Item = DigitalLevel> {
        let frame = self.frame();
        (0..FRAME_BITS).rev().map(move |i| frame_bit(frame, i))
    }
}

fn frame_bit(frame: u16, index: u8) -> DigitalLevel {
    ((frame >> index) & 1 == 1).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiTiming {
    sclk_period_ns: u64,
    select_lead_ticks: u32,
    settle_ticks: u32,
}

impl SpiTiming {
    pub fn new(sclk_period_ns: u64) -> HarnessResult<Self> {
        if sclk_period_ns == 0 {
            return Err(HarnessError::InvalidTiming(
                "SCLK period must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            sclk_period_ns,
            select_lead_ticks: 1,
            settle_ticks: 600,
        })
    }

    /// Reference ticks between asserting nCS and presenting the first bit.
    pub fn with_select_lead_ticks(mut self, ticks: u32) -> Self {
        self.select_lead_ticks = ticks;
        self
    }

    /// Reference ticks the idle state is held after nCS is released.
    pub fn with_settle_ticks(mut self, ticks: u32) -> Self {
        self.settle_ticks = ticks;
        self
    }

    pub fn sclk_period_ns(&self) -> u64 {
        self.sclk_period_ns
    }

    pub fn select_lead_ticks(&self) -> u32 {
        self.select_lead_ticks
    }

    pub fn settle_ticks(&self) -> u32 {
        self.settle_ticks
    }

    pub fn half_period_ns(&self) -> u64 {
        self.sclk_period_ns / 2
    }

    /// True once at least half an SCLK period has passed since `since_ns`.
    fn half_period_elapsed(&self, since_ns: u64, now_ns: u64) -> bool {
        now_ns.saturating_sub(since_ns).saturating_mul(2) >= self.sclk_period_ns
    }
}

impl Default for SpiTiming {
    fn default() -> Self {
        // 100 kHz SCLK against a 10 MHz reference.
        Self {
            sclk_period_ns: 10_000,
            select_lead_ticks: 1,
            settle_ticks: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SelectAsserted { frame: u16, remaining: u32 },
    BitClockLow { frame: u16, bit: u8, since_ns: u64 },
    BitClockHigh { frame: u16, bit: u8, since_ns: u64 },
    Deselect { remaining: u32 },
}

#[derive(Debug)]
pub struct SpiMaster {
    timing: SpiTiming,
    phase: Phase,
    lines: LineState,
}

impl SpiMaster {
    pub fn new(timing: SpiTiming) -> Self {
        Self {
            timing,
            phase: Phase::Idle,
            lines: LineState::idle(),
        }
    }

    pub fn timing(&self) -> SpiTiming {
        self.timing
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Start a frame. `current` is the line state presently on the wire; a frame
    /// may only start while nCS is released and SCLK is idle low.
    pub fn begin(
        &mut self,
        txn: Transaction,
        current: LineState,
        now_ns: u64,
    ) -> HarnessResult<LineState> {
        if !self.is_idle() || current.is_selected() || current.sclk() == DigitalLevel::High {
            return Err(HarnessError::ProtocolViolation { lines: current });
        }

        let frame = txn.frame();
        let selected = LineState::new(DigitalLevel::Low, DigitalLevel::Low, DigitalLevel::Low);
        if self.timing.select_lead_ticks == 0 {
            self.lines = selected.with_copi(frame_bit(frame, FRAME_BITS - 1));
            self.phase = Phase::BitClockLow {
                frame,
                bit: FRAME_BITS - 1,
                since_ns: now_ns,
            };
        } else {
            self.lines = selected;
            self.phase = Phase::SelectAsserted {
                frame,
                remaining: self.timing.select_lead_ticks,
            };
        }
        Ok(self.lines)
    }

    /// Advance after one reference tick. Returns the new line state when it changes.
    pub fn on_tick(&mut self, now_ns: u64) -> Option<LineState> {
        let (next, lines) = match self.phase {
            Phase::Idle => return None,
            Phase::SelectAsserted { frame, remaining } if remaining > 1 => (
                Phase::SelectAsserted {
                    frame,
                    remaining: remaining - 1,
                },
                None,
            ),
            Phase::SelectAsserted { frame, .. } => (
                Phase::BitClockLow {
                    frame,
                    bit: FRAME_BITS - 1,
                    since_ns: now_ns,
                },
                Some(self.lines.with_copi(frame_bit(frame, FRAME_BITS - 1))),
            ),
            Phase::BitClockLow {
                frame,
                bit,
                since_ns,
            } => {
                if !self.timing.half_period_elapsed(since_ns, now_ns) {
                    return None;
                }
                (
                    Phase::BitClockHigh {
                        frame,
                        bit,
                        since_ns: now_ns,
                    },
                    Some(self.lines.with_sclk(DigitalLevel::High)),
                )
            }
            Phase::BitClockHigh {
                frame,
                bit,
                since_ns,
            } => {
                if !self.timing.half_period_elapsed(since_ns, now_ns) {
                    return None;
                }
                if bit == 0 {
                    let next = if self.timing.settle_ticks == 0 {
                        Phase::Idle
                    } else {
                        Phase::Deselect {
                            remaining: self.timing.settle_ticks,
                        }
                    };
                    (next, Some(LineState::idle()))
                } else {
                    (
                        Phase::BitClockLow {
                            frame,
                            bit: bit - 1,
                            since_ns: now_ns,
                        },
                        Some(LineState::new(
                            DigitalLevel::Low,
                            frame_bit(frame, bit - 1),
                            DigitalLevel::Low,
                        )),
                    )
                }
            }
            Phase::Deselect { remaining } if remaining > 1 => (
                Phase::Deselect {
                    remaining: remaining - 1,
                },
                None,
            ),
            Phase::Deselect { .. } => (Phase::Idle, None),
        };

        self.phase = next;
        if let Some(lines) = lines {
            self.lines = lines;
        }
        lines
    }

    /// Drive one complete frame and hold the settle window. Returns the final idle lines.
    pub fn transfer<D: LineDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        txn: Transaction,
    ) -> HarnessResult<LineState> {
        let lines = self.begin(txn, driver.driven(), driver.now_ns())?;
        tracing::debug!(
            "SPI {:?} addr={:#04x} data={:#04x} frame={:#06x}",
            txn.direction(),
            txn.address(),
            txn.data(),
            txn.frame()
        );
        driver.drive(lines);

        while !self.is_idle() {
            if driver.tick_budget_exhausted() {
                // The frame is abandoned with the lines left as they are.
                self.phase = Phase::Idle;
                let at_ns = driver.now_ns();
                tracing::warn!("SPI frame aborted at {}ns: tick budget exhausted", at_ns);
                return Err(HarnessError::TickLimit { at_ns });
            }
            driver.tick();
            if let Some(lines) = self.on_tick(driver.now_ns()) {
                driver.drive(lines);
            }
        }

        tracing::debug!("SPI frame complete at {}ns", driver.now_ns());
        Ok(self.lines)
    }

    pub fn write<D: LineDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        address: u32,
        data: u32,
    ) -> HarnessResult<LineState> {
        let txn = Transaction::write(address, data)?;
        self.transfer(driver, txn)
    }

    pub fn read<D: LineDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        address: u32,
        data: u32,
    ) -> HarnessResult<LineState> {
        let txn = Transaction::read(address, data)?;
        self.transfer(driver, txn)
    }
}

impl Default for SpiMaster {
    fn default() -> Self {
        Self::new(SpiTiming::default())
    }
}
