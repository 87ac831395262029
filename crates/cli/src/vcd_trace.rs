// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use spibench_core::{BenchObserver, DigitalLevel, LineState, OutputPins};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Dumps the SPI lines and device outputs as a VCD waveform, one timestamp per change.
pub struct VcdObserver {
    state: Mutex<VcdState>,
    ids: VcdIds,
}

struct VcdIds {
    ncs: IdCode,
    sclk: IdCode,
    copi: IdCode,
    uo_out: IdCode,
    uio_out: IdCode,
}

struct VcdState {
    writer: Writer<BufWriter<File>>,
    last_time: u64,
}

impl VcdObserver {
    pub fn new(path: &Path, lines: LineState, outputs: OutputPins) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        let buf = BufWriter::new(file);
        let mut writer = Writer::new(buf);

        // Header
        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("bench")?;

        writer.add_module("spi")?;
        let ncs = writer.add_wire(1, "ncs")?;
        let sclk = writer.add_wire(1, "sclk")?;
        let copi = writer.add_wire(1, "copi")?;
        writer.upscope()?; // spi

        writer.add_module("dut")?;
        let uo_out = writer.add_wire(8, "uo_out")?;
        let uio_out = writer.add_wire(8, "uio_out")?;
        writer.upscope()?; // dut

        writer.upscope()?; // bench
        writer.enddefinitions()?;

        // Initial values
        writer.timestamp(0)?;
        writer.change_scalar(ncs, level_value(lines.ncs()))?;
        writer.change_scalar(sclk, level_value(lines.sclk()))?;
        writer.change_scalar(copi, level_value(lines.copi()))?;
        writer.change_vector(uo_out, u64_to_vec(outputs.uo_out as u64, 8))?;
        writer.change_vector(uio_out, u64_to_vec(outputs.uio_out as u64, 8))?;

        Ok(Self {
            state: Mutex::new(VcdState {
                writer,
                last_time: 0,
            }),
            ids: VcdIds {
                ncs,
                sclk,
                copi,
                uo_out,
                uio_out,
            },
        })
    }
}

impl VcdState {
    fn stamp(&mut self, now_ns: u64) {
        if now_ns > self.last_time {
            self.last_time = now_ns;
            let _ = self.writer.timestamp(now_ns);
        }
    }
}

fn level_value(level: DigitalLevel) -> Value {
    match level {
        DigitalLevel::High => Value::V1,
        DigitalLevel::Low => Value::V0,
    }
}

// Helper to convert u64 to Vec<Value> (MSB first)
fn u64_to_vec(val: u64, width: u32) -> Vec<Value> {
    let mut bits = Vec::with_capacity(width as usize);
    for i in (0..width).rev() {
        let bit = (val >> i) & 1;
        bits.push(if bit == 1 { Value::V1 } else { Value::V0 });
    }
    bits
}

impl core::fmt::Debug for VcdObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdObserver")
    }
}

impl BenchObserver for VcdObserver {
    fn on_lines_driven(&self, now_ns: u64, lines: LineState) {
        if let Ok(mut state) = self.state.lock() {
            state.stamp(now_ns);
            let _ = state
                .writer
                .change_scalar(self.ids.ncs, level_value(lines.ncs()));
            let _ = state
                .writer
                .change_scalar(self.ids.sclk, level_value(lines.sclk()));
            let _ = state
                .writer
                .change_scalar(self.ids.copi, level_value(lines.copi()));
        }
    }

    fn on_outputs_changed(&self, now_ns: u64, outputs: OutputPins) {
        if let Ok(mut state) = self.state.lock() {
            state.stamp(now_ns);
            let uo = u64_to_vec(outputs.uo_out as u64, 8);
            let uio = u64_to_vec(outputs.uio_out as u64, 8);
            let _ = state.writer.change_vector(self.ids.uo_out, uo);
            let _ = state.writer.change_vector(self.ids.uio_out, uio);
        }
    }
}
