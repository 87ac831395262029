// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bench::BenchObserver;
use crate::signals::{LineState, OutputPins};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
pub struct BenchMetrics {
    tick_count: AtomicU64,
    reset_count: AtomicU64,
    line_change_count: AtomicU64,
    frame_count: AtomicU64,
    output_change_count: AtomicU64,
    selected: AtomicBool,
}

impl Default for BenchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchMetrics {
    pub fn new() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            reset_count: AtomicU64::new(0),
            line_change_count: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            output_change_count: AtomicU64::new(0),
            selected: AtomicBool::new(false),
        }
    }

    pub fn reset(&self) {
        self.tick_count.store(0, Ordering::SeqCst);
        self.reset_count.store(0, Ordering::SeqCst);
        self.line_change_count.store(0, Ordering::SeqCst);
        self.frame_count.store(0, Ordering::SeqCst);
        self.output_change_count.store(0, Ordering::SeqCst);
        self.selected.store(false, Ordering::SeqCst);
    }

    pub fn get_ticks(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn get_resets(&self) -> u64 {
        self.reset_count.load(Ordering::SeqCst)
    }

    pub fn get_line_changes(&self) -> u64 {
        self.line_change_count.load(Ordering::SeqCst)
    }

    /// Number of nCS assertions seen.
    pub fn get_frames(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    pub fn get_output_changes(&self) -> u64 {
        self.output_change_count.load(Ordering::SeqCst)
    }
}

impl BenchObserver for BenchMetrics {
    fn on_reset(&self, _now_ns: u64) {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_tick(&self, _now_ns: u64) {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_lines_driven(&self, _now_ns: u64, lines: LineState) {
        self.line_change_count.fetch_add(1, Ordering::SeqCst);
        let was_selected = self.selected.swap(lines.is_selected(), Ordering::SeqCst);
        if lines.is_selected() && !was_selected {
            self.frame_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_outputs_changed(&self, _now_ns: u64, _outputs: OutputPins) {
        self.output_change_count.fetch_add(1, Ordering::SeqCst);
    }
}
