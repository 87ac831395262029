// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use spibench_core::observer::SignalObserver;
use spibench_core::peripherals::spi_pwm::SpiPwmPeripheral;
use spibench_core::signals::{DigitalLevel, Edge, Probe};
use spibench_core::spi::SpiMaster;
use spibench_core::{Bench, Clocked, HarnessError, ReferenceClock, SignalView};

const MAX_WAIT: u32 = 5000;

fn powered_bench() -> Bench<SpiPwmPeripheral> {
    let mut bench = Bench::new(ReferenceClock::new(100), SpiPwmPeripheral::default());
    bench.reset(5);
    bench
}

fn pwm_bench(duty: u32) -> (Bench<SpiPwmPeripheral>, SpiMaster) {
    let mut bench = powered_bench();
    let mut spi = SpiMaster::default();
    spi.write(&mut bench, 0x02, 0x01).unwrap();
    spi.write(&mut bench, 0x04, duty).unwrap();
    bench.run(7000);
    (bench, spi)
}

#[test]
fn test_register_write_visible_on_outputs() {
    let mut bench = powered_bench();
    let mut spi = SpiMaster::default();

    spi.write(&mut bench, 0x00, 0xF0).unwrap();
    assert_eq!(bench.outputs().uo_out, 0xF0);
    bench.run(1000);

    spi.write(&mut bench, 0x01, 0xCC).unwrap();
    assert_eq!(bench.outputs().uio_out, 0xCC);
}

#[test]
fn test_out_of_range_addresses_do_not_alias() {
    let mut bench = powered_bench();
    let mut spi = SpiMaster::default();

    spi.write(&mut bench, 0x00, 0xF0).unwrap();
    spi.write(&mut bench, 0x01, 0xCC).unwrap();
    bench.run(100);

    spi.write(&mut bench, 0x30, 0xAA).unwrap();
    bench.run(100);
    spi.read(&mut bench, 0x30, 0xBE).unwrap();
    assert_eq!(bench.outputs().uo_out, 0xF0);
    bench.run(100);
    spi.read(&mut bench, 0x41, 0xEF).unwrap();
    bench.run(100);

    assert_eq!(bench.outputs().uo_out, 0xF0);
    assert_eq!(bench.outputs().uio_out, 0xCC);
}

#[test]
fn test_invalid_transaction_has_no_side_effect() {
    let mut bench = powered_bench();
    let mut spi = SpiMaster::default();
    let before = bench.ticks();

    assert_eq!(
        spi.write(&mut bench, 0x80, 0x00),
        Err(HarnessError::InvalidAddress(0x80))
    );
    assert_eq!(
        spi.write(&mut bench, 0x00, 0x100),
        Err(HarnessError::InvalidData(0x100))
    );
    assert_eq!(bench.ticks(), before);
    assert_eq!(bench.outputs().uo_out, 0);
}

#[test]
fn test_pwm_frequency_and_half_duty() {
    let (mut bench, _) = pwm_bench(128);
    let observer = SignalObserver::default();

    let m = observer.measure_cycle(&mut bench, MAX_WAIT).unwrap();
    assert!(
        (2970.0..=3030.0).contains(&m.frequency_hz),
        "Measured {:.1} Hz; expected 3000 Hz +-1%",
        m.frequency_hz
    );
    assert!(
        (49.0..=51.0).contains(&m.duty_pct),
        "50%: measured {:.1}%",
        m.duty_pct
    );
    assert!(m.rising_ns < m.falling_ns && m.falling_ns < m.next_rising_ns);
}

#[test]
fn test_pwm_zero_and_full_duty_are_constant() {
    let (mut bench, mut spi) = pwm_bench(0);
    let observer = SignalObserver::new(Probe::default());

    observer
        .assert_constant(&mut bench, DigitalLevel::Low, 30_000, 10)
        .unwrap();
    assert!(matches!(
        observer.measure_cycle(&mut bench, MAX_WAIT),
        Err(HarnessError::Timeout {
            expected: DigitalLevel::High,
            stuck: DigitalLevel::Low,
            ..
        })
    ));

    spi.write(&mut bench, 0x04, 255).unwrap();
    bench.run(7000);
    observer
        .assert_constant(&mut bench, DigitalLevel::High, 30_000, 10)
        .unwrap();
    assert!(matches!(
        observer.measure_cycle(&mut bench, MAX_WAIT),
        Err(HarnessError::Timeout {
            expected: DigitalLevel::Low,
            stuck: DigitalLevel::High,
            ..
        })
    ));
}

#[test]
fn test_duty_change_takes_effect() {
    let (mut bench, mut spi) = pwm_bench(128);
    let observer = SignalObserver::default();

    spi.write(&mut bench, 0x04, 64).unwrap();
    bench.run(7000);
    let m = observer.measure_cycle(&mut bench, MAX_WAIT).unwrap();
    assert!((m.duty_pct - 25.0).abs() < 0.01);
}

#[test]
fn test_edge_wait_matches_level_wait() {
    let (mut a, _) = pwm_bench(128);
    let (mut b, _) = pwm_bench(128);
    let observer = SignalObserver::default();

    observer
        .wait_for_level(&mut a, DigitalLevel::Low, MAX_WAIT)
        .unwrap();
    observer
        .wait_for_level(&mut b, DigitalLevel::Low, MAX_WAIT)
        .unwrap();

    let level_t = observer
        .wait_for_level(&mut a, DigitalLevel::High, MAX_WAIT)
        .unwrap();
    let edge = observer
        .wait_for_edge(&mut b, Edge::Rising, MAX_WAIT)
        .unwrap();
    assert_eq!(edge.timestamp_ns, level_t);
    assert_eq!(a.now_ns(), b.now_ns());
}
