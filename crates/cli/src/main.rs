// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use spibench_config::{BenchConfig, ScenarioScript, ScenarioStep};
use spibench_core::metrics::BenchMetrics;
use spibench_core::spi::{Direction, Transaction};
use spibench_core::{LineDriver, SignalView};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

mod runner;
mod vcd_trace;

use runner::{RunReport, ScenarioRunner, StepResult, StopReason};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

fn parse_u32(s: &str) -> Result<u32, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value '{}': {}", s, e))
    } else {
        u32::from_str(trimmed).map_err(|e| format!("Invalid value '{}': {}", s, e))
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "SpiBench SPI/PWM Verification Harness",
    long_about = None
)]
struct Cli {
    /// Enable per-frame and per-step debug tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deterministic, CI-friendly runner mode driven by a scenario script (YAML).
    Test(TestArgs),

    /// Print the 16-bit SPI frame for one transaction.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the scenario script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Path to the bench config (YAML); overrides the script's `bench` entry
    #[arg(short = 'b', long)]
    bench: Option<PathBuf>,

    /// Directory to write test artifacts (result.json, junit.xml)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional path to write a JUnit XML report for CI systems
    #[arg(long)]
    junit: Option<PathBuf>,

    /// Optional path to write a VCD waveform of the SPI lines and outputs
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Override max ticks (takes precedence over script)
    #[arg(long)]
    max_ticks: Option<u64>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Register address, 0x00..=0x7F
    #[arg(short, long, value_parser = parse_u32)]
    address: u32,

    /// Data byte, 0x00..=0xFF
    #[arg(short, long, value_parser = parse_u32)]
    data: u32,

    /// Encode a read frame instead of a write
    #[arg(long)]
    read: bool,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    ticks: u64,
    elapsed_ns: u64,
    frames: u64,
    line_changes: u64,
    output_changes: u64,
    max_ticks: u64,
    steps: Vec<StepResult>,
    script_hash: String,
    config: TestConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_state: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct TestConfig {
    script: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    bench: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Test(args) => run_test(args),
        Commands::Frame(args) => run_frame(args),
    }
}

fn run_frame(args: FrameArgs) -> ExitCode {
    let direction = if args.read {
        Direction::Read
    } else {
        Direction::Write
    };

    match Transaction::new(direction, args.address, args.data) {
        Ok(txn) => {
            let [hi, lo] = txn.bytes();
            let bits: String = txn.bits().map(|b| b.to_string()).collect();
            println!(
                "frame=0x{:04x} bytes=[0x{:02x}, 0x{:02x}] bits={}",
                txn.frame(),
                hi,
                lo,
                bits
            );
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match ScenarioScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, None, 0, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let bench_path = args.bench.clone().or_else(|| {
        script
            .bench
            .as_deref()
            .map(|p| resolve_script_path(&args.script, p))
    });

    let max_ticks = args.max_ticks.unwrap_or(script.limits.max_ticks);

    // Guard against accidentally huge runs from CI misconfiguration.
    const MAX_ALLOWED_TICKS: u64 = 2_000_000_000;
    if max_ticks == 0 || max_ticks > MAX_ALLOWED_TICKS {
        let msg = format!(
            "max_ticks {} must be within 1..={}",
            max_ticks, MAX_ALLOWED_TICKS
        );
        error!("{}", msg);
        write_config_error_outputs(&args, bench_path.as_ref(), max_ticks, msg);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let bench_config = match &bench_path {
        Some(path) => match BenchConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                let msg = format!("{:#}", e);
                error!("{}", msg);
                write_config_error_outputs(&args, bench_path.as_ref(), max_ticks, msg);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        },
        None => BenchConfig::default(),
    };

    let mut runner = match ScenarioRunner::new(bench_config, max_ticks) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, bench_path.as_ref(), max_ticks, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let metrics = Arc::new(BenchMetrics::new());
    runner.attach_observer(metrics.clone());

    if let Some(vcd_path) = &args.vcd {
        let bench = runner.bench();
        match vcd_trace::VcdObserver::new(vcd_path, bench.driven(), bench.outputs()) {
            Ok(vcd) => {
                info!("Writing VCD trace to {:?}", vcd_path);
                runner.attach_observer(Arc::new(vcd));
            }
            Err(e) => {
                let msg = format!("Failed to create VCD trace {:?}: {:#}", vcd_path, e);
                error!("{}", msg);
                write_config_error_outputs(&args, bench_path.as_ref(), max_ticks, msg);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }

    info!(
        "Running scenario {} ({} steps, max {} ticks)",
        script.name.as_deref().unwrap_or("<unnamed>"),
        script.steps.len(),
        max_ticks
    );

    let start = std::time::Instant::now();
    let report = runner.run(&script.steps);
    let duration = start.elapsed();

    let (status, code) = match report.stop_reason {
        StopReason::Completed => ("pass", EXIT_PASS),
        StopReason::AssertionFailed => ("fail", EXIT_ASSERT_FAIL),
        StopReason::ConfigError => ("error", EXIT_CONFIG_ERROR),
        StopReason::RuntimeError | StopReason::MaxTicks => ("error", EXIT_RUNTIME_ERROR),
    };

    info!(
        "Scenario {}: {:?} after {} ticks ({} ns)",
        status, report.stop_reason, report.ticks, report.elapsed_ns
    );
    info!(
        "SPI frames: {}, output changes: {}",
        metrics.get_frames(),
        metrics.get_output_changes()
    );

    let result = build_result(
        &args,
        &script,
        bench_path.as_ref(),
        status,
        max_ticks,
        report,
        &metrics,
        Some(runner.bench().snapshot()),
    );
    write_outputs(&args, &result, duration);

    ExitCode::from(code)
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    args: &TestArgs,
    script: &ScenarioScript,
    bench_path: Option<&PathBuf>,
    status: &str,
    max_ticks: u64,
    report: RunReport,
    metrics: &BenchMetrics,
    final_state: Option<serde_json::Value>,
) -> TestResult {
    TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        scenario: script.name.clone(),
        stop_reason: report.stop_reason,
        message: report.message,
        ticks: report.ticks,
        elapsed_ns: report.elapsed_ns,
        frames: metrics.get_frames(),
        line_changes: metrics.get_line_changes(),
        output_changes: metrics.get_output_changes(),
        max_ticks,
        steps: report.steps,
        script_hash: script_hash(&args.script),
        config: TestConfig {
            script: args.script.clone(),
            bench: bench_path.cloned(),
        },
        final_state,
    }
}

fn script_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        }
        Err(e) => {
            error!("Failed to read script for hash {:?}: {}", path, e);
            String::new()
        }
    }
}

fn write_outputs(args: &TestArgs, result: &TestResult, duration: std::time::Duration) {
    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
        } else {
            // result.json
            let result_path = output_dir.join("result.json");
            match std::fs::File::create(&result_path) {
                Ok(f) => {
                    if let Err(e) = serde_json::to_writer_pretty(f, result) {
                        error!("Failed to write result.json: {}", e);
                    }
                }
                Err(e) => error!("Failed to create result.json: {}", e),
            }

            // junit.xml
            let junit_path = output_dir.join("junit.xml");
            if let Err(e) = write_junit_xml(&junit_path, result, duration) {
                error!("Failed to write junit.xml: {}", e);
            }
        }
    }

    if let Some(junit_path) = &args.junit {
        if let Some(parent) = junit_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = write_junit_xml(junit_path, result, duration) {
            error!("Failed to write JUnit report {:?}: {}", junit_path, e);
        }
    }
}

fn write_config_error_outputs(
    args: &TestArgs,
    bench_path: Option<&PathBuf>,
    max_ticks: u64,
    message: String,
) {
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        scenario: None,
        stop_reason: StopReason::ConfigError,
        message: Some(message),
        ticks: 0,
        elapsed_ns: 0,
        frames: 0,
        line_changes: 0,
        output_changes: 0,
        max_ticks,
        steps: Vec::new(),
        script_hash: script_hash(&args.script),
        config: TestConfig {
            script: args.script.clone(),
            bench: bench_path.cloned(),
        },
        final_state: None,
    };
    write_outputs(args, &result, std::time::Duration::ZERO);
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join(p)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn write_junit_xml(
    path: &Path,
    result: &TestResult,
    duration: std::time::Duration,
) -> std::io::Result<()> {
    let mut details = String::new();
    details.push_str(&format!(
        "result_schema_version={}\n",
        RESULT_SCHEMA_VERSION
    ));
    details.push_str(&format!("stop_reason={:?}\n", result.stop_reason));
    if let Some(msg) = &result.message {
        details.push_str(&format!("message={}\n", msg));
    }
    details.push_str(&format!("ticks={}\n", result.ticks));
    details.push_str(&format!("elapsed_ns={}\n", result.elapsed_ns));
    details.push_str(&format!("frames={}\n", result.frames));
    details.push_str(&format!("max_ticks={}\n", result.max_ticks));
    details.push_str(&format!("script_hash={}\n", result.script_hash));
    details.push_str(&format!("script={}\n", result.config.script.display()));
    if let Some(bench) = &result.config.bench {
        details.push_str(&format!("bench={}\n", bench.display()));
    }

    let time_secs = duration.as_secs_f64();

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;

    let mut testcases = String::new();

    // A top-level "run" testcase captures config, runtime and tick limit errors.
    tests += 1;
    testcases.push_str(&format!(
        "  <testcase classname=\"spibench\" name=\"run\" time=\"{:.6}\">\n",
        time_secs
    ));
    if result.status == "error" {
        let err_type = if result.stop_reason == StopReason::ConfigError {
            "config error"
        } else {
            "runtime error"
        };
        errors += 1;
        testcases.push_str(&format!(
            "    <error message=\"{}\">{}</error>\n",
            xml_escape(err_type),
            xml_escape(&details)
        ));
    }
    testcases.push_str("  </testcase>\n");

    // One testcase per assertion step so CI UIs show exactly which check failed.
    for s in result.steps.iter().filter(|s| s.step.is_assertion()) {
        tests += 1;
        let name = format!("step {}: {}", s.index + 1, step_short_name(&s.step));
        testcases.push_str(&format!(
            "  <testcase classname=\"spibench\" name=\"{}\" time=\"0.000000\">\n",
            xml_escape(&name)
        ));
        if !s.passed {
            failures += 1;
            let msg = s.message.as_deref().unwrap_or("assertion failed");
            testcases.push_str(&format!(
                "    <failure message=\"{}\">{}</failure>\n",
                xml_escape(msg),
                xml_escape(&format!("{}\n\n{}", name, details))
            ));
        }
        testcases.push_str("  </testcase>\n");
    }

    xml.push_str(&format!(
        r#"<testsuite name="spibench" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        tests, failures, errors, time_secs
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(RESULT_SCHEMA_VERSION)
    ));
    xml.push_str(&format!(
        "    <property name=\"stop_reason\" value=\"{}\"/>\n",
        xml_escape(&format!("{:?}", result.stop_reason))
    ));
    xml.push_str(&format!(
        "    <property name=\"script_hash\" value=\"{}\"/>\n",
        xml_escape(&result.script_hash)
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}

fn step_short_name(step: &ScenarioStep) -> String {
    match step {
        ScenarioStep::Reset(_) => "reset".to_string(),
        ScenarioStep::Write(s) => format!(
            "write {:#04x} <= {:#04x}",
            s.write.address, s.write.data
        ),
        ScenarioStep::Read(s) => format!("read {:#04x}", s.read.address),
        ScenarioStep::Wait(s) => format!("wait {} ticks", s.wait.ticks),
        ScenarioStep::ExpectOutput(s) => format!(
            "expect_output {:?} == {:#04x}",
            s.expect_output.port, s.expect_output.value
        ),
        ScenarioStep::MeasurePwm(s) => format!(
            "measure_pwm {} Hz, {}% duty",
            s.measure_pwm.frequency_hz, s.measure_pwm.duty_pct
        ),
        ScenarioStep::ExpectConstant(s) => format!(
            "expect_constant {} for {} ticks",
            s.expect_constant.level, s.expect_constant.ticks
        ),
    }
}
