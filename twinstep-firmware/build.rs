//! Build script for twinstep-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates safety.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).expect("cannot create memory.x");
    f.write_all(memory_x).expect("cannot write memory.x");

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}

/// Validate safety.toml at compile time
///
/// Catches the mistakes that would otherwise only show up as a rejected
/// configuration on the board: missing sections, a recovery sequence that
/// outlasts the watchdog, and inverted warning/fault thresholds.
fn validate_config() {
    println!("cargo:rerun-if-changed=safety.toml");

    let config_path = Path::new("safety.toml");
    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read safety.toml", &[e.to_string()]),
    };

    let config: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => fail(
            "Invalid TOML syntax in safety.toml",
            &e.to_string().lines().map(str::to_string).collect::<Vec<_>>(),
        ),
    };

    let mut errors = Vec::new();
    validate_supervisor(&config, &mut errors);
    validate_channels(&config, &mut errors);
    validate_resources(&config, &mut errors);

    if !errors.is_empty() {
        fail("Invalid safety configuration", &errors);
    }

    println!("cargo:warning=safety.toml validated successfully");
}

fn fail(title: &str, lines: &[String]) -> ! {
    let body = lines
        .iter()
        .map(|line| format!("║  • {:<62} ║", line))
        .collect::<Vec<_>>()
        .join("\n");
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<57}║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title, body
    );
}

fn int(config: &toml::Value, section: &str, key: &str) -> Option<i64> {
    config.get(section)?.get(key)?.as_integer()
}

fn validate_supervisor(config: &toml::Value, errors: &mut Vec<String>) {
    if config.get("supervisor").is_none() {
        errors.push("Missing [supervisor] section".into());
        return;
    }

    let watchdog = int(config, "supervisor", "watchdog_timeout_ms").unwrap_or(2000);
    let tick = int(config, "supervisor", "tick_interval_ms").unwrap_or(5);
    if tick <= 0 {
        errors.push("[supervisor] tick_interval_ms must be positive".into());
    }
    if tick >= watchdog {
        errors.push("[supervisor] tick_interval_ms must be below the watchdog timeout".into());
    }

    let base = int(config, "recovery", "base_backoff_ms").unwrap_or(100);
    let max = int(config, "recovery", "max_backoff_ms").unwrap_or(10_000);
    let attempts = int(config, "recovery", "max_attempts").unwrap_or(3);
    if attempts <= 0 {
        errors.push("[recovery] max_attempts must be at least 1".into());
    }

    // Waiting after the n-th attempt costs base * 2^n, capped at max
    let window: i64 = (1..=attempts.clamp(0, 31))
        .map(|n| (base << n).min(max))
        .sum();
    // The supervisor caps a whole fault episode at this window; the onset
    // and escalation ticks may each go unfed on top of it
    if window + 2 * tick >= watchdog {
        errors.push(format!(
            "recovery window {} ms plus two {} ms ticks must be below watchdog {} ms",
            window, tick, watchdog
        ));
    }
}

fn validate_channels(config: &toml::Value, errors: &mut Vec<String>) {
    let channels = match config.get("channel") {
        Some(toml::Value::Table(t)) => t,
        Some(_) => {
            errors.push("[channel] must contain named tables".into());
            return;
        }
        None => return,
    };

    if channels.len() > 4 {
        errors.push("At most 4 [channel.*] sections are supported".into());
    }

    for (name, channel) in channels {
        if name.len() > 16 {
            errors.push(format!("[channel.{}] name longer than 16 bytes", name));
        }
        match channel.get("timeout_ms").and_then(|v| v.as_integer()) {
            Some(t) if t > 0 => {}
            _ => errors.push(format!("[channel.{}] needs a positive timeout_ms", name)),
        }
        if let Some(v) = channel.get("safety_critical") {
            if !v.is_bool() {
                errors.push(format!("[channel.{}] safety_critical must be a bool", name));
            }
        }
    }
}

fn validate_resources(config: &toml::Value, errors: &mut Vec<String>) {
    let stack_warn = int(config, "resources", "stack_warn_percent").unwrap_or(25);
    let stack_fault = int(config, "resources", "stack_fault_percent").unwrap_or(10);
    let cpu_warn = int(config, "resources", "cpu_warn_percent").unwrap_or(85);
    let cpu_fault = int(config, "resources", "cpu_fault_percent").unwrap_or(97);

    if stack_fault >= stack_warn {
        errors.push("[resources] stack_fault_percent must be below stack_warn_percent".into());
    }
    if cpu_fault <= cpu_warn || cpu_fault > 100 {
        errors.push("[resources] cpu_fault_percent must be above cpu_warn_percent".into());
    }
}
