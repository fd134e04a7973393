//! CPU temperature from thermal zones, with `sensors` as fallback

use crate::{read_trimmed, run_command};
use std::path::PathBuf;

pub const UNAVAILABLE: &str = "N/A";

/// Whole degrees Celsius from a thermal zone reading in milli-°C
pub fn parse_millicelsius(raw: &str) -> Option<String> {
    let millis: i64 = raw.trim().parse().ok()?;
    Some(format!("{}°C", millis / 1000))
}

/// First `°C` reading on a `Core 0` or `CPU` line of `sensors` output
pub fn parse_sensors(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("Core 0") || line.contains("CPU"))
        .flat_map(str::split_whitespace)
        .find(|part| part.ends_with("°C"))
        .map(str::to_string)
}

pub fn probe(zones: &[PathBuf], use_commands: bool) -> String {
    let from_zones = zones.iter().find_map(|path| {
        read_trimmed(path)
            .ok()
            .and_then(|raw| parse_millicelsius(&raw))
    });
    if let Some(celsius) = from_zones {
        return celsius;
    }

    if use_commands {
        match run_command("sensors", &[]) {
            Ok(output) => {
                if let Some(reading) = parse_sensors(&output) {
                    return reading;
                }
            }
            Err(e) => tracing::debug!("{}", e),
        }
    }

    UNAVAILABLE.to_string()
}
