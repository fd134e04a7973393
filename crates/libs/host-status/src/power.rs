//! Power source and battery level from sysfs `power_supply`

use crate::error::{Error, Result};
use crate::read_trimmed;
use std::path::{Path, PathBuf};

/// Supply voltage above which a USB port counts as powering us (µV)
const USB_ACTIVE_MICROVOLTS: i64 = 1_000_000;

/// Supply current above which a USB port counts as powering us (µA)
const USB_ACTIVE_MICROAMPS: i64 = 100_000;

/// Placeholder when the system is running but no source was identified
pub const POWERED: &str = "Powered";

fn read_number(path: &Path) -> Option<i64> {
    read_trimmed(path).ok()?.parse().ok()
}

fn is_online(supply: &Path) -> bool {
    read_trimmed(&supply.join("online")).is_ok_and(|v| v == "1")
}

fn usb_is_active(supply: &Path) -> bool {
    read_number(&supply.join("voltage_now")).is_some_and(|v| v > USB_ACTIVE_MICROVOLTS)
        || read_number(&supply.join("current_now")).is_some_and(|c| c > USB_ACTIVE_MICROAMPS)
        || is_online(supply)
}

/// Describe the power state under `root` (normally `/sys/class/power_supply`)
pub fn probe(root: &Path) -> Result<String> {
    let entries = std::fs::read_dir(root).map_err(|source| Error::Read {
        path: root.to_path_buf(),
        source,
    })?;

    let mut supplies: Vec<(PathBuf, String)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let kind = read_trimmed(&path.join("type")).ok()?;
            Some((path, kind))
        })
        .collect();
    supplies.sort();

    let mut source: Option<&'static str> = None;
    let mut battery: Option<String> = None;

    for (path, kind) in &supplies {
        match kind.as_str() {
            "USB" if usb_is_active(path) => source = Some("USB-C power"),
            "Mains" if is_online(path) => source = Some("AC power"),
            "USB_PD" if is_online(path) => source = Some("USB-PD power"),
            "Battery" => {
                if let Ok(capacity) = read_trimmed(&path.join("capacity")) {
                    battery = Some(format!("{}%", capacity));
                }
            }
            _ => {}
        }
    }

    if source.is_none() {
        let pd_port = supplies.iter().any(|(path, kind)| {
            kind == "USB" && read_trimmed(&path.join("usb_type")).is_ok_and(|t| t.contains("PD"))
        });
        if pd_port {
            source = Some("USB-C PD power");
        }
    }

    Ok(match (source, battery) {
        (Some(source), Some(level)) => format!("{} ({})", source, level),
        (Some(source), None) => source.to_string(),
        (None, Some(level)) => level,
        (None, None) => POWERED.to_string(),
    })
}
