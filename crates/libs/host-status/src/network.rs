//! Network link and Wi-Fi signal quality
//!
//! NetworkManager is asked first; sysfs `net` is the fallback when `nmcli`
//! is missing or reports nothing connected.

use crate::error::{Error, Result};
use crate::{read_trimmed, run_command};
use std::path::Path;

pub const WIRED: &str = "Wired";
pub const WIFI_CONNECTED: &str = "WiFi connected";
pub const NO_CONNECTION: &str = "No connection";

/// Active link reported by `nmcli device status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Wired,
    Wifi(String),
}

/// First connected ethernet or wifi device in `nmcli device status` output
pub fn parse_device_status(output: &str) -> Option<Link> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_, "ethernet", "connected", ..] => Some(Link::Wired),
            [device, "wifi", "connected", ..] => Some(Link::Wifi(device.to_string())),
            _ => None,
        }
    })
}

pub fn strength_from_percentage(percentage: i32) -> &'static str {
    if percentage >= 70 {
        "WiFi strong"
    } else if percentage >= 40 {
        "WiFi medium"
    } else {
        "WiFi weak"
    }
}

pub fn strength_from_dbm(dbm: i32) -> &'static str {
    if dbm >= -30 {
        "WiFi strong"
    } else if dbm >= -60 {
        "WiFi medium"
    } else {
        "WiFi weak"
    }
}

/// Signal bucket of the in-use row of `nmcli -t -f IN-USE,SIGNAL device wifi list`
pub fn parse_wifi_list(output: &str) -> Option<&'static str> {
    output.lines().find_map(|line| {
        let (in_use, signal) = line.split_once(':')?;
        if in_use.trim() != "*" {
            return None;
        }
        match signal.trim().parse::<i32>().ok()? {
            value @ 0..=100 => Some(strength_from_percentage(value)),
            value @ -100..=-1 => Some(strength_from_dbm(value)),
            _ => None,
        }
    })
}

fn wifi_strength(device: &str) -> &'static str {
    run_command(
        "nmcli",
        &["-t", "-f", "IN-USE,SIGNAL", "device", "wifi", "list", "ifname", device],
    )
        .ok()
        .and_then(|output| parse_wifi_list(&output))
        .unwrap_or(WIFI_CONNECTED)
}

/// Scan `root` (normally `/sys/class/net`) for an up interface
pub fn probe_sysfs(root: &Path, use_commands: bool) -> Result<String> {
    let entries = std::fs::read_dir(root).map_err(|source| Error::Read {
        path: root.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();

    for name in names {
        let iface = root.join(&name);
        if read_trimmed(&iface.join("operstate")).ok().as_deref() != Some("up") {
            continue;
        }

        let wired = ["end", "eth", "enp"].iter().any(|p| name.starts_with(p));
        if wired && read_trimmed(&iface.join("carrier")).ok().as_deref() == Some("1") {
            return Ok(WIRED.to_string());
        }
        if name.starts_with("wl") {
            let label = if use_commands {
                wifi_strength(&name)
            } else {
                WIFI_CONNECTED
            };
            return Ok(label.to_string());
        }
    }

    Err(Error::Unavailable("network"))
}

/// Describe the current network link
pub fn probe(root: &Path, use_commands: bool) -> String {
    if use_commands {
        match run_command("nmcli", &["device", "status"]) {
            Ok(output) => match parse_device_status(&output) {
                Some(Link::Wired) => return WIRED.to_string(),
                Some(Link::Wifi(device)) => return wifi_strength(&device).to_string(),
                None => {}
            },
            Err(e) => tracing::debug!("{}", e),
        }
    }

    probe_sysfs(root, use_commands).unwrap_or_else(|e| {
        tracing::debug!("{}", e);
        NO_CONNECTION.to_string()
    })
}
