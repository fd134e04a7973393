//! Root filesystem usage via `df -h`

use crate::error::{Error, Result};
use crate::run_command;
use std::path::Path;

pub const UNAVAILABLE: &str = "N/A";

/// `AVAIL Free / TOTAL` from the first data row of `df -h` output
pub fn parse_df(output: &str) -> Option<String> {
    let row = output.lines().nth(1)?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    match fields.as_slice() {
        [_, total, _, avail, ..] => Some(format!("{} Free / {}", avail, total)),
        _ => None,
    }
}

pub fn probe(path: &Path) -> Result<String> {
    let target = path.to_string_lossy();
    let output = run_command("df", &["-h", &target])?;
    parse_df(&output).ok_or(Error::Unavailable("storage"))
}
