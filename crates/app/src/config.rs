use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{Context, Result};

/// Reads one IPv4 address per line; `#` comments and blank lines are
/// skipped. A malformed line is fatal, the same class of mistake as a
/// missing domain-list file.
pub fn load_preset_ips(path: &Path) -> Result<Vec<Ipv4Addr>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read preset-ips file: {}", path.display()))?;

    let mut ips = Vec::new();
    for raw_line in contents.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let ip: Ipv4Addr = line
            .parse()
            .with_context(|| format!("invalid preset IP: {line}"))?;
        ips.push(ip);
    }
    Ok(ips)
}
