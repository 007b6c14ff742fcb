use std::path::Path;

use anyhow::{Context, Result, bail};

use dnsrouted_util::CommandRunner;

use crate::config::WireguardConfig;

/// Creates `iface`, assigns its address, writes a transient `wg`-format
/// config file, and applies it with `wg setconf`. Brings the link up last.
pub fn setup_interface(iface: &str, config: &WireguardConfig, runner: &CommandRunner) -> Result<()> {
    if runner.run("ip", &["link", "add", "dev", iface, "type", "wireguard"]).is_err() {
        if !module_loaded("wireguard") {
            tracing::warn!("wireguard kernel module not loaded; try `modprobe wireguard`");
        }
        bail!("failed to create wireguard interface {iface}");
    }

    runner
        .run("ip", &["address", "add", &config.address, "dev", iface])
        .with_context(|| format!("failed to assign address {} to {iface}", config.address))?;

    let conf_path = std::env::temp_dir().join(format!("{iface}.wg.conf"));
    write_wg_conf(&conf_path, config)?;
    let result = runner.run("wg", &["setconf", iface, conf_path.to_string_lossy().as_ref()]);
    let _ = std::fs::remove_file(&conf_path);
    result.with_context(|| format!("failed to configure wireguard device {iface}"))?;

    runner.run("ip", &["link", "set", "dev", iface, "up"]).with_context(|| format!("failed to bring up {iface}"))?;

    Ok(())
}

pub fn teardown_interface(iface: &str, runner: &CommandRunner) -> Result<()> {
    let _ = runner.run_capture_allow_fail("ip", &["link", "del", "dev", iface]);
    Ok(())
}

fn write_wg_conf(path: &Path, config: &WireguardConfig) -> Result<()> {
    let mut body = String::new();
    body.push_str("[Interface]\n");
    body.push_str(&format!("PrivateKey = {}\n", config.private_key));
    if let Some(port) = config.listen_port {
        body.push_str(&format!("ListenPort = {port}\n"));
    }
    for peer in &config.peers {
        body.push_str("[Peer]\n");
        body.push_str(&format!("PublicKey = {}\n", peer.public_key));
        body.push_str(&format!("AllowedIPs = {}\n", peer.allowed_ips));
        if let Some(endpoint) = &peer.endpoint {
            body.push_str(&format!("Endpoint = {endpoint}\n"));
        }
        if let Some(psk) = &peer.preshared_key {
            body.push_str(&format!("PresharedKey = {psk}\n"));
        }
    }
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    dnsrouted_util::set_permissions_0600(path)?;
    Ok(())
}

fn module_loaded(name: &str) -> bool {
    let Ok(contents) = std::fs::read_to_string("/proc/modules") else {
        return false;
    };
    contents.lines().any(|line| line.split_whitespace().next() == Some(name))
}
