use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

#[derive(Debug, Default, Clone)]
pub struct WireguardConfig {
    pub private_key: String,
    pub address: String,
    pub listen_port: Option<u16>,
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Default, Clone)]
pub struct PeerConfig {
    pub public_key: String,
    pub allowed_ips: String,
    pub endpoint: Option<String>,
    pub preshared_key: Option<String>,
}

#[derive(PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
}

pub fn parse_config(path: &Path) -> Result<WireguardConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to open tunnel config file: {}", path.display()))?;

    let mut config = WireguardConfig::default();
    let mut section = Section::None;

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "[Interface]" {
            section = Section::Interface;
            continue;
        }
        if line == "[Peer]" {
            section = Section::Peer;
            config.peers.push(PeerConfig::default());
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match section {
            Section::Interface => match key {
                "PrivateKey" => config.private_key = value.to_string(),
                "Address" => config.address = value.to_string(),
                "ListenPort" => {
                    config.listen_port =
                        Some(value.parse().with_context(|| format!("invalid ListenPort: {value}"))?);
                }
                _ => {}
            },
            Section::Peer => {
                let Some(peer) = config.peers.last_mut() else { continue };
                match key {
                    "PublicKey" => peer.public_key = value.to_string(),
                    "AllowedIPs" => peer.allowed_ips = value.to_string(),
                    "Endpoint" => peer.endpoint = Some(value.to_string()),
                    "PresharedKey" => peer.preshared_key = Some(value.to_string()),
                    _ => {}
                }
            }
            Section::None => {}
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &WireguardConfig) -> Result<()> {
    if config.private_key.is_empty() {
        bail!("tunnel config: private key is required");
    }
    if config.address.is_empty() {
        bail!("tunnel config: address is required");
    }
    for (idx, peer) in config.peers.iter().enumerate() {
        if peer.public_key.is_empty() {
            bail!("tunnel config: public key is required for peer {idx}");
        }
        if peer.allowed_ips.is_empty() {
            bail!("tunnel config: allowed IPs are required for peer {idx}");
        }
    }
    Ok(())
}
