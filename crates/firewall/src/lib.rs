mod iptables;
mod nft;

use anyhow::Result;

use dnsrouted_util::CommandRunner;

/// Which rules this controller installed, so `remove` can reverse exactly
/// those and nothing else.
pub enum FirewallState {
    Nft { table: String, chain: String, nat_table: String },
    Iptables { chain: String },
}

pub struct FirewallConfig<'a> {
    /// Packet-queue number that DNS-response traffic is redirected into.
    pub queue_num: u16,
    /// Tunnel interface the MASQUERADE rule is scoped to.
    pub tun_name: &'a str,
}

pub trait FirewallBackend {
    fn apply(&self, cfg: &FirewallConfig, runner: &CommandRunner) -> Result<FirewallState>;
    fn remove(&self, state: &FirewallState, runner: &CommandRunner) -> Result<()>;
}

pub struct NftBackend {
    pub table: String,
    pub chain: String,
}

impl FirewallBackend for NftBackend {
    fn apply(&self, cfg: &FirewallConfig, runner: &CommandRunner) -> Result<FirewallState> {
        let table = &self.table;
        let chain = &self.chain;
        let nat_table = format!("{table}_nat");
        if let Err(err) = nft::apply_native(cfg, table, chain) {
            if dnsrouted_util::is_root() && nft::find_nft_binary() {
                nft::apply_cmd(cfg, table, chain, runner)?;
            } else {
                return Err(err);
            }
        }
        nft::apply_masquerade_cmd(cfg, &nat_table, runner)?;
        Ok(FirewallState::Nft {
            table: table.clone(),
            chain: chain.clone(),
            nat_table,
        })
    }

    fn remove(&self, state: &FirewallState, runner: &CommandRunner) -> Result<()> {
        if let FirewallState::Nft { table, nat_table, .. } = state {
            match nft::delete_table(table) {
                Ok(()) => tracing::debug!(table, "native nft delete succeeded"),
                Err(err) => {
                    tracing::warn!(table, %err, "native nft delete failed");
                    if dnsrouted_util::is_root() && nft::find_nft_binary() {
                        let _ = runner.run_capture_allow_fail("nft", &["delete", "table", "inet", table]);
                    } else {
                        return Err(err);
                    }
                }
            }
            let _ = runner.run_capture_allow_fail("nft", &["delete", "table", "inet", nat_table]);
        }
        Ok(())
    }
}

pub struct IptablesBackend {
    pub chain: String,
}

impl FirewallBackend for IptablesBackend {
    fn apply(&self, cfg: &FirewallConfig, runner: &CommandRunner) -> Result<FirewallState> {
        iptables::apply(cfg, &self.chain, runner)?;
        Ok(FirewallState::Iptables {
            chain: self.chain.clone(),
        })
    }

    fn remove(&self, state: &FirewallState, runner: &CommandRunner) -> Result<()> {
        if let FirewallState::Iptables { chain } = state {
            iptables::remove(chain, runner)?;
        }
        Ok(())
    }
}

pub enum FirewallBackendKind {
    Nft(NftBackend),
    Iptables(IptablesBackend),
}

impl FirewallBackendKind {
    pub fn apply(&self, cfg: &FirewallConfig, runner: &CommandRunner) -> Result<FirewallState> {
        match self {
            FirewallBackendKind::Nft(backend) => backend.apply(cfg, runner),
            FirewallBackendKind::Iptables(backend) => backend.apply(cfg, runner),
        }
    }

    pub fn remove(&self, state: &FirewallState, runner: &CommandRunner) -> Result<()> {
        match self {
            FirewallBackendKind::Nft(backend) => backend.remove(state, runner),
            FirewallBackendKind::Iptables(backend) => backend.remove(state, runner),
        }
    }

    pub fn remove_best_effort(&self, runner: &CommandRunner) -> Result<()> {
        match nft::delete_table("dnsrouted") {
            Ok(()) => tracing::debug!("native nft delete succeeded"),
            Err(err) => tracing::warn!(%err, "native nft delete failed"),
        }

        if dnsrouted_util::is_root() && nft::find_nft_binary() {
            let _ = runner.run_capture_allow_fail("nft", &["delete", "table", "inet", "dnsrouted"]);
            let _ = runner.run_capture_allow_fail("nft", &["delete", "table", "inet", "dnsrouted_nat"]);
        }

        if dnsrouted_util::is_root() && dnsrouted_util::find_in_path("iptables").is_some() {
            let _ = iptables::remove("DNSROUTED", runner);
        }

        Ok(())
    }
}

/// Detects which backend is installed and active, preferring nftables when
/// both are available.
pub fn detect_backend(table: &str, chain: &str) -> FirewallBackendKind {
    let nft_available = nft::find_nft_binary() || std::path::Path::new("/proc/net/nf_tables").exists();
    let iptables_available =
        dnsrouted_util::find_in_path("iptables").is_some() || std::path::Path::new("/proc/net/ip_tables_names").exists();

    if nft_available || !iptables_available {
        FirewallBackendKind::Nft(NftBackend {
            table: table.to_string(),
            chain: chain.to_string(),
        })
    } else {
        FirewallBackendKind::Iptables(IptablesBackend {
            chain: chain.to_uppercase(),
        })
    }
}
