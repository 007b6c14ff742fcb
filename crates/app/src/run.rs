use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use nix::unistd::{Gid, Uid, setgid};

use dnsrouted_cli::{Cli, parse_cli};
use dnsrouted_decision::DecisionEngine;
use dnsrouted_domains::RuleSet;
use dnsrouted_firewall::{FirewallConfig, FirewallState, detect_backend};
use dnsrouted_ipset::Ipv4Set;
use dnsrouted_netlink::Netlink;
use dnsrouted_queue::QueueConfig;
use dnsrouted_util::{CommandRunner, has_cap_net_admin};

use super::ops::{FirewallOps, NetlinkOps, NetlinkRouteScheduler, RealFirewall};
use super::teardown::teardown as do_teardown;

/// Name given to the interface this daemon creates from a WireGuard config
/// file. When `-i/--interface` is used instead, an existing link is opened
/// by its own name and this constant plays no part.
const MANAGED_INTERFACE: &str = "wg0";
const FIREWALL_TABLE: &str = "dnsrouted";
const FIREWALL_CHAIN: &str = "dnsrouted";
const PROXY_SET_CAPACITY: usize = 4096;

pub async fn run() -> Result<()> {
    let cli = parse_cli();
    run_with_args(cli).await
}

/// Entry point used once the caller has already parsed `Cli` itself, so it
/// can initialize logging (verbosity depends on `cli.verbose`) before
/// anything here logs a line.
pub async fn run_with_args(cli: Cli) -> Result<()> {
    ensure_linux()?;
    ensure_net_admin()?;
    drop_privileges(cli.unprivileged_gid)?;
    enable_ip_forward()?;

    let runner = CommandRunner::new(cli.verbose, false);
    let netlink = Arc::new(Netlink::new()?);

    let tunnel = obtain_tunnel(&cli, &netlink, &runner).await?;

    let firewall = RealFirewall::new(detect_backend(FIREWALL_TABLE, FIREWALL_CHAIN), runner.clone());
    let (proxy_rules, block_rules, proxy_ips, collisions, fw_state) =
        setup(&cli, &netlink, &firewall, &tunnel).await?;

    let scheduler = Arc::new(NetlinkRouteScheduler::new(netlink.clone(), tunnel.link_index));
    let engine = Arc::new(DecisionEngine::new(
        Arc::new(proxy_rules),
        Arc::new(block_rules),
        proxy_ips.clone(),
        scheduler,
        cli.silent,
        cli.verbose,
    ));

    let cancel = tokio_util::sync::CancellationToken::new();
    let rt = tokio::runtime::Handle::current();
    let queue_cfg = QueueConfig { queue_num: cli.queue_num };
    let worker_cancel = cancel.clone();
    let worker_engine = engine.clone();
    let worker = tokio::task::spawn_blocking(move || {
        dnsrouted_queue::run_blocking(queue_cfg, worker_cancel, rt, move |rt, packet| {
            worker_engine.decide(rt, packet)
        })
    });

    tracing::info!(
        tunnel = %tunnel.tun_name,
        queue_num = cli.queue_num,
        "dnsrouted is running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("received shutdown signal");
    cancel.cancel();
    match worker.await {
        Ok(Err(err)) => tracing::warn!(%err, "packet-queue worker exited with an error"),
        Err(err) => tracing::warn!(%err, "packet-queue worker task panicked"),
        Ok(Ok(())) => {}
    }

    if cli.persistent {
        tracing::info!("persistent mode: leaving tunnel, firewall rules, and routes in place");
    } else {
        do_teardown(
            &netlink,
            &firewall,
            &fw_state,
            tunnel.link_index,
            &tunnel.tun_name,
            tunnel.owns_interface,
            &proxy_ips,
            &collisions,
            &runner,
        )
        .await;
    }

    Ok(())
}

struct TunnelHandle {
    link_index: u32,
    tun_name: String,
    /// Whether this daemon created the interface (from a WireGuard config)
    /// and is therefore responsible for tearing it down.
    owns_interface: bool,
}

async fn obtain_tunnel<N: NetlinkOps>(
    cli: &Cli,
    netlink: &N,
    runner: &CommandRunner,
) -> Result<TunnelHandle> {
    if let Some(path) = &cli.wg_config {
        let config = dnsrouted_wgconfig::parse_config(path)?;
        if cli.force {
            let _ = dnsrouted_wgconfig::teardown_interface(MANAGED_INTERFACE, runner);
        }
        dnsrouted_wgconfig::setup_interface(MANAGED_INTERFACE, &config, runner)
            .context("failed to set up tunnel interface")?;
        let link_index = netlink.link_index(MANAGED_INTERFACE).await?;
        Ok(TunnelHandle {
            link_index,
            tun_name: MANAGED_INTERFACE.to_string(),
            owns_interface: true,
        })
    } else {
        let name = cli
            .interface
            .as_ref()
            .ok_or_else(|| anyhow!("either a WireGuard config path or --interface is required"))?;
        let link_index = netlink.link_index(name).await?;
        Ok(TunnelHandle {
            link_index,
            tun_name: name.clone(),
            owns_interface: false,
        })
    }
}

/// Routes this process did not itself add, discovered on the tunnel link at
/// startup. They are absorbed into `proxy_ips` so the decision engine won't
/// re-add them, but they must never be deleted at shutdown — this process
/// didn't create them and doesn't own their lifetime.
type Collisions = std::collections::HashSet<std::net::Ipv4Addr>;

async fn setup<N, F>(
    cli: &Cli,
    netlink: &N,
    firewall: &F,
    tunnel: &TunnelHandle,
) -> Result<(RuleSet, RuleSet, Arc<Ipv4Set>, Collisions, FirewallState)>
where
    N: NetlinkOps,
    F: FirewallOps,
{
    let mut proxy_rules = RuleSet::new();
    dnsrouted_domains::load_domains(cli.proxy_list.to_string_lossy().as_ref(), |d| {
        proxy_rules.add_proxied(d)
    })
    .with_context(|| format!("failed to load proxy list {}", cli.proxy_list.display()))?;
    tracing::info!(
        registrable = proxy_rules.registrable_len(),
        patterns = proxy_rules.pattern_len(),
        "loaded proxy list"
    );

    let mut block_rules = RuleSet::new();
    if cli.block_list.exists() {
        dnsrouted_domains::load_domains(cli.block_list.to_string_lossy().as_ref(), |d| {
            block_rules.add_blocked(d)
        })
        .with_context(|| format!("failed to load block list {}", cli.block_list.display()))?;
        tracing::info!(
            exact = block_rules.exact_len(),
            patterns = block_rules.pattern_len(),
            "loaded block list"
        );
    }

    let proxy_ips = Arc::new(Ipv4Set::new(PROXY_SET_CAPACITY));

    let existing = netlink.routes_on_link(tunnel.link_index).await?;
    let mut collisions = Collisions::new();
    if !existing.is_empty() {
        tracing::warn!(
            count = existing.len(),
            "pre-existing routes found on tunnel link; will not be deleted at shutdown"
        );
        for ip in existing {
            proxy_ips.add(ip);
            collisions.insert(ip);
        }
    }

    if let Some(path) = &cli.preset_ips {
        for ip in super::config::load_preset_ips(path)? {
            if proxy_ips.add(ip) {
                netlink.add_route(tunnel.link_index, ip).await?;
            }
        }
    }

    let fw_cfg = FirewallConfig {
        queue_num: cli.queue_num,
        tun_name: &tunnel.tun_name,
    };
    let fw_state = firewall
        .apply(&fw_cfg)
        .context("failed to install firewall rules")?;

    Ok((proxy_rules, block_rules, proxy_ips, collisions, fw_state))
}

fn ensure_linux() -> Result<()> {
    if std::env::consts::OS != "linux" {
        return Err(anyhow!("this tool only supports Linux"));
    }
    Ok(())
}

fn ensure_net_admin() -> Result<()> {
    if Uid::effective().is_root() || has_cap_net_admin() {
        return Ok(());
    }
    Err(anyhow!("must be run as root or have CAP_NET_ADMIN"))
}

fn drop_privileges(gid: u32) -> Result<()> {
    setgid(Gid::from_raw(gid)).with_context(|| format!("failed to drop to group {gid}"))
}

fn enable_ip_forward() -> Result<()> {
    let path = Path::new("/proc/sys/net/ipv4/ip_forward");
    std::fs::write(path, b"1\n").context("failed to enable IPv4 forwarding")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockNetlink {
        routes_on_link: Vec<Ipv4Addr>,
        added: Mutex<Vec<Ipv4Addr>>,
        link_names: Mutex<Vec<String>>,
    }

    impl NetlinkOps for MockNetlink {
        async fn link_index(&self, name: &str) -> Result<u32> {
            self.link_names.lock().unwrap().push(name.to_string());
            Ok(7)
        }
        async fn add_route(&self, _link_index: u32, ip: Ipv4Addr) -> Result<()> {
            self.added.lock().unwrap().push(ip);
            Ok(())
        }
        async fn del_route(&self, _link_index: u32, _ip: Ipv4Addr) -> Result<()> {
            Ok(())
        }
        async fn routes_on_link(&self, _link_index: u32) -> Result<Vec<Ipv4Addr>> {
            Ok(self.routes_on_link.clone())
        }
    }

    #[derive(Default)]
    struct MockFirewall {
        applied: Mutex<Vec<u16>>,
    }

    impl FirewallOps for MockFirewall {
        fn apply(&self, cfg: &FirewallConfig) -> Result<FirewallState> {
            self.applied.lock().unwrap().push(cfg.queue_num);
            Ok(FirewallState::Iptables { chain: "DNSROUTED".to_string() })
        }
        fn remove_from_state(&self, _state: &FirewallState) -> Result<()> {
            Ok(())
        }
    }

    fn base_cli() -> Cli {
        Cli {
            wg_config: None,
            interface: Some("wg0".to_string()),
            proxy_list: PathBuf::from("/nonexistent/proxy.lst"),
            block_list: PathBuf::from("/nonexistent/blocks.lst"),
            preset_ips: None,
            force: false,
            silent: false,
            verbose: false,
            persistent: false,
            queue_num: 2034,
            unprivileged_gid: 2354,
        }
    }

    fn empty_file() -> PathBuf {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("dnsrouted-run-test-{}-{id}.lst", std::process::id()));
        std::fs::write(&path, "").unwrap();
        path
    }

    #[tokio::test]
    async fn obtain_tunnel_opens_existing_interface_by_name() {
        let cli = base_cli();
        let netlink = MockNetlink::default();
        let runner = CommandRunner::new(false, true);
        let tunnel = obtain_tunnel(&cli, &netlink, &runner).await.unwrap();
        assert_eq!(tunnel.link_index, 7);
        assert_eq!(tunnel.tun_name, "wg0");
        assert!(!tunnel.owns_interface);
        assert_eq!(netlink.link_names.lock().unwrap().as_slice(), &["wg0".to_string()]);
    }

    #[tokio::test]
    async fn setup_adopts_pre_existing_routes_and_installs_firewall() {
        let mut cli = base_cli();
        cli.proxy_list = empty_file();
        let netlink = MockNetlink {
            routes_on_link: vec![Ipv4Addr::new(10, 0, 0, 9)],
            ..Default::default()
        };
        let firewall = MockFirewall::default();
        let tunnel = TunnelHandle { link_index: 7, tun_name: "wg0".to_string(), owns_interface: false };

        let (_proxy, _block, proxy_ips, collisions, _state) =
            setup(&cli, &netlink, &firewall, &tunnel).await.unwrap();

        assert!(proxy_ips.exists(Ipv4Addr::new(10, 0, 0, 9)));
        assert!(collisions.contains(&Ipv4Addr::new(10, 0, 0, 9)));
        assert_eq!(firewall.applied.lock().unwrap().as_slice(), &[2034]);
        let _ = std::fs::remove_file(&cli.proxy_list);
    }

    #[tokio::test]
    async fn setup_seeds_preset_ips_before_firewall_install() {
        let mut cli = base_cli();
        cli.proxy_list = empty_file();
        cli.preset_ips = Some({
            let path = empty_file();
            std::fs::write(&path, "10.0.0.5\n10.0.0.6\n").unwrap();
            path
        });
        let netlink = MockNetlink::default();
        let firewall = MockFirewall::default();
        let tunnel = TunnelHandle { link_index: 7, tun_name: "wg0".to_string(), owns_interface: false };

        let (_proxy, _block, proxy_ips, collisions, _state) =
            setup(&cli, &netlink, &firewall, &tunnel).await.unwrap();

        assert!(proxy_ips.exists(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(proxy_ips.exists(Ipv4Addr::new(10, 0, 0, 6)));
        assert!(collisions.is_empty());
        assert_eq!(
            netlink.added.lock().unwrap().as_slice(),
            &[Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 6)]
        );
        let _ = std::fs::remove_file(&cli.proxy_list);
        let _ = std::fs::remove_file(cli.preset_ips.unwrap());
    }
}
