use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use dnsrouted_firewall::FirewallState;
use dnsrouted_ipset::Ipv4Set;
use dnsrouted_util::CommandRunner;

use super::ops::{FirewallOps, NetlinkOps};

/// Reverse-order best-effort cleanup: firewall rules, tunnel interface,
/// then every route `proxy_ips` caused to be installed. `collisions` names
/// addresses that were already routed on the tunnel link before this
/// process started — those are skipped here, since this process never
/// created them and does not own their lifetime. Every step is logged and a
/// failure never stops the remaining steps.
pub async fn teardown<N, F>(
    netlink: &N,
    firewall: &F,
    fw_state: &FirewallState,
    link_index: u32,
    tun_name: &str,
    owns_interface: bool,
    proxy_ips: &Arc<Ipv4Set>,
    collisions: &HashSet<Ipv4Addr>,
    runner: &CommandRunner,
) where
    N: NetlinkOps,
    F: FirewallOps,
{
    if let Err(err) = firewall.remove_from_state(fw_state) {
        tracing::warn!(%err, "failed to remove firewall rules");
    }

    if owns_interface {
        if let Err(err) = dnsrouted_wgconfig::teardown_interface(tun_name, runner) {
            tracing::warn!(%err, interface = tun_name, "failed to tear down tunnel interface");
        }
    }

    for ip in proxy_ips.snapshot() {
        if collisions.contains(&ip) {
            tracing::debug!(%ip, "leaving pre-existing route in place");
            continue;
        }
        if let Err(err) = netlink.del_route(link_index, ip).await {
            tracing::warn!(%err, %ip, "failed to delete proxy route");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockNetlink {
        deleted: Mutex<Vec<Ipv4Addr>>,
    }

    impl NetlinkOps for MockNetlink {
        async fn link_index(&self, _name: &str) -> anyhow::Result<u32> {
            Ok(1)
        }
        async fn add_route(&self, _link_index: u32, _ip: Ipv4Addr) -> anyhow::Result<()> {
            Ok(())
        }
        async fn del_route(&self, _link_index: u32, ip: Ipv4Addr) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(ip);
            Ok(())
        }
        async fn routes_on_link(&self, _link_index: u32) -> anyhow::Result<Vec<Ipv4Addr>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MockFirewall {
        removed: Mutex<usize>,
    }

    impl FirewallOps for MockFirewall {
        fn apply(&self, _cfg: &dnsrouted_firewall::FirewallConfig) -> anyhow::Result<FirewallState> {
            unreachable!("teardown tests never call apply")
        }
        fn remove_from_state(&self, _state: &FirewallState) -> anyhow::Result<()> {
            *self.removed.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn teardown_removes_firewall_and_every_route() {
        let netlink = MockNetlink::default();
        let firewall = MockFirewall::default();
        let state = FirewallState::Iptables { chain: "DNSROUTED".to_string() };
        let proxy_ips = Arc::new(Ipv4Set::new(10));
        proxy_ips.add(Ipv4Addr::new(10, 0, 0, 1));
        proxy_ips.add(Ipv4Addr::new(10, 0, 0, 2));
        let runner = CommandRunner::new(false, true);

        teardown(
            &netlink,
            &firewall,
            &state,
            3,
            "wg0",
            false,
            &proxy_ips,
            &HashSet::new(),
            &runner,
        )
        .await;

        assert_eq!(*firewall.removed.lock().unwrap(), 1);
        let deleted = netlink.deleted.lock().unwrap().clone();
        assert_eq!(
            deleted,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[tokio::test]
    async fn teardown_never_deletes_a_pre_existing_collision_route() {
        let netlink = MockNetlink::default();
        let firewall = MockFirewall::default();
        let state = FirewallState::Iptables { chain: "DNSROUTED".to_string() };
        let proxy_ips = Arc::new(Ipv4Set::new(10));
        let collision = Ipv4Addr::new(10, 0, 0, 1);
        let owned = Ipv4Addr::new(10, 0, 0, 2);
        proxy_ips.add(collision);
        proxy_ips.add(owned);
        let mut collisions = HashSet::new();
        collisions.insert(collision);
        let runner = CommandRunner::new(false, true);

        teardown(
            &netlink, &firewall, &state, 3, "wg0", false, &proxy_ips, &collisions, &runner,
        )
        .await;

        let deleted = netlink.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec![owned]);
        assert!(!deleted.contains(&collision));
    }
}
