use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Result;

use dnsrouted_decision::RouteScheduler;
use dnsrouted_firewall::{FirewallBackendKind, FirewallConfig, FirewallState};
use dnsrouted_netlink::Netlink;
use dnsrouted_util::CommandRunner;

#[allow(async_fn_in_trait)]
pub trait NetlinkOps: Send + Sync {
    async fn link_index(&self, name: &str) -> Result<u32>;
    async fn add_route(&self, link_index: u32, ip: Ipv4Addr) -> Result<()>;
    async fn del_route(&self, link_index: u32, ip: Ipv4Addr) -> Result<()>;
    async fn routes_on_link(&self, link_index: u32) -> Result<Vec<Ipv4Addr>>;
}

impl NetlinkOps for Arc<Netlink> {
    async fn link_index(&self, name: &str) -> Result<u32> {
        self.as_ref().link_index(name).await
    }

    async fn add_route(&self, link_index: u32, ip: Ipv4Addr) -> Result<()> {
        self.as_ref().add_route(link_index, ip).await
    }

    async fn del_route(&self, link_index: u32, ip: Ipv4Addr) -> Result<()> {
        self.as_ref().del_route(link_index, ip).await
    }

    async fn routes_on_link(&self, link_index: u32) -> Result<Vec<Ipv4Addr>> {
        self.as_ref().routes_on_link(link_index).await
    }
}

pub trait FirewallOps: Send + Sync {
    fn apply(&self, cfg: &FirewallConfig) -> Result<FirewallState>;
    fn remove_from_state(&self, state: &FirewallState) -> Result<()>;
}

pub struct RealFirewall {
    backend: FirewallBackendKind,
    runner: CommandRunner,
}

impl RealFirewall {
    pub fn new(backend: FirewallBackendKind, runner: CommandRunner) -> Self {
        Self { backend, runner }
    }
}

impl FirewallOps for RealFirewall {
    fn apply(&self, cfg: &FirewallConfig) -> Result<FirewallState> {
        self.backend.apply(cfg, &self.runner)
    }

    fn remove_from_state(&self, state: &FirewallState) -> Result<()> {
        self.backend.remove(state, &self.runner)
    }
}

/// Fire-and-forget route installation over a live netlink handle, scoped to
/// the one tunnel link index the daemon was started against.
pub struct NetlinkRouteScheduler {
    netlink: Arc<Netlink>,
    link_index: u32,
}

impl NetlinkRouteScheduler {
    pub fn new(netlink: Arc<Netlink>, link_index: u32) -> Self {
        Self { netlink, link_index }
    }
}

impl RouteScheduler for NetlinkRouteScheduler {
    fn schedule_add_route(&self, rt: &tokio::runtime::Handle, ip: Ipv4Addr) {
        let netlink = self.netlink.clone();
        let link_index = self.link_index;
        rt.spawn(async move {
            if let Err(err) = netlink.add_route(link_index, ip).await {
                tracing::warn!(%ip, %err, "failed to add proxy route");
            }
        });
    }
}
