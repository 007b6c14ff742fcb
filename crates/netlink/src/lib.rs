use std::net::Ipv4Addr;

use anyhow::{Context, Result, anyhow};
use futures_util::TryStreamExt;
use netlink_packet_route::route::{RouteAttribute, RouteMessage, RouteScope};
use rtnetlink::{Handle, RouteMessageBuilder, new_connection};

/// Routes installed by this daemon always land in the main routing table,
/// matching the source implementation's literal `Table: 0`.
pub const MAIN_TABLE: u32 = 0;

pub struct Netlink {
    handle: Handle,
    _task: tokio::task::JoinHandle<()>,
}

impl Netlink {
    pub fn new() -> Result<Self> {
        let (conn, handle, _) = new_connection().context("failed to open netlink connection")?;
        let task = tokio::spawn(conn);
        Ok(Self { handle, _task: task })
    }

    pub async fn link_index(&self, name: &str) -> Result<u32> {
        let mut links = self.handle.link().get().match_name(name.to_string()).execute();
        if let Some(msg) = links.try_next().await? {
            return Ok(msg.header.index);
        }
        Err(anyhow!("interface not found: {name}"))
    }

    /// Installs a `/32` route to `ip` via `link_index` in the main table.
    pub async fn add_route(&self, link_index: u32, ip: Ipv4Addr) -> Result<()> {
        let route = RouteMessageBuilder::<Ipv4Addr>::new()
            .destination_prefix(ip, 32)
            .output_interface(link_index)
            .table_id(MAIN_TABLE)
            .scope(RouteScope::Universe)
            .build();
        self.handle
            .route()
            .add(route)
            .replace()
            .execute()
            .await
            .with_context(|| format!("failed to add route for {ip}"))?;
        Ok(())
    }

    /// Deletes the `/32` route to `ip` on `link_index` in the main table, if
    /// it exists.
    pub async fn del_route(&self, link_index: u32, ip: Ipv4Addr) -> Result<()> {
        let filter = RouteMessageBuilder::<Ipv4Addr>::new().build();
        let mut req = self.handle.route().get(filter).execute();
        while let Some(route) = req.try_next().await? {
            if route_matches(&route, link_index, ip) {
                self.handle
                    .route()
                    .del(route)
                    .execute()
                    .await
                    .with_context(|| format!("failed to delete route for {ip}"))?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Enumerates every `/32` destination already routed over `link_index`
    /// in the main table. Called once at startup to absorb pre-existing
    /// routes so the daemon never claims ownership of a route it didn't
    /// create.
    pub async fn routes_on_link(&self, link_index: u32) -> Result<Vec<Ipv4Addr>> {
        let filter = RouteMessageBuilder::<Ipv4Addr>::new().build();
        let mut req = self.handle.route().get(filter).execute();
        let mut found = Vec::new();
        while let Some(route) = req.try_next().await? {
            if route_output_interface(&route) != Some(link_index) {
                continue;
            }
            if route_table_id(&route) != MAIN_TABLE {
                continue;
            }
            if let Some(dest) = route_destination(&route) {
                found.push(dest);
            }
        }
        Ok(found)
    }
}

fn route_matches(route: &RouteMessage, link_index: u32, ip: Ipv4Addr) -> bool {
    route_output_interface(route) == Some(link_index)
        && route_table_id(route) == MAIN_TABLE
        && route_destination(route) == Some(ip)
}

fn route_table_id(route: &RouteMessage) -> u32 {
    for attr in &route.attributes {
        if let RouteAttribute::Table(value) = attr {
            return *value;
        }
    }
    route.header.table as u32
}

fn route_output_interface(route: &RouteMessage) -> Option<u32> {
    route.attributes.iter().find_map(|attr| match attr {
        RouteAttribute::Oif(idx) => Some(*idx),
        _ => None,
    })
}

fn route_destination(route: &RouteMessage) -> Option<Ipv4Addr> {
    route.attributes.iter().find_map(|attr| match attr {
        RouteAttribute::Destination(std::net::IpAddr::V4(v4)) => Some(*v4),
        _ => None,
    })
}
