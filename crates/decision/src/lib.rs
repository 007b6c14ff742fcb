//! Turns one captured DNS-response packet into a verdict: block beats
//! proxy beats direct. Proxy hits cause the resolved address to be
//! remembered and a route installation to be scheduled, without blocking
//! the verdict on that netlink round-trip.

use std::net::Ipv4Addr;
use std::sync::Arc;

use dnsrouted_domains::RuleSet;
use dnsrouted_ipset::Ipv4Set;
pub use dnsrouted_queue::Verdict;

/// Schedules a fire-and-forget route installation. Implemented over
/// `dnsrouted-netlink` in the running daemon; swapped for a recording mock
/// in tests.
pub trait RouteScheduler: Send + Sync {
    fn schedule_add_route(&self, rt: &tokio::runtime::Handle, ip: Ipv4Addr);
}

pub struct DecisionEngine {
    proxy_rules: Arc<RuleSet>,
    block_rules: Arc<RuleSet>,
    proxy_ips: Arc<Ipv4Set>,
    scheduler: Arc<dyn RouteScheduler>,
    silent: bool,
    verbose: bool,
}

impl DecisionEngine {
    pub fn new(
        proxy_rules: Arc<RuleSet>,
        block_rules: Arc<RuleSet>,
        proxy_ips: Arc<Ipv4Set>,
        scheduler: Arc<dyn RouteScheduler>,
        silent: bool,
        verbose: bool,
    ) -> Self {
        Self { proxy_rules, block_rules, proxy_ips, scheduler, silent, verbose }
    }

    /// Entry point handed to the queue worker. Never blocks on anything
    /// beyond in-memory lookups and a short `proxy_ips` lock.
    pub fn decide(&self, rt: &tokio::runtime::Handle, packet: &[u8]) -> Verdict {
        let payload = match dnsrouted_dnswire::extract_udp_payload(packet) {
            Ok(payload) => payload,
            Err(_) => return Verdict::Accept,
        };

        let resolved = dnsrouted_dnswire::parse_dns_answer(payload);
        if resolved.is_empty() {
            return Verdict::Accept;
        }

        for name in resolved.keys() {
            if self.block_rules.matches_exact_or_pattern(name) {
                tracing::info!(domain = %name, "blocked DNS response");
                return Verdict::Drop;
            }
        }

        for (name, ips) in &resolved {
            let (registrable_hit, pattern_hit) = self.proxy_rules.matches_registrable_or_pattern(name);
            if !registrable_hit && !pattern_hit {
                if self.verbose {
                    tracing::debug!(domain = %name, "direct (not proxied)");
                }
                continue;
            }
            for ip in ips {
                if self.proxy_ips.add(*ip) {
                    if !self.silent {
                        tracing::info!(domain = %name, ip = %ip, "new proxy route");
                    }
                    self.scheduler.schedule_add_route(rt, *ip);
                } else if self.verbose {
                    tracing::debug!(domain = %name, ip = %ip, "old proxy route");
                }
            }
        }

        Verdict::Accept
    }
}
