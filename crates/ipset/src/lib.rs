//! Bounded, FIFO-evicting set of IPv4 addresses shared between the decision
//! engine and the route cleanup path.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::RwLock;

struct Inner {
    members: HashSet<Ipv4Addr>,
    order: VecDeque<Ipv4Addr>,
}

/// Thread-safe set of IPv4 addresses capped at a fixed capacity. Inserting
/// past capacity evicts the oldest member first (see `ipv4set.go` in the
/// original implementation this is derived from).
pub struct Ipv4Set {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl Ipv4Set {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                members: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Inserts `ip`. Returns `true` if it was not already present.
    pub fn add(&self, ip: Ipv4Addr) -> bool {
        let mut inner = self.inner.write().expect("ipv4set lock poisoned");
        if inner.members.contains(&ip) {
            return false;
        }
        if inner.order.len() >= self.capacity
            && let Some(oldest) = inner.order.pop_front()
        {
            inner.members.remove(&oldest);
        }
        inner.members.insert(ip);
        inner.order.push_back(ip);
        true
    }

    pub fn exists(&self, ip: Ipv4Addr) -> bool {
        self.inner.read().expect("ipv4set lock poisoned").members.contains(&ip)
    }

    /// Addresses currently tracked, in insertion order. Used at shutdown to
    /// tear down the routes this set caused to be installed.
    pub fn snapshot(&self) -> Vec<Ipv4Addr> {
        self.inner
            .read()
            .expect("ipv4set lock poisoned")
            .order
            .iter()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("ipv4set lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
