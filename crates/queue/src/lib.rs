//! Owns the kernel packet-queue handle and drives its receive loop.
//!
//! `nfq`'s `Queue` is a synchronous, blocking-by-poll API, so the worker
//! runs on a dedicated `spawn_blocking` task. A cloned `tokio::runtime::Handle`
//! lets the injected decision closure schedule async follow-up work (route
//! installation) without the verdict itself waiting on it.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use nfq::Queue;
use tokio_util::sync::CancellationToken;

pub use nfq::Verdict;

pub const DEFAULT_QUEUE_NUM: u16 = 2034;
const MAX_PACKET_LEN: u32 = 0xFFFF;
const MAX_QUEUE_LEN: u32 = 0xFF;
/// `nfq` has no direct write-timeout knob; this bounds how long each idle
/// poll sleeps before re-checking for cancellation and retrying `recv`.
const POLL_INTERVAL: Duration = Duration::from_millis(15);

pub struct QueueConfig {
    pub queue_num: u16,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { queue_num: DEFAULT_QUEUE_NUM }
    }
}

/// Runs the packet-queue worker to completion (until `cancel` fires).
/// `decide` is invoked once per packet with its raw payload and must return
/// a verdict quickly — it runs inline on the blocking worker thread. Route
/// scheduling is the caller's responsibility (see `dnsrouted-decision`),
/// dispatched onto `rt` so it does not delay the verdict.
pub fn run_blocking(
    cfg: QueueConfig,
    cancel: CancellationToken,
    rt: tokio::runtime::Handle,
    mut decide: impl FnMut(&tokio::runtime::Handle, &[u8]) -> Verdict,
) -> Result<()> {
    let mut queue = Queue::open().context("failed to open netfilter queue")?;
    queue.set_nonblocking(true);
    queue
        .bind(cfg.queue_num)
        .with_context(|| format!("failed to bind queue {}", cfg.queue_num))?;
    queue
        .set_queue_max_len(cfg.queue_num, MAX_QUEUE_LEN)
        .with_context(|| "failed to set queue max length")?;
    queue
        .set_copy_range(cfg.queue_num, MAX_PACKET_LEN)
        .with_context(|| "failed to set copy-packet mode")?;
    queue
        .set_fail_open(cfg.queue_num, true)
        .with_context(|| "failed to enable fail-open (NOENOBUFS)")?;

    tracing::info!(queue_num = cfg.queue_num, "packet queue worker started");

    while !cancel.is_cancelled() {
        match queue.recv() {
            Ok(mut msg) => {
                let verdict = decide(&rt, msg.get_payload());
                msg.set_verdict(verdict);
                if let Err(err) = queue.verdict(msg) {
                    tracing::warn!(%err, "failed to emit verdict");
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                tracing::warn!(%err, "error receiving from packet queue");
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }

    let _ = queue.unbind(cfg.queue_num);
    tracing::info!(queue_num = cfg.queue_num, "packet queue worker stopped");
    Ok(())
}
