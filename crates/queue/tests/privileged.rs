#![cfg(feature = "privileged-tests")]

use dnsrouted_queue::{QueueConfig, Verdict, run_blocking};
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore]
async fn worker_shuts_down_on_cancel() {
    if std::env::var("DNSROUTED_PRIV_TESTS_ALLOW_NFQUEUE").ok().as_deref() != Some("1") {
        eprintln!("skipping nfqueue test (set DNSROUTED_PRIV_TESTS_ALLOW_NFQUEUE=1)");
        return;
    }

    let cancel = CancellationToken::new();
    let rt = tokio::runtime::Handle::current();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let cfg = QueueConfig { queue_num: 2099 };
    tokio::task::spawn_blocking(move || run_blocking(cfg, cancel, rt, |_, _| Verdict::Accept))
        .await
        .unwrap()
        .unwrap();
}
