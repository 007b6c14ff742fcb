#![cfg(feature = "privileged-tests")]

use std::net::Ipv4Addr;

use dnsrouted_netlink::Netlink;

#[tokio::test]
#[ignore]
async fn can_add_and_delete_loopback_route() {
    if std::env::var("DNSROUTED_PRIV_TESTS_ALLOW_NETLINK").ok().as_deref() != Some("1") {
        eprintln!("skipping netlink test (set DNSROUTED_PRIV_TESTS_ALLOW_NETLINK=1)");
        return;
    }

    let netlink = Netlink::new().unwrap();
    let link_index = netlink.link_index("lo").await.unwrap();
    let probe = Ipv4Addr::new(127, 0, 0, 200);

    netlink.add_route(link_index, probe).await.unwrap();
    let routes = netlink.routes_on_link(link_index).await.unwrap();
    assert!(routes.contains(&probe));

    netlink.del_route(link_index, probe).await.unwrap();
    let routes = netlink.routes_on_link(link_index).await.unwrap();
    assert!(!routes.contains(&probe));
}
