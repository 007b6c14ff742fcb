use anyhow::Result;

use dnsrouted_util::CommandRunner;

use crate::FirewallConfig;

pub(crate) struct IptablesPlan {
    pub(crate) cleanup: Vec<Vec<String>>,
    pub(crate) setup: Vec<Vec<String>>,
    pub(crate) nat_cleanup: Vec<Vec<String>>,
    pub(crate) nat_setup: Vec<Vec<String>>,
}

/// Builds the rule set: every UDP datagram sourced from port 53 on INPUT,
/// FORWARD and OUTPUT is redirected into the packet queue, plus a
/// MASQUERADE rule in POSTROUTING for the tunnel interface.
pub(crate) fn build_plan(cfg: &FirewallConfig, chain: &str) -> IptablesPlan {
    let mut cleanup = Vec::new();
    let mut setup = Vec::new();

    for builtin in ["INPUT", "FORWARD", "OUTPUT"] {
        let jump_chain = format!("{chain}_{builtin}");
        cleanup.push(vec!["-D", builtin, "-j", &jump_chain].into_iter().map(String::from).collect());
        cleanup.push(vec!["-F", &jump_chain].into_iter().map(String::from).collect());
        cleanup.push(vec!["-X", &jump_chain].into_iter().map(String::from).collect());

        setup.push(vec!["-N", &jump_chain].into_iter().map(String::from).collect());
        setup.push(vec![
            "-A".to_string(),
            jump_chain.clone(),
            "-p".to_string(),
            "udp".to_string(),
            "--sport".to_string(),
            "53".to_string(),
            "-j".to_string(),
            "NFQUEUE".to_string(),
            "--queue-num".to_string(),
            cfg.queue_num.to_string(),
        ]);
        setup.push(vec!["-I", builtin, "1", "-j", &jump_chain].into_iter().map(String::from).collect());
    }

    let nat_chain = format!("{chain}_NAT");
    let nat_cleanup = vec![
        vec!["-t", "nat", "-D", "POSTROUTING", "-j", &nat_chain].into_iter().map(String::from).collect(),
        vec!["-t", "nat", "-F", &nat_chain].into_iter().map(String::from).collect(),
        vec!["-t", "nat", "-X", &nat_chain].into_iter().map(String::from).collect(),
    ];
    let nat_setup = vec![
        vec!["-t", "nat", "-N", &nat_chain].into_iter().map(String::from).collect(),
        vec![
            "-t".to_string(),
            "nat".to_string(),
            "-A".to_string(),
            nat_chain.clone(),
            "-o".to_string(),
            cfg.tun_name.to_string(),
            "-j".to_string(),
            "MASQUERADE".to_string(),
        ],
        vec!["-t", "nat", "-I", "POSTROUTING", "1", "-j", &nat_chain].into_iter().map(String::from).collect(),
    ];

    IptablesPlan { cleanup, setup, nat_cleanup, nat_setup }
}

pub(crate) fn apply(cfg: &FirewallConfig, chain: &str, runner: &CommandRunner) -> Result<()> {
    let plan = build_plan(cfg, chain);
    for cmd in plan.cleanup.iter().chain(plan.nat_cleanup.iter()) {
        let args: Vec<&str> = cmd.iter().map(String::as_str).collect();
        let _ = runner.run_capture_allow_fail("iptables", &args);
    }
    for cmd in plan.setup.iter().chain(plan.nat_setup.iter()) {
        let args: Vec<&str> = cmd.iter().map(String::as_str).collect();
        runner.run("iptables", &args)?;
    }
    Ok(())
}

pub(crate) fn remove(chain: &str, runner: &CommandRunner) -> Result<()> {
    for builtin in ["INPUT", "FORWARD", "OUTPUT"] {
        let jump_chain = format!("{chain}_{builtin}");
        let _ = runner.run_capture_allow_fail("iptables", &["-D", builtin, "-j", &jump_chain]);
        let _ = runner.run_capture_allow_fail("iptables", &["-F", &jump_chain]);
        let _ = runner.run_capture_allow_fail("iptables", &["-X", &jump_chain]);
    }
    let nat_chain = format!("{chain}_NAT");
    let _ = runner.run_capture_allow_fail("iptables", &["-t", "nat", "-D", "POSTROUTING", "-j", &nat_chain]);
    let _ = runner.run_capture_allow_fail("iptables", &["-t", "nat", "-F", &nat_chain]);
    let _ = runner.run_capture_allow_fail("iptables", &["-t", "nat", "-X", &nat_chain]);
    Ok(())
}
