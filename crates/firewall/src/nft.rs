use std::ffi::CString;

use anyhow::{Context, Result};
use nix::libc;
use nftnl::{Batch, Chain, FinalizedBatch, Hook, MsgType, ProtoFamily, Rule, Table, nft_expr};

use dnsrouted_util::CommandRunner;

use crate::FirewallConfig;

pub(crate) fn find_nft_binary() -> bool {
    dnsrouted_util::find_in_path("nft").is_some()
}

/// Builds the `nft` CLI invocations equivalent to [`apply_native`], used
/// when the native netlink path is unavailable (e.g. missing `CAP_NET_ADMIN`
/// without a helper binary).
pub(crate) fn build_cmds(cfg: &FirewallConfig, table: &str, chain_prefix: &str) -> Vec<Vec<String>> {
    let mut cmds = Vec::new();
    cmds.push(vec!["delete", "table", "inet", table].into_iter().map(String::from).collect());
    cmds.push(vec!["add", "table", "inet", table].into_iter().map(String::from).collect());

    for (hook, name) in [("input", "in"), ("forward", "fwd"), ("output", "out")] {
        let chain = format!("{chain_prefix}_{name}");
        cmds.push(vec![
            "add".to_string(), "chain".to_string(), "inet".to_string(), table.to_string(), chain.clone(),
            "{".to_string(), "type".to_string(), "filter".to_string(), "hook".to_string(), hook.to_string(),
            "priority".to_string(), "0".to_string(), ";".to_string(), "policy".to_string(), "accept".to_string(), ";".to_string(), "}".to_string(),
        ]);
        cmds.push(vec![
            "add".to_string(), "rule".to_string(), "inet".to_string(), table.to_string(), chain,
            "udp".to_string(), "sport".to_string(), "53".to_string(),
            "queue".to_string(), "num".to_string(), cfg.queue_num.to_string(),
        ]);
    }

    cmds.push(vec![
        "add".to_string(), "chain".to_string(), "inet".to_string(), table.to_string(), format!("{chain_prefix}_nat"),
        "{".to_string(), "type".to_string(), "nat".to_string(), "hook".to_string(), "postrouting".to_string(),
        "priority".to_string(), "100".to_string(), ";".to_string(), "}".to_string(),
    ]);
    cmds.push(vec![
        "add".to_string(), "rule".to_string(), "inet".to_string(), table.to_string(), format!("{chain_prefix}_nat"),
        "oifname".to_string(), cfg.tun_name.to_string(), "masquerade".to_string(),
    ]);

    cmds
}

pub(crate) fn apply_cmd(
    cfg: &FirewallConfig,
    table: &str,
    chain: &str,
    runner: &CommandRunner,
) -> Result<()> {
    let cmds = build_cmds(cfg, table, chain);
    for (idx, cmd) in cmds.into_iter().enumerate() {
        let args: Vec<&str> = cmd.iter().map(String::as_str).collect();
        if idx == 0 {
            let _ = runner.run_capture_allow_fail("nft", &args);
        } else {
            runner.run("nft", &args)?;
        }
    }
    Ok(())
}

/// Installs the table and the three filter-hook chains that redirect
/// source-port-53 UDP into the packet queue, via the native netlink path.
///
/// The MASQUERADE/NAT rule is deliberately left to the CLI path
/// ([`apply_masquerade_cmd`]) — `nftnl`'s expression set does not wrap the
/// NAT masquerade expression, so that one rule always goes through the
/// `nft` binary regardless of which backend programmed the filter chains.
pub(crate) fn apply_native(cfg: &FirewallConfig, table: &str, chain_prefix: &str) -> Result<()> {
    let table_c = CString::new(table).context("invalid nft table name")?;
    let table = Table::new(table_c.as_c_str(), ProtoFamily::Inet);

    let _ = delete_table(table_c.to_str().unwrap_or_default());

    let mut batch = Batch::new();
    batch.add(&table, MsgType::Add);

    let mut names = Vec::new();
    for suffix in ["in", "fwd", "out"] {
        names.push(CString::new(format!("{chain_prefix}_{suffix}")).context("invalid nft chain name")?);
    }

    let mut chains = Vec::new();
    for (name, hook) in names.iter().zip([Hook::In, Hook::Forward, Hook::Out]) {
        let mut chain = Chain::new(name.as_c_str(), &table);
        chain.set_hook(hook, 0);
        batch.add(&chain, MsgType::Add);
        chains.push(chain);
    }
    for chain in &chains {
        add_rule_udp_sport_queue(&mut batch, chain, 53, cfg.queue_num);
    }

    let finalized = batch.finalize();
    send_and_process(&finalized)?;
    Ok(())
}

/// Installs the MASQUERADE rule on `cfg.tun_name` through the `nft` CLI.
/// Always used regardless of whether the filter chains were programmed
/// natively or via CLI.
pub(crate) fn apply_masquerade_cmd(cfg: &FirewallConfig, nat_table: &str, runner: &CommandRunner) -> Result<()> {
    let _ = runner.run_capture_allow_fail("nft", &["delete", "table", "inet", nat_table]);
    runner.run("nft", &["add", "table", "inet", nat_table])?;
    runner.run(
        "nft",
        &[
            "add", "chain", "inet", nat_table, "postrouting", "{", "type", "nat", "hook", "postrouting",
            "priority", "100", ";", "}",
        ],
    )?;
    runner.run(
        "nft",
        &["add", "rule", "inet", nat_table, "postrouting", "oifname", cfg.tun_name, "masquerade"],
    )?;
    Ok(())
}

pub(crate) fn delete_table(table: &str) -> Result<()> {
    let table_c = CString::new(table).context("invalid nft table name")?;
    let table = Table::new(table_c.as_c_str(), ProtoFamily::Inet);
    let mut batch = Batch::new();
    batch.add(&table, MsgType::Del);
    let finalized = batch.finalize();
    let _ = send_and_process(&finalized);
    Ok(())
}

fn add_rule_udp_sport_queue(batch: &mut Batch, chain: &Chain, port: u16, queue_num: u16) {
    let port = port.to_be();
    let mut rule = Rule::new(chain);
    rule.add_expr(&nft_expr!(meta l4proto));
    rule.add_expr(&nft_expr!(cmp == libc::IPPROTO_UDP as u8));
    rule.add_expr(&nft_expr!(payload udp sport));
    rule.add_expr(&nft_expr!(cmp == port));
    rule.add_expr(&nft_expr!(queue num queue_num));
    batch.add(&rule, MsgType::Add);
}

fn send_and_process(batch: &FinalizedBatch) -> std::io::Result<()> {
    let socket = mnl::Socket::new(mnl::Bus::Netfilter)?;
    let portid = socket.portid();
    socket.send_all(batch)?;
    let mut buffer = vec![0; nftnl::nft_nlmsg_maxsize() as usize];
    let mut expected_seqs = batch.sequence_numbers();
    while !expected_seqs.is_empty() {
        let len = socket.recv(&mut buffer[..])?;
        let expected_seq = expected_seqs.next().expect("unexpected nft ack");
        mnl::cb_run(&buffer[..len], expected_seq, portid)?;
    }
    Ok(())
}
