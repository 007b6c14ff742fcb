use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "dnsrouted",
    version,
    about = "Routes specific domains through a WireGuard tunnel by watching DNS responses",
)]
#[command(group(
    ArgGroup::new("tunnel_source").args(["wg_config", "interface"]).required(true)
))]
pub struct Cli {
    /// Path to a WireGuard configuration file; an interface is created from it
    #[arg(value_name = "WG_CONFIG")]
    pub wg_config: Option<PathBuf>,

    /// Use an existing interface instead of creating one from a config file
    #[arg(short, long)]
    pub interface: Option<String>,

    /// File listing domains/patterns to route through the tunnel
    #[arg(long, default_value = "proxy.lst")]
    pub proxy_list: PathBuf,

    /// File listing domains/patterns to drop
    #[arg(long, default_value = "blocks.lst")]
    pub block_list: PathBuf,

    /// File of literal IPs to route immediately at startup
    #[arg(long)]
    pub preset_ips: Option<PathBuf>,

    /// Remove a pre-existing managed interface at startup
    #[arg(short, long)]
    pub force: bool,

    /// Suppress the "new proxy route" log line
    #[arg(short, long)]
    pub silent: bool,

    /// Log every DNS answer's disposition
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip tunnel and route teardown at exit
    #[arg(short, long)]
    pub persistent: bool,

    /// Packet-queue number DNS traffic is redirected into
    #[arg(long, default_value_t = 2034)]
    pub queue_num: u16,

    /// Secondary group ID privileges are dropped to after startup
    #[arg(long, default_value_t = 2354)]
    pub unprivileged_gid: u32,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn wg_config_and_interface_are_mutually_exclusive() {
        let err = Cli::try_parse_from(["dnsrouted", "wg0.conf", "-i", "wg0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn requires_either_wg_config_or_interface() {
        let err = Cli::try_parse_from(["dnsrouted"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_with_wg_config_and_defaults() {
        let cli = Cli::try_parse_from(["dnsrouted", "wg0.conf"]).unwrap();
        assert_eq!(cli.wg_config, Some(PathBuf::from("wg0.conf")));
        assert_eq!(cli.proxy_list, PathBuf::from("proxy.lst"));
        assert_eq!(cli.block_list, PathBuf::from("blocks.lst"));
        assert_eq!(cli.queue_num, 2034);
        assert_eq!(cli.unprivileged_gid, 2354);
        assert!(!cli.persistent);
    }

    #[test]
    fn parses_with_interface_flag() {
        let cli = Cli::try_parse_from(["dnsrouted", "-i", "wg0", "-s", "-v", "-p"]).unwrap();
        assert_eq!(cli.interface.as_deref(), Some("wg0"));
        assert!(cli.wg_config.is_none());
        assert!(cli.silent);
        assert!(cli.verbose);
        assert!(cli.persistent);
    }
}
