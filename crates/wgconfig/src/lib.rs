//! Parses an ini-style WireGuard configuration file and brings the
//! resulting interface up. The WireGuard control plane itself is reached
//! by shelling out to the `wg` command-line tool rather than vendoring a
//! protocol implementation — consistent with how the rest of this codebase
//! treats narrow, well-understood external tools.

mod config;
mod setup;

pub use config::{PeerConfig, WireguardConfig, parse_config};
pub use setup::{setup_interface, teardown_interface};
