use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::runtime::conf::{conf_serde::level, ReceiverMode, XdpMode};

/// Command line flags. Every flag is optional so that an unset flag leaves the value from the
/// configuration file in place.
#[derive(Parser, Debug, Default, Serialize, Deserialize)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set the path to the configuration file (e.g., "hijack.yaml").
    #[arg(short, long, value_name = "FILE", env = "HIJACK_CONFIG_PATH")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Network interface to capture on.
    #[arg(short, long, value_name = "IFACE", env = "HIJACK_INTERFACE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Attach to every interface on the host instead of a single one.
    #[arg(
        long,
        env = "HIJACK_ALL_INTERFACES",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_interfaces: Option<bool>,

    /// UDP destination port to inspect.
    #[arg(short, long, env = "HIJACK_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Where frames are classified: in the kernel or on a raw socket.
    #[arg(short, long, value_enum, env = "HIJACK_MODE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ReceiverMode>,

    /// XDP attach mode.
    #[arg(long, value_enum, env = "HIJACK_XDP_MODE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xdp_mode: Option<XdpMode>,

    /// Size of the event ring in bytes (power of two, multiple of the page size).
    #[arg(long, value_name = "BYTES", env = "HIJACK_RING_BYTE_SIZE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_byte_size: Option<u32>,

    /// Datagrams buffered between the ring consumer and the caller.
    #[arg(long, value_name = "N", env = "HIJACK_CHANNEL_CAPACITY")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,

    /// Destination addresses to accept (comma separated). Defaults to the host's addresses.
    #[arg(
        long = "local-address",
        value_name = "ADDR",
        value_delimiter = ',',
        env = "HIJACK_LOCAL_ADDRESSES"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_addresses: Option<Vec<IpAddr>>,

    /// Set the application's log level (e.g., "debug", "warn").
    #[arg(short, long, value_name = "LEVEL", env = "HIJACK_LOG_LEVEL")]
    #[serde(
        with = "level::option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub log_level: Option<Level>,
}

#[cfg(test)]
mod tests {
    use std::{net::IpAddr, path::PathBuf};

    use clap::Parser as _;
    use figment::Jail;
    use tracing::Level;

    use super::Cli;
    use crate::runtime::conf::{ReceiverMode, XdpMode};

    #[test]
    fn parses_long_flags() {
        Jail::expect_with(|jail| {
            jail.set_env("HIJACK_CONFIG_PATH", "/tmp/hijack.yaml");
            jail.set_env("HIJACK_LOG_LEVEL", "debug");

            let args = [
                "hijack",
                "--config",
                "/path/to/conf.yaml",
                "--interface",
                "tailscale0",
                "--port",
                "41641",
                "--mode",
                "raw_socket",
                "--xdp-mode",
                "driver",
                "--all-interfaces",
                "--log-level",
                "warn",
            ];
            let cli = Cli::parse_from(args);
            assert_eq!(cli.config, Some(PathBuf::from("/path/to/conf.yaml")));
            assert_eq!(cli.interface.as_deref(), Some("tailscale0"));
            assert_eq!(cli.port, Some(41641));
            assert_eq!(cli.mode, Some(ReceiverMode::RawSocket));
            assert_eq!(cli.xdp_mode, Some(XdpMode::Driver));
            assert_eq!(cli.all_interfaces, Some(true));
            assert_eq!(cli.log_level, Some(Level::WARN));

            Ok(())
        });
    }

    #[test]
    fn parses_from_env_when_no_args() {
        Jail::expect_with(|jail| {
            jail.set_env("HIJACK_CONFIG_PATH", "/tmp/hijack.yaml");
            jail.set_env("HIJACK_INTERFACE", "eth1");
            jail.set_env("HIJACK_CHANNEL_CAPACITY", "64");
            jail.set_env("HIJACK_ALL_INTERFACES", "false");
            jail.set_env("HIJACK_LOCAL_ADDRESSES", "10.0.0.1,fd7a::1");
            jail.set_env("HIJACK_LOG_LEVEL", "debug");

            let cli = Cli::parse_from(["hijack"]);
            assert_eq!(cli.config, Some(PathBuf::from("/tmp/hijack.yaml")));
            assert_eq!(cli.interface.as_deref(), Some("eth1"));
            assert_eq!(cli.channel_capacity, Some(64));
            assert_eq!(cli.all_interfaces, Some(false));
            assert_eq!(
                cli.local_addresses,
                Some(vec![
                    "10.0.0.1".parse::<IpAddr>().unwrap(),
                    "fd7a::1".parse::<IpAddr>().unwrap(),
                ])
            );
            assert_eq!(cli.log_level, Some(Level::DEBUG));

            Ok(())
        });
    }

    #[test]
    fn unset_flags_stay_none() {
        Jail::expect_with(|_| {
            let cli = Cli::parse_from(["hijack"]);
            assert_eq!(cli.interface, None);
            assert_eq!(cli.port, None);
            assert_eq!(cli.mode, None);
            assert_eq!(cli.all_interfaces, None);
            assert_eq!(cli.log_level, None);

            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_mode() {
        Jail::expect_with(|_| {
            let res = Cli::try_parse_from(["hijack", "--mode", "pcap"]);
            assert!(res.is_err());

            Ok(())
        });
    }
}
