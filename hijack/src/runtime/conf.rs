use std::{
    net::IpAddr,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use figment::{
    providers::{Format, Serialized, Yaml},
    Figment,
};
use hijack_common::{DEFAULT_PORT, DEFAULT_RING_BYTE_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::runtime::{cli::Cli, conf::conf_serde::level};

/// Page size the kernel ring buffer has to be a multiple of.
const RING_PAGE_SIZE: u32 = 4096;

/// Where frames are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ReceiverMode {
    /// The XDP program classifies frames in the kernel.
    #[default]
    Xdp,
    /// An AF_PACKET socket receives every frame and the classifier runs in process.
    RawSocket,
}

impl ReceiverMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiverMode::Xdp => "xdp",
            ReceiverMode::RawSocket => "raw_socket",
        }
    }
}

/// How the XDP program is attached to the interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum XdpMode {
    /// Let the kernel pick.
    Default,
    /// skb mode, works on every driver.
    #[default]
    Generic,
    Driver,
    Hardware,
}

impl XdpMode {
    pub fn as_str(self) -> &'static str {
        match self {
            XdpMode::Default => "default",
            XdpMode::Generic => "generic",
            XdpMode::Driver => "driver",
            XdpMode::Hardware => "hardware",
        }
    }
}

/// Application configuration, read from defaults, an optional YAML file, environment variables
/// and command line flags.
#[derive(Debug, Deserialize, Serialize)]
pub struct Conf {
    /// Interface the classifier is attached to.
    pub interface: String,

    /// Attach to every interface on the host instead of `interface`. Interfaces that appear
    /// later are picked up on refresh. Only applies to the XDP receiver.
    #[serde(default)]
    pub all_interfaces: bool,

    /// Path of the file this configuration was read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// UDP destination port to inspect.
    pub port: u16,

    pub mode: ReceiverMode,

    pub xdp_mode: XdpMode,

    /// Event ring size in bytes.
    /// - Default: 16 MiB
    /// - Must be a power of two and a multiple of 4096
    pub ring_byte_size: u32,

    /// Datagrams buffered between the ring consumer and the caller. When full, new datagrams
    /// are dropped.
    /// - Default: 10
    pub channel_capacity: usize,

    /// Destination addresses to accept. When unset the addresses of every interface on the
    /// host are used; an empty list accepts every destination.
    #[serde(default)]
    pub local_addresses: Option<Vec<IpAddr>>,

    #[serde(with = "level")]
    pub log_level: Level,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            all_interfaces: false,
            config_path: None,
            port: DEFAULT_PORT,
            mode: ReceiverMode::default(),
            xdp_mode: XdpMode::default(),
            ring_byte_size: DEFAULT_RING_BYTE_SIZE,
            channel_capacity: 10,
            local_addresses: None,
            log_level: Level::INFO,
        }
    }
}

impl Conf {
    /// Builds the configuration with the priority
    /// defaults < configuration file < environment variables / CLI flags.
    ///
    /// # Errors
    /// * `ConfigError::NoConfigFile` - the configured file does not exist.
    /// * `ConfigError::InvalidConfigPath` - the configured path is not a file.
    /// * `ConfigError::InvalidExtension` - the file is not YAML.
    /// * `ConfigError::InvalidRingSize` / `InvalidChannelCapacity` - values out of range.
    /// * `ConfigError::Extraction` - the merged values do not form a `Conf`.
    pub fn new(cli: Cli) -> Result<(Self, Cli), ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Conf::default()));

        let config_path_to_store = if let Some(config_path) = &cli.config {
            validate_config_path(config_path)?;
            figment = figment.merge(Yaml::file(config_path));
            Some(config_path.clone())
        } else {
            None
        };

        figment = figment.merge(Serialized::defaults(&cli));

        let mut conf: Conf = figment.extract()?;
        conf.validate()?;

        conf.config_path = config_path_to_store;
        Ok((conf, cli))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.ring_byte_size.is_power_of_two() || self.ring_byte_size % RING_PAGE_SIZE != 0 {
            return Err(ConfigError::InvalidRingSize(self.ring_byte_size));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }
        Ok(())
    }
}

/// Checks that `path` is an existing file with a YAML extension.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if !path.is_file() {
        if path.exists() {
            return Err(ConfigError::InvalidConfigPath(
                path.to_string_lossy().into_owned(),
            ));
        }
        return Err(ConfigError::NoConfigFile);
    }

    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => Ok(()),
        Some(ext) => Err(ConfigError::InvalidExtension(ext.to_string())),
        None => Err(ConfigError::InvalidExtension("none".to_string())),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file provided")]
    NoConfigFile,

    #[error("path '{0}' is not a valid file")]
    InvalidConfigPath(String),

    #[error("invalid file extension '.{0}', expected 'yaml' or 'yml'")]
    InvalidExtension(String),

    #[error("ring_byte_size {0} must be a power of two and a multiple of 4096")]
    InvalidRingSize(u32),

    #[error("channel_capacity must be at least 1")]
    InvalidChannelCapacity,

    #[error("configuration error: {0}")]
    Extraction(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Extraction(Box::new(e))
    }
}

pub mod conf_serde {
    pub mod level {
        use serde::{self, Deserialize, Deserializer, Serializer};
        use tracing::Level;

        pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(level.as_str())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            s.parse::<Level>().map_err(serde::de::Error::custom)
        }

        pub mod option {
            use super::*;

            pub fn serialize<S>(level: &Option<Level>, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                match level {
                    Some(l) => serializer.serialize_str(l.as_str()),
                    None => serializer.serialize_none(),
                }
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Level>, D::Error>
            where
                D: Deserializer<'de>,
            {
                Option::<String>::deserialize(deserializer)?
                    .map(|s| s.parse::<Level>().map_err(serde::de::Error::custom))
                    .transpose()
            }
        }
    }
}
