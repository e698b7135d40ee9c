use clap::Parser;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::runtime::{
    cli::Cli,
    conf::{Conf, ConfigError},
};

pub mod cli;
pub mod conf;

pub struct Runtime {
    #[allow(dead_code)]
    pub cli: Cli,
    pub conf: Conf,
}

impl Runtime {
    pub fn new() -> Result<Self, RuntimeError> {
        let cli = Cli::parse();
        let (conf, cli) = Conf::new(cli)?;

        Ok(Runtime { cli, conf })
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn default_directives(level: Level) -> String {
    format!("warn,hijack={level}")
}
