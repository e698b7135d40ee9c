use thiserror::Error;

use crate::runtime::conf::ConfigError;

#[derive(Debug, Error)]
pub enum HijackError {
    #[error("embedded eBPF object is empty, rebuild with bpf-linker installed")]
    MissingObject,

    #[error("failed to load eBPF object: {0}")]
    Load(#[from] aya::EbpfError),

    #[error("eBPF program '{0}' not found in object")]
    ProgramNotFound(&'static str),

    #[error("eBPF program error: {0}")]
    Program(#[from] aya::programs::ProgramError),

    #[error("eBPF map '{0}' not found in object")]
    MapNotFound(&'static str),

    #[error("eBPF map error: {0}")]
    Map(#[from] aya::maps::MapError),

    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("could not attach to any network interface")]
    NoInterfaceAttached,

    #[error("program on '{interface}' is no longer attached: {reason}")]
    Detached {
        interface: String,
        reason: &'static str,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HijackError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| HijackError::Io { context, source }
    }

    pub(crate) fn last_os_error(context: &'static str) -> Self {
        HijackError::Io {
            context,
            source: std::io::Error::last_os_error(),
        }
    }
}
