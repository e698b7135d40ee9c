//! Loads the embedded classifier object and attaches it to an interface.

use std::ffi::CString;

use aya::{
    maps::{MapData, RingBuf},
    programs::{xdp::XdpLinkId, Xdp, XdpFlags},
    Ebpf, EbpfLoader,
};
use tracing::{debug, info, warn};

use crate::{error::HijackError, runtime::conf::XdpMode};

pub const PROGRAM_NAME: &str = "hijack";
pub const EVENTS_MAP: &str = "EVENTS";
pub const PORT_GLOBAL: &str = "PORT";

static EBPF_OBJECT: &[u8] = aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/hijack"));

/// What the loader needs to know about the deployment.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub interface: String,
    pub port: u16,
    pub ring_byte_size: u32,
    pub xdp_mode: XdpMode,
}

pub fn xdp_flags(mode: XdpMode) -> XdpFlags {
    match mode {
        XdpMode::Default => XdpFlags::default(),
        XdpMode::Generic => XdpFlags::SKB_MODE,
        XdpMode::Driver => XdpFlags::DRV_MODE,
        XdpMode::Hardware => XdpFlags::HW_MODE,
    }
}

/// A loaded and attached classifier. Dropping it detaches the program and frees its maps.
pub struct Attachment {
    ebpf: Ebpf,
    link_id: Option<XdpLinkId>,
    interface: String,
    ifindex: u32,
}

impl Attachment {
    pub fn load(opts: &LoadOptions) -> Result<Self, HijackError> {
        if EBPF_OBJECT.is_empty() {
            return Err(HijackError::MissingObject);
        }
        let ifindex = if_index(&opts.interface)?;

        raise_memlock_limit();

        let mut ebpf = EbpfLoader::new()
            .set_global(PORT_GLOBAL, &opts.port, true)
            .set_max_entries(EVENTS_MAP, opts.ring_byte_size)
            .load(EBPF_OBJECT)?;

        if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
            // happens when the object carries no log statements
            warn!(
                event.name = "loader.logger_unavailable",
                error = %e,
                "failed to initialize eBPF logger"
            );
        }

        let program: &mut Xdp = ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or(HijackError::ProgramNotFound(PROGRAM_NAME))?
            .try_into()?;
        program.load()?;
        let link_id = program.attach(&opts.interface, xdp_flags(opts.xdp_mode))?;

        info!(
            event.name = "loader.program_attached",
            network.interface.name = %opts.interface,
            network.interface.index = ifindex,
            xdp.mode = opts.xdp_mode.as_str(),
            udp.port = opts.port,
            "xdp program attached to interface"
        );

        Ok(Attachment {
            ebpf,
            link_id: Some(link_id),
            interface: opts.interface.clone(),
            ifindex,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Hands out the event ring. Only the first call succeeds.
    pub fn take_events(&mut self) -> Result<RingBuf<MapData>, HijackError> {
        let map = self
            .ebpf
            .take_map(EVENTS_MAP)
            .ok_or(HijackError::MapNotFound(EVENTS_MAP))?;
        Ok(RingBuf::try_from(map)?)
    }

    /// Checks that the interface still exists under the same index and the program is still
    /// loaded and linked.
    pub fn health_check(&self) -> Result<(), HijackError> {
        let detached = |reason| HijackError::Detached {
            interface: self.interface.clone(),
            reason,
        };

        if self.link_id.is_none() {
            return Err(detached("program was detached"));
        }
        match if_index(&self.interface) {
            Ok(index) if index == self.ifindex => {}
            Ok(_) => return Err(detached("interface was recreated")),
            Err(_) => return Err(detached("interface disappeared")),
        }

        let program: &Xdp = self
            .ebpf
            .program(PROGRAM_NAME)
            .ok_or(HijackError::ProgramNotFound(PROGRAM_NAME))?
            .try_into()?;
        program.fd()?;
        Ok(())
    }

    /// Detaches the program now instead of on drop.
    pub fn detach(&mut self) -> Result<(), HijackError> {
        let Some(link_id) = self.link_id.take() else {
            return Ok(());
        };
        let program: &mut Xdp = self
            .ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or(HijackError::ProgramNotFound(PROGRAM_NAME))?
            .try_into()?;
        program.detach(link_id)?;

        info!(
            event.name = "loader.program_detached",
            network.interface.name = %self.interface,
            "xdp program detached from interface"
        );
        Ok(())
    }
}

pub(crate) fn if_index(interface: &str) -> Result<u32, HijackError> {
    let name =
        CString::new(interface).map_err(|_| HijackError::InterfaceNotFound(interface.into()))?;
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(HijackError::InterfaceNotFound(interface.to_string()));
    }
    Ok(index)
}

// Needed on kernels that predate memcg based accounting, see https://lwn.net/Articles/837122/
fn raise_memlock_limit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!(
            event.name = "loader.memlock_unchanged",
            ret, "remove limit on locked memory failed"
        );
    }
}
