use std::{env, fs, path::PathBuf};

use anyhow::{anyhow, Context as _};
use aya_build::cargo_metadata;

fn main() -> anyhow::Result<()> {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").context("OUT_DIR not set")?);

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("linux") {
        return write_placeholder(&out_dir, "eBPF programs are only built on linux");
    }

    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .no_deps()
        .exec()
        .context("MetadataCommand::exec")?;
    let ebpf_package = packages
        .into_iter()
        .find(|cargo_metadata::Package { name, .. }| name == "hijack-ebpf")
        .ok_or_else(|| anyhow!("hijack-ebpf package not found"))?;

    if let Err(e) = aya_build::build_ebpf([ebpf_package]) {
        // Host-only work (unit tests, the raw-socket receiver) does not need the object.
        // The loader refuses an empty one at runtime.
        return write_placeholder(&out_dir, &format!("failed to build eBPF program: {e:#}"));
    }
    Ok(())
}

fn write_placeholder(out_dir: &std::path::Path, reason: &str) -> anyhow::Result<()> {
    println!("cargo:warning={reason}; XDP mode will be unavailable");
    fs::write(out_dir.join("hijack"), b"").context("writing placeholder eBPF object")
}
