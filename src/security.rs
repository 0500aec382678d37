#![forbid(unsafe_code)]

//! Privilege guard shared by the viewtally binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to proceed when running as root. The tool writes snapshots and
/// markers into operator-owned directories; created as root they would block
/// every later unprivileged run.
pub fn refuse_root(binary: &str) -> Result<()> {
    refuse_root_for(Uid::effective(), binary)
}

fn refuse_root_for(uid: Uid, binary: &str) -> Result<()> {
    if uid.is_root() {
        bail!("refusing to run {binary} as root; run it as the account that owns the data directory");
    }
    Ok(())
}
