//! Config-surface mutators.
//!
//! Every mutator follows one protocol: parse current state, compute the
//! desired set, merge, and stop early when nothing would change (or when
//! previewing). Writes always go through the backup session first, and a
//! failed post-write reload is a warning, never a rollback.

pub mod cleaner;
pub mod debloat;
pub mod fstab;
pub mod grub;
pub mod network;
pub mod scheduler;
pub mod sysctl;
pub mod vmtools;

use std::path::Path;

use anyhow::Result;

use crate::backup::BackupSession;
use crate::distro::Distro;
use crate::error::Result as TuneResult;
use crate::profile::TuningProfile;
use crate::report::Reporter;

pub use cleaner::clean_system;
pub use debloat::DebloatTuner;
pub use fstab::FstabTuner;
pub use grub::GrubTuner;
pub use network::{check_packet_drops, NetworkTuner};
pub use scheduler::SchedulerTuner;
pub use sysctl::SysctlTuner;
pub use vmtools::VmToolsTuner;

/// What an apply pass did to its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Current state already matches the desired state.
    Unchanged,
    /// Preview mode: the would-be change was reported, nothing written.
    Previewed,
    /// The surface was rewritten.
    Applied,
}

/// Shared state for one apply pass over a surface.
pub struct ApplyContext<'a> {
    pub profile: &'a TuningProfile,
    pub distro: &'a Distro,
    /// `None` in preview mode: no backups, no writes.
    pub session: Option<&'a BackupSession>,
    pub reporter: &'a dyn Reporter,
    pub online: bool,
}

impl ApplyContext<'_> {
    pub fn dry_run(&self) -> bool {
        self.session.is_none()
    }

    /// Back up `path` into the session. A preview pass never reaches this,
    /// but the no-session case is a no-op for safety, not a panic.
    pub fn backup(&self, path: &Path) -> TuneResult<()> {
        match self.session {
            Some(session) => session.backup_file(path),
            None => Ok(()),
        }
    }
}

/// One tunable config surface.
pub trait Tuner {
    /// Human-readable surface name for summaries and error reports.
    fn name(&self) -> &'static str;

    /// Parse, merge, back up, write, reload.
    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome>;

    /// Print the surface's current state.
    fn show(&self, reporter: &dyn Reporter) -> Result<()>;

    /// Check whether the applied artifacts are present. `false` means
    /// missing, not broken.
    fn verify(&self, reporter: &dyn Reporter) -> Result<bool>;

    /// Whether an applied change only takes effect after a reboot.
    fn requires_reboot(&self) -> bool {
        false
    }
}
