//! I/O scheduler mutator: a udev rule for virtual block devices plus an
//! immediate sysfs pass for disks that are already attached.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::exec::Cmd;
use crate::profile::TuningProfile;
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

const UDEV_RULE_PATH: &str = "/etc/udev/rules.d/60-vm-tuner-io.rules";

/// Disk name prefixes the rule and the sysfs pass cover.
const DISK_PREFIXES: &[&str] = &["sd", "vd", "xvd", "nvme"];

pub struct SchedulerTuner {
    path: PathBuf,
}

impl SchedulerTuner {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(UDEV_RULE_PATH),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Render the udev rule selecting the profile's elevator.
    pub fn render(profile: &TuningProfile) -> String {
        format!(
            "# I/O scheduler for virtual disks, managed by vm-tuner.\n\
             ACTION==\"add|change\", KERNEL==\"sd[a-z]|vd[a-z]|xvd[a-z]|nvme[0-9]n[0-9]\", \
             ATTR{{queue/scheduler}}=\"{}\"\n",
            profile.io_scheduler
        )
    }

    /// Write the elevator into `queue/scheduler` of every matching disk
    /// already present under `/sys/block`. Best-effort per disk.
    fn apply_now(&self, elevator: &str, reporter: &dyn Reporter) {
        let block_dir = Path::new("/sys/block");
        let entries = match std::fs::read_dir(block_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !DISK_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            let scheduler_path = entry.path().join("queue/scheduler");
            match std::fs::write(&scheduler_path, elevator) {
                Ok(()) => reporter.success(&format!("{}: scheduler set to {}", name, elevator)),
                Err(err) => reporter.warning(&format!(
                    "{}: could not set scheduler now ({}); the udev rule applies on reboot",
                    name, err
                )),
            }
        }
    }
}

impl Default for SchedulerTuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuner for SchedulerTuner {
    fn name(&self) -> &'static str {
        "I/O scheduler configuration"
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Optimizing I/O scheduler");

        let desired = Self::render(ctx.profile);
        let current = std::fs::read_to_string(&self.path).ok();

        if current.as_deref() == Some(desired.as_str()) {
            reporter.success("I/O scheduler rule already in place");
            return Ok(Outcome::Unchanged);
        }

        if ctx.dry_run() {
            reporter.info(&format!("would write: {}", self.path.display()));
            reporter.info(desired.trim_end());
            return Ok(Outcome::Previewed);
        }

        ctx.backup(&self.path)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, &desired)?;
        reporter.success(&format!("wrote {}", self.path.display()));

        self.apply_now(&ctx.profile.io_scheduler, reporter);

        for args in [
            vec!["control", "--reload"],
            vec!["trigger", "--subsystem-match=block"],
        ] {
            if let Err(err) = Cmd::new("udevadm").args(&args).capture() {
                reporter.warning(&format!("udev reload failed ({})", err));
            }
        }

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Current I/O schedulers");

        let entries = match std::fs::read_dir("/sys/block") {
            Ok(entries) => entries,
            Err(_) => {
                reporter.info("no /sys/block available");
                return Ok(());
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !DISK_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            if let Ok(current) = std::fs::read_to_string(entry.path().join("queue/scheduler")) {
                reporter.info(&format!("{}: {}", name, current.trim()));
            }
        }
        Ok(())
    }

    fn verify(&self, reporter: &dyn Reporter) -> Result<bool> {
        if self.path.exists() {
            reporter.success(&format!("{} is present", self.path.display()));
            Ok(true)
        } else {
            reporter.warning(&format!("{} is missing", self.path.display()));
            Ok(false)
        }
    }
}
