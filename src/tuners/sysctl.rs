//! Kernel-tunable mutator: owns a drop-in under `/etc/sysctl.d/`.

use std::path::PathBuf;

use anyhow::Result;

use crate::exec::Cmd;
use crate::profile::TuningProfile;
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

const SYSCTL_DROPIN: &str = "/etc/sysctl.d/99-vm-tuner.conf";

pub struct SysctlTuner {
    path: PathBuf,
}

impl SysctlTuner {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(SYSCTL_DROPIN),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Render the managed drop-in from the profile's tunables.
    pub fn render(profile: &TuningProfile) -> String {
        let mut out = String::from("# Kernel tunables managed by vm-tuner.\n");
        out.push_str("# Edit the tuning profile instead of this file; it is rewritten on apply.\n\n");
        for (key, value) in &profile.sysctl {
            out.push_str(&format!("{} = {}\n", key, value));
        }
        out
    }
}

impl Default for SysctlTuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuner for SysctlTuner {
    fn name(&self) -> &'static str {
        "sysctl kernel parameters"
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Optimizing kernel tunables");

        let desired = Self::render(ctx.profile);
        let current = std::fs::read_to_string(&self.path).ok();

        if current.as_deref() == Some(desired.as_str()) {
            reporter.success("kernel tunables already optimized");
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

        reporter.info("reloading kernel tunables...");
        match Cmd::new("sysctl").arg("--system").capture() {
            Ok(_) => reporter.success("kernel tunables reloaded"),
            Err(err) => reporter.warning(&format!(
                "sysctl reload failed ({}); settings apply on next boot",
                err
            )),
        }

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Current kernel tunables");

        let profile = TuningProfile::default();
        for key in profile.sysctl.keys() {
            let proc_path = PathBuf::from("/proc/sys").join(key.replace('.', "/"));
            match std::fs::read_to_string(&proc_path) {
                Ok(value) => reporter.info(&format!("{} = {}", key, value.trim())),
                Err(_) => reporter.info(&format!("{} = <unavailable>", key)),
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
