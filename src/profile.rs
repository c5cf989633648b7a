//! Tuning profile: the desired parameter sets applied by the mutators.
//!
//! Built-in defaults target virtualized guests; `/etc/vm-tuner/profile.toml`
//! (or `--profile <path>`) overrides individual sections.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// System path probed when no explicit profile is given.
pub const DEFAULT_PROFILE_PATH: &str = "/etc/vm-tuner/profile.toml";

#[derive(Debug, Clone)]
pub struct TuningProfile {
    /// Kernel command-line parameters merged into the boot defaults file.
    pub boot_params: Vec<String>,
    /// Kernel tunables written to the managed sysctl drop-in.
    pub sysctl: BTreeMap<String, String>,
    /// Mount options merged into eligible fstab entries.
    pub mount_add_options: Vec<String>,
    /// Mount options stripped from eligible fstab entries.
    pub mount_remove_options: Vec<String>,
    /// I/O scheduler selected for virtual block devices.
    pub io_scheduler: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileToml {
    boot: Option<BootToml>,
    sysctl: Option<BTreeMap<String, String>>,
    mounts: Option<MountsToml>,
    scheduler: Option<SchedulerToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BootToml {
    params: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MountsToml {
    add_options: Option<Vec<String>>,
    remove_options: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedulerToml {
    elevator: String,
}

impl Default for TuningProfile {
    fn default() -> Self {
        let sysctl = [
            ("vm.swappiness", "10"),
            ("vm.dirty_ratio", "15"),
            ("vm.dirty_background_ratio", "5"),
            ("net.core.rmem_max", "16777216"),
            ("net.core.wmem_max", "16777216"),
            ("net.core.netdev_max_backlog", "5000"),
            ("net.ipv4.tcp_rmem", "4096 87380 16777216"),
            ("net.ipv4.tcp_wmem", "4096 65536 16777216"),
            ("kernel.nmi_watchdog", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            boot_params: [
                "elevator=noop",
                "transparent_hugepage=madvise",
                "vsyscall=emulate",
                "clocksource=tsc",
                "tsc=reliable",
                "intel_idle.max_cstate=0",
                "processor.max_cstate=1",
                "nmi_watchdog=0",
                "pcie_aspm=off",
                "nvme_core.default_ps_max_latency_us=0",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            sysctl,
            mount_add_options: ["noatime", "nodiratime", "commit=60"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            mount_remove_options: vec!["discard".to_string()],
            io_scheduler: "none".to_string(),
        }
    }
}

impl TuningProfile {
    /// Load the profile: an explicit path must exist; otherwise the system
    /// path is used when present, and built-in defaults when not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let system = Path::new(DEFAULT_PROFILE_PATH);
                if system.exists() {
                    Self::from_file(system)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading tuning profile '{}'", path.display()))?;
        let parsed: ProfileToml = toml::from_str(&text)
            .with_context(|| format!("parsing tuning profile '{}'", path.display()))?;

        let mut profile = Self::default();
        if let Some(boot) = parsed.boot {
            profile.boot_params = boot.params;
        }
        if let Some(sysctl) = parsed.sysctl {
            profile.sysctl = sysctl;
        }
        if let Some(mounts) = parsed.mounts {
            if let Some(add) = mounts.add_options {
                profile.mount_add_options = add;
            }
            if let Some(remove) = mounts.remove_options {
                profile.mount_remove_options = remove;
            }
        }
        if let Some(scheduler) = parsed.scheduler {
            profile.io_scheduler = scheduler.elevator;
        }

        profile.validate(path)?;
        Ok(profile)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for param in &self.boot_params {
            if param.is_empty() || param.contains(char::is_whitespace) {
                bail!(
                    "invalid tuning profile '{}': boot parameter '{}' must be a single token",
                    path.display(),
                    param
                );
            }
        }
        for opt in self
            .mount_add_options
            .iter()
            .chain(&self.mount_remove_options)
        {
            if opt.is_empty() || opt.contains(char::is_whitespace) || opt.contains(',') {
                bail!(
                    "invalid tuning profile '{}': mount option '{}' must be a single token",
                    path.display(),
                    opt
                );
            }
        }
        if self.io_scheduler.is_empty() {
            bail!(
                "invalid tuning profile '{}': scheduler.elevator must not be empty",
                path.display()
            );
        }
        Ok(())
    }
}
