//! Optional service-disable pass: stops and disables services that rarely
//! belong on a server VM.

use anyhow::Result;

use crate::exec::Cmd;
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

/// A candidate service and why it is usually unneeded.
#[derive(Debug, Clone)]
pub struct ServiceTarget {
    pub name: &'static str,
    pub description: &'static str,
}

/// Services checked for removal. Only ones currently active are touched.
pub const BLOAT_SERVICES: &[ServiceTarget] = &[
    ServiceTarget { name: "cups", description: "printing service (CUPS)" },
    ServiceTarget { name: "cups-browsed", description: "printer discovery" },
    ServiceTarget { name: "avahi-daemon", description: "mDNS/DNS-SD (Avahi)" },
    ServiceTarget { name: "bluetooth", description: "Bluetooth service" },
    ServiceTarget { name: "wpa_supplicant", description: "Wi-Fi security (WPA)" },
    ServiceTarget { name: "modemmanager", description: "modem manager" },
    ServiceTarget { name: "snapd", description: "snap package manager (consumes loop devices)" },
    ServiceTarget { name: "lxcfs", description: "LXC filesystem (if not using containers)" },
    ServiceTarget { name: "multipathd", description: "multipath daemon (unless using SAN)" },
];

pub struct DebloatTuner;

impl DebloatTuner {
    pub fn new() -> Self {
        Self
    }

    /// The subset of candidates that are currently active.
    pub fn active_services(&self) -> Vec<&'static ServiceTarget> {
        BLOAT_SERVICES
            .iter()
            .filter(|svc| is_service_active(svc.name))
            .collect()
    }
}

impl Default for DebloatTuner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_service_active(name: &str) -> bool {
    matches!(
        Cmd::new("systemctl")
            .args(["is-active", name])
            .capture_unchecked(),
        Ok((_, true))
    )
}

impl Tuner for DebloatTuner {
    fn name(&self) -> &'static str {
        "server slim (disable unused services)"
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Checking for unnecessary services");

        let services = self.active_services();
        if services.is_empty() {
            reporter.success("no unnecessary services are active");
            return Ok(Outcome::Unchanged);
        }

        reporter.info(&format!("found {} unnecessary service(s):", services.len()));
        for svc in &services {
            reporter.info(&format!("  - {}: {}", svc.name, svc.description));
        }

        if ctx.dry_run() {
            reporter.info("would disable and stop the services above");
            return Ok(Outcome::Previewed);
        }

        for svc in &services {
            if let Err(err) = Cmd::new("systemctl").args(["disable", svc.name]).capture() {
                reporter.warning(&format!("failed to disable {}: {}", svc.name, err));
                continue;
            }
            if let Err(err) = Cmd::new("systemctl").args(["stop", svc.name]).capture() {
                reporter.warning(&format!("failed to stop {}: {}", svc.name, err));
                continue;
            }
            reporter.success(&format!("disabled {}", svc.name));
        }

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Unnecessary services");
        for svc in self.active_services() {
            reporter.info(&format!("{}: active ({})", svc.name, svc.description));
        }
        Ok(())
    }

    fn verify(&self, reporter: &dyn Reporter) -> Result<bool> {
        let active = self.active_services();
        if active.is_empty() {
            reporter.success("no known-unneeded services are active");
            Ok(true)
        } else {
            reporter.warning(&format!(
                "{} known-unneeded service(s) still active",
                active.len()
            ));
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_list_is_well_formed() {
        assert!(!BLOAT_SERVICES.is_empty());
        for svc in BLOAT_SERVICES {
            assert!(!svc.name.is_empty());
            assert!(!svc.description.is_empty());
            assert!(!svc.name.contains(char::is_whitespace));
        }
    }
}
