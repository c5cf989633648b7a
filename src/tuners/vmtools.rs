//! Guest-tools mutator: makes sure open-vm-tools is installed and its
//! service is running.

use anyhow::{bail, Result};

use crate::exec::{command_exists, Cmd};
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

/// The daemon ships under either service name depending on the
/// distribution; both are tried.
const SERVICE_NAMES: &[&str] = &["open-vm-tools", "vmtoolsd"];

pub struct VmToolsTuner;

impl VmToolsTuner {
    pub fn new() -> Self {
        Self
    }

    pub fn is_installed(&self) -> bool {
        command_exists("vmtoolsd")
    }

    fn ensure_service(&self, reporter: &dyn Reporter) {
        for service in SERVICE_NAMES {
            if let Err(err) = Cmd::new("systemctl").args(["enable", service]).capture() {
                reporter.warning(&format!("could not enable '{}' ({})", service, err));
            }
            match Cmd::new("systemctl").args(["start", service]).capture() {
                Ok(_) => {
                    reporter.success(&format!("guest tools service '{}' is running", service));
                    return;
                }
                Err(err) => {
                    reporter.warning(&format!("could not start '{}' ({})", service, err));
                }
            }
        }
        reporter.warning("guest tools service not started; it may start on next boot");
    }
}

impl Default for VmToolsTuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuner for VmToolsTuner {
    fn name(&self) -> &'static str {
        "guest tools verification/installation"
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Checking guest tools");

        if self.is_installed() {
            reporter.success("open-vm-tools is already installed");
            if !ctx.dry_run() {
                self.ensure_service(reporter);
            }
            return Ok(Outcome::Unchanged);
        }

        reporter.info("open-vm-tools is missing");
        if ctx.dry_run() {
            reporter.info("would install the open-vm-tools package");
            return Ok(Outcome::Previewed);
        }

        if !ctx.online {
            bail!("cannot install open-vm-tools in offline mode; install it manually");
        }

        ctx.distro.install_package("open-vm-tools")?;
        reporter.success("installed open-vm-tools");
        self.ensure_service(reporter);

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Guest tools");
        if self.is_installed() {
            reporter.info("open-vm-tools: installed");
        } else {
            reporter.info("open-vm-tools: not installed");
        }
        Ok(())
    }

    fn verify(&self, reporter: &dyn Reporter) -> Result<bool> {
        if self.is_installed() {
            reporter.success("open-vm-tools is installed");
            Ok(true)
        } else {
            reporter.warning("open-vm-tools is not installed");
            Ok(false)
        }
    }
}
