//! Boot-parameter mutator: merges tuned kernel parameters into the
//! boot-loader defaults file.

use std::path::PathBuf;

use anyhow::Result;

use crate::config::{merge_params, parse_cmdline, render_cmdline, BootParam, DefaultsFile};
use crate::distro::Distro;
use crate::error::TuneError;
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

const CMDLINE_KEY: &str = "GRUB_CMDLINE_LINUX_DEFAULT";

pub struct GrubTuner {
    path: PathBuf,
}

impl GrubTuner {
    pub fn new(distro: &Distro) -> Self {
        Self {
            path: distro.boot_defaults_path(),
        }
    }

    /// Operate on an explicit defaults file instead of the distro default.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Tuner for GrubTuner {
    fn name(&self) -> &'static str {
        "GRUB boot parameters"
    }

    fn requires_reboot(&self) -> bool {
        true
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Optimizing GRUB boot parameters");

        let file = match DefaultsFile::parse(&self.path) {
            Ok(file) => file,
            Err(TuneError::NotFound(path)) => {
                reporter.warning(&format!(
                    "no boot defaults file at {}; nothing to merge",
                    path.display()
                ));
                return Ok(Outcome::Unchanged);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(current) = file.get(CMDLINE_KEY) else {
            reporter.warning(&format!(
                "{} has no {} line; refusing to guess where to add one",
                self.path.display(),
                CMDLINE_KEY
            ));
            return Ok(Outcome::Unchanged);
        };

        let existing = parse_cmdline(current);
        let desired: Vec<BootParam> = ctx
            .profile
            .boot_params
            .iter()
            .map(|p| BootParam::new(p))
            .collect();
        let merged = merge_params(&existing, &desired);
        let new_cmdline = render_cmdline(&merged);

        if current == new_cmdline {
            reporter.success("GRUB boot parameters already optimized");
            return Ok(Outcome::Unchanged);
        }

        reporter.info(&format!("current cmdline: {}", current));
        reporter.info(&format!("new cmdline: {}", new_cmdline));

        if ctx.dry_run() {
            reporter.info(&format!("would update: {}", self.path.display()));
            return Ok(Outcome::Previewed);
        }

        ctx.backup(&self.path)?;
        std::fs::write(&self.path, file.render_with(CMDLINE_KEY, &new_cmdline))?;
        reporter.success(&format!("updated {}", self.path.display()));

        reporter.info("regenerating boot-loader configuration...");
        if let Err(err) = ctx.distro.update_boot_loader() {
            reporter.warning(&format!(
                "boot-loader regeneration failed ({}); run it manually before rebooting",
                err
            ));
        }
        reporter.warning("REBOOT REQUIRED for boot parameter changes to take effect");

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Current GRUB configuration");

        let file = DefaultsFile::parse(&self.path)?;
        let cmdline = file.get(CMDLINE_KEY).unwrap_or("");
        reporter.info(&format!("{}=\"{}\"", CMDLINE_KEY, cmdline));
        for param in parse_cmdline(cmdline) {
            reporter.info(&format!("  - {}", param.raw));
        }

        if let Ok(running) = std::fs::read_to_string("/proc/cmdline") {
            reporter.step("Current running kernel parameters");
            reporter.info(running.trim());
        }
        Ok(())
    }

    fn verify(&self, reporter: &dyn Reporter) -> Result<bool> {
        let file = match DefaultsFile::parse(&self.path) {
            Ok(file) => file,
            Err(TuneError::NotFound(_)) => {
                reporter.warning("boot defaults file is missing");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        let current = parse_cmdline(file.get(CMDLINE_KEY).unwrap_or(""));
        let missing: Vec<&str> = ["elevator", "nmi_watchdog"]
            .into_iter()
            .filter(|key| !current.iter().any(|p| p.key == *key))
            .collect();

        if missing.is_empty() {
            reporter.success("tuned boot parameters are present");
            Ok(true)
        } else {
            reporter.warning(&format!(
                "boot parameters not applied (missing: {})",
                missing.join(", ")
            ));
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupSession;
    use crate::profile::TuningProfile;
    use crate::report::MemoryReporter;
    use std::fs;
    use tempfile::TempDir;

    const GRUB: &str = "\
GRUB_DEFAULT=0
GRUB_TIMEOUT=5
GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash\"
GRUB_CMDLINE_LINUX=\"\"
";

    fn ctx<'a>(
        profile: &'a TuningProfile,
        distro: &'a Distro,
        session: Option<&'a BackupSession>,
        reporter: &'a MemoryReporter,
    ) -> ApplyContext<'a> {
        ApplyContext {
            profile,
            distro,
            session,
            reporter,
            online: false,
        }
    }

    #[test]
    fn test_apply_merges_and_backs_up() {
        let temp = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let grub_path = temp.path().join("grub");
        fs::write(&grub_path, GRUB).unwrap();

        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let session = BackupSession::create(backups.path()).unwrap();
        let reporter = MemoryReporter::new();
        let tuner = GrubTuner::with_path(grub_path.clone());

        let outcome = tuner
            .apply(&ctx(&profile, &distro, Some(&session), &reporter))
            .unwrap();
        assert_eq!(outcome, Outcome::Applied);

        let written = fs::read_to_string(&grub_path).unwrap();
        assert!(written.contains("quiet splash elevator=noop"));
        assert!(written.contains("GRUB_TIMEOUT=5\n"));

        // original content is in the session
        assert_eq!(
            fs::read_to_string(session.dir().join("grub")).unwrap(),
            GRUB
        );
    }

    #[test]
    fn test_apply_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let grub_path = temp.path().join("grub");
        fs::write(&grub_path, GRUB).unwrap();

        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let session = BackupSession::create(backups.path()).unwrap();
        let reporter = MemoryReporter::new();
        let tuner = GrubTuner::with_path(grub_path.clone());

        tuner
            .apply(&ctx(&profile, &distro, Some(&session), &reporter))
            .unwrap();
        let first_pass = fs::read_to_string(&grub_path).unwrap();

        let outcome = tuner
            .apply(&ctx(&profile, &distro, Some(&session), &reporter))
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(fs::read_to_string(&grub_path).unwrap(), first_pass);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let grub_path = temp.path().join("grub");
        fs::write(&grub_path, GRUB).unwrap();

        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let reporter = MemoryReporter::new();
        let tuner = GrubTuner::with_path(grub_path.clone());

        let outcome = tuner
            .apply(&ctx(&profile, &distro, None, &reporter))
            .unwrap();
        assert_eq!(outcome, Outcome::Previewed);
        assert_eq!(fs::read_to_string(&grub_path).unwrap(), GRUB);
    }

    #[test]
    fn test_missing_file_is_unchanged() {
        let temp = TempDir::new().unwrap();
        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let reporter = MemoryReporter::new();
        let tuner = GrubTuner::with_path(temp.path().join("absent"));

        let outcome = tuner
            .apply(&ctx(&profile, &distro, None, &reporter))
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[test]
    fn test_missing_cmdline_key_refused() {
        let temp = TempDir::new().unwrap();
        let grub_path = temp.path().join("grub");
        fs::write(&grub_path, "GRUB_TIMEOUT=5\n").unwrap();

        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let reporter = MemoryReporter::new();
        let tuner = GrubTuner::with_path(grub_path.clone());

        let outcome = tuner
            .apply(&ctx(&profile, &distro, None, &reporter))
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(fs::read_to_string(&grub_path).unwrap(), "GRUB_TIMEOUT=5\n");
    }
}
