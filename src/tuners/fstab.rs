//! Mount-table mutator: merges tuned mount options into eligible entries.

use std::path::PathBuf;

use anyhow::Result;

use crate::config::{merge_params, BootParam, FstabLine, MountEntry};
use crate::config::{parse_fstab, render_fstab};
use crate::error::TuneError;
use crate::exec::Cmd;
use crate::profile::TuningProfile;
use crate::report::Reporter;

use super::{ApplyContext, Outcome, Tuner};

pub struct FstabTuner {
    path: PathBuf,
}

impl FstabTuner {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/etc/fstab"),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Merge the profile's mount options into one entry. Only ext4 data
    /// mounts are eligible; swap and placeholder entries are left alone.
    /// Returns whether the entry changed.
    pub fn optimize_entry(entry: &mut MountEntry, profile: &TuningProfile) -> bool {
        if entry.fs_type != "ext4" || entry.mount_point == "none" {
            return false;
        }

        let existing: Vec<BootParam> = entry
            .options
            .iter()
            .filter(|opt| {
                let key = BootParam::new(opt).key;
                !profile.mount_remove_options.contains(&key)
            })
            .map(|opt| BootParam::new(opt))
            .collect();
        let desired: Vec<BootParam> = profile
            .mount_add_options
            .iter()
            .map(|opt| BootParam::new(opt))
            .collect();

        let merged: Vec<String> = merge_params(&existing, &desired)
            .into_iter()
            .map(|p| p.raw)
            .collect();

        if merged == entry.options {
            return false;
        }
        entry.options = merged;
        true
    }
}

impl Default for FstabTuner {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuner for FstabTuner {
    fn name(&self) -> &'static str {
        "filesystem mount options"
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<Outcome> {
        let reporter = ctx.reporter;
        reporter.step("Optimizing mount table");

        let mut lines = match parse_fstab(&self.path) {
            Ok(lines) => lines,
            Err(TuneError::NotFound(path)) => {
                reporter.warning(&format!(
                    "no mount table at {}; nothing to merge",
                    path.display()
                ));
                return Ok(Outcome::Unchanged);
            }
            Err(err) => return Err(err.into()),
        };

        let mut touched = Vec::new();
        for line in &mut lines {
            if let FstabLine::Entry(entry) = line {
                if Self::optimize_entry(entry, ctx.profile) {
                    reporter.info(&format!(
                        "optimizing: {} mounted at {}",
                        entry.device, entry.mount_point
                    ));
                    touched.push(entry.mount_point.clone());
                }
            }
        }

        if touched.is_empty() {
            reporter.success("no mount option changes needed");
            return Ok(Outcome::Unchanged);
        }

        let new_content = render_fstab(&lines);
        if ctx.dry_run() {
            reporter.info(&format!("would update: {}", self.path.display()));
            reporter.info(new_content.trim_end());
            return Ok(Outcome::Previewed);
        }

        ctx.backup(&self.path)?;
        std::fs::write(&self.path, new_content)?;
        reporter.success(&format!("updated {}", self.path.display()));

        // remount so options apply now; a failed remount just means reboot
        for mount_point in &touched {
            match Cmd::new("mount")
                .args(["-o", "remount"])
                .arg(mount_point)
                .capture()
            {
                Ok(_) => reporter.success(&format!("remounted {}", mount_point)),
                Err(err) => {
                    reporter.warning(&format!("failed to remount {}: {}", mount_point, err));
                    reporter.warning("a reboot may be required for the new options");
                }
            }
        }

        Ok(Outcome::Applied)
    }

    fn show(&self, reporter: &dyn Reporter) -> Result<()> {
        reporter.step("Current mount table entries");

        for line in parse_fstab(&self.path)? {
            if let FstabLine::Entry(entry) = line {
                reporter.info(&format!(
                    "{} on {} type {} ({})",
                    entry.device,
                    entry.mount_point,
                    entry.fs_type,
                    entry.options.join(",")
                ));
            }
        }
        Ok(())
    }

    fn verify(&self, reporter: &dyn Reporter) -> Result<bool> {
        let profile = TuningProfile::default();
        let lines = match parse_fstab(&self.path) {
            Ok(lines) => lines,
            Err(TuneError::NotFound(_)) => {
                reporter.warning("mount table is missing");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        let mut all_tuned = true;
        for line in lines {
            if let FstabLine::Entry(mut entry) = line {
                if FstabTuner::optimize_entry(&mut entry, &profile) {
                    reporter.warning(&format!("{} is not tuned", entry.mount_point));
                    all_tuned = false;
                }
            }
        }
        if all_tuned {
            reporter.success("mount options are tuned");
        }
        Ok(all_tuned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupSession;
    use crate::distro::Distro;
    use crate::report::MemoryReporter;
    use std::fs;
    use tempfile::TempDir;

    fn entry(fs_type: &str, mount_point: &str, options: &[&str]) -> MountEntry {
        MountEntry {
            device: "/dev/sda2".to_string(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            dump: "0".to_string(),
            pass: "1".to_string(),
        }
    }

    #[test]
    fn test_optimize_adds_options_and_drops_discard() {
        let profile = TuningProfile::default();
        let mut e = entry("ext4", "/", &["errors=remount-ro", "discard"]);

        assert!(FstabTuner::optimize_entry(&mut e, &profile));
        assert!(!e.options.contains(&"discard".to_string()));
        assert!(e.options.contains(&"noatime".to_string()));
        assert!(e.options.contains(&"nodiratime".to_string()));
        assert!(e.options.contains(&"commit=60".to_string()));
        assert!(e.options.contains(&"errors=remount-ro".to_string()));
    }

    #[test]
    fn test_optimize_overrides_commit_value() {
        let profile = TuningProfile::default();
        let mut e = entry("ext4", "/", &["noatime", "nodiratime", "commit=30"]);

        assert!(FstabTuner::optimize_entry(&mut e, &profile));
        assert!(e.options.contains(&"commit=60".to_string()));
        assert!(!e.options.contains(&"commit=30".to_string()));
        // commit keeps its original position (last-writer wins on value only)
        assert_eq!(e.options, vec!["noatime", "nodiratime", "commit=60"]);
    }

    #[test]
    fn test_optimize_skips_non_ext4() {
        let profile = TuningProfile::default();
        let mut swap = entry("swap", "none", &["sw"]);
        let mut vfat = entry("vfat", "/boot/efi", &["umask=0077"]);

        assert!(!FstabTuner::optimize_entry(&mut swap, &profile));
        assert!(!FstabTuner::optimize_entry(&mut vfat, &profile));
    }

    #[test]
    fn test_optimize_already_tuned_is_stable() {
        let profile = TuningProfile::default();
        let mut e = entry("ext4", "/", &["errors=remount-ro"]);
        FstabTuner::optimize_entry(&mut e, &profile);

        let tuned = e.clone();
        assert!(!FstabTuner::optimize_entry(&mut e, &profile));
        assert_eq!(e, tuned);
    }

    #[test]
    fn test_apply_preserves_comments_and_backs_up() {
        let temp = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let path = temp.path().join("fstab");
        let content = "# static file system information\n\
                       /dev/sda2 /data ext4 errors=remount-ro 0 1\n\
                       /dev/sda1 none swap sw 0 0\n";
        fs::write(&path, content).unwrap();

        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let session = BackupSession::create(backups.path()).unwrap();
        let reporter = MemoryReporter::new();
        let ctx = ApplyContext {
            profile: &profile,
            distro: &distro,
            session: Some(&session),
            reporter: &reporter,
            online: false,
        };

        let outcome = FstabTuner::with_path(path.clone()).apply(&ctx).unwrap();
        assert_eq!(outcome, Outcome::Applied);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("# static file system information\n"));

        let reparsed = crate::config::fstab::parse_fstab_str(&written);
        let entries: Vec<MountEntry> = reparsed
            .into_iter()
            .filter_map(|l| match l {
                FstabLine::Entry(e) => Some(e),
                FstabLine::Passthrough(_) => None,
            })
            .collect();
        assert!(entries[0].options.contains(&"noatime".to_string()));
        // swap entry untouched
        assert_eq!(entries[1].options, vec!["sw"]);

        assert_eq!(
            fs::read_to_string(session.dir().join("fstab")).unwrap(),
            content
        );
    }

    #[test]
    fn test_apply_unchanged_when_tuned() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fstab");
        fs::write(
            &path,
            "/dev/sda2 / ext4 errors=remount-ro,noatime,nodiratime,commit=60 0 1\n",
        )
        .unwrap();

        let profile = TuningProfile::default();
        let distro = Distro::unknown();
        let reporter = MemoryReporter::new();
        let ctx = ApplyContext {
            profile: &profile,
            distro: &distro,
            session: None,
            reporter: &reporter,
            online: false,
        };

        let outcome = FstabTuner::with_path(path).apply(&ctx).unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
    }
}
