//! System cleaner: package cache, journal, rotated logs.

use std::path::Path;

use anyhow::Result;
use walkdir::WalkDir;

use crate::distro::{Distro, DistroKind};
use crate::exec::{command_exists, Cmd};
use crate::report::Reporter;

/// Clean the package-manager cache, vacuum the journal to three days, and
/// sweep rotated logs out of /var/log. Every step is best-effort.
pub fn clean_system(distro: &Distro, reporter: &dyn Reporter) -> Result<()> {
    reporter.step("System Cleaner");

    reporter.info("cleaning package cache...");
    clean_package_cache(distro, reporter);

    reporter.info("vacuuming system logs...");
    match Cmd::new("journalctl").arg("--vacuum-time=3d").capture() {
        Ok(_) => reporter.success("journal vacuumed (kept 3 days)"),
        Err(err) => reporter.warning(&format!("failed to vacuum journal: {}", err)),
    }

    reporter.info("sweeping rotated logs...");
    match sweep_rotated_logs(Path::new("/var/log")) {
        Ok(0) => reporter.success("no rotated logs to remove"),
        Ok(count) => reporter.success(&format!("removed {} rotated log file(s)", count)),
        Err(err) => reporter.warning(&format!("log sweep incomplete: {}", err)),
    }

    Ok(())
}

fn clean_package_cache(distro: &Distro, reporter: &dyn Reporter) {
    let commands: &[(&str, &[&str])] = match distro.kind {
        DistroKind::Debian => &[("apt-get", &["clean"]), ("apt-get", &["autoremove", "-y"])],
        DistroKind::Rhel => {
            if command_exists("dnf") {
                &[("dnf", &["clean", "all"]), ("dnf", &["autoremove", "-y"])]
            } else {
                &[("yum", &["clean", "all"]), ("yum", &["autoremove", "-y"])]
            }
        }
        DistroKind::Unknown => {
            reporter.warning("unknown distribution; skipping package cache cleanup");
            return;
        }
    };

    for (program, args) in commands {
        if let Err(err) = Cmd::new(program).args(*args).capture() {
            reporter.warning(&format!("{} failed: {}", program, err));
            return;
        }
    }
    reporter.success("package cache cleaned");
}

/// Remove rotated log files (`*.gz` and numeric rotations like `*.1`)
/// under `dir`. Returns how many were deleted.
pub fn sweep_rotated_logs(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_rotated_log(&name) && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_rotated_log(name: &str) -> bool {
    if name.ends_with(".gz") {
        return true;
    }
    match name.rsplit_once('.') {
        Some((stem, suffix)) => {
            !stem.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
