//! Backup & manifest store.
//!
//! A mutation run owns one timestamped session directory holding copies of
//! every file it touched plus `manifest.json`. Restore replays the manifest
//! back onto the original paths, best-effort per entry, then runs the fixed
//! reload set so services pick the restored files up.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Result, TuneError};
use crate::exec::{command_exists, Cmd};
use crate::report::Reporter;

pub const MANIFEST_FILENAME: &str = "manifest.json";
const LEGACY_ROLLBACK_SCRIPT: &str = "rollback.sh";

/// One backed-up file. Created once per file per session; the first backup
/// is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original_path: String,
    /// Base name of the copy inside the session directory.
    pub backup_path: String,
    /// Recorded permission bits.
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub timestamp: String,
    pub entries: Vec<ManifestEntry>,
}

/// Outcome of a manifest replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub failed: usize,
}

/// A backup session bound to `<backup-root>/<timestamp>/`.
#[derive(Debug, Clone)]
pub struct BackupSession {
    dir: PathBuf,
    timestamp: String,
}

/// Default backup root under the invoking root user's home.
pub fn default_backup_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".vm-tuner")
        .join("backups")
}

/// List existing session timestamps, oldest first. An absent root is an
/// empty list, not an error.
pub fn list_sessions(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                sessions.push(name.to_string());
            }
        }
    }
    sessions.sort();
    Ok(sessions)
}

impl BackupSession {
    /// Start a new session: create a unique timestamped directory under
    /// `root`. Two sessions within the same second get `-2`, `-3`, …
    /// suffixes instead of sharing a directory.
    pub fn create(root: &Path) -> Result<Self> {
        let base = session_timestamp();
        let mut timestamp = base.clone();
        let mut suffix = 2;
        while root.join(&timestamp).exists() {
            timestamp = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let dir = root.join(&timestamp);
        fs::create_dir_all(&dir)?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;

        Ok(Self { dir, timestamp })
    }

    /// Bind to an existing session directory.
    pub fn open(root: &Path, timestamp: &str) -> Result<Self> {
        let dir = root.join(timestamp);
        if !dir.is_dir() {
            return Err(TuneError::NotFound(dir));
        }
        Ok(Self {
            dir,
            timestamp: timestamp.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILENAME)
    }

    /// Read the session manifest. `NotFound` when no file was ever backed
    /// up in this session.
    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(TuneError::NotFound(path));
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|err| TuneError::malformed(&path, err))
    }

    fn load_or_new_manifest(&self) -> Manifest {
        self.read_manifest().unwrap_or_else(|_| Manifest {
            timestamp: self.timestamp.clone(),
            entries: Vec::new(),
        })
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|err| TuneError::malformed(self.manifest_path(), err))?;
        fs::write(self.manifest_path(), json)?;
        Ok(())
    }

    /// Copy `path`'s bytes and permission bits into the session and record
    /// a manifest entry.
    ///
    /// A missing source is a no-op, not an error. Backing up the same path
    /// twice in one session keeps the first image and the single original
    /// entry untouched.
    pub fn backup_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let original = path.display().to_string();
        let mut manifest = self.load_or_new_manifest();
        if manifest.entries.iter().any(|e| e.original_path == original) {
            return Ok(());
        }

        let backup_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TuneError::malformed(path, "path has no base name"))?;
        let backup_path = self.dir.join(&backup_name);

        fs::copy(path, &backup_path)?;
        let mode = fs::metadata(path)?.permissions().mode() & 0o7777;
        fs::set_permissions(&backup_path, fs::Permissions::from_mode(mode))?;

        manifest.entries.push(ManifestEntry {
            original_path: original,
            backup_path: backup_name,
            mode,
        });
        self.write_manifest(&manifest)
    }

    /// Replay every manifest entry onto its original path, continuing past
    /// per-entry failures. One bad entry never aborts the rest.
    pub fn restore_files(&self, reporter: &dyn Reporter) -> Result<RestoreSummary> {
        let manifest = self.read_manifest()?;
        reporter.info(&format!("restoring backup from {}...", manifest.timestamp));

        let mut summary = RestoreSummary::default();
        for entry in &manifest.entries {
            match self.restore_entry(entry) {
                Ok(()) => {
                    reporter.info(&format!(
                        "restored {} -> {}",
                        entry.backup_path, entry.original_path
                    ));
                    summary.restored += 1;
                }
                Err(err) => {
                    reporter.error(&format!(
                        "failed to restore {}: {}",
                        entry.original_path, err
                    ));
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn restore_entry(&self, entry: &ManifestEntry) -> std::io::Result<()> {
        let src = self.dir.join(&entry.backup_path);
        fs::copy(&src, &entry.original_path)?;
        fs::set_permissions(
            &entry.original_path,
            fs::Permissions::from_mode(entry.mode),
        )
    }

    /// Full restore: replay the manifest, then run the fixed reload set
    /// unconditionally. The reloads are cheap and idempotent, so they are
    /// safe even for files that were not among the restored entries.
    pub fn restore(&self, reporter: &dyn Reporter) -> Result<RestoreSummary> {
        let summary = self.restore_files(reporter)?;
        run_reload_actions(reporter);
        if summary.failed == 0 {
            reporter.success("restore complete");
        } else {
            reporter.warning(&format!(
                "restore finished with {} failed file(s) out of {}",
                summary.failed,
                summary.failed + summary.restored
            ));
        }
        Ok(summary)
    }
}

/// Post-restore reload actions: service-manager rescan, boot-loader
/// regeneration when a defaults file exists, kernel-tunable reload.
/// Failures are warnings; a missed reload is recoverable by rebooting.
pub fn run_reload_actions(reporter: &dyn Reporter) {
    for result in [
        reload(Cmd::new("systemctl").arg("daemon-reload")),
        reload_boot_loader(),
        reload(Cmd::new("sysctl").arg("--system")),
    ] {
        if let Err(err) = result {
            reporter.warning(&err.to_string());
        }
    }
}

fn reload(cmd: Cmd) -> Result<()> {
    cmd.capture()
        .map(|_| ())
        .map_err(|err| TuneError::ReloadFailed(err.to_string()))
}

fn reload_boot_loader() -> Result<()> {
    if !Path::new("/etc/default/grub").exists() {
        return Ok(());
    }
    if command_exists("update-grub") {
        reload(Cmd::new("update-grub"))
    } else {
        reload(Cmd::new("grub2-mkconfig").args(["-o", "/boot/grub2/grub.cfg"]))
    }
}

/// How a backup session can be rolled back: the structured manifest, or the
/// legacy self-contained shell script older sessions carry.
#[derive(Debug)]
pub enum Rollback {
    Manifest(BackupSession),
    LegacyScript(PathBuf),
}

/// Resolve the rollback mechanism for a session, probing for the manifest
/// first and falling back to the legacy script.
pub fn resolve_rollback(root: &Path, timestamp: &str) -> Result<Rollback> {
    let session = BackupSession::open(root, timestamp)?;

    if session.manifest_path().exists() {
        return Ok(Rollback::Manifest(session));
    }

    let script = session.dir().join(LEGACY_ROLLBACK_SCRIPT);
    if script.exists() {
        return Ok(Rollback::LegacyScript(script));
    }

    Err(TuneError::NotFound(session.dir().join(MANIFEST_FILENAME)))
}

impl Rollback {
    pub fn execute(&self, reporter: &dyn Reporter) -> anyhow::Result<RestoreSummary> {
        match self {
            Rollback::Manifest(session) => Ok(session.restore(reporter)?),
            Rollback::LegacyScript(script) => {
                reporter.warning("manifest missing, falling back to legacy rollback script");
                Cmd::new("/bin/bash")
                    .arg_path(script)
                    .error_msg("legacy rollback script failed")
                    .run()?;
                Ok(RestoreSummary::default())
            }
        }
    }
}

fn session_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}-{:02}{:02}{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use tempfile::TempDir;

    fn write_mode(path: &Path, content: &str, mode: u32) {
        fs::write(path, content).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_backup_copies_bytes_and_mode() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let target = work.path().join("grub");
        write_mode(&target, "GRUB_TIMEOUT=5\n", 0o600);

        let session = BackupSession::create(root.path()).unwrap();
        session.backup_file(&target).unwrap();

        let copy = session.dir().join("grub");
        assert_eq!(fs::read_to_string(&copy).unwrap(), "GRUB_TIMEOUT=5\n");
        assert_eq!(
            fs::metadata(&copy).unwrap().permissions().mode() & 0o7777,
            0o600
        );

        let manifest = session.read_manifest().unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].backup_path, "grub");
        assert_eq!(manifest.entries[0].mode, 0o600);
    }

    #[test]
    fn test_backup_twice_keeps_first_image() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let target = work.path().join("fstab");
        fs::write(&target, "original").unwrap();

        let session = BackupSession::create(root.path()).unwrap();
        session.backup_file(&target).unwrap();

        // mutate, then back up again: the first image must survive
        fs::write(&target, "mutated").unwrap();
        session.backup_file(&target).unwrap();

        let manifest = session.read_manifest().unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(
            fs::read_to_string(session.dir().join("fstab")).unwrap(),
            "original"
        );
    }

    #[test]
    fn test_backup_missing_path_is_noop() {
        let root = TempDir::new().unwrap();
        let session = BackupSession::create(root.path()).unwrap();
        session
            .backup_file(Path::new("/definitely/not/there"))
            .unwrap();
        assert!(session.read_manifest().is_err());
    }

    #[test]
    fn test_restore_replays_bytes_and_mode() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let target = work.path().join("sysctl.conf");
        write_mode(&target, "vm.swappiness=60\n", 0o600);

        let session = BackupSession::create(root.path()).unwrap();
        session.backup_file(&target).unwrap();

        write_mode(&target, "vm.swappiness=10\n", 0o644);

        let reporter = MemoryReporter::new();
        let summary = session.restore_files(&reporter).unwrap();
        assert_eq!(summary, RestoreSummary { restored: 1, failed: 0 });
        assert_eq!(fs::read_to_string(&target).unwrap(), "vm.swappiness=60\n");
        assert_eq!(
            fs::metadata(&target).unwrap().permissions().mode() & 0o7777,
            0o600
        );
    }

    #[test]
    fn test_restore_continues_past_bad_entry() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let session = BackupSession::create(root.path()).unwrap();
        for name in ["a.conf", "b.conf", "c.conf"] {
            let target = work.path().join(name);
            fs::write(&target, name).unwrap();
            session.backup_file(&target).unwrap();
        }

        // sabotage the middle entry: point it into a directory that is gone
        let mut manifest = session.read_manifest().unwrap();
        manifest.entries[1].original_path = work
            .path()
            .join("missing-dir/b.conf")
            .display()
            .to_string();
        session.write_manifest(&manifest).unwrap();

        let reporter = MemoryReporter::new();
        let summary = session.restore_files(&reporter).unwrap();
        assert_eq!(summary.restored, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(reporter.errors().len(), 1);
    }

    #[test]
    fn test_session_directories_never_collide() {
        let root = TempDir::new().unwrap();
        let first = BackupSession::create(root.path()).unwrap();
        let second = BackupSession::create(root.path()).unwrap();
        assert_ne!(first.timestamp(), second.timestamp());
        assert!(first.dir().is_dir());
        assert!(second.dir().is_dir());
    }

    #[test]
    fn test_list_sessions() {
        let root = TempDir::new().unwrap();
        assert!(list_sessions(&root.path().join("absent")).unwrap().is_empty());

        let session = BackupSession::create(root.path()).unwrap();
        let listed = list_sessions(root.path()).unwrap();
        assert_eq!(listed, vec![session.timestamp().to_string()]);
    }

    #[test]
    fn test_rollback_prefers_manifest() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let target = work.path().join("x.conf");
        fs::write(&target, "x").unwrap();

        let session = BackupSession::create(root.path()).unwrap();
        session.backup_file(&target).unwrap();
        // a stale legacy script must not win over the manifest
        fs::write(session.dir().join(LEGACY_ROLLBACK_SCRIPT), "#!/bin/bash\n").unwrap();

        let rollback = resolve_rollback(root.path(), session.timestamp()).unwrap();
        assert!(matches!(rollback, Rollback::Manifest(_)));
    }

    #[test]
    fn test_rollback_falls_back_to_legacy_script() {
        let root = TempDir::new().unwrap();
        let session = BackupSession::create(root.path()).unwrap();
        fs::write(session.dir().join(LEGACY_ROLLBACK_SCRIPT), "#!/bin/bash\n").unwrap();

        let rollback = resolve_rollback(root.path(), session.timestamp()).unwrap();
        assert!(matches!(rollback, Rollback::LegacyScript(_)));
    }

    #[test]
    fn test_rollback_requires_some_mechanism() {
        let root = TempDir::new().unwrap();
        let session = BackupSession::create(root.path()).unwrap();
        let err = resolve_rollback(root.path(), session.timestamp()).unwrap_err();
        assert!(matches!(err, TuneError::NotFound(_)));
    }
}
