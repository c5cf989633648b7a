//! Distribution resolver: the package-manager and boot-loader boundary.
//!
//! The mutation core consumes `install_package` and `update_boot_loader`
//! and never calls further out; everything distribution-specific funnels
//! through here.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::exec::{command_exists, Cmd};

/// Linux distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroKind {
    Debian,
    Rhel,
    Unknown,
}

/// Detected distribution and the operations the core needs from it.
#[derive(Debug, Clone)]
pub struct Distro {
    pub kind: DistroKind,
    pub name: String,
}

impl Distro {
    /// Detect the running distribution from `/etc/os-release`, falling back
    /// to probing for a package manager.
    pub fn detect() -> Result<Self> {
        Self::detect_at(Path::new("/"))
    }

    /// Detection against an alternate fs root, for tests.
    pub fn detect_at(fs_root: &Path) -> Result<Self> {
        let os_release = fs_root.join("etc/os-release");
        if let Ok(content) = std::fs::read_to_string(&os_release) {
            let lower = content.to_lowercase();
            if lower.contains("debian") || lower.contains("ubuntu") {
                return Ok(Self {
                    kind: DistroKind::Debian,
                    name: "Debian/Ubuntu".to_string(),
                });
            }
            if ["rhel", "centos", "fedora", "almalinux", "rocky"]
                .iter()
                .any(|id| lower.contains(id))
            {
                return Ok(Self {
                    kind: DistroKind::Rhel,
                    name: "RHEL/CentOS".to_string(),
                });
            }
        }

        if command_exists("apt-get") {
            return Ok(Self {
                kind: DistroKind::Debian,
                name: "Debian-based".to_string(),
            });
        }
        if command_exists("dnf") || command_exists("yum") {
            return Ok(Self {
                kind: DistroKind::Rhel,
                name: "RHEL-based".to_string(),
            });
        }

        bail!("unsupported distribution (no os-release match, no known package manager)");
    }

    /// Placeholder used when detection fails and the caller continues anyway.
    pub fn unknown() -> Self {
        Self {
            kind: DistroKind::Unknown,
            name: "unknown".to_string(),
        }
    }

    /// Path of the boot-loader defaults file mutated by the grub tuner.
    pub fn boot_defaults_path(&self) -> PathBuf {
        PathBuf::from("/etc/default/grub")
    }

    /// Install a package with the native package manager.
    pub fn install_package(&self, package: &str) -> Result<()> {
        let cmd = match self.kind {
            DistroKind::Debian => Cmd::new("apt-get").args(["install", "-y", package]),
            DistroKind::Rhel => {
                if command_exists("dnf") {
                    Cmd::new("dnf").args(["install", "-y", package])
                } else {
                    Cmd::new("yum").args(["install", "-y", package])
                }
            }
            DistroKind::Unknown => bail!("cannot install '{}': unknown distribution", package),
        };

        cmd.capture()
            .with_context(|| format!("failed to install package '{}'", package))?;
        Ok(())
    }

    /// Regenerate the boot-loader configuration from its defaults file.
    pub fn update_boot_loader(&self) -> Result<()> {
        match self.kind {
            DistroKind::Debian => Cmd::new("update-grub")
                .error_msg("update-grub failed")
                .capture()
                .map(|_| ()),
            DistroKind::Rhel => {
                // grub2-mkconfig with the UEFI or BIOS output path
                let uefi_cfg = Path::new("/boot/efi/EFI");
                let output = if uefi_cfg.is_dir() {
                    grub2_efi_config_path(uefi_cfg)
                } else {
                    PathBuf::from("/boot/grub2/grub.cfg")
                };

                Cmd::new("grub2-mkconfig")
                    .arg("-o")
                    .arg_path(&output)
                    .error_msg("grub2-mkconfig failed")
                    .capture()
                    .map(|_| ())
            }
            DistroKind::Unknown => {
                bail!("cannot regenerate boot loader: unknown distribution")
            }
        }
    }
}

/// Locate `<efi>/<vendor>/grub.cfg` for UEFI RHEL-family systems, falling
/// back to the BIOS path when no vendor directory carries one.
fn grub2_efi_config_path(efi_dir: &Path) -> PathBuf {
    if let Ok(entries) = std::fs::read_dir(efi_dir) {
        for entry in entries.flatten() {
            let candidate = entry.path().join("grub.cfg");
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    PathBuf::from("/boot/grub2/grub.cfg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_os_release(root: &Path, content: &str) {
        let etc = root.join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("os-release"), content).unwrap();
    }

    #[test]
    fn test_detect_debian() {
        let temp = TempDir::new().unwrap();
        write_os_release(temp.path(), "ID=ubuntu\nNAME=\"Ubuntu\"\n");
        let distro = Distro::detect_at(temp.path()).unwrap();
        assert_eq!(distro.kind, DistroKind::Debian);
    }

    #[test]
    fn test_detect_rhel_family() {
        let temp = TempDir::new().unwrap();
        write_os_release(temp.path(), "ID=\"rocky\"\nNAME=\"Rocky Linux\"\n");
        let distro = Distro::detect_at(temp.path()).unwrap();
        assert_eq!(distro.kind, DistroKind::Rhel);
    }

    #[test]
    fn test_unknown_install_refused() {
        let err = Distro::unknown().install_package("ethtool").unwrap_err();
        assert!(err.to_string().contains("unknown distribution"));
    }
}
