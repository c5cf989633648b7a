//! Disk topology: resolving the device and partition behind `/`, and the
//! root-filesystem expansion built on top of it.
//!
//! The resolver fails closed. Misidentifying the backing device means
//! resizing the wrong object, so raw-disk roots and LVM stacks abort
//! instead of guessing.

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::distro::Distro;
use crate::error::{Result, TuneError};
use crate::exec::{command_exists, Cmd};
use crate::report::Reporter;

/// One node of the `lsblk -J -o NAME,TYPE,MOUNTPOINT` report.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub children: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
pub struct LsblkReport {
    pub blockdevices: Vec<BlockDevice>,
}

/// The disk and partition index backing the root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTarget {
    pub disk: String,
    pub partition: String,
}

impl BlockDevice {
    fn mounted_at_root(&self) -> bool {
        self.mountpoint.as_deref() == Some("/")
    }
}

/// Run `lsblk` and parse its JSON report.
pub fn read_device_tree() -> Result<Vec<BlockDevice>> {
    let output = Cmd::new("lsblk")
        .args(["-J", "-o", "NAME,TYPE,MOUNTPOINT"])
        .capture()
        .map_err(|err| TuneError::malformed("lsblk", err))?;

    let report: LsblkReport = serde_json::from_str(&output)
        .map_err(|err| TuneError::malformed("lsblk", err))?;
    Ok(report.blockdevices)
}

/// Find the disk and partition index carrying `/`.
///
/// Traverses disks, then each disk's direct children. A partition mounted at
/// `/` resolves immediately. A disk itself mounted at `/` (no partition
/// table) and a root reached through a nested container (LVM) both abort.
pub fn resolve_root(
    devices: &[BlockDevice],
    reporter: &dyn Reporter,
) -> Result<RootTarget> {
    for device in devices {
        if device.mounted_at_root() {
            return Err(TuneError::UnsupportedTopology(format!(
                "root is directly on disk '{}' without a partition table",
                device.name
            )));
        }

        for child in &device.children {
            if child.mounted_at_root() {
                let partition = partition_index(&device.name, &child.name, reporter);
                return Ok(RootTarget {
                    disk: device.name.clone(),
                    partition,
                });
            }

            // one level deeper means a container (LVM volume group); refuse
            // rather than resize through it
            for grandchild in &child.children {
                if grandchild.mounted_at_root() {
                    return Err(TuneError::UnsupportedTopology(format!(
                        "root is on '{}' inside container '{}' (LVM); automated resizing is disabled",
                        grandchild.name, child.name
                    )));
                }
            }
        }
    }

    Err(TuneError::RootNotFound)
}

/// Derive a partition index from the disk and partition names.
///
/// `sda` + `sda1` -> `1`; `nvme0n1` + `nvme0n1p3` -> `3`. A name with no
/// digits after stripping falls back to `1`, reported as a warning.
fn partition_index(disk: &str, partition: &str, reporter: &dyn Reporter) -> String {
    let mut suffix = partition.strip_prefix(disk).unwrap_or(partition);
    suffix = suffix.strip_prefix('p').unwrap_or(suffix);

    let digits: String = suffix
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        reporter.warning(&format!(
            "no partition index found in '{}' (disk '{}'); assuming partition 1",
            partition, disk
        ));
        return "1".to_string();
    }
    digits
}

/// Build the `/dev` path of a partition from its disk name and index,
/// re-applying the naming convention: NVMe, loop and MMC devices take a `p`
/// separator before the index, everything else concatenates directly.
pub fn partition_device_path(disk: &str, index: &str) -> String {
    let needs_separator = ["nvme", "loop", "mmcblk"]
        .iter()
        .any(|pattern| disk.contains(pattern))
        && !disk.ends_with('p');

    if needs_separator {
        format!("/dev/{}p{}", disk, index)
    } else {
        format!("/dev/{}{}", disk, index)
    }
}

/// Grow the root partition to fill its disk, then grow the filesystem.
///
/// Destructive: the CLI asks for confirmation before calling this. Requires
/// `growpart`; offline systems without it are refused rather than half-set-up.
pub fn expand_root(
    distro: &Distro,
    online: bool,
    reporter: &dyn Reporter,
) -> anyhow::Result<()> {
    if !command_exists("growpart") {
        reporter.warning("required tool 'growpart' is missing");
        if !online {
            bail!(
                "cannot install 'growpart' in offline mode; install cloud-guest-utils manually"
            );
        }
        reporter.info("installing growpart...");
        if distro.install_package("cloud-guest-utils").is_err() {
            distro
                .install_package("cloud-utils-growpart")
                .context("failed to install growpart")?;
        }
    }

    reporter.info("reading disk layout...");
    let devices = read_device_tree()?;
    let target = resolve_root(&devices, reporter)?;
    reporter.info(&format!(
        "target -> disk /dev/{}, partition {}",
        target.disk, target.partition
    ));

    reporter.info("growing partition...");
    let (output, ok) = Cmd::new("growpart")
        .arg(&format!("/dev/{}", target.disk))
        .arg(&target.partition)
        .capture_unchecked()?;
    if ok {
        reporter.success("partition grown");
    } else if output.contains("NOCHANGE") {
        reporter.success("partition is already at its maximum size");
    } else {
        bail!("growpart failed: {}", output.trim());
    }

    let fs_type = Cmd::new("findmnt")
        .args(["/", "-o", "FSTYPE", "-n"])
        .error_msg("failed to detect root filesystem type")
        .capture()?
        .trim()
        .to_string();
    reporter.info(&format!("root filesystem: {}", fs_type));

    let partition_path = partition_device_path(&target.disk, &target.partition);
    match fs_type.as_str() {
        "ext4" => Cmd::new("resize2fs")
            .arg(&partition_path)
            .error_msg("resize2fs failed")
            .capture()
            .map(|_| ())?,
        "xfs" => Cmd::new("xfs_growfs")
            .arg("/")
            .error_msg("xfs_growfs failed")
            .capture()
            .map(|_| ())?,
        other => bail!("filesystem '{}' is not supported for automatic resize", other),
    }

    reporter.success("filesystem expanded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;

    fn disk(name: &str, children: Vec<BlockDevice>) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            kind: "disk".to_string(),
            mountpoint: None,
            children,
        }
    }

    fn part(name: &str, mountpoint: Option<&str>) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            kind: "part".to_string(),
            mountpoint: mountpoint.map(str::to_string),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_root_second_partition() {
        let tree = vec![disk(
            "sda",
            vec![part("sda1", Some("/boot")), part("sda2", Some("/"))],
        )];
        let reporter = MemoryReporter::new();
        let target = resolve_root(&tree, &reporter).unwrap();
        assert_eq!(target.disk, "sda");
        assert_eq!(target.partition, "2");
        assert!(reporter.warnings().is_empty());
    }

    #[test]
    fn test_resolve_root_sole_partition() {
        let tree = vec![disk("vda", vec![part("vda1", Some("/"))])];
        let target = resolve_root(&tree, &MemoryReporter::new()).unwrap();
        assert_eq!(target.disk, "vda");
        assert_eq!(target.partition, "1");
    }

    #[test]
    fn test_resolve_root_nvme_index() {
        let tree = vec![disk("nvme0n1", vec![part("nvme0n1p3", Some("/"))])];
        let target = resolve_root(&tree, &MemoryReporter::new()).unwrap();
        assert_eq!(target.disk, "nvme0n1");
        assert_eq!(target.partition, "3");
    }

    #[test]
    fn test_lvm_root_refused() {
        let lv = part("vg0-root", Some("/"));
        let pv = BlockDevice {
            name: "sda2".to_string(),
            kind: "part".to_string(),
            mountpoint: None,
            children: vec![lv],
        };
        let tree = vec![disk("sda", vec![part("sda1", Some("/boot")), pv])];

        let err = resolve_root(&tree, &MemoryReporter::new()).unwrap_err();
        assert!(matches!(err, TuneError::UnsupportedTopology(_)));
    }

    #[test]
    fn test_raw_disk_root_refused() {
        let mut raw = disk("vdb", Vec::new());
        raw.mountpoint = Some("/".to_string());
        let err = resolve_root(&[raw], &MemoryReporter::new()).unwrap_err();
        assert!(matches!(err, TuneError::UnsupportedTopology(_)));
    }

    #[test]
    fn test_no_root_anywhere() {
        let tree = vec![disk("sda", vec![part("sda1", Some("/data"))])];
        let err = resolve_root(&tree, &MemoryReporter::new()).unwrap_err();
        assert!(matches!(err, TuneError::RootNotFound));
    }

    #[test]
    fn test_digitless_partition_falls_back_with_warning() {
        let tree = vec![disk("xvda", vec![part("xvda", Some("/"))])];
        let reporter = MemoryReporter::new();
        let target = resolve_root(&tree, &reporter).unwrap();
        assert_eq!(target.partition, "1");
        assert_eq!(reporter.warnings().len(), 1);
        assert!(reporter.warnings()[0].contains("assuming partition 1"));
    }

    #[test]
    fn test_partition_device_path_conventions() {
        assert_eq!(partition_device_path("sda", "2"), "/dev/sda2");
        assert_eq!(partition_device_path("vda", "1"), "/dev/vda1");
        assert_eq!(partition_device_path("nvme0n1", "1"), "/dev/nvme0n1p1");
        assert_eq!(partition_device_path("mmcblk0", "2"), "/dev/mmcblk0p2");
        assert_eq!(partition_device_path("loop7", "1"), "/dev/loop7p1");
    }

    #[test]
    fn test_lsblk_report_deserializes() {
        let json = r#"{
            "blockdevices": [
                {"name": "sda", "type": "disk", "mountpoint": null, "children": [
                    {"name": "sda1", "type": "part", "mountpoint": "/"}
                ]}
            ]
        }"#;
        let report: LsblkReport = serde_json::from_str(json).unwrap();
        let target = resolve_root(&report.blockdevices, &MemoryReporter::new()).unwrap();
        assert_eq!(target, RootTarget { disk: "sda".into(), partition: "1".into() });
    }
}
