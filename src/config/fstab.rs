//! Mount-table parsing and rendering.
//!
//! Data lines re-render into fixed-width columns; comment, blank and
//! malformed lines pass through byte-for-byte so the file round-trips.

use std::path::Path;

use crate::error::{Result, TuneError};

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FstabLine {
    Entry(MountEntry),
    /// Comment, blank or malformed line, reproduced verbatim.
    Passthrough(String),
}

/// A parsed mount-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub options: Vec<String>,
    pub dump: String,
    pub pass: String,
}

pub fn parse_fstab(path: &Path) -> Result<Vec<FstabLine>> {
    if !path.exists() {
        return Err(TuneError::NotFound(path.to_path_buf()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|err| TuneError::malformed(path, err))?;
    Ok(parse_fstab_str(&content))
}

pub fn parse_fstab_str(content: &str) -> Vec<FstabLine> {
    content.lines().map(parse_line).collect()
}

fn parse_line(line: &str) -> FstabLine {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return FstabLine::Passthrough(line.to_string());
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() < 4 {
        // malformed data line: demote, never abort the file
        return FstabLine::Passthrough(line.to_string());
    }

    FstabLine::Entry(MountEntry {
        device: fields[0].to_string(),
        mount_point: fields[1].to_string(),
        fs_type: fields[2].to_string(),
        options: fields[3].split(',').map(str::to_string).collect(),
        dump: fields.get(4).unwrap_or(&"0").to_string(),
        pass: fields.get(5).unwrap_or(&"0").to_string(),
    })
}

/// Render the table: entries in fixed-width columns, passthrough lines
/// verbatim, newline-terminated.
pub fn render_fstab(lines: &[FstabLine]) -> String {
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        match line {
            FstabLine::Passthrough(raw) => out.push(raw.clone()),
            FstabLine::Entry(entry) => out.push(format!(
                "{:<45} {:<15} {:<7} {:<30} {} {}",
                entry.device,
                entry.mount_point,
                entry.fs_type,
                entry.options.join(","),
                entry.dump,
                entry.pass
            )),
        }
    }

    let mut content = out.join("\n");
    content.push('\n');
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# /etc/fstab: static file system information.
#
# <file system> <mount point>   <type>  <options>       <dump>  <pass>
UUID=26a9f2e1-88a0-4a1c-a2c6-6d7ae5b5b2b9 /               ext4    errors=remount-ro 0       1
/dev/sr0        /media/cdrom0   udf,iso9660 user,noauto     0       0
UUID=9d3c-2a11  /boot/efi       vfat    umask=0077      0       1

broken line
";

    #[test]
    fn test_round_trip_preserves_passthrough() {
        let lines = parse_fstab_str(SAMPLE);
        let rendered = render_fstab(&lines);

        let passthrough: Vec<&str> = SAMPLE
            .lines()
            .filter(|l| {
                let t = l.trim();
                t.is_empty() || t.starts_with('#') || t.split_whitespace().count() < 4
            })
            .collect();
        assert_eq!(passthrough.len(), 5);
        for line in passthrough {
            assert!(
                rendered.lines().any(|r| r == line),
                "passthrough line altered: {:?}",
                line
            );
        }
    }

    #[test]
    fn test_round_trip_preserves_entry_fields() {
        let lines = parse_fstab_str(SAMPLE);
        let entries_before: Vec<MountEntry> = lines
            .iter()
            .filter_map(|l| match l {
                FstabLine::Entry(e) => Some(e.clone()),
                FstabLine::Passthrough(_) => None,
            })
            .collect();
        assert_eq!(entries_before.len(), 3);

        // reparse the rendered output: same entries, field for field
        let reparsed = parse_fstab_str(&render_fstab(&lines));
        let entries_after: Vec<MountEntry> = reparsed
            .into_iter()
            .filter_map(|l| match l {
                FstabLine::Entry(e) => Some(e),
                FstabLine::Passthrough(_) => None,
            })
            .collect();
        assert_eq!(entries_before, entries_after);
    }

    #[test]
    fn test_short_line_demoted_to_passthrough() {
        let lines = parse_fstab_str("/dev/sda1 / ext4\n");
        assert_eq!(lines.len(), 1);
        assert!(matches!(lines[0], FstabLine::Passthrough(_)));
    }

    #[test]
    fn test_missing_dump_pass_default_to_zero() {
        let lines = parse_fstab_str("proc /proc proc defaults\n");
        match &lines[0] {
            FstabLine::Entry(entry) => {
                assert_eq!(entry.dump, "0");
                assert_eq!(entry.pass, "0");
            }
            FstabLine::Passthrough(_) => panic!("expected entry"),
        }
    }

    #[test]
    fn test_options_split_on_comma() {
        let lines = parse_fstab_str("/dev/sda2 /home ext4 noatime,commit=60 0 2\n");
        match &lines[0] {
            FstabLine::Entry(entry) => {
                assert_eq!(entry.options, vec!["noatime", "commit=60"]);
            }
            FstabLine::Passthrough(_) => panic!("expected entry"),
        }
    }

    #[test]
    fn test_parse_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = parse_fstab(&temp.path().join("fstab")).unwrap_err();
        assert!(matches!(err, TuneError::NotFound(_)));
    }

    #[test]
    fn test_parse_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fstab");
        fs::write(&path, SAMPLE).unwrap();
        let lines = parse_fstab(&path).unwrap();
        assert_eq!(lines.len(), SAMPLE.lines().count());
    }
}
