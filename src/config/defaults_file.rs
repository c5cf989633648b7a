//! Lenient `KEY=value` parser for boot-loader defaults files.
//!
//! Comments, blank lines and anything that is not a `KEY=value` assignment
//! are retained verbatim; only recognized assignments populate the map. A
//! rewrite touches exactly the one targeted line.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{Result, TuneError};

/// A parsed defaults file: the value map plus every raw line in order.
#[derive(Debug, Clone)]
pub struct DefaultsFile {
    pub path: PathBuf,
    values: IndexMap<String, String>,
    lines: Vec<String>,
}

impl DefaultsFile {
    pub fn parse(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TuneError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|err| TuneError::malformed(path, err))?;
        Ok(Self::from_str_at(path, &content))
    }

    fn from_str_at(path: &Path, content: &str) -> Self {
        let mut values = IndexMap::new();
        let mut lines = Vec::new();

        for line in content.lines() {
            lines.push(line.to_string());

            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = split_assignment(trimmed) {
                values.insert(key.to_string(), value.trim_matches('"').to_string());
            }
        }

        Self {
            path: path.to_path_buf(),
            values,
            lines,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Re-render the file with `key` set to `value` (double-quoted). Every
    /// other line is reproduced byte-identical. The key is expected to
    /// pre-exist; an absent key leaves the content unchanged.
    pub fn render_with(&self, key: &str, value: &str) -> String {
        let prefix = format!("{}=", key);
        let mut out = Vec::with_capacity(self.lines.len());

        for line in &self.lines {
            if line.trim().starts_with(&prefix) {
                out.push(format!("{}=\"{}\"", key, value));
            } else {
                out.push(line.clone());
            }
        }

        let mut content = out.join("\n");
        content.push('\n');
        content
    }
}

/// Split `KEY=value` where KEY is uppercase-with-underscores; anything else
/// is not an assignment this parser understands.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let idx = line.find('=')?;
    let (key, rest) = line.split_at(idx);
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        return None;
    }
    Some((key, &rest[1..]))
}
