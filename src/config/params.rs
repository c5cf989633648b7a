//! Boot/mount parameter sets and the last-writer-wins merge.

use indexmap::IndexMap;

/// A single parameter token: a bare flag (`quiet`) or `key=value`
/// (`elevator=noop`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootParam {
    pub key: String,
    pub raw: String,
}

impl BootParam {
    pub fn new(raw: &str) -> Self {
        let key = match raw.find('=') {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        Self {
            key: key.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Split a command line into parameters on runs of whitespace.
pub fn parse_cmdline(cmdline: &str) -> Vec<BootParam> {
    cmdline.split_whitespace().map(BootParam::new).collect()
}

/// Join parameters back into a command line.
pub fn render_cmdline(params: &[BootParam]) -> String {
    params
        .iter()
        .map(|p| p.raw.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge `desired` over `existing` with last-writer-wins-by-key semantics.
///
/// Keys keep their first-seen position; keys new to `existing` append at the
/// end in `desired` order. The result never holds two parameters with the
/// same key.
pub fn merge_params(existing: &[BootParam], desired: &[BootParam]) -> Vec<BootParam> {
    let mut merged: IndexMap<String, BootParam> = IndexMap::new();

    for param in existing.iter().chain(desired) {
        merged.insert(param.key.clone(), param.clone());
    }

    merged.into_values().collect()
}
