//! Config-surface parsing and merging.
//!
//! Each parser is line-preserving: anything it does not understand is kept
//! verbatim so a rewrite never destroys operator intent.

pub mod defaults_file;
pub mod fstab;
pub mod params;

pub use defaults_file::DefaultsFile;
pub use fstab::{parse_fstab, render_fstab, FstabLine, MountEntry};
pub use params::{merge_params, parse_cmdline, render_cmdline, BootParam};
