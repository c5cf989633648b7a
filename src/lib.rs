//! Performance tuning, audit and rollback for virtualized Linux guests.
//!
//! The crate edits operating-system configuration surfaces (boot
//! parameters, kernel tunables, mount table, I/O scheduler, network device
//! settings), records a reversible before-image of every file it touches,
//! and restores those before-images on demand.
//!
//! # Architecture
//!
//! ```text
//! vm-tuner
//!     │
//!     ├── config/   parsers + parameter merge (line-preserving)
//!     ├── disk/     block-device topology resolver (fail-closed)
//!     ├── backup/   session store: copies + manifest.json, restore
//!     ├── tuners/   one mutator per config surface
//!     ├── distro    package-manager / boot-loader boundary
//!     └── report    injected operator-facing reporting
//! ```
//!
//! Every mutator follows the same protocol: parse current state, merge the
//! desired settings with last-writer-wins-by-key semantics, stop early when
//! nothing would change, back up before the first write, and downgrade a
//! failed post-write reload to a warning. Mutators run strictly
//! sequentially; one surface failing never blocks the others.

pub mod backup;
pub mod config;
pub mod disk;
pub mod distro;
pub mod error;
pub mod exec;
pub mod host;
pub mod profile;
pub mod report;
pub mod tuners;

pub use backup::{BackupSession, Manifest, ManifestEntry, Rollback};
pub use distro::{Distro, DistroKind};
pub use error::TuneError;
pub use profile::TuningProfile;
pub use report::{ConsoleReporter, Reporter};
pub use tuners::{ApplyContext, Outcome, Tuner};
