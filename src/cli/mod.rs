//! Command line front end: argument parsing and `kiln.toml` manifests.

pub mod args;
pub mod manifest;

pub use args::{Args, BuildOptions, Commands, GraphOptions, parse_selectors};
pub use manifest::{Manifest, ManifestError, ManifestTaskKind, TaskManifest, load_context};
