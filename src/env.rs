//! File and directory names used by a build.
//!
//! Centralizes the paths kiln reads and writes so the front end, the build session and the
//! state store agree on them.

use std::path::{Path, PathBuf};

/// Project manifest file name
pub const MANIFEST_FILE_NAME: &str = "kiln.toml";

/// Build directory used when none is given, relative to the project directory
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Default log filter directive
pub const DEFAULT_LOG_FILTER: &str = "kiln=info";

/// Build state file names
pub mod state {
    /// State directory below the build directory
    pub const STATE_DIR_NAME: &str = ".kiln/buildenv";

    pub const STATE_FILE_PREFIX: &str = "state-";

    pub const STATE_FILE_SUFFIX: &str = ".json";

    /// Suffix of the file a state is written to before it is moved into place
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// `state-{name}.json`
    pub fn state_file_name(name: &str) -> String {
        format!("{STATE_FILE_PREFIX}{name}{STATE_FILE_SUFFIX}")
    }
}

/// Build the manifest path for a project directory
pub fn manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join(MANIFEST_FILE_NAME)
}

/// Build the default state directory path from a build directory
pub fn state_dir_path(build_dir: &Path) -> PathBuf {
    build_dir.join(state::STATE_DIR_NAME)
}

/// A short random identifier for naming state files
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..7].to_string()
}
