use crate::address::Address;
use crate::env;
use crate::graph::{Edge, TaskGraph};
use crate::task::TaskStatus;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs as async_fs;
use tracing::{debug, info, warn};

/// Version of the on-disk schema written by [`save`].
pub const STATE_VERSION: u32 = 1;

static STATE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^state-.*\.json$").expect("state file pattern is valid"));

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to access build state at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse build state {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("build state {} has version {version}, expected {}", .path.display(), STATE_VERSION)]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("failed to serialize build state: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
    move |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredEdge {
    pub from: Address,
    pub to: Address,
    #[serde(flatten)]
    pub edge: Edge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResult {
    pub address: Address,
    pub status: TaskStatus,
}

/// Structure and results of a task graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGraph {
    pub nodes: Vec<Address>,
    pub edges: Vec<StoredEdge>,
    pub results: Vec<StoredResult>,
    /// Tasks whose last status was `STARTED`
    #[serde(default)]
    pub background: Vec<Address>,
}

/// How the structure of a live graph differs from the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureDrift {
    /// Tasks in the live graph that the state does not know
    pub added: Vec<Address>,
    /// Tasks in the state that the live graph no longer has
    pub removed: Vec<Address>,
    /// Edges present on one side only
    pub changed_edges: usize,
}

impl StructureDrift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed_edges == 0
    }
}

/// The record saved at the end of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    pub version: u32,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub graph: StoredGraph,
}

impl BuildState {
    /// Capture the full graph `graph` was derived from together with the latest results.
    /// Pending and interrupted results are left out so those tasks run again on resume.
    pub fn capture(name: &str, graph: &TaskGraph) -> Self {
        let root = graph.root();
        let mut results: Vec<StoredResult> = graph
            .merged_results()
            .into_iter()
            .filter(|(_, status)| !status.is_pending() && !status.is_interrupted())
            .map(|(address, status)| StoredResult { address, status })
            .collect();
        results.sort_by_key(|r| r.address.to_string());

        let mut state = Self {
            version: STATE_VERSION,
            name: name.to_string(),
            saved_at: Utc::now(),
            graph: StoredGraph {
                nodes: root.nodes(),
                edges: root
                    .edges()
                    .into_iter()
                    .map(|(from, to, edge)| StoredEdge { from, to, edge })
                    .collect(),
                results,
                background: Vec::new(),
            },
        };
        state.update_background();
        state
    }

    fn update_background(&mut self) {
        self.graph.background = self
            .graph
            .results
            .iter()
            .filter(|r| r.status.is_started())
            .map(|r| r.address.clone())
            .collect();
    }

    pub fn results(&self) -> impl Iterator<Item = (Address, TaskStatus)> + '_ {
        self.graph
            .results
            .iter()
            .map(|r| (r.address.clone(), r.status.clone()))
    }

    pub fn get_status(&self, address: &Address) -> Option<&TaskStatus> {
        self.graph
            .results
            .iter()
            .find(|r| &r.address == address)
            .map(|r| &r.status)
    }

    /// Layer the results of `other` over these. The structure of `self` is kept.
    pub fn merge(&mut self, other: BuildState) {
        for result in other.graph.results {
            match self.graph.results.iter_mut().find(|r| r.address == result.address) {
                Some(existing) => existing.status = result.status,
                None => self.graph.results.push(result),
            }
        }
        self.saved_at = self.saved_at.max(other.saved_at);
        self.update_background();
    }

    /// Compare the stored structure with the full graph `graph` belongs to.
    pub fn drift(&self, graph: &TaskGraph) -> StructureDrift {
        let root = graph.root();
        let live_nodes = root.nodes();
        let stored: HashSet<&Address> = self.graph.nodes.iter().collect();
        let live: HashSet<&Address> = live_nodes.iter().collect();

        let mut added: Vec<Address> = live_nodes.iter().filter(|a| !stored.contains(a)).cloned().collect();
        let mut removed: Vec<Address> = self
            .graph
            .nodes
            .iter()
            .filter(|a| !live.contains(a))
            .cloned()
            .collect();
        added.sort_by_key(Address::to_string);
        removed.sort_by_key(Address::to_string);

        let live_edges: HashSet<StoredEdge> = root
            .edges()
            .into_iter()
            .map(|(from, to, edge)| StoredEdge { from, to, edge })
            .collect();
        let stored_edges: HashSet<StoredEdge> = self.graph.edges.iter().cloned().collect();
        let changed_edges = live_edges.symmetric_difference(&stored_edges).count();

        StructureDrift {
            added,
            removed,
            changed_edges,
        }
    }

    /// Apply the stored results to `graph`, warning about tasks that no longer exist and about
    /// a graph whose shape changed since the state was saved.
    pub fn apply_to(&self, graph: &TaskGraph) {
        let drift = self.drift(graph);
        if !drift.is_empty() {
            warn!(
                "The task graph changed since the build state was saved: {} task(s) added, {} removed, {} edge(s) changed",
                drift.added.len(),
                drift.removed.len(),
                drift.changed_edges
            );
            debug!("Added tasks: {:?}, removed tasks: {:?}", drift.added, drift.removed);
        }
        let unknown = graph.restore(self.results());
        if !unknown.is_empty() {
            warn!(
                "Ignoring stored results for {} task(s) that no longer exist: {}",
                unknown.len(),
                unknown.iter().map(Address::to_string).collect::<Vec<_>>().join(", ")
            );
        }
    }
}

/// Write the state of `graph` to `<state_dir>/state-<name>.json`, replacing any other state
/// files in the directory. Returns the path written.
pub async fn save(state_dir: &Path, name: &str, graph: &TaskGraph) -> Result<PathBuf, StateError> {
    let state = BuildState::capture(name, graph);
    let json = serde_json::to_string_pretty(&state)?;

    async_fs::create_dir_all(state_dir).await.map_err(io_error(state_dir))?;
    let file_name = env::state::state_file_name(name);
    let state_file = state_dir.join(&file_name);
    let temp_file = state_dir.join(format!("{file_name}{}", env::state::TEMP_FILE_SUFFIX));

    async_fs::write(&temp_file, json).await.map_err(io_error(&temp_file))?;
    async_fs::rename(&temp_file, &state_file)
        .await
        .map_err(io_error(&state_file))?;

    let mut entries = async_fs::read_dir(state_dir).await.map_err(io_error(state_dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(io_error(state_dir))? {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        let stale = entry_name != file_name
            && (STATE_FILE.is_match(&entry_name) || entry_name.ends_with(env::state::TEMP_FILE_SUFFIX));
        if stale {
            debug!("Removing stale build state {entry_name}");
            async_fs::remove_file(entry.path())
                .await
                .map_err(io_error(&entry.path()))?;
        }
    }

    info!("Saved build state to \"{}\"", state_file.display());
    Ok(state_file)
}

async fn read_state(path: &Path) -> Result<BuildState, StateError> {
    let contents = async_fs::read_to_string(path).await.map_err(io_error(path))?;
    let state: BuildState = serde_json::from_str(&contents).map_err(|source| StateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if state.version != STATE_VERSION {
        return Err(StateError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: state.version,
        });
    }
    Ok(state)
}

/// Load and merge every state file found in `state_dirs`, in file name order. The first file
/// supplies the graph structure that [`BuildState::apply_to`] checks the live graph against.
/// Each later one overrides results per task. `None` when no state file exists.
pub async fn load(state_dirs: &[PathBuf]) -> Result<Option<BuildState>, StateError> {
    let mut files = Vec::new();
    for dir in state_dirs {
        if !async_fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
            continue;
        }
        let mut entries = async_fs::read_dir(dir).await.map_err(io_error(dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(dir))? {
            if STATE_FILE.is_match(&entry.file_name().to_string_lossy()) {
                files.push(entry.path());
            }
        }
    }
    if files.is_empty() {
        return Ok(None);
    }
    files.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));

    info!(
        "Resuming from {} build state(s) ({})",
        files.len(),
        files
            .iter()
            .filter_map(|f| f.file_name())
            .map(|n| n.to_string_lossy())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut merged: Option<BuildState> = None;
    for file in &files {
        let state = read_state(file).await?;
        match merged.as_mut() {
            Some(existing) => existing.merge(state),
            None => merged = Some(state),
        }
    }
    Ok(merged)
}
