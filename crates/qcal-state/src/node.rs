//! Calibration node records and their on-disk store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! └── 2026-10-18/
//!     ├── #41_ramsey_093012/
//!     │   ├── node.json
//!     │   ├── ds.json
//!     │   └── figure.svg
//!     └── #42_ramsey_101500/
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::machine::Machine;

/// File holding the node record inside its folder.
pub const NODE_FILE: &str = "node.json";

/// Per-qubit outcome of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Calibrated and written back to the state.
    Successful,
    /// Fit or data quality failed; state left untouched.
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Successful => write!(f, "successful"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// One saved run of a calibration node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Sequential id, unique within a store.
    pub id: u64,
    /// Node name.
    pub name: String,
    /// Run time.
    pub created_at: DateTime<Utc>,
    /// Parameters the node ran with.
    pub parameters: serde_json::Value,
    /// Results (fit results, initial parameters, ...).
    #[serde(default)]
    pub results: serde_json::Value,
    /// Outcome per qubit.
    #[serde(default)]
    pub outcomes: BTreeMap<String, Outcome>,
    /// Artifact files saved next to the record, by result key.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    /// Machine state after the node ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
}

impl NodeRecord {
    /// Create a record stamped with the current time.
    pub fn new(id: u64, name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
            parameters,
            results: serde_json::Value::Null,
            outcomes: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            machine: None,
        }
    }

    /// Folder name: `#<id>_<name>_<HHMMSS>`.
    pub fn folder_name(&self) -> String {
        format!(
            "#{}_{}_{}",
            self.id,
            self.name,
            self.created_at.format("%H%M%S")
        )
    }

    /// Number of successful qubits.
    pub fn successes(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| **o == Outcome::Successful)
            .count()
    }
}

/// A file written next to `node.json`.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Key under which the record lists the file (e.g. `figure`).
    pub key: String,
    /// File name inside the node folder.
    pub file_name: String,
    /// Contents.
    pub contents: Vec<u8>,
}

impl Artifact {
    /// Create an artifact.
    pub fn new(key: impl Into<String>, file_name: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            file_name: file_name.into(),
            contents,
        }
    }
}

/// Folder-per-node store.
#[derive(Debug, Clone)]
pub struct NodeStore {
    root: PathBuf,
}

impl NodeStore {
    /// Open a store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One more than the highest id in the store, starting at 1.
    pub async fn next_node_id(&self) -> StateResult<u64> {
        let max = self
            .scan()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Write `node` and its artifacts; returns the node folder.
    ///
    /// The record's `artifacts` map is filled from `artifacts`.
    pub async fn save(&self, node: &mut NodeRecord, artifacts: &[Artifact]) -> StateResult<PathBuf> {
        let dir = self
            .root
            .join(node.created_at.format("%Y-%m-%d").to_string())
            .join(node.folder_name());
        fs::create_dir_all(&dir).await?;

        for artifact in artifacts {
            fs::write(dir.join(&artifact.file_name), &artifact.contents).await?;
            node.artifacts
                .insert(artifact.key.clone(), artifact.file_name.clone());
        }

        let json = serde_json::to_string_pretty(node)?;
        fs::write(dir.join(NODE_FILE), json).await?;
        debug!("saved node #{} to {}", node.id, dir.display());
        Ok(dir)
    }

    /// Load the record of node `id` and its folder.
    pub async fn load(&self, id: u64) -> StateResult<(NodeRecord, PathBuf)> {
        let dir = self
            .scan()
            .await?
            .into_iter()
            .find(|(found, _)| *found == id)
            .map(|(_, dir)| dir)
            .ok_or(StateError::NodeNotFound(id))?;
        let content = fs::read_to_string(dir.join(NODE_FILE)).await?;
        let node: NodeRecord = serde_json::from_str(&content)?;
        Ok((node, dir))
    }

    /// Read an artifact of node `id` by its result key.
    pub async fn read_artifact(&self, id: u64, key: &str) -> StateResult<Vec<u8>> {
        let (node, dir) = self.load(id).await?;
        let file = node
            .artifacts
            .get(key)
            .ok_or_else(|| StateError::ArtifactNotFound {
                id,
                name: key.to_string(),
            })?;
        Ok(fs::read(dir.join(file)).await?)
    }

    /// Every stored record, by ascending id. Unreadable records are skipped.
    pub async fn list(&self) -> StateResult<Vec<NodeRecord>> {
        let mut nodes = vec![];
        for (_, dir) in self.scan().await? {
            let path = dir.join(NODE_FILE);
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<NodeRecord>(&content) {
                    Ok(node) => nodes.push(node),
                    Err(e) => warn!("Failed to parse node file {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to read node file {:?}: {}", path, e),
            }
        }
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    /// `(id, folder)` of every node folder under the root.
    async fn scan(&self) -> StateResult<Vec<(u64, PathBuf)>> {
        let mut found = vec![];
        let mut days = match fs::read_dir(&self.root).await {
            Ok(days) => days,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(day) = days.next_entry().await? {
            if !day.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(day.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if let Some(id) = name.to_str().and_then(parse_node_id) {
                    found.push((id, entry.path()));
                }
            }
        }
        Ok(found)
    }
}

/// Id from a folder name like `#42_ramsey_101500`.
fn parse_node_id(folder: &str) -> Option<u64> {
    let rest = folder.strip_prefix('#')?;
    let (id, _) = rest.split_once('_')?;
    id.parse().ok()
}
