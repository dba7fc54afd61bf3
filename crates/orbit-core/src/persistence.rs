use std::collections::HashSet;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  warn
};

use crate::datastore::KvStore;
use crate::task::Task;

pub const DEFAULT_STORAGE_KEY: &str =
  "cosmicTodos";

/// Snapshot adapter between the task
/// collection and a [`KvStore`].
#[derive(Debug, Clone)]
pub struct Persistence<S> {
  backend: S,
  key:     String
}

impl<S: KvStore> Persistence<S> {
  pub fn new(backend: S) -> Self {
    Self::with_key(
      backend,
      DEFAULT_STORAGE_KEY
    )
  }

  pub fn with_key(
    backend: S,
    key: &str
  ) -> Self {
    Self {
      backend,
      key: key.to_string()
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn backend(&self) -> &S {
    &self.backend
  }

  /// Reads the stored snapshot. Absent,
  /// unreadable or malformed snapshots
  /// all yield an empty collection.
  #[tracing::instrument(skip(self), fields(key = %self.key))]
  pub fn load(&self) -> Vec<Task> {
    let bytes =
      match self.backend.load(&self.key)
      {
        | Ok(Some(bytes)) => bytes,
        | Ok(None) => {
          debug!(
            "no snapshot stored; \
             starting empty"
          );
          return Vec::new();
        }
        | Err(err) => {
          warn!(error = %format!("{err:#}"), "failed reading snapshot; starting empty");
          return Vec::new();
        }
      };

    match decode_snapshot(&bytes) {
      | Ok(tasks) => {
        debug!(
          count = tasks.len(),
          "loaded snapshot"
        );
        tasks
      }
      | Err(err) => {
        warn!(error = %format!("{err:#}"), "discarding malformed snapshot");
        Vec::new()
      }
    }
  }

  #[tracing::instrument(skip(self, tasks), fields(key = %self.key, count = tasks.len()))]
  pub fn save(
    &self,
    tasks: &[Task]
  ) -> anyhow::Result<()> {
    let bytes = encode_snapshot(tasks)?;
    self
      .backend
      .save(&self.key, &bytes)
      .with_context(|| {
        format!(
          "failed to save snapshot \
           `{}`",
          self.key
        )
      })
  }
}

pub fn encode_snapshot(
  tasks: &[Task]
) -> anyhow::Result<Vec<u8>> {
  serde_json::to_vec(tasks).context(
    "failed to serialize tasks"
  )
}

pub fn decode_snapshot(
  bytes: &[u8]
) -> anyhow::Result<Vec<Task>> {
  let tasks: Vec<Task> =
    serde_json::from_slice(bytes)
      .context(
        "snapshot is not a task array"
      )?;

  let mut seen = HashSet::new();
  for task in &tasks {
    if !seen.insert(&task.id) {
      return Err(anyhow!(
        "snapshot contains duplicate \
         task id {}",
        task.id
      ));
    }
  }

  Ok(tasks)
}
