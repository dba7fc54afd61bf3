use chrono::Utc;
use tracing::{debug, error, info};

use crate::datastore::KvStore;
use crate::persistence::Persistence;
use crate::task::{Task, TaskDraft, TaskId};

/// Sole owner of the ordered task collection.
///
/// Mutators take `&mut self` and are the only way tasks change. Each
/// successful mutation writes a full snapshot through [`Persistence`];
/// rejected mutations leave both memory and storage untouched.
#[derive(Debug)]
pub struct TaskStore<S> {
    tasks: Vec<Task>,
    persistence: Persistence<S>,
}

impl<S: KvStore> TaskStore<S> {
    #[tracing::instrument(skip(persistence))]
    pub fn open(persistence: Persistence<S>) -> Self {
        let tasks = persistence.load();
        info!(count = tasks.len(), key = persistence.key(), "opened task store");
        Self { tasks, persistence }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    #[tracing::instrument(skip(self, draft))]
    pub fn create(&mut self, draft: TaskDraft) -> Option<Task> {
        let Some(draft) = draft.normalized() else {
            debug!("ignoring create with blank text");
            return None;
        };

        let mut task = Task::from_draft(draft, Utc::now());
        while self.get(&task.id).is_some() {
            task.id = TaskId::generate();
        }

        self.tasks.push(task.clone());
        debug!(id = %task.id, count = self.tasks.len(), "task created");
        self.sync();
        Some(task)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) else {
            debug!("toggle target not found");
            return false;
        };

        task.completed = !task.completed;
        debug!(completed = task.completed, "task toggled");
        self.sync();
        true
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: &TaskId) -> bool {
        let Some(idx) = self.position(id) else {
            debug!("delete target not found");
            return false;
        };

        self.tasks.remove(idx);
        debug!(index = idx, count = self.tasks.len(), "task deleted");
        self.sync();
        true
    }

    /// Replaces the user-editable fields in place. Text is validated the
    /// same way as on create: blank text is rejected.
    #[tracing::instrument(skip(self, draft), fields(id = %id))]
    pub fn edit(&mut self, id: &TaskId, draft: TaskDraft) -> bool {
        let Some(draft) = draft.normalized() else {
            debug!("ignoring edit with blank text");
            return false;
        };
        let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) else {
            debug!("edit target not found");
            return false;
        };

        task.text = draft.text;
        task.category = draft.category;
        task.priority = draft.priority;
        task.due_date = draft.due_date;
        debug!("task edited");
        self.sync();
        true
    }

    /// Moves the task at `source` to `destination`, both indices into the
    /// full collection. `None` means the move had no drop target.
    #[tracing::instrument(skip(self))]
    pub fn reorder(&mut self, source: usize, destination: Option<usize>) -> bool {
        let Some(destination) = destination else {
            debug!("reorder without destination");
            return false;
        };
        let len = self.tasks.len();
        if source == destination || source >= len || destination >= len {
            debug!(len, "reorder rejected");
            return false;
        }

        let moved = self.tasks.remove(source);
        self.tasks.insert(destination, moved);
        debug!("task moved");
        self.sync();
        true
    }

    fn sync(&self) {
        if let Err(err) = self.persistence.save(&self.tasks) {
            error!(error = %format!("{err:#}"), "failed to persist tasks");
        }
    }
}
