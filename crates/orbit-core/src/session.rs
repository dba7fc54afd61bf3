use tracing::{debug, info};

use crate::advisor::{Advisor, Suggestion, SuggestionHandle};
use crate::category::CategoryRegistry;
use crate::datastore::KvStore;
use crate::filter::{self, CategoryFilter, StatusFilter};
use crate::stats::{self, Stats};
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft, TaskId};

pub const DEFAULT_AUTOTRIGGER_CHARS: usize = 10;

/// When the create flow asks the advisor on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvisoryPolicy {
    pub enabled: bool,
    /// Trimmed text must be strictly longer than this many characters.
    pub min_chars: usize,
}

impl Default for AdvisoryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: DEFAULT_AUTOTRIGGER_CHARS,
        }
    }
}

impl AdvisoryPolicy {
    pub fn triggers_for(&self, text: &str) -> bool {
        self.enabled && text.trim().chars().count() > self.min_chars
    }
}

/// Everything a presentation layer needs: the store, the fixed
/// categories, the current filter selection and the advisor.
#[derive(Debug)]
pub struct Session<S> {
    store: TaskStore<S>,
    registry: CategoryRegistry,
    advisor: Advisor,
    policy: AdvisoryPolicy,
    status_filter: StatusFilter,
    category_filter: CategoryFilter,
    pending: Vec<SuggestionHandle>,
}

impl<S: KvStore> Session<S> {
    pub fn new(
        store: TaskStore<S>,
        registry: CategoryRegistry,
        advisor: Advisor,
        policy: AdvisoryPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            advisor,
            policy,
            status_filter: StatusFilter::default(),
            category_filter: CategoryFilter::default(),
            pending: Vec::new(),
        }
    }

    pub fn store(&self) -> &TaskStore<S> {
        &self.store
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status_filter
    }

    pub fn category_filter(&self) -> &CategoryFilter {
        &self.category_filter
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        debug!(%status, "status filter changed");
        self.status_filter = status;
    }

    pub fn set_category_filter(&mut self, category: CategoryFilter) {
        debug!(%category, "category filter changed");
        self.category_filter = category;
    }

    /// Creates a task and, when the text is long enough, asks the advisor
    /// about it. Requires a Tokio runtime when the advisory fires.
    #[tracing::instrument(skip(self, draft))]
    pub fn add_task(&mut self, draft: TaskDraft) -> Option<Task> {
        let task = self.store.create(draft)?;
        if self.policy.triggers_for(&task.text) {
            info!(id = %task.id, "auto-requesting suggestion for new task");
            let handle = self.advisor.request(&task.text);
            self.pending.retain(|pending| !pending.is_finished());
            self.pending.push(handle);
        }
        Some(task)
    }

    pub fn toggle_task(&mut self, id: &TaskId) -> bool {
        self.store.toggle(id)
    }

    pub fn delete_task(&mut self, id: &TaskId) -> bool {
        self.store.delete(id)
    }

    pub fn edit_task(&mut self, id: &TaskId, draft: TaskDraft) -> bool {
        self.store.edit(id, draft)
    }

    /// Reorders using positions in the current filtered view. Both
    /// positions are mapped back to full-collection indices first, so the
    /// tasks the user sees are the ones that move.
    #[tracing::instrument(skip(self))]
    pub fn move_in_view(&mut self, from: usize, to: Option<usize>) -> bool {
        let positions = self.view_positions();
        let Some(&source) = positions.get(from) else {
            debug!(visible = positions.len(), "view source out of range");
            return false;
        };
        let destination = match to {
            Some(to) => match positions.get(to) {
                Some(&idx) => Some(idx),
                None => {
                    debug!(visible = positions.len(), "view destination out of range");
                    return false;
                }
            },
            None => None,
        };
        debug!(source, ?destination, "translated view move");
        self.store.reorder(source, destination)
    }

    /// Full-collection index of each visible row.
    pub fn view_positions(&self) -> Vec<usize> {
        filter::view_positions(self.store.tasks(), self.status_filter, &self.category_filter)
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        filter::filter(self.store.tasks(), self.status_filter, &self.category_filter)
    }

    pub fn stats(&self) -> Stats {
        stats::stats(self.store.tasks(), &self.registry)
    }

    pub fn suggestion(&self) -> Suggestion {
        self.advisor.current()
    }

    /// Asks the advisor about free text. Blank text is ignored and leaves the
    /// current suggestion alone.
    pub fn ask(&self, text: &str) -> Option<SuggestionHandle> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank advisory request");
            return None;
        }
        Some(self.advisor.request(text))
    }

    /// Hands over the auto-triggered requests that have not been collected
    /// yet. Requests that finished before a newer one was issued are not
    /// kept; their result is still visible through [`Session::suggestion`].
    pub fn take_pending_suggestions(&mut self) -> Vec<SuggestionHandle> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::advisor::CannedSuggestions;
    use crate::datastore::MemoryKvStore;
    use crate::persistence::{DEFAULT_STORAGE_KEY, Persistence};
    use crate::task::Priority;

    fn session() -> (Session<MemoryKvStore>, MemoryKvStore) {
        let backend = MemoryKvStore::new();
        let store = TaskStore::open(Persistence::new(backend.clone()));
        let session = Session::new(
            store,
            CategoryRegistry::default(),
            Advisor::new(CannedSuggestions::default(), Duration::from_millis(500)),
            AdvisoryPolicy::default(),
        );
        (session, backend)
    }

    fn visible_texts(session: &Session<MemoryKvStore>) -> Vec<String> {
        session
            .visible_tasks()
            .iter()
            .map(|task| task.text.clone())
            .collect()
    }

    fn all_texts(session: &Session<MemoryKvStore>) -> Vec<String> {
        session
            .store()
            .tasks()
            .iter()
            .map(|task| task.text.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn buy_milk_scenario() {
        let (mut session, _) = session();
        session
            .add_task(TaskDraft::new("Buy milk", "personal").with_priority(Priority::Medium))
            .expect("created");

        let stats = session.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 0);
        for entry in &stats.by_category {
            let expected = usize::from(entry.id == "personal");
            assert_eq!(entry.count, expected, "category {}", entry.id);
        }
        assert_eq!(session.advisor().requests_issued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn long_text_triggers_exactly_one_request() {
        let (mut session, _) = session();
        session
            .add_task(TaskDraft::new("a".repeat(11), "work").with_priority(Priority::High))
            .expect("created");
        assert_eq!(session.advisor().requests_issued(), 1);

        session
            .add_task(TaskDraft::new("short", "work"))
            .expect("created");
        session.add_task(TaskDraft::new("   ", "work"));
        session
            .add_task(TaskDraft::new("  tenletters  ", "work"))
            .expect("created");
        assert_eq!(session.advisor().requests_issued(), 1);

        let pending = session.take_pending_suggestions();
        assert_eq!(pending.len(), 1);
        for handle in pending {
            let suggestion = handle.wait().await;
            assert!(suggestion.text().is_some());
        }
        assert!(session.suggestion().text().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_requests_are_not_retained() {
        let (mut session, _) = session();
        for round in 0..5 {
            session
                .add_task(TaskDraft::new(format!("long task number {round}"), "work"))
                .expect("created");
            tokio::time::sleep(Duration::from_millis(600)).await;
            tokio::task::yield_now().await;
        }

        assert_eq!(session.advisor().requests_issued(), 5);
        assert_eq!(session.pending.len(), 1);
        assert!(session.suggestion().text().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_ask_leaves_slot_alone() {
        let (session, _) = session();
        assert!(session.ask("   ").is_none());
        assert_eq!(session.advisor().requests_issued(), 0);
        assert!(session.suggestion().is_empty());

        let asked = session.ask(" plan ").expect("request").wait().await;
        assert_eq!(session.suggestion(), asked);
    }

    #[test]
    fn add_outside_runtime_does_not_panic() {
        let (mut session, _) = session();
        session
            .add_task(TaskDraft::new("a task long enough to trigger", "work"))
            .expect("created");

        assert_eq!(session.advisor().requests_issued(), 1);
        assert_eq!(session.suggestion(), Suggestion::Unavailable);
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn disabled_policy_never_triggers() {
        let policy = AdvisoryPolicy {
            enabled: false,
            ..AdvisoryPolicy::default()
        };
        assert!(!policy.triggers_for("a much longer piece of text"));
        assert!(AdvisoryPolicy::default().triggers_for("eleven char"));
        assert!(!AdvisoryPolicy::default().triggers_for(" tenletters "));
    }

    #[test]
    fn filters_shape_the_visible_view() {
        let (mut session, _) = session();
        for (text, category) in [("a", "work"), ("b", "personal"), ("c", "work")] {
            session.add_task(TaskDraft::new(text, category));
        }
        let b = session.store().tasks()[1].id.clone();
        session.toggle_task(&b);

        session.set_category_filter(CategoryFilter::parse("work"));
        assert_eq!(visible_texts(&session), vec!["a", "c"]);

        session.set_category_filter(CategoryFilter::All);
        session.set_status_filter(StatusFilter::Completed);
        assert_eq!(visible_texts(&session), vec!["b"]);

        session.set_status_filter(StatusFilter::All);
        assert_eq!(visible_texts(&session), all_texts(&session));
    }

    #[test]
    fn move_in_filtered_view_moves_visible_tasks() {
        let (mut session, _) = session();
        for (text, category) in [
            ("A", "work"),
            ("x", "personal"),
            ("B", "work"),
            ("y", "personal"),
            ("C", "work"),
        ] {
            session.add_task(TaskDraft::new(text, category));
        }
        session.set_category_filter(CategoryFilter::parse("work"));

        assert!(session.move_in_view(0, Some(1)));
        assert_eq!(visible_texts(&session), vec!["B", "A", "C"]);
        assert_eq!(all_texts(&session), vec!["x", "B", "A", "y", "C"]);

        assert!(session.move_in_view(2, Some(0)));
        assert_eq!(visible_texts(&session), vec!["C", "B", "A"]);
        assert_eq!(all_texts(&session), vec!["x", "C", "B", "A", "y"]);
    }

    #[test]
    fn move_in_view_rejects_out_of_range_and_missing_targets() {
        let (mut session, backend) = session();
        for text in ["A", "B"] {
            session.add_task(TaskDraft::new(text, "work"));
        }
        let snapshot = backend.get(DEFAULT_STORAGE_KEY);
        session.set_status_filter(StatusFilter::Active);

        assert!(!session.move_in_view(0, Some(2)));
        assert!(!session.move_in_view(5, Some(0)));
        assert!(!session.move_in_view(0, None));
        assert!(!session.move_in_view(1, Some(1)));
        assert_eq!(backend.get(DEFAULT_STORAGE_KEY), snapshot);
    }

    #[test]
    fn unknown_edit_leaves_snapshot_untouched() {
        let (mut session, backend) = session();
        session.add_task(TaskDraft::new("A", "work"));
        let snapshot = backend.get(DEFAULT_STORAGE_KEY);

        assert!(!session.edit_task(&TaskId::from("nope"), TaskDraft::new("B", "work")));
        assert_eq!(backend.get(DEFAULT_STORAGE_KEY), snapshot);
    }
}
