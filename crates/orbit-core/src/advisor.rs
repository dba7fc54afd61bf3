use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use rand::seq::SliceRandom;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

const CATALOG: [&str; 4] = [
    "I suggest breaking this task into smaller steps",
    "This appears to be a high priority task",
    "Would you like to set a reminder for this?",
    "This task seems similar to ones in your 'Work' category",
];

/// Produces the text of one suggestion for a piece of free text.
pub trait SuggestionSource: Send + Sync + 'static {
    fn suggest(&self, input: &str) -> anyhow::Result<String>;
}

/// Fixed catalog, one entry picked uniformly at random per request.
#[derive(Debug, Clone)]
pub struct CannedSuggestions {
    catalog: Vec<String>,
}

impl Default for CannedSuggestions {
    fn default() -> Self {
        Self::new(CATALOG.iter().map(|s| s.to_string()).collect())
    }
}

impl CannedSuggestions {
    pub fn new(catalog: Vec<String>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }
}

impl SuggestionSource for CannedSuggestions {
    fn suggest(&self, _input: &str) -> anyhow::Result<String> {
        let mut rng = rand::thread_rng();
        self.catalog
            .choose(&mut rng)
            .cloned()
            .ok_or_else(|| anyhow!("suggestion catalog is empty"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Suggestion {
    #[default]
    Empty,
    Ready(String),
    Unavailable,
}

impl Suggestion {
    pub fn text(&self) -> Option<&str> {
        match self {
            Suggestion::Ready(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Suggestion::Empty)
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suggestion::Empty => Ok(()),
            Suggestion::Ready(text) => f.write_str(text),
            Suggestion::Unavailable => f.write_str("suggestion unavailable"),
        }
    }
}

/// In-flight advisory request. Without a runtime there is nothing to run
/// it on and the handle is already resolved as unavailable.
#[derive(Debug)]
pub struct SuggestionHandle {
    inner: Option<JoinHandle<Suggestion>>,
}

impl SuggestionHandle {
    pub async fn wait(self) -> Suggestion {
        let Some(inner) = self.inner else {
            return Suggestion::Unavailable;
        };
        match inner.await {
            Ok(suggestion) => suggestion,
            Err(err) => {
                warn!(error = %err, "advisory request did not complete");
                Suggestion::Unavailable
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

/// Issues delayed suggestion requests and keeps the single current
/// suggestion slot.
///
/// Requests run independently and are never cancelled. Whichever request
/// resolves last owns the slot, regardless of submission order.
#[derive(Clone)]
pub struct Advisor {
    source: Arc<dyn SuggestionSource>,
    delay: Duration,
    slot: Arc<watch::Sender<Suggestion>>,
    issued: Arc<AtomicU64>,
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("delay", &self.delay)
            .field("issued", &self.requests_issued())
            .finish_non_exhaustive()
    }
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(CannedSuggestions::default(), DEFAULT_DELAY)
    }
}

impl Advisor {
    pub fn new(source: impl SuggestionSource, delay: Duration) -> Self {
        let (slot, _) = watch::channel(Suggestion::Empty);
        Self {
            source: Arc::new(source),
            delay,
            slot: Arc::new(slot),
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Starts one request on the current Tokio runtime. Outside a runtime
    /// the request resolves to [`Suggestion::Unavailable`] at once.
    #[tracing::instrument(skip(self, input), fields(chars = input.chars().count()))]
    pub fn request(&self, input: &str) -> SuggestionHandle {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let source = Arc::clone(&self.source);
        let slot = Arc::clone(&self.slot);
        let delay = self.delay;
        let input = input.to_string();
        let Ok(runtime) = Handle::try_current() else {
            warn!(seq, "no async runtime; suggestion unavailable");
            self.slot.send_replace(Suggestion::Unavailable);
            return SuggestionHandle { inner: None };
        };
        debug!(seq, delay_ms = delay.as_millis() as u64, "advisory request queued");

        let inner = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let suggestion = match source.suggest(&input) {
                Ok(text) => Suggestion::Ready(text),
                Err(err) => {
                    warn!(seq, error = %format!("{err:#}"), "suggestion source failed");
                    Suggestion::Unavailable
                }
            };
            slot.send_replace(suggestion.clone());
            debug!(seq, "advisory request resolved");
            suggestion
        });

        SuggestionHandle { inner: Some(inner) }
    }

    pub fn current(&self) -> Suggestion {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Suggestion> {
        self.slot.subscribe()
    }

    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}
