//! Search-as-you-type.
//!
//! Every keystroke supersedes the previous one: its quiet-period timer and,
//! if already sent, its request are cancelled through the session's token.
//! A result is delivered only while its epoch is still current, and delivery
//! happens under the session lock so an older result can never land after a
//! newer one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::epoch::{until_cancelled, Epoch, EpochCounter};
use crate::client::gateway::ItemSearch;
use crate::models::item::Item;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Items(Vec<Item>),
    /// Empty query, or the lookup failed.
    Cleared,
}

#[derive(Debug)]
struct Session {
    epochs: EpochCounter,
    current: Mutex<CancellationToken>,
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels whatever is pending and opens a new epoch.
    fn supersede(&self) -> (Epoch, CancellationToken) {
        let mut current = self.lock();
        current.cancel();
        *current = CancellationToken::new();
        (self.epochs.advance(), current.clone())
    }

    /// Runs `deliver` only if `epoch` is still the latest one.
    fn deliver_if_current<F>(&self, epoch: Epoch, deliver: F) -> bool
    where
        F: FnOnce(),
    {
        let current = self.lock();
        if current.is_cancelled() || !self.epochs.is_current(epoch) {
            return false;
        }
        deliver();
        true
    }
}

pub struct SearchDebouncer<S: ?Sized> {
    source: Arc<S>,
    quiet: Duration,
    session: Arc<Session>,
}

impl<S> SearchDebouncer<S>
where
    S: ItemSearch + ?Sized + 'static,
{
    pub fn new(source: Arc<S>) -> Self {
        Self::with_quiet_period(source, DEFAULT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(source: Arc<S>, quiet: Duration) -> Self {
        Self {
            source,
            quiet,
            session: Arc::new(Session {
                epochs: EpochCounter::new(),
                current: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Schedules a lookup for `query` after the quiet period.
    ///
    /// A blank query or city clears results immediately. `on_result` runs at
    /// most once and must not call back into this debouncer.
    pub fn schedule_search<F>(&self, city: &str, query: &str, on_result: F)
    where
        F: FnOnce(SearchResult) + Send + 'static,
    {
        let (epoch, token) = self.session.supersede();

        let city = city.trim().to_string();
        let query = query.trim().to_string();
        if city.is_empty() || query.is_empty() {
            self.session
                .deliver_if_current(epoch, || on_result(SearchResult::Cleared));
            return;
        }

        let source = Arc::clone(&self.source);
        let session = Arc::clone(&self.session);
        let quiet = self.quiet;

        tokio::spawn(async move {
            if until_cancelled(&token, sleep(quiet)).await.is_none() {
                return;
            }

            debug!(city = %city, query = %query, "searching items");
            let Some(outcome) = until_cancelled(&token, source.search_items(&city, &query)).await
            else {
                debug!(query = %query, "search superseded while in flight");
                return;
            };

            let result = match outcome {
                Ok(items) => SearchResult::Items(items),
                Err(err) => {
                    warn!(query = %query, error = %err, "item search failed");
                    SearchResult::Cleared
                }
            };

            if !session.deliver_if_current(epoch, || on_result(result)) {
                debug!(query = %query, "dropping stale search result");
            }
        });
    }

    /// Drops any pending or in-flight lookup without delivering anything.
    pub fn cancel(&self) {
        self.session.supersede();
    }
}

impl<S: ?Sized> Drop for SearchDebouncer<S> {
    fn drop(&mut self) {
        self.session.lock().cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{SearchDebouncer, SearchResult};
    use crate::client::gateway::{FetchError, ItemSearch};
    use crate::models::item::Item;

    #[derive(Default)]
    struct FakeSearch {
        queries: Mutex<Vec<String>>,
        completed: AtomicUsize,
        latency: Mutex<Vec<(String, Duration)>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl ItemSearch for FakeSearch {
        async fn search_items(&self, city: &str, query: &str) -> Result<Vec<Item>, FetchError> {
            self.queries.lock().unwrap().push(query.to_string());
            let latency = self
                .latency
                .lock()
                .unwrap()
                .iter()
                .find(|(q, _)| q == query)
                .map(|(_, d)| *d);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(FetchError::Transport("timeout".to_string()));
            }
            Ok(vec![Item {
                id: Uuid::new_v4(),
                shop_id: Uuid::new_v4(),
                name: query.to_string(),
                city: city.to_string(),
                price: Decimal::new(99, 0),
                image: None,
            }])
        }
    }

    fn collector() -> (
        Arc<Mutex<Vec<SearchResult>>>,
        impl Fn() -> Box<dyn FnOnce(SearchResult) + Send>,
    ) {
        let seen: Arc<Mutex<Vec<SearchResult>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let make = move || {
            let sink = Arc::clone(&sink);
            Box::new(move |result: SearchResult| sink.lock().unwrap().push(result))
                as Box<dyn FnOnce(SearchResult) + Send>
        };
        (seen, make)
    }

    fn names(result: &SearchResult) -> Vec<String> {
        match result {
            SearchResult::Items(items) => items.iter().map(|i| i.name.clone()).collect(),
            SearchResult::Cleared => Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_issues_one_lookup_for_final_query() {
        let source = Arc::new(FakeSearch::default());
        let debouncer = SearchDebouncer::new(source.clone());
        let (seen, make) = collector();

        for query in ["p", "pa", "pan", "pane", "paneer"] {
            debouncer.schedule_search("Pune", query, make());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*source.queries.lock().unwrap(), vec!["paneer".to_string()]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(names(&seen[0]), vec!["paneer".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_older_request_never_overwrites_newer_one() {
        let source = Arc::new(FakeSearch::default());
        source
            .latency
            .lock()
            .unwrap()
            .push(("dal".to_string(), Duration::from_secs(2)));
        let debouncer = SearchDebouncer::new(source.clone());
        let (seen, make) = collector();

        debouncer.schedule_search("Pune", "dal", make());
        tokio::time::sleep(Duration::from_millis(500)).await;
        debouncer.schedule_search("Pune", "dosa", make());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            *source.queries.lock().unwrap(),
            vec!["dal".to_string(), "dosa".to_string()]
        );
        assert_eq!(source.completed.load(Ordering::SeqCst), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(names(&seen[0]), vec!["dosa".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_query_clears_immediately_and_cancels_pending() {
        let source = Arc::new(FakeSearch::default());
        let debouncer = SearchDebouncer::new(source.clone());
        let (seen, make) = collector();

        debouncer.schedule_search("Pune", "misal", make());
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.schedule_search("Pune", "  ", make());

        assert_eq!(*seen.lock().unwrap(), vec![SearchResult::Cleared]);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(source.queries.lock().unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_clears_results() {
        let source = Arc::new(FakeSearch::default());
        *source.fail.lock().unwrap() = true;
        let debouncer = SearchDebouncer::new(source.clone());
        let (seen, make) = collector();

        debouncer.schedule_search("Pune", "poha", make());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*seen.lock().unwrap(), vec![SearchResult::Cleared]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_in_flight_lookup() {
        let source = Arc::new(FakeSearch::default());
        source
            .latency
            .lock()
            .unwrap()
            .push(("thali".to_string(), Duration::from_secs(2)));
        let debouncer = SearchDebouncer::new(source.clone());
        let (seen, make) = collector();

        debouncer.schedule_search("Pune", "thali", make());
        tokio::time::sleep(Duration::from_millis(600)).await;
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(source.queries.lock().unwrap().len(), 1);
        assert_eq!(source.completed.load(Ordering::SeqCst), 0);
        assert!(seen.lock().unwrap().is_empty());
    }
}
