use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::debug;

use chronicle_core::model::Mutation;

use crate::progress::store::ProgressStore;

/// A [`ProgressStore`] shared with two background tasks: a debounced autosave
/// and a periodic play-time tick.
///
/// Every change schedules one save after the configured quiet period; bursts
/// of changes coalesce into a single write. Both tasks stop on
/// [`ProgressService::shutdown`] or drop. Must be created inside a Tokio runtime.
pub struct ProgressService {
    store: Arc<Mutex<ProgressStore>>,
    changes: mpsc::UnboundedSender<()>,
    autosave: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl ProgressService {
    #[must_use]
    pub fn spawn(store: ProgressStore) -> Self {
        let debounce = store.config().autosave_debounce();
        let tick = store.config().session_tick();
        let store = Arc::new(Mutex::new(store));
        let (changes, rx) = mpsc::unbounded_channel();

        let autosave = tokio::spawn(autosave_loop(Arc::clone(&store), rx, debounce));
        let ticker = tokio::spawn(tick_loop(Arc::clone(&store), changes.clone(), tick));

        Self {
            store,
            changes,
            autosave,
            ticker,
        }
    }

    /// Exclusive access to the store. Call [`ProgressService::notify_changed`]
    /// after mutating through the guard.
    pub async fn lock(&self) -> MutexGuard<'_, ProgressStore> {
        self.store.lock().await
    }

    /// Apply a mutation and schedule an autosave when it changed the record.
    pub async fn apply(&self, mutation: Mutation) -> bool {
        let changed = self.store.lock().await.apply(mutation);
        if changed {
            self.notify_changed();
        }
        changed
    }

    /// Restart the debounce window.
    pub fn notify_changed(&self) {
        // A closed channel means the worker is gone; the final save still runs.
        let _ = self.changes.send(());
    }

    /// Stop the background tasks and write a final save, subject to the same
    /// persona gate as autosaves.
    ///
    /// Returns the save result.
    pub async fn shutdown(self) -> bool {
        self.autosave.abort();
        self.ticker.abort();
        let mut store = self.store.lock().await;
        store.accrue_session_time();
        store.final_save().await
    }
}

impl Drop for ProgressService {
    fn drop(&mut self) {
        self.autosave.abort();
        self.ticker.abort();
    }
}

async fn autosave_loop(
    store: Arc<Mutex<ProgressStore>>,
    mut changes: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
) {
    while changes.recv().await.is_some() {
        // Keep extending the window while changes keep arriving.
        loop {
            tokio::select! {
                next = changes.recv() => {
                    if next.is_none() {
                        break;
                    }
                }
                () = sleep(debounce) => break,
            }
        }
        let saved = store.lock().await.autosave().await;
        debug!(saved, "autosave window elapsed");
    }
}

async fn tick_loop(
    store: Arc<Mutex<ProgressStore>>,
    changes: mpsc::UnboundedSender<()>,
    every: Duration,
) {
    let mut ticks = interval(every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticks.tick().await;
    loop {
        ticks.tick().await;
        let accrued = store.lock().await.tick();
        if accrued && changes.send(()).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::catalog;
    use chronicle_core::config::PersistenceConfig;
    use chronicle_core::model::{LessonId, PageId, PersonaId};
    use chronicle_core::time::{Clock, fixed_clock};
    use storage::repository::{InMemoryRepository, SaveSlotRepository};

    fn spawn(repo: Arc<InMemoryRepository>, clock: Clock) -> ProgressService {
        spawn_with(repo, clock, PersistenceConfig::default())
    }

    fn spawn_with(
        repo: Arc<InMemoryRepository>,
        clock: Clock,
        config: PersistenceConfig,
    ) -> ProgressService {
        let store = ProgressStore::new(repo, Arc::new(catalog()), config).with_clock(clock);
        ProgressService::spawn(store)
    }

    async fn saved_play_time(repo: &InMemoryRepository) -> serde_json::Value {
        let payload = saved_payload(repo).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        value["totalPlayTime"].clone()
    }

    async fn saved_payload(repo: &InMemoryRepository) -> Option<String> {
        repo.read_slot("cat-chronicles-save")
            .await
            .unwrap()
            .map(|slot| slot.payload)
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_of_changes_coalesce_into_one_save() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = spawn(repo.clone(), fixed_clock());

        service.apply(Mutation::SelectPersona(PersonaId::new("A"))).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        service
            .apply(Mutation::CompleteLesson(LessonId::new("hieroglyphics")))
            .await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(saved_payload(&repo).await.is_none());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let payload = saved_payload(&repo).await.unwrap();
        assert!(payload.contains("hieroglyphics"));
        assert!(!service.lock().await.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_skips_until_a_persona_is_chosen() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = spawn(repo.clone(), fixed_clock());

        service
            .apply(Mutation::CollectPage(PageId::new("page-hieroglyphics")))
            .await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(repo.is_empty().unwrap());
        assert!(service.lock().await.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_mutations_schedule_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = spawn(repo.clone(), fixed_clock());
        service.apply(Mutation::SelectPersona(PersonaId::new("A"))).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        repo.remove_slot("cat-chronicles-save").await.unwrap();

        assert!(!service.apply(Mutation::SelectPersona(PersonaId::new("B"))).await);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(repo.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_persist_play_time_without_other_changes() {
        let repo = Arc::new(InMemoryRepository::new());
        let config = PersistenceConfig {
            session_tick_secs: 5,
            ..PersistenceConfig::default()
        };
        let service = spawn_with(repo.clone(), fixed_clock(), config);
        service.apply(Mutation::SelectPersona(PersonaId::new("A"))).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(saved_play_time(&repo).await, 0);

        service.lock().await.clock_mut().advance(chrono::Duration::seconds(300));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(saved_play_time(&repo).await, 300_000);
        assert!(!service.lock().await.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_before_a_persona_stay_in_memory() {
        let repo = Arc::new(InMemoryRepository::new());
        let config = PersistenceConfig {
            session_tick_secs: 5,
            ..PersistenceConfig::default()
        };
        let service = spawn_with(repo.clone(), fixed_clock(), config);
        service.lock().await.clock_mut().advance(chrono::Duration::seconds(30));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(repo.is_empty().unwrap());
        assert_eq!(service.lock().await.record().total_play_time_ms(), 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_writes_a_final_save() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = spawn(repo.clone(), fixed_clock());
        service.apply(Mutation::SelectPersona(PersonaId::new("A"))).await;
        service.lock().await.clock_mut().advance(chrono::Duration::seconds(42));

        assert!(service.shutdown().await);
        assert_eq!(saved_play_time(&repo).await, 42_000);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_without_persona_saves_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = spawn(repo.clone(), fixed_clock());
        service.lock().await.clock_mut().advance(chrono::Duration::seconds(42));

        assert!(!service.shutdown().await);
        assert!(repo.is_empty().unwrap());
    }
}
