//! Owns one change-subscription loop per registered binding.
//!
//! Each loop connects with the binding's own credentials, subscribes to the whole source
//! database and hands events, in delivery order, to the [`ChangePropagator`]. Loops are
//! independent tokio tasks. A loop that fails to connect or loses its stream is not
//! restarted; `register` or `reload` starts a fresh one.

use super::propagate::ChangePropagator;
use crate::error::SyncError;
use crate::secret::SecretCodec;
use crate::source::DocumentSource;
use crate::store::{SourceBinding, Store};
use common::model::binding::WatchStatus;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

struct WatchHandle {
    task: JoinHandle<()>,
    status: watch::Receiver<WatchStatus>,
}

struct RegistryInner {
    store: Store,
    source: Arc<dyn DocumentSource>,
    propagator: ChangePropagator,
    codec: SecretCodec,
    watches: Mutex<HashMap<String, WatchHandle>>,
}

/// Clonable handle; every clone drives the same set of loops.
#[derive(Clone)]
pub struct WatcherRegistry {
    inner: Arc<RegistryInner>,
}

impl WatcherRegistry {
    pub fn new(
        store: Store,
        source: Arc<dyn DocumentSource>,
        propagator: ChangePropagator,
        codec: SecretCodec,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                source,
                propagator,
                codec,
                watches: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts watching `binding`, replacing any loop already running for it.
    pub async fn register(&self, binding: SourceBinding) {
        let (sender, receiver) = watch::channel(WatchStatus::Connecting);
        let id = binding.id.clone();
        let task = tokio::spawn(run_watch(Arc::clone(&self.inner), binding, sender));

        let mut watches = self.inner.watches.lock().await;
        if let Some(previous) = watches.insert(
            id.clone(),
            WatchHandle {
                task,
                status: receiver,
            },
        ) {
            previous.task.abort();
            debug!("binding {id}: replaced running watch");
        }
    }

    /// Stops the loop of `binding_id`; false if none was registered.
    pub async fn unregister(&self, binding_id: &str) -> bool {
        match self.inner.watches.lock().await.remove(binding_id) {
            Some(handle) => {
                handle.task.abort();
                info!("binding {binding_id}: watch stopped");
                true
            }
            None => false,
        }
    }

    /// Stops every loop, then starts one per stored binding. Returns how many were started.
    pub async fn reload(&self) -> Result<usize, SyncError> {
        let bindings = self.inner.store.all_bindings()?;
        {
            let mut watches = self.inner.watches.lock().await;
            for (_, handle) in watches.drain() {
                handle.task.abort();
            }
        }
        let count = bindings.len();
        for binding in bindings {
            self.register(binding).await;
        }
        info!("watching {count} bindings");
        Ok(count)
    }

    pub async fn status(&self, binding_id: &str) -> Option<WatchStatus> {
        self.inner
            .watches
            .lock()
            .await
            .get(binding_id)
            .map(|handle| handle.status.borrow().clone())
    }

    /// A receiver that observes every status change of `binding_id`.
    #[cfg(test)]
    pub async fn subscribe(&self, binding_id: &str) -> Option<watch::Receiver<WatchStatus>> {
        self.inner
            .watches
            .lock()
            .await
            .get(binding_id)
            .map(|handle| handle.status.clone())
    }

    /// Ids of the registered bindings, sorted.
    pub async fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.watches.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn run_watch(
    inner: Arc<RegistryInner>,
    binding: SourceBinding,
    status: watch::Sender<WatchStatus>,
) {
    let session = match binding.credentials(&inner.codec) {
        Ok(credentials) => {
            inner
                .source
                .connect(&credentials, &binding.database_name)
                .await
        }
        Err(err) => Err(err),
    };
    let session = match session {
        Ok(session) => session,
        Err(err) => {
            error!("binding {}: watch not started: {err}", binding.id);
            status.send_replace(WatchStatus::Inactive(err.to_string()));
            return;
        }
    };
    let mut stream = match session.watch().await {
        Ok(stream) => stream,
        Err(err) => {
            error!("binding {}: change stream refused: {err}", binding.id);
            session.close().await;
            status.send_replace(WatchStatus::Inactive(err.to_string()));
            return;
        }
    };
    status.send_replace(WatchStatus::Active);
    info!(
        "binding {}: watching database '{}'",
        binding.id, binding.database_name
    );

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                warn!("binding {}: change stream failed: {err}", binding.id);
                break;
            }
        };
        match inner.propagator.apply(&binding, &event).await {
            Ok(outcome) => debug!("binding {}: {outcome:?}", binding.id),
            Err(err) => warn!("binding {}: event not mirrored: {err}", binding.id),
        }
    }

    // The session cannot shut down while the stream still holds its cursor.
    drop(stream);
    session.close().await;
    info!("binding {}: disconnected", binding.id);
    status.send_replace(WatchStatus::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FieldValue, MutationEvent, MutationKind};
    use crate::store::bindings::tests::sample_binding;
    use crate::store::Account;
    use crate::testing::{FakeSheets, FakeSource};
    use std::time::Duration;
    use tokio::time::timeout;

    const SHEET: &str = "sheet-1";
    const WAIT: Duration = Duration::from_secs(5);

    fn update_age(document_id: &str, age: i64) -> MutationEvent {
        let mut event = MutationEvent::new(MutationKind::Update, "users", document_id);
        event.updated_fields.insert("age", FieldValue::Int(age));
        event
    }

    fn codec() -> SecretCodec {
        SecretCodec::new([3u8; 32])
    }

    fn fixture(source: FakeSource) -> (Store, Arc<FakeSource>, Arc<FakeSheets>, WatcherRegistry) {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_account(&Account::new("acc-1", "access", "refresh"))
            .unwrap();
        let mut binding = sample_binding("b-1", "acc-1");
        binding.secret = codec().encrypt("hunter2").unwrap();
        store.insert_binding(&binding).unwrap();

        let source = Arc::new(source);
        let sheets = Arc::new(FakeSheets::with_default_tab(SHEET));
        sheets.seed_tab(SHEET, "users", vec![vec!["_id", "age"], vec!["X", "1"]]);
        let registry = WatcherRegistry::new(
            store.clone(),
            source.clone(),
            ChangePropagator::new(store.clone(), sheets.clone()),
            codec(),
        );
        (store, source, sheets, registry)
    }

    #[tokio::test]
    async fn reload_watches_every_binding_and_mirrors_events() {
        let (store, source, sheets, registry) = fixture(FakeSource::new());
        assert_eq!(registry.reload().await.unwrap(), 1);
        assert_eq!(registry.registered().await, vec!["b-1"]);

        let mut status = registry.subscribe("b-1").await.unwrap();
        timeout(WAIT, status.wait_for(|state| *state == WatchStatus::Active))
            .await
            .unwrap()
            .unwrap();

        let event = update_age("X", 5);
        let events = source.events();
        events.send(event.clone()).unwrap();
        events.send(event).unwrap();
        drop(events);
        source.end_events();

        // Closing the channel ends the stream once both events are handled. The fake
        // session only closes after the stream is dropped, like a driver client.
        timeout(WAIT, status.wait_for(|state| *state == WatchStatus::Disconnected))
            .await
            .expect("watch loop never finished closing its session")
            .unwrap();
        assert_eq!(
            sheets.updates(),
            vec![("'users'!B2".to_string(), "5".to_string())]
        );
        assert_eq!(store.logs_for_binding("b-1").unwrap().len(), 1);
        assert_eq!(source.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn stalled_connection_does_not_hold_up_other_bindings() {
        let source = FakeSource::new();
        source.stall_connections_to("cluster0.example.net");
        let (store, source, sheets, registry) = fixture(source);
        store
            .upsert_account(&Account::new("acc-2", "access-2", "refresh-2"))
            .unwrap();
        let mut other = sample_binding("b-2", "acc-2");
        other.host = "replica.example.net".to_string();
        other.secret = codec().encrypt("hunter2").unwrap();
        store.insert_binding(&other).unwrap();

        assert_eq!(registry.reload().await.unwrap(), 2);
        let mut status = registry.subscribe("b-2").await.unwrap();
        timeout(WAIT, status.wait_for(|state| *state == WatchStatus::Active))
            .await
            .unwrap()
            .unwrap();

        let events = source.events();
        events.send(update_age("X", 5)).unwrap();
        drop(events);
        source.end_events();
        timeout(WAIT, status.wait_for(|state| *state == WatchStatus::Disconnected))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            sheets.updates(),
            vec![("'users'!B2".to_string(), "5".to_string())]
        );
        assert_eq!(registry.status("b-1").await, Some(WatchStatus::Connecting));
        assert_eq!(store.logs_for_binding("b-2").unwrap().len(), 1);
        assert!(store.logs_for_binding("b-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn connection_failure_leaves_watch_inactive() {
        let source = FakeSource::new();
        source.fail_connections();
        let (_store, _source, _sheets, registry) = fixture(source);
        registry.reload().await.unwrap();

        let mut status = registry.subscribe("b-1").await.unwrap();
        status
            .wait_for(|state| matches!(state, WatchStatus::Inactive(_)))
            .await
            .unwrap();
        assert!(matches!(
            registry.status("b-1").await,
            Some(WatchStatus::Inactive(_))
        ));
    }

    #[tokio::test]
    async fn unregister_stops_the_loop() {
        let (_store, _source, _sheets, registry) = fixture(FakeSource::new());
        registry.register(sample_binding("b-1", "acc-1")).await;

        assert!(registry.unregister("b-1").await);
        assert!(!registry.unregister("b-1").await);
        assert!(registry.status("b-1").await.is_none());
        assert!(registry.registered().await.is_empty());
    }
}
