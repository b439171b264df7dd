//! The top-level reconciliation loop: poll, select, parse, dispatch,
//! acknowledge, repeat.

use crate::event::{self, ParseError};
use crate::router::{Dispatcher, Disposition};
use crate::selector::OrderingPolicy;
use crate::source::{EventSource, PendingEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The reconciliation driver. Owns the cycle and is the only component with
/// persistent loop state (the last-seen batch snapshot).
///
/// No error escapes [`run`][Self::run]: every failure is caught at the
/// event-processing boundary and converted to a log entry so the daemon
/// stays self-healing across transient outages.
#[derive(Debug)]
pub struct Consumer {
    source: Arc<dyn EventSource>,
    dispatcher: Dispatcher,
    policy: OrderingPolicy,
    poll_interval: Duration,
    shutdown: CancellationToken,
    /// Last selected batch, kept so a refreshed listing is only logged when
    /// it actually changed (lexicographic-batch policy only).
    last_batch: Vec<PendingEvent>,
}

impl Consumer {
    pub fn new(
        source: Arc<dyn EventSource>,
        dispatcher: Dispatcher,
        policy: OrderingPolicy,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            dispatcher,
            policy,
            poll_interval,
            shutdown,
            last_batch: Vec::new(),
        }
    }

    /// Run the poll cycle until cancelled, completing the in-flight event
    /// before exiting.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(policy = %self.policy, "starting reconciliation loop");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.cancelled() => break,
            }
            self.cycle().await;
        }

        info!("reconciliation loop stopped");
    }

    async fn cycle(&mut self) {
        let pending = match self.source.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                error!(%err, "failed to list pending events");
                return;
            }
        };
        if pending.is_empty() {
            debug!("no pending events, waiting for new requests");
            return;
        }

        let selected = self.policy.select(pending);
        if self.policy == OrderingPolicy::LexicographicBatch && selected != self.last_batch {
            info!(batch_size = selected.len(), "refreshed pending batch");
            self.last_batch = selected.clone();
        }

        for event in &selected {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.process(event).await;
        }
    }

    async fn process(&self, pending: &PendingEvent) {
        debug!(location = %pending.location, "processing event");
        let payload = match self.source.fetch(pending).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(%err, "failed to fetch event");
                return;
            }
        };

        let disposition = match event::parse(&payload) {
            Ok(event) => self.dispatcher.dispatch(&event).await,
            // Deterministic decode failures can never succeed on retry, so
            // they are skipped (logged and acknowledged) rather than left to
            // monopolize the selector forever.
            Err(err @ ParseError::Json(_)) => {
                warn!(location = %pending.location, %err, "skipping malformed event payload");
                debug!(
                    location = %pending.location,
                    payload = %String::from_utf8_lossy(&payload),
                    "raw event payload"
                );
                Disposition::Skip
            }
            Err(err) => {
                warn!(location = %pending.location, %err, "skipping unprocessable event");
                Disposition::Skip
            }
        };

        match disposition {
            Disposition::Acknowledge | Disposition::Skip => {
                if let Err(err) = self.source.acknowledge(pending).await {
                    error!(%err, "failed to acknowledge event");
                }
            }
            Disposition::Retry => {
                debug!(location = %pending.location, "leaving event in place for retry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemoryTable, ObjectSink, TableStore};
    use crate::source::ObjectStoreSource;
    use object_store::{memory::InMemory, path::Path, ObjectStore, PutPayload};

    const POLL: Duration = Duration::from_millis(10);

    async fn wait_until_consumed(store: &Arc<dyn ObjectStore>, location: &Path) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.head(location).await.is_ok() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "event {location} was not consumed in time"
            );
            tokio::time::sleep(POLL).await;
        }
    }

    fn consumer_for(
        source_store: &Arc<dyn ObjectStore>,
        dispatcher: Dispatcher,
        shutdown: CancellationToken,
    ) -> Consumer {
        Consumer::new(
            Arc::new(ObjectStoreSource::new(Arc::clone(source_store))),
            dispatcher,
            OrderingPolicy::OldestFirst,
            POLL,
            shutdown,
        )
    }

    #[test_log::test(tokio::test)]
    async fn create_event_is_mirrored_and_source_drained() {
        let source_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let mirror_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let location = Path::from("event-1");
        source_store
            .put(
                &location,
                PutPayload::from(r#"{"type":"create","owner":"John Doe","widgetId":"123"}"#),
            )
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let consumer = consumer_for(
            &source_store,
            Dispatcher::new(Some(ObjectSink::new(Arc::clone(&mirror_store))), None),
            shutdown.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        wait_until_consumed(&source_store, &location).await;

        let mirrored = mirror_store
            .get(&Path::from("widgets/john-doe/123"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        let record: crate::event::WidgetRecord = serde_json::from_slice(&mirrored).unwrap();
        assert_eq!(record.owner, "John Doe");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn malformed_payload_is_acknowledged_without_sink_mutation() {
        let source_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let mirror_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let location = Path::from("bad-event");
        source_store
            .put(&location, PutPayload::from("definitely not json"))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let consumer = consumer_for(
            &source_store,
            Dispatcher::new(Some(ObjectSink::new(Arc::clone(&mirror_store))), None),
            shutdown.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        wait_until_consumed(&source_store, &location).await;

        use futures::TryStreamExt;
        let mirrored: Vec<_> = mirror_store.list(None).try_collect().await.unwrap();
        assert!(mirrored.is_empty(), "no sink mutation expected");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn full_lifecycle_reaches_both_sinks() {
        let source_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let mirror_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let table = Arc::new(MemoryTable::new());

        let shutdown = CancellationToken::new();
        let consumer = consumer_for(
            &source_store,
            Dispatcher::new(
                Some(ObjectSink::new(Arc::clone(&mirror_store))),
                Some(Arc::clone(&table) as Arc<dyn TableStore>),
            ),
            shutdown.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        for (name, payload) in [
            (
                "event-1",
                r#"{"type":"create","owner":"John Doe","widgetId":"123",
                    "otherAttributes":[{"name":"size","value":"5"}]}"#,
            ),
            (
                "event-2",
                r#"{"type":"update","owner":"John Doe","widgetId":"123","description":"x"}"#,
            ),
            (
                "event-3",
                r#"{"type":"delete","owner":"John Doe","widgetId":"123"}"#,
            ),
        ] {
            let location = Path::from(name);
            source_store
                .put(&location, PutPayload::from(payload))
                .await
                .unwrap();
            wait_until_consumed(&source_store, &location).await;
        }

        // created, updated, then deleted again everywhere
        assert!(mirror_store
            .head(&Path::from("widgets/john-doe/123"))
            .await
            .is_err());
        assert!(table.rows().is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
