//! The three-way dispatch router: turns a decoded event into sink mutations
//! and an explicit per-event outcome.

use crate::event::{WidgetChange, WidgetEvent, WidgetIdentity, WidgetRecord};
use crate::normalize::{flatten, normalize_owner};
use crate::paths::WidgetKey;
use crate::sink::{ObjectSink, TableStore};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of dispatching a single event. The loop alone acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Every configured sink accepted the event's effect; remove it from the
    /// source.
    Acknowledge,
    /// A sink failed in a way that may succeed later; leave the event
    /// pending for the next cycle.
    Retry,
    /// The event is unprocessable as-is; remove it from the source so it
    /// cannot wedge the stream.
    Skip,
}

/// Routes each event to the configured sinks, keyed on event type.
///
/// Either sink may be absent; an absent sink is skipped entirely.
/// Acknowledgment requires every configured sink to succeed. Sink writes are
/// idempotent puts, so an event retried after a partial failure re-applies
/// harmlessly.
#[derive(Debug)]
pub struct Dispatcher {
    object_sink: Option<ObjectSink>,
    table: Option<Arc<dyn TableStore>>,
}

impl Dispatcher {
    pub fn new(object_sink: Option<ObjectSink>, table: Option<Arc<dyn TableStore>>) -> Self {
        Self { object_sink, table }
    }

    fn has_sinks(&self) -> bool {
        self.object_sink.is_some() || self.table.is_some()
    }

    pub async fn dispatch(&self, event: &WidgetEvent) -> Disposition {
        match event {
            WidgetEvent::Create(change) => self.create(change).await,
            WidgetEvent::Update(change) => self.update(change).await,
            WidgetEvent::Delete(identity) => self.delete(identity).await,
        }
    }

    async fn create(&self, change: &WidgetChange) -> Disposition {
        let key = WidgetKey::new(&change.owner, &change.widget_id);
        let mut failed = false;

        if let Some(sink) = &self.object_sink {
            match sink.put(&key, &WidgetRecord::from(change)).await {
                Ok(()) => info!(key = %key, "stored widget in mirror"),
                Err(err) => {
                    error!(key = %key, %err, "failed to store widget in mirror");
                    failed = true;
                }
            }
        }
        if let Some(table) = &self.table {
            match table.put(flatten("create", change)).await {
                Ok(()) => info!(key = %key, "stored widget row in table"),
                Err(err) => {
                    error!(key = %key, %err, "failed to store widget row in table");
                    failed = true;
                }
            }
        }

        if failed {
            Disposition::Retry
        } else {
            Disposition::Acknowledge
        }
    }

    async fn update(&self, change: &WidgetChange) -> Disposition {
        let key = WidgetKey::new(&change.owner, &change.widget_id);
        let mut failed = false;
        let mut found = false;

        if let Some(sink) = &self.object_sink {
            match sink.get(&key).await {
                Ok(Some(mut record)) => {
                    found = true;
                    record.merge(change);
                    match sink.put(&key, &record).await {
                        Ok(()) => info!(key = %key, "updated widget in mirror"),
                        Err(err) => {
                            error!(key = %key, %err, "failed to update widget in mirror");
                            failed = true;
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(key = %key, %err, "failed to fetch mirrored widget");
                    failed = true;
                }
            }
        }
        if let Some(table) = &self.table {
            let id = normalize_owner(&change.owner);
            match table.get(&id, &change.widget_id).await {
                Ok(Some(mut row)) => {
                    found = true;
                    for (name, value) in flatten("update", change) {
                        row.insert(name, value);
                    }
                    match table.put(row).await {
                        Ok(()) => info!(key = %key, "updated widget row in table"),
                        Err(err) => {
                            error!(key = %key, %err, "failed to update widget row in table");
                            failed = true;
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(key = %key, %err, "failed to fetch widget row");
                    failed = true;
                }
            }
        }

        if failed {
            return Disposition::Retry;
        }
        if !found && self.has_sinks() {
            // A stale update against a missing entity is a no-op, not an
            // error: retrying it forever would starve the selector.
            warn!(key = %key, "update target not found, nothing to merge");
        }
        Disposition::Acknowledge
    }

    async fn delete(&self, identity: &WidgetIdentity) -> Disposition {
        let key = WidgetKey::new(&identity.owner, &identity.widget_id);

        if let Some(sink) = &self.object_sink {
            match sink.delete(&key).await {
                Ok(()) => info!(key = %key, "removed widget from mirror"),
                Err(err) => error!(key = %key, %err, "failed to remove widget from mirror"),
            }
        }
        if let Some(table) = &self.table {
            let id = normalize_owner(&identity.owner);
            match table.delete(&id, &identity.widget_id).await {
                Ok(()) => info!(key = %key, "removed widget row from table"),
                Err(err) => error!(key = %key, %err, "failed to remove widget row from table"),
            }
        }

        // The intent is to ensure absence; "already gone" is success and a
        // failed delete has no better retry, so always acknowledge.
        Disposition::Acknowledge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Attribute;
    use crate::normalize::TableRow;
    use crate::sink::{MemoryTable, SinkError};
    use async_trait::async_trait;
    use object_store::memory::InMemory;
    use pretty_assertions::assert_eq;

    fn create_event() -> WidgetEvent {
        WidgetEvent::Create(WidgetChange {
            owner: "John Doe".to_string(),
            widget_id: "123".to_string(),
            description: None,
            other_attributes: vec![Attribute {
                name: "size".to_string(),
                value: "5".to_string(),
            }],
        })
    }

    fn update_event(description: &str) -> WidgetEvent {
        WidgetEvent::Update(WidgetChange {
            owner: "John Doe".to_string(),
            widget_id: "123".to_string(),
            description: Some(description.to_string()),
            other_attributes: vec![],
        })
    }

    fn delete_event() -> WidgetEvent {
        WidgetEvent::Delete(WidgetIdentity {
            owner: "John Doe".to_string(),
            widget_id: "123".to_string(),
        })
    }

    /// Table that rejects every write, standing in for a sink outage.
    #[derive(Debug)]
    struct FailingTable;

    #[async_trait]
    impl TableStore for FailingTable {
        async fn get(&self, _id: &str, _widget_id: &str) -> crate::sink::Result<Option<TableRow>> {
            Err(SinkError::Table("table unavailable".into()))
        }

        async fn put(&self, _row: TableRow) -> crate::sink::Result<()> {
            Err(SinkError::Table("table unavailable".into()))
        }

        async fn delete(&self, _id: &str, _widget_id: &str) -> crate::sink::Result<()> {
            Err(SinkError::Table("table unavailable".into()))
        }
    }

    #[tokio::test]
    async fn create_writes_both_sinks_and_acknowledges() {
        let mirror = ObjectSink::new(Arc::new(InMemory::new()));
        let table = Arc::new(MemoryTable::new());
        let dispatcher = Dispatcher::new(
            Some(mirror.clone()),
            Some(Arc::clone(&table) as Arc<dyn TableStore>),
        );

        let disposition = dispatcher.dispatch(&create_event()).await;
        assert_eq!(disposition, Disposition::Acknowledge);

        let key = WidgetKey::new("John Doe", "123");
        let record = mirror.get(&key).await.unwrap().unwrap();
        assert_eq!(record.owner, "John Doe");
        assert_eq!(record.widget_id, "123");

        let rows = table.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id").map(String::as_str), Some("john-doe"));
        assert_eq!(rows[0].get("size").map(String::as_str), Some("5"));
        assert!(!rows[0].contains_key("owner"));
    }

    #[tokio::test]
    async fn update_merges_into_existing_mirror_record() {
        let mirror = ObjectSink::new(Arc::new(InMemory::new()));
        let dispatcher = Dispatcher::new(Some(mirror.clone()), None);

        dispatcher.dispatch(&create_event()).await;
        let disposition = dispatcher.dispatch(&update_event("now described")).await;
        assert_eq!(disposition, Disposition::Acknowledge);

        let key = WidgetKey::new("John Doe", "123");
        let record = mirror.get(&key).await.unwrap().unwrap();
        assert_eq!(record.description.as_deref(), Some("now described"));
        // attributes from the create survive the merge
        assert_eq!(record.other_attributes.len(), 1);
    }

    #[tokio::test]
    async fn update_against_missing_target_acknowledges_without_writing() {
        let mirror = ObjectSink::new(Arc::new(InMemory::new()));
        let dispatcher = Dispatcher::new(Some(mirror.clone()), None);

        let disposition = dispatcher.dispatch(&update_event("x")).await;
        assert_eq!(disposition, Disposition::Acknowledge);

        let key = WidgetKey::new("John Doe", "123");
        assert_eq!(mirror.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_always_acknowledges() {
        let mirror = ObjectSink::new(Arc::new(InMemory::new()));
        let table = Arc::new(MemoryTable::new());
        let dispatcher = Dispatcher::new(
            Some(mirror.clone()),
            Some(Arc::clone(&table) as Arc<dyn TableStore>),
        );

        dispatcher.dispatch(&create_event()).await;
        assert_eq!(
            dispatcher.dispatch(&delete_event()).await,
            Disposition::Acknowledge
        );
        // second delete, entity already absent
        assert_eq!(
            dispatcher.dispatch(&delete_event()).await,
            Disposition::Acknowledge
        );

        let key = WidgetKey::new("John Doe", "123");
        assert_eq!(mirror.get(&key).await.unwrap(), None);
        assert!(table.rows().is_empty());
    }

    #[tokio::test]
    async fn partial_sink_failure_retries_after_attempting_both() {
        let mirror = ObjectSink::new(Arc::new(InMemory::new()));
        let dispatcher = Dispatcher::new(
            Some(mirror.clone()),
            Some(Arc::new(FailingTable) as Arc<dyn TableStore>),
        );

        let disposition = dispatcher.dispatch(&create_event()).await;
        assert_eq!(disposition, Disposition::Retry);

        // the mirror write was still attempted and applied
        let key = WidgetKey::new("John Doe", "123");
        assert!(mirror.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failing_table_delete_still_acknowledges() {
        let dispatcher = Dispatcher::new(None, Some(Arc::new(FailingTable) as Arc<dyn TableStore>));
        assert_eq!(
            dispatcher.dispatch(&delete_event()).await,
            Disposition::Acknowledge
        );
    }
}
