//! The event source adapter: lists pending change events in the source
//! container and fetches/removes individual event objects.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use object_store::{path::Path, ObjectStore};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("error listing pending events: {0}")]
    List(#[source] object_store::Error),

    #[error("error fetching event {location}: {source}")]
    Fetch {
        location: Path,
        source: object_store::Error,
    },

    #[error("error acknowledging event {location}: {source}")]
    Acknowledge {
        location: Path,
        source: object_store::Error,
    },
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;

/// A pending change event as seen in the source listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub location: Path,
    pub last_modified: DateTime<Utc>,
}

/// Interface to whatever holds the pending events.
///
/// The object-store surrogate queue is the only implementation today; a
/// message-queue adapter slots in behind the same trait once a transport
/// exists for it.
#[async_trait]
pub trait EventSource: std::fmt::Debug + Send + Sync {
    /// List every pending event. An empty or nonexistent listing is an empty
    /// vec, not an error.
    async fn list_pending(&self) -> Result<Vec<PendingEvent>>;

    /// Fetch the raw payload of one pending event.
    async fn fetch(&self, event: &PendingEvent) -> Result<Bytes>;

    /// Remove an event from the source, signaling it need not be processed
    /// again. Acknowledging an already-removed event succeeds.
    async fn acknowledge(&self, event: &PendingEvent) -> Result<()>;
}

/// [`EventSource`] over an object-store container used as a surrogate queue.
#[derive(Debug)]
pub struct ObjectStoreSource {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreSource {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventSource for ObjectStoreSource {
    async fn list_pending(&self) -> Result<Vec<PendingEvent>> {
        let mut listing = self.store.list(None);
        let mut pending = Vec::new();
        while let Some(item) = listing.next().await {
            let meta = item.map_err(SourceError::List)?;
            pending.push(PendingEvent {
                location: meta.location,
                last_modified: meta.last_modified,
            });
        }
        Ok(pending)
    }

    async fn fetch(&self, event: &PendingEvent) -> Result<Bytes> {
        let result = self
            .store
            .get(&event.location)
            .await
            .map_err(|source| SourceError::Fetch {
                location: event.location.clone(),
                source,
            })?;
        result.bytes().await.map_err(|source| SourceError::Fetch {
            location: event.location.clone(),
            source,
        })
    }

    async fn acknowledge(&self, event: &PendingEvent) -> Result<()> {
        match self.store.delete(&event.location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(source) => Err(SourceError::Acknowledge {
                location: event.location.clone(),
                source,
            }),
        }
    }
}
