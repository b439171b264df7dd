//! Sink writers: the mirrored object-store container and the primary-key
//! table store.

use crate::event::WidgetRecord;
use crate::normalize::TableRow;
use crate::paths::WidgetKey;
use async_trait::async_trait;
use object_store::{path::Path, ObjectStore, PutPayload};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("table store error: {0}")]
    Table(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = SinkError> = std::result::Result<T, E>;

/// Writer for the mirrored object-store sink. Records are JSON documents
/// addressed by their [`WidgetKey`].
#[derive(Debug, Clone)]
pub struct ObjectSink {
    store: Arc<dyn ObjectStore>,
}

impl ObjectSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn put(&self, key: &WidgetKey, record: &WidgetRecord) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        self.store.put(key.as_ref(), PutPayload::from(data)).await?;
        Ok(())
    }

    /// Fetch the mirrored record at `key`, or `None` if no such record
    /// exists.
    pub async fn get(&self, key: &WidgetKey) -> Result<Option<WidgetRecord>> {
        match self.store.get(key.as_ref()).await {
            Ok(result) => {
                let data = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&data)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the mirrored record at `key`. Deleting an absent record is
    /// success: the intent is to ensure absence.
    pub async fn delete(&self, key: &WidgetKey) -> Result<()> {
        match self.store.delete(key.as_ref()).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A primary-key-addressed record store used as an alternate sink.
///
/// Rows are flat string mappings under the composite key (`id`, `widgetId`).
/// The real table-store transport is out of scope for this crate; this trait
/// is the seam where one plugs in.
#[async_trait]
pub trait TableStore: std::fmt::Debug + Send + Sync {
    async fn get(&self, id: &str, widget_id: &str) -> Result<Option<TableRow>>;

    /// Write a row. The row must carry its own `id` and `widgetId` fields.
    async fn put(&self, row: TableRow) -> Result<()>;

    /// Remove a row. Removing an absent row is success.
    async fn delete(&self, id: &str, widget_id: &str) -> Result<()>;
}

fn row_key(row: &TableRow) -> Result<(&str, &str)> {
    match (row.get("id"), row.get("widgetId")) {
        (Some(id), Some(widget_id)) => Ok((id, widget_id)),
        _ => Err(SinkError::Table(
            "row is missing its primary key fields".into(),
        )),
    }
}

/// [`TableStore`] persisting rows as JSON documents in an object-store
/// container, addressed `<id>/<widgetId>.json`. Used where no real table
/// transport is configured.
#[derive(Debug)]
pub struct ObjectStoreTable {
    store: Arc<dyn ObjectStore>,
    table: String,
}

impl ObjectStoreTable {
    pub fn new(store: Arc<dyn ObjectStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// The configured table name, for log context.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn row_path(id: &str, widget_id: &str) -> Path {
        Path::from(format!("{id}/{widget_id}.json"))
    }
}

#[async_trait]
impl TableStore for ObjectStoreTable {
    async fn get(&self, id: &str, widget_id: &str) -> Result<Option<TableRow>> {
        match self.store.get(&Self::row_path(id, widget_id)).await {
            Ok(result) => {
                let data = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&data)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, row: TableRow) -> Result<()> {
        let (id, widget_id) = row_key(&row)?;
        let path = Self::row_path(id, widget_id);
        let data = serde_json::to_vec(&row)?;
        self.store.put(&path, PutPayload::from(data)).await?;
        Ok(())
    }

    async fn delete(&self, id: &str, widget_id: &str) -> Result<()> {
        match self.store.delete(&Self::row_path(id, widget_id)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory [`TableStore`] for tests.
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: Mutex<BTreeMap<(String, String), TableRow>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows, in key order.
    pub fn rows(&self) -> Vec<TableRow> {
        self.rows.lock().values().cloned().collect()
    }
}

#[async_trait]
impl TableStore for MemoryTable {
    async fn get(&self, id: &str, widget_id: &str) -> Result<Option<TableRow>> {
        Ok(self
            .rows
            .lock()
            .get(&(id.to_string(), widget_id.to_string()))
            .cloned())
    }

    async fn put(&self, row: TableRow) -> Result<()> {
        let (id, widget_id) = {
            let (id, widget_id) = row_key(&row)?;
            (id.to_string(), widget_id.to_string())
        };
        self.rows.lock().insert((id, widget_id), row);
        Ok(())
    }

    async fn delete(&self, id: &str, widget_id: &str) -> Result<()> {
        self.rows
            .lock()
            .remove(&(id.to_string(), widget_id.to_string()));
        Ok(())
    }
}
