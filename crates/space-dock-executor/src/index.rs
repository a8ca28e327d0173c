use space_dock_common::ImageRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory index of the images this process built, keyed by short id.
///
/// Created once per orchestrator and shared by handle between the build
/// manager (writer) and the fleet registry (reader). Insertion order is kept
/// for listing.
#[derive(Debug, Default)]
pub struct ImageIndex {
    inner: RwLock<IndexState>,
}

#[derive(Debug, Default)]
struct IndexState {
    records: HashMap<String, ImageRecord>,
    order: Vec<String>,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record`, replacing any previous entry with the same short id.
    /// A replaced entry moves to the end of the listing order.
    pub async fn insert(&self, record: ImageRecord) {
        let mut state = self.inner.write().await;
        let key = record.short_id.clone();
        if state.records.insert(key.clone(), record).is_some() {
            state.order.retain(|k| *k != key);
        }
        state.order.push(key);
    }

    pub async fn get(&self, short_id: &str) -> Option<ImageRecord> {
        self.inner.read().await.records.get(short_id).cloned()
    }

    pub async fn build_log(&self, short_id: &str) -> Option<Vec<String>> {
        self.inner
            .read()
            .await
            .records
            .get(short_id)
            .map(|record| record.build_log.clone())
    }

    /// All records in insertion order.
    pub async fn records(&self) -> Vec<ImageRecord> {
        let state = self.inner.read().await;
        state
            .order
            .iter()
            .filter_map(|key| state.records.get(key).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
