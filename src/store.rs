use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;

/// One data row keyed by header name.
pub type SheetRecord = HashMap<String, String>;

/// A remote append-only table whose first row is the header.
///
/// Implementations make no promise about ordering between concurrent writers.
pub trait SheetStore: Send + Sync + 'static {
    fn sheet_name(&self) -> &str;

    fn read_header(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Every row of the sheet, header first. Rows may be shorter than the header.
    fn read_rows(&self) -> impl Future<Output = Result<Vec<Vec<String>>, StoreError>> + Send;

    fn write_header(&self, header: &[String])
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Pins row 1 so it stays visible. Purely cosmetic.
    fn freeze_header(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn append_rows(&self, rows: &[Vec<String>])
        -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Reads the whole sheet and keys every data row by the header.
pub async fn read_all<S: SheetStore>(store: &S) -> Result<Vec<SheetRecord>, StoreError> {
    let rows = store.read_rows().await?;
    let records = records_from_rows(&rows);
    if records.is_empty() {
        return Err(StoreError::EmptyStore {
            sheet: store.sheet_name().to_string(),
        });
    }
    Ok(records)
}

/// Associates cells with header names by position. Short rows are padded with empty
/// cells; for a repeated header name the first occurrence wins.
pub fn records_from_rows(rows: &[Vec<String>]) -> Vec<SheetRecord> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };

    data.iter()
        .map(|row| {
            let mut record = SheetRecord::with_capacity(header.len());
            for (position, name) in header.iter().enumerate() {
                if name.is_empty() {
                    continue;
                }
                let value = row.get(position).cloned().unwrap_or_default();
                record.entry(name.clone()).or_insert(value);
            }
            record
        })
        .collect()
}

/// Read-through cache over a store. Reads inside the TTL window may miss recent appends.
pub struct CachedSheet<S> {
    store: S,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Arc<Vec<SheetRecord>>)>>,
}

impl<S: SheetStore> CachedSheet<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn read_all(&self) -> Result<Arc<Vec<SheetRecord>>, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some((loaded_at, records)) = cached.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(records));
            }
        }

        let records = Arc::new(read_all(&self.store).await?);
        debug!(
            sheet = self.store.sheet_name(),
            rows = records.len(),
            "sheet cache refreshed"
        );
        *cached = Some((Instant::now(), Arc::clone(&records)));
        Ok(records)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn records_pad_short_rows() {
        let rows = vec![row(&["a", "b", "c"]), row(&["1", "2"]), row(&["x", "y", "z", "extra"])];
        let records = records_from_rows(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], "1");
        assert_eq!(records[0]["c"], "");
        assert_eq!(records[1]["c"], "z");
        assert_eq!(records[1].len(), 3);
    }

    #[test]
    fn repeated_header_names_keep_first_cell() {
        let rows = vec![row(&["a", "a", ""]), row(&["first", "second", "ignored"])];
        let records = records_from_rows(&rows);
        assert_eq!(records[0]["a"], "first");
        assert_eq!(records[0].len(), 1);
    }

    #[tokio::test]
    async fn read_all_rejects_sheet_without_data() {
        let store = MemoryStore::with_header(row(&["a"]));
        let err = read_all(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyStore { .. }));
    }

    #[tokio::test]
    async fn read_all_propagates_unavailable_store() {
        let store = MemoryStore::with_header(row(&["a"]));
        store.push_row(row(&["1"]));
        store.fail_reads(true);
        let err = read_all(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_serves_reads_within_ttl() {
        let store = MemoryStore::with_header(row(&["a"]));
        store.push_row(row(&["1"]));
        let cache = CachedSheet::new(store.clone(), Duration::from_secs(60));

        assert_eq!(cache.read_all().await.unwrap().len(), 1);
        store.push_row(row(&["2"]));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.read_all().await.unwrap().len(), 1);
        assert_eq!(store.reads(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.read_all().await.unwrap().len(), 2);
        assert_eq!(store.reads(), 2);
    }
}
