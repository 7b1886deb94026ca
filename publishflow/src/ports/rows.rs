//! Persisted import row store port.

use crate::core::ImportRow;
use crate::errors::RowStoreError;
use async_trait::async_trait;

/// Paginated, read-only access to the rows of an import.
#[async_trait]
pub trait ImportRowStore: Send + Sync {
    /// Reads up to `limit` rows starting at `offset`, in row order.
    ///
    /// An empty page means there are no more rows.
    async fn fetch_page(
        &self,
        import_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImportRow>, RowStoreError>;
}
