//! Change fetching per stream.

use crate::catalog::{Catalog, StreamSpec};
use crate::error::SyncResult;
use crate::source::{decode_rows, SourceConnection};
use contentsync_model::{ChangeRecord, Watermark};
use tracing::debug;

/// One page of changed rows of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePage {
    /// Stream the rows belong to.
    pub stream: String,
    /// Changed rows, oldest first.
    pub records: Vec<ChangeRecord>,
    /// Watermark to checkpoint once the page was delivered.
    pub new_watermark: Option<Watermark>,
}

impl ChangePage {
    /// Returns true if the page holds no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Fetches up to `page_size` rows of `stream` modified after `watermark`.
///
/// Without a watermark every row qualifies. The returned watermark is the
/// modification time of the last row, or the input watermark when nothing
/// changed.
///
/// Rows sharing the last timestamp of a full page but falling past the
/// limit are skipped by the next fetch, since it compares with `>`.
pub fn fetch_changes(
    conn: &mut dyn SourceConnection,
    catalog: &Catalog,
    stream: &StreamSpec,
    watermark: Option<&Watermark>,
    page_size: u32,
) -> SyncResult<ChangePage> {
    let min = Watermark::min();
    let since = watermark.unwrap_or(&min);
    let query = catalog.changes_query(stream, since, page_size);

    let rows = conn.execute(&query)?;
    let records: Vec<ChangeRecord> = decode_rows(rows)?;
    debug!(stream = %stream.name, since = %since, count = records.len(), "fetched changes");

    let new_watermark = records
        .last()
        .map(|r| r.updated_at.clone())
        .or_else(|| watermark.cloned());

    Ok(ChangePage {
        stream: stream.name.clone(),
        records,
        new_watermark,
    })
}
