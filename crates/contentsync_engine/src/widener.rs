//! One-hop widening from dependent-stream changes to units.

use crate::catalog::{Catalog, StreamSpec};
use crate::error::SyncResult;
use crate::source::{decode_rows, SourceConnection};
use contentsync_model::ChangeRecord;
use tracing::debug;

/// Returns the units linked to any of `ids` of the dependent `stream`,
/// oldest first and at most `page_size` of them.
///
/// An empty `ids` slice returns nothing without querying the source.
pub fn widen(
    conn: &mut dyn SourceConnection,
    catalog: &Catalog,
    stream: &StreamSpec,
    ids: &[String],
    page_size: u32,
) -> SyncResult<Vec<ChangeRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let query = catalog.widen_query(stream, ids, page_size)?;
    let units: Vec<ChangeRecord> = decode_rows(conn.execute(&query)?)?;
    debug!(
        stream = %stream.name,
        changed = ids.len(),
        units = units.len(),
        "widened changes to units"
    );
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MockSource, QueryKind, SourceConnector};
    use serde_json::json;

    #[test]
    fn empty_ids_issue_no_query() {
        let source = MockSource::new();
        let catalog = Catalog::movies();
        let mut conn = source.connect().unwrap();

        let person = catalog.stream("person").unwrap();
        let units = widen(conn.as_mut(), &catalog, person, &[], 1000).unwrap();

        assert!(units.is_empty());
        assert!(source.queries().is_empty());
    }

    #[test]
    fn non_empty_ids_issue_exactly_one_query() {
        let source = MockSource::new();
        let row = match json!({"id": "f1", "updated_at": "2021-06-01 00:00:00+00"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        source.push_rows(QueryKind::Widen, "genre", vec![row]);
        let catalog = Catalog::movies();
        let mut conn = source.connect().unwrap();
        let ids = vec!["g1".to_string(), "g2".to_string()];

        let genre = catalog.stream("genre").unwrap();
        let units = widen(conn.as_mut(), &catalog, genre, &ids, 1000).unwrap();

        assert_eq!(units, vec![ChangeRecord::new("f1", "2021-06-01 00:00:00+00")]);
        let queries = source.queries_of(QueryKind::Widen);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].ids(), Some(&ids[..]));
        assert_eq!(queries[0].limit(), Some(1000));
    }

    #[test]
    fn primary_stream_cannot_be_widened() {
        let source = MockSource::new();
        let catalog = Catalog::movies();
        let mut conn = source.connect().unwrap();

        let result = widen(conn.as_mut(), &catalog, catalog.primary(), &["f1".into()], 10);
        assert!(result.is_err());
        assert!(source.queries().is_empty());
    }
}
