//! Flattened join of units with their related entities.

use crate::catalog::Catalog;
use crate::error::SyncResult;
use crate::source::{decode_rows, SourceConnection};
use contentsync_model::FlattenedJoinRow;
use tracing::debug;

/// Returns one row per (unit, related entity) pair for `unit_ids`.
///
/// Units without related entities still produce one row. The result is not
/// paginated. An empty `unit_ids` slice returns nothing without querying
/// the source.
pub fn aggregate(
    conn: &mut dyn SourceConnection,
    catalog: &Catalog,
    unit_ids: &[String],
) -> SyncResult<Vec<FlattenedJoinRow>> {
    if unit_ids.is_empty() {
        return Ok(Vec::new());
    }

    let query = catalog.aggregate_query(unit_ids);
    let rows: Vec<FlattenedJoinRow> = decode_rows(conn.execute(&query)?)?;
    debug!(units = unit_ids.len(), rows = rows.len(), "aggregated units");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::source::{MockSource, QueryKind, Row, SourceConnector};
    use contentsync_model::Role;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn empty_ids_issue_no_query() {
        let source = MockSource::new();
        let mut conn = source.connect().unwrap();

        let rows = aggregate(conn.as_mut(), &Catalog::movies(), &[]).unwrap();
        assert!(rows.is_empty());
        assert!(source.queries().is_empty());
    }

    #[test]
    fn decodes_outer_join_rows() {
        let source = MockSource::new();
        source.push_rows(
            QueryKind::Aggregate,
            "film_work",
            vec![
                row(json!({
                    "id": "f1", "title": "Star Wars", "description": null,
                    "rating": 8.6, "type": "movie",
                    "created_at": "2021-06-16 20:14:09+00", "updated_at": "2021-06-16 20:14:09+00",
                    "role": "actor", "person_id": "p1", "full_name": "Mark Hamill",
                    "genre_id": "g1", "genre_name": "Sci-Fi"
                })),
                row(json!({
                    "id": "f2", "title": "Untitled", "description": null,
                    "rating": null, "type": "movie",
                    "created_at": null, "updated_at": null,
                    "role": null, "person_id": null, "full_name": null,
                    "genre_id": null, "genre_name": null
                })),
            ],
        );
        let mut conn = source.connect().unwrap();
        let ids = vec!["f1".to_string(), "f2".to_string()];

        let rows = aggregate(conn.as_mut(), &Catalog::movies(), &ids).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].person_role(), Some(Role::Actor));
        assert_eq!(rows[0].genre_name.as_deref(), Some("Sci-Fi"));
        assert_eq!(rows[1].person_id, None);
        assert_eq!(source.queries_of(QueryKind::Aggregate).len(), 1);
        assert_eq!(source.queries()[0].ids(), Some(&ids[..]));
    }

    #[test]
    fn malformed_row_is_a_decode_error() {
        let source = MockSource::new();
        source.push_rows(QueryKind::Aggregate, "film_work", vec![row(json!({"id": "f1"}))]);
        let mut conn = source.connect().unwrap();

        let err = aggregate(conn.as_mut(), &Catalog::movies(), &["f1".into()]).unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }
}
