//! Stream catalogue and query construction.
//!
//! A [`Catalog`] names the tracked streams: one primary stream whose rows
//! become documents, and dependent streams that reach the primary table
//! through a link table. Every query the engine issues is built here from
//! that data.

use crate::error::{SyncError, SyncResult};
use crate::source::{QueryKind, QueryParam, SqlQuery};
use contentsync_model::Watermark;
use std::fmt::Write as _;

const UNIT_ALIAS: &str = "u";

/// Table a projected column is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// The primary table.
    Unit,
    /// The link table of a dependent stream.
    Link,
    /// The table of a dependent stream.
    Entity,
}

/// A column of the aggregation query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    /// Table the column is read from.
    pub source: ColumnSource,
    /// Column name.
    pub column: String,
    /// Name of the column in the result row.
    pub alias: String,
    /// Render the value as text (ids and timestamps).
    pub as_text: bool,
}

impl JoinColumn {
    /// A column read as-is.
    pub fn new(source: ColumnSource, column: &str, alias: &str) -> Self {
        Self {
            source,
            column: column.to_string(),
            alias: alias.to_string(),
            as_text: false,
        }
    }

    /// A column rendered as text.
    pub fn text(source: ColumnSource, column: &str, alias: &str) -> Self {
        Self {
            as_text: true,
            ..Self::new(source, column, alias)
        }
    }
}

/// How a stream relates to the documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRole {
    /// Rows of this stream are the documents.
    Primary,
    /// Rows of this stream are embedded in documents through a link table.
    Dependent {
        /// Table linking units to rows of this stream.
        link_table: String,
        /// Link table column referencing this stream's rows.
        link_column: String,
        /// Link table column referencing the unit.
        unit_column: String,
        /// Columns this stream contributes to the aggregation query.
        columns: Vec<JoinColumn>,
    },
}

/// A tracked entity type with its own watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// Stream name.
    pub name: String,
    /// Table holding the stream's rows.
    pub table: String,
    /// Relation to the documents.
    pub role: StreamRole,
}

impl StreamSpec {
    /// Creates the primary stream.
    pub fn primary(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            role: StreamRole::Primary,
        }
    }

    /// Creates a dependent stream.
    pub fn dependent(
        name: &str,
        table: &str,
        link_table: &str,
        link_column: &str,
        unit_column: &str,
        columns: Vec<JoinColumn>,
    ) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            role: StreamRole::Dependent {
                link_table: link_table.to_string(),
                link_column: link_column.to_string(),
                unit_column: unit_column.to_string(),
                columns,
            },
        }
    }

    /// Returns true for the primary stream.
    pub fn is_primary(&self) -> bool {
        matches!(self.role, StreamRole::Primary)
    }

    /// Key under which the stream's watermark is checkpointed.
    pub fn checkpoint_key(&self) -> String {
        format!("{}_last_modified", self.name)
    }
}

/// The set of tracked streams.
#[derive(Debug, Clone)]
pub struct Catalog {
    schema: String,
    streams: Vec<StreamSpec>,
    primary: usize,
    unit_columns: Vec<JoinColumn>,
}

impl Catalog {
    /// Creates a catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] unless there is exactly one primary
    /// stream, stream names are unique, and every identifier is a plain
    /// SQL identifier.
    pub fn new(
        schema: &str,
        streams: Vec<StreamSpec>,
        unit_columns: Vec<JoinColumn>,
    ) -> SyncResult<Self> {
        let primaries: Vec<usize> = streams
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_primary())
            .map(|(i, _)| i)
            .collect();
        let [primary] = primaries[..] else {
            return Err(SyncError::Config(format!(
                "expected exactly one primary stream, found {}",
                primaries.len()
            )));
        };

        check_ident(schema)?;
        for (i, stream) in streams.iter().enumerate() {
            if streams[..i].iter().any(|s| s.name == stream.name) {
                return Err(SyncError::Config(format!(
                    "duplicate stream '{}'",
                    stream.name
                )));
            }
            check_ident(&stream.name)?;
            check_ident(&stream.table)?;
            if let StreamRole::Dependent {
                link_table,
                link_column,
                unit_column,
                columns,
            } = &stream.role
            {
                check_ident(link_table)?;
                check_ident(link_column)?;
                check_ident(unit_column)?;
                check_columns(columns)?;
            }
        }
        check_columns(&unit_columns)?;

        Ok(Self {
            schema: schema.to_string(),
            streams,
            primary,
            unit_columns,
        })
    }

    /// The film catalogue: `film_work` documents with persons and genres.
    pub fn movies() -> Self {
        use ColumnSource::{Entity, Link, Unit};

        let streams = vec![
            StreamSpec::dependent(
                "person",
                "person",
                "person_film_work",
                "person_id",
                "film_work_id",
                vec![
                    JoinColumn::new(Link, "role", "role"),
                    JoinColumn::text(Entity, "id", "person_id"),
                    JoinColumn::new(Entity, "full_name", "full_name"),
                ],
            ),
            StreamSpec::dependent(
                "genre",
                "genre",
                "genre_film_work",
                "genre_id",
                "film_work_id",
                vec![
                    JoinColumn::text(Entity, "id", "genre_id"),
                    JoinColumn::new(Entity, "name", "genre_name"),
                ],
            ),
            StreamSpec::primary("film_work", "film_work"),
        ];
        let unit_columns = vec![
            JoinColumn::text(Unit, "id", "id"),
            JoinColumn::new(Unit, "title", "title"),
            JoinColumn::new(Unit, "description", "description"),
            JoinColumn::new(Unit, "rating", "rating"),
            JoinColumn::new(Unit, "type", "type"),
            JoinColumn::text(Unit, "created_at", "created_at"),
            JoinColumn::text(Unit, "updated_at", "updated_at"),
        ];

        Self {
            schema: "content".to_string(),
            primary: streams.len() - 1,
            streams,
            unit_columns,
        }
    }

    /// Schema all tables live in.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// All streams, in processing order.
    pub fn streams(&self) -> &[StreamSpec] {
        &self.streams
    }

    /// Looks up a stream by name.
    pub fn stream(&self, name: &str) -> Option<&StreamSpec> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// The primary stream.
    pub fn primary(&self) -> &StreamSpec {
        &self.streams[self.primary]
    }

    /// Dependent streams, in processing order.
    pub fn dependents(&self) -> impl Iterator<Item = &StreamSpec> {
        self.streams.iter().filter(|s| !s.is_primary())
    }

    /// Statement run once on every new connection.
    ///
    /// Watermarks are the text rendering of `timestamptz` values and are
    /// compared as strings, which only follows temporal order when every
    /// value carries the same offset. Pinning the session to UTC renders
    /// them all as `+00`.
    pub fn session_query(&self) -> SqlQuery {
        SqlQuery {
            kind: QueryKind::Session,
            stream: String::new(),
            text: "SET TIME ZONE 'UTC'".to_string(),
            params: Vec::new(),
        }
    }

    /// Rows of `stream` modified after `since`, oldest first.
    pub fn changes_query(&self, stream: &StreamSpec, since: &Watermark, limit: u32) -> SqlQuery {
        let text = format!(
            "SELECT id::text AS id, updated_at::text AS updated_at \
             FROM {}.{} \
             WHERE updated_at > $1::timestamptz \
             ORDER BY updated_at \
             LIMIT $2",
            self.schema, stream.table
        );
        SqlQuery {
            kind: QueryKind::Changes,
            stream: stream.name.clone(),
            text,
            params: vec![
                QueryParam::Timestamp(since.as_str().to_string()),
                QueryParam::Limit(limit),
            ],
        }
    }

    /// Units linked to any of `ids` of the dependent `stream`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `stream` is the primary stream.
    pub fn widen_query(
        &self,
        stream: &StreamSpec,
        ids: &[String],
        limit: u32,
    ) -> SyncResult<SqlQuery> {
        let StreamRole::Dependent {
            link_table,
            link_column,
            unit_column,
            ..
        } = &stream.role
        else {
            return Err(SyncError::Config(format!(
                "stream '{}' has no link to the primary table",
                stream.name
            )));
        };

        let text = format!(
            "SELECT {u}.id::text AS id, {u}.updated_at::text AS updated_at \
             FROM {schema}.{unit} {u} \
             JOIN {schema}.{link_table} l ON l.{unit_column} = {u}.id \
             WHERE l.{link_column} = ANY($1::uuid[]) \
             ORDER BY {u}.updated_at \
             LIMIT $2",
            u = UNIT_ALIAS,
            schema = self.schema,
            unit = self.primary().table,
        );
        Ok(SqlQuery {
            kind: QueryKind::Widen,
            stream: stream.name.clone(),
            text,
            params: vec![QueryParam::Ids(ids.to_vec()), QueryParam::Limit(limit)],
        })
    }

    /// One row per (unit, related entity) for the given units.
    ///
    /// Outer joins keep units without related entities.
    pub fn aggregate_query(&self, ids: &[String]) -> SqlQuery {
        let mut columns: Vec<String> = self
            .unit_columns
            .iter()
            .map(|c| projection(c, UNIT_ALIAS, UNIT_ALIAS, UNIT_ALIAS))
            .collect();
        let mut joins = String::new();

        for (i, stream) in self.dependents().enumerate() {
            let StreamRole::Dependent {
                link_table,
                link_column,
                unit_column,
                columns: stream_columns,
            } = &stream.role
            else {
                continue;
            };
            let link = format!("l{i}");
            let entity = format!("e{i}");
            let _ = write!(
                joins,
                " LEFT JOIN {schema}.{link_table} {link} ON {link}.{unit_column} = {u}.id \
                 LEFT JOIN {schema}.{table} {entity} ON {entity}.id = {link}.{link_column}",
                schema = self.schema,
                table = stream.table,
                u = UNIT_ALIAS,
            );
            columns.extend(
                stream_columns
                    .iter()
                    .map(|c| projection(c, UNIT_ALIAS, &link, &entity)),
            );
        }

        let text = format!(
            "SELECT {} FROM {}.{} {}{} WHERE {}.id = ANY($1::uuid[])",
            columns.join(", "),
            self.schema,
            self.primary().table,
            UNIT_ALIAS,
            joins,
            UNIT_ALIAS,
        );
        SqlQuery {
            kind: QueryKind::Aggregate,
            stream: self.primary().name.clone(),
            text,
            params: vec![QueryParam::Ids(ids.to_vec())],
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::movies()
    }
}

fn projection(column: &JoinColumn, unit: &str, link: &str, entity: &str) -> String {
    let table = match column.source {
        ColumnSource::Unit => unit,
        ColumnSource::Link => link,
        ColumnSource::Entity => entity,
    };
    let cast = if column.as_text { "::text" } else { "" };
    format!("{table}.{}{cast} AS {}", column.column, column.alias)
}

fn check_columns(columns: &[JoinColumn]) -> SyncResult<()> {
    for column in columns {
        check_ident(&column.column)?;
        check_ident(&column.alias)?;
    }
    Ok(())
}

fn check_ident(ident: &str) -> SyncResult<()> {
    let mut chars = ident.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SyncError::Config(format!("invalid identifier '{ident}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movies_catalog_layout() {
        let catalog = Catalog::movies();
        assert_eq!(catalog.primary().name, "film_work");
        let dependents: Vec<_> = catalog.dependents().map(|s| s.name.as_str()).collect();
        assert_eq!(dependents, ["person", "genre"]);
        assert_eq!(
            catalog.stream("person").unwrap().checkpoint_key(),
            "person_last_modified"
        );
    }

    #[test]
    fn rejects_missing_or_duplicate_primary() {
        let err = Catalog::new("content", vec![], vec![]).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));

        let streams = vec![
            StreamSpec::primary("a", "a"),
            StreamSpec::primary("b", "b"),
        ];
        assert!(Catalog::new("content", streams, vec![]).is_err());
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let streams = vec![StreamSpec::primary("film", "film; DROP TABLE x")];
        let err = Catalog::new("content", streams, vec![]).unwrap_err();
        assert!(err.to_string().contains("invalid identifier"));
    }

    #[test]
    fn session_pins_time_zone_to_utc() {
        let query = Catalog::movies().session_query();
        assert_eq!(query.kind, QueryKind::Session);
        assert_eq!(query.text, "SET TIME ZONE 'UTC'");
        assert!(query.params.is_empty());
    }

    #[test]
    fn changes_query_is_parameterized() {
        let catalog = Catalog::movies();
        let person = catalog.stream("person").unwrap();
        let query = catalog.changes_query(person, &Watermark::min(), 100);

        assert_eq!(query.kind, QueryKind::Changes);
        assert!(query.text.contains("FROM content.person"));
        assert!(query.text.contains("ORDER BY updated_at"));
        assert_eq!(query.timestamp(), Some("1970-01-01 00:00:00+00"));
        assert_eq!(query.limit(), Some(100));
    }

    #[test]
    fn widen_query_joins_link_table() {
        let catalog = Catalog::movies();
        let genre = catalog.stream("genre").unwrap();
        let query = catalog.widen_query(genre, &["g1".into()], 1000).unwrap();

        assert!(query.text.contains("JOIN content.genre_film_work l ON l.film_work_id = u.id"));
        assert!(query.text.contains("l.genre_id = ANY($1::uuid[])"));
        assert_eq!(query.ids(), Some(&["g1".to_string()][..]));
        assert_eq!(query.limit(), Some(1000));

        assert!(catalog.widen_query(catalog.primary(), &[], 10).is_err());
    }

    #[test]
    fn aggregate_query_outer_joins_every_dependent() {
        let catalog = Catalog::movies();
        let query = catalog.aggregate_query(&["f1".into()]);

        assert_eq!(query.kind, QueryKind::Aggregate);
        assert!(query.text.contains("FROM content.film_work u"));
        assert!(query.text.contains("LEFT JOIN content.person_film_work l0"));
        assert!(query.text.contains("LEFT JOIN content.genre e1 ON e1.id = l1.genre_id"));
        assert!(query.text.contains("e0.id::text AS person_id"));
        assert!(query.text.contains("u.type AS type"));
        assert!(query.text.ends_with("WHERE u.id = ANY($1::uuid[])"));
    }
}
