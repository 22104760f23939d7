//! Folding flattened join rows into documents.

use contentsync_model::{AggregateDocument, FlattenedJoinRow};
use std::collections::HashMap;

/// Incrementally folds join rows into one document per unit.
///
/// The first row of a unit sets its scalar fields; every row may add one
/// person and one genre. Related entities are deduplicated by id within each
/// collection, and documents come out in the order their unit first
/// appeared.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    positions: HashMap<String, usize>,
    documents: Vec<AggregateDocument>,
}

impl DocumentBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one row into the document of its unit.
    pub fn push(&mut self, row: &FlattenedJoinRow) {
        let position = match self.positions.get(&row.id) {
            Some(&position) => position,
            None => {
                self.documents.push(AggregateDocument::from_row(row));
                self.positions.insert(row.id.clone(), self.documents.len() - 1);
                self.documents.len() - 1
            }
        };
        let document = &mut self.documents[position];

        if let (Some(role), Some(id), Some(name)) =
            (row.person_role(), row.person_id.as_deref(), row.full_name.as_deref())
        {
            document.add_person(role, id, name);
        }
        if let (Some(id), Some(name)) = (row.genre_id.as_deref(), row.genre_name.as_deref()) {
            document.add_genre(id, name);
        }
    }

    /// Number of documents so far.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no row was pushed.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns the documents in first-appearance order.
    pub fn finish(self) -> Vec<AggregateDocument> {
        self.documents
    }
}

/// Folds `rows` into documents. Pure; performs no I/O.
pub fn build_documents(rows: &[FlattenedJoinRow]) -> Vec<AggregateDocument> {
    let mut builder = DocumentBuilder::new();
    for row in rows {
        builder.push(row);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentsync_model::{NamedRef, Role};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn film(id: &str) -> FlattenedJoinRow {
        FlattenedJoinRow::unit(id, format!("Film {id}")).with_rating(7.5)
    }

    #[test]
    fn same_person_as_actor_and_writer() {
        let rows = vec![
            film("f1").with_person("actor", "p1", "George Lucas"),
            film("f1").with_person("writer", "p1", "George Lucas"),
            film("f1").with_person("actor", "p1", "George Lucas"),
        ];

        let docs = build_documents(&rows);

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].people(Role::Actor), &[NamedRef::new("p1", "George Lucas")]);
        assert_eq!(docs[0].people(Role::Writer), &[NamedRef::new("p1", "George Lucas")]);
        assert_eq!(docs[0].people_names(Role::Actor), &["George Lucas".to_string()]);
        assert!(docs[0].people(Role::Director).is_empty());
    }

    #[test]
    fn unit_without_relations_has_empty_collections() {
        let docs = build_documents(&[film("f1")]);

        assert_eq!(docs.len(), 1);
        assert!(docs[0].has_no_relations());
        assert_eq!(docs[0].imdb_rating, Some(7.5));
        assert_eq!(docs[0].title, "Film f1");
    }

    #[test]
    fn documents_keep_first_appearance_order() {
        let rows = vec![
            film("f2").with_genre("g1", "Drama"),
            film("f1").with_genre("g1", "Drama"),
            film("f2").with_genre("g2", "Comedy"),
            film("f3"),
        ];

        let ids: Vec<_> = build_documents(&rows).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, ["f2", "f1", "f3"]);
    }

    #[test]
    fn cross_product_rows_are_deduplicated() {
        let rows = vec![
            film("f1").with_person("actor", "p1", "Mark Hamill").with_genre("g1", "Sci-Fi"),
            film("f1").with_person("actor", "p1", "Mark Hamill").with_genre("g2", "Adventure"),
            film("f1").with_person("director", "p2", "George Lucas").with_genre("g1", "Sci-Fi"),
            film("f1").with_person("director", "p2", "George Lucas").with_genre("g2", "Adventure"),
        ];

        let docs = build_documents(&rows);

        assert_eq!(docs[0].people(Role::Actor).len(), 1);
        assert_eq!(docs[0].people(Role::Director).len(), 1);
        assert_eq!(
            docs[0].genre_names(),
            &["Sci-Fi".to_string(), "Adventure".to_string()]
        );
    }

    #[test]
    fn unknown_roles_are_ignored() {
        let docs = build_documents(&[film("f1").with_person("producer", "p9", "Gary Kurtz")]);
        assert!(docs[0].has_no_relations());
    }

    #[test]
    fn builder_tracks_count() {
        let mut builder = DocumentBuilder::new();
        assert!(builder.is_empty());
        builder.push(&film("f1"));
        builder.push(&film("f1").with_genre("g1", "Drama"));
        assert_eq!(builder.len(), 1);
        assert_eq!(builder.finish()[0].genres().len(), 1);
    }

    fn related_row() -> impl Strategy<Value = FlattenedJoinRow> {
        (0..3usize, 0..4u8, 0..3u8).prop_map(|(role, person, genre)| {
            let role = Role::ALL[role].as_str();
            film("f1")
                .with_person(role, format!("p{person}"), format!("Person {person}"))
                .with_genre(format!("g{genre}"), format!("Genre {genre}"))
        })
    }

    fn membership(doc: &AggregateDocument) -> Vec<BTreeSet<String>> {
        let mut sets: Vec<BTreeSet<String>> = Role::ALL
            .iter()
            .map(|role| doc.people(*role).iter().map(|p| p.id.clone()).collect())
            .collect();
        sets.push(doc.genres().iter().map(|g| g.id.clone()).collect());
        sets
    }

    proptest! {
        #[test]
        fn membership_is_permutation_invariant(
            (rows, shuffled) in prop::collection::vec(related_row(), 1..20)
                .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
        ) {
            let a = build_documents(&rows);
            let b = build_documents(&shuffled);
            prop_assert_eq!(a.len(), 1);
            prop_assert_eq!(b.len(), 1);
            prop_assert_eq!(membership(&a[0]), membership(&b[0]));
        }

        #[test]
        fn collections_never_hold_duplicate_ids(
            rows in prop::collection::vec(related_row(), 0..30)
        ) {
            for doc in build_documents(&rows) {
                for role in Role::ALL {
                    let ids: BTreeSet<_> = doc.people(role).iter().map(|p| &p.id).collect();
                    prop_assert_eq!(ids.len(), doc.people(role).len());
                    prop_assert_eq!(doc.people_names(role).len(), doc.people(role).len());
                }
            }
        }
    }
}
