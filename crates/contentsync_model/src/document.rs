//! Documents written to the search index.

use crate::row::{FlattenedJoinRow, Role};
use serde::{Deserialize, Serialize};

/// An `{id, name}` reference to a related entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedRef {
    /// Related entity id.
    pub id: String,
    /// Related entity display name.
    pub name: String,
}

impl NamedRef {
    /// Creates a reference.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The fully joined representation of one unit.
///
/// Each nested collection is kept twice: as a flat name list for full-text
/// matching and as `{id, name}` records for filtering. Both lists of a
/// collection always have the same length and order.
///
/// # Invariants
///
/// - A related entity id appears at most once per collection
/// - Collections keep the order in which entities were first added
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDocument {
    /// Unit id, also the index document id.
    pub id: String,
    /// Unit rating.
    pub imdb_rating: Option<f64>,
    /// Unit type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Unit title.
    pub title: String,
    /// Unit description.
    pub description: Option<String>,
    /// Unit creation timestamp.
    pub created_at: Option<String>,
    /// Unit modification timestamp.
    pub updated_at: Option<String>,
    genre: Vec<String>,
    genres: Vec<NamedRef>,
    directors_names: Vec<String>,
    actors_names: Vec<String>,
    writers_names: Vec<String>,
    directors: Vec<NamedRef>,
    actors: Vec<NamedRef>,
    writers: Vec<NamedRef>,
}

impl AggregateDocument {
    /// Creates a document from the unit columns of a join row, with empty
    /// collections.
    pub fn from_row(row: &FlattenedJoinRow) -> Self {
        Self {
            id: row.id.clone(),
            imdb_rating: row.rating,
            kind: row.kind.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
            genre: Vec::new(),
            genres: Vec::new(),
            directors_names: Vec::new(),
            actors_names: Vec::new(),
            writers_names: Vec::new(),
            directors: Vec::new(),
            actors: Vec::new(),
            writers: Vec::new(),
        }
    }

    /// Adds a credited person unless the id is already listed for `role`.
    ///
    /// Returns true if the person was added.
    pub fn add_person(&mut self, role: Role, id: &str, name: &str) -> bool {
        let (names, refs) = match role {
            Role::Actor => (&mut self.actors_names, &mut self.actors),
            Role::Writer => (&mut self.writers_names, &mut self.writers),
            Role::Director => (&mut self.directors_names, &mut self.directors),
        };
        push_unique(names, refs, id, name)
    }

    /// Adds a genre unless the id is already listed.
    ///
    /// Returns true if the genre was added.
    pub fn add_genre(&mut self, id: &str, name: &str) -> bool {
        push_unique(&mut self.genre, &mut self.genres, id, name)
    }

    /// Persons credited with `role`, in first-seen order.
    pub fn people(&self, role: Role) -> &[NamedRef] {
        match role {
            Role::Actor => &self.actors,
            Role::Writer => &self.writers,
            Role::Director => &self.directors,
        }
    }

    /// Names of persons credited with `role`, in first-seen order.
    pub fn people_names(&self, role: Role) -> &[String] {
        match role {
            Role::Actor => &self.actors_names,
            Role::Writer => &self.writers_names,
            Role::Director => &self.directors_names,
        }
    }

    /// Genres, in first-seen order.
    pub fn genres(&self) -> &[NamedRef] {
        &self.genres
    }

    /// Genre names, in first-seen order.
    pub fn genre_names(&self) -> &[String] {
        &self.genre
    }

    /// Returns true if no related entity was attached.
    pub fn has_no_relations(&self) -> bool {
        self.genres.is_empty() && Role::ALL.iter().all(|role| self.people(*role).is_empty())
    }
}

fn push_unique(names: &mut Vec<String>, refs: &mut Vec<NamedRef>, id: &str, name: &str) -> bool {
    if refs.iter().any(|existing| existing.id == id) {
        return false;
    }
    names.push(name.to_string());
    refs.push(NamedRef::new(id, name));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> AggregateDocument {
        AggregateDocument::from_row(&FlattenedJoinRow::unit("f1", "Star Wars").with_rating(8.6))
    }

    #[test]
    fn new_document_has_empty_collections() {
        let doc = doc();
        assert_eq!(doc.id, "f1");
        assert_eq!(doc.imdb_rating, Some(8.6));
        assert!(doc.has_no_relations());
    }

    #[test]
    fn add_person_deduplicates_per_role() {
        let mut doc = doc();
        assert!(doc.add_person(Role::Actor, "p1", "Mark Hamill"));
        assert!(!doc.add_person(Role::Actor, "p1", "Mark Hamill"));
        assert!(doc.add_person(Role::Writer, "p1", "Mark Hamill"));

        assert_eq!(doc.people(Role::Actor), &[NamedRef::new("p1", "Mark Hamill")]);
        assert_eq!(doc.people_names(Role::Writer), &["Mark Hamill".to_string()]);
        assert!(doc.people(Role::Director).is_empty());
    }

    #[test]
    fn serializes_index_field_names() {
        let mut doc = doc();
        doc.add_genre("g1", "Sci-Fi");
        doc.add_person(Role::Director, "p9", "George Lucas");

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["genre"], serde_json::json!(["Sci-Fi"]));
        assert_eq!(value["genres"][0]["id"], "g1");
        assert_eq!(value["directors_names"], serde_json::json!(["George Lucas"]));
        assert_eq!(value["actors"], serde_json::json!([]));
        assert_eq!(value["imdb_rating"], 8.6);
        assert!(value.get("kind").is_none());
    }
}
