//! Rows of the unit-to-related-entity join.

use serde::{Deserialize, Serialize};

/// Role a person plays in a unit's credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Credited actor.
    Actor,
    /// Credited writer.
    Writer,
    /// Credited director.
    Director,
}

impl Role {
    /// All recognized roles.
    pub const ALL: [Role; 3] = [Role::Actor, Role::Writer, Role::Director];

    /// Parses the role name stored in the source. Unknown roles yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "actor" => Some(Role::Actor),
            "writer" => Some(Role::Writer),
            "director" => Some(Role::Director),
            _ => None,
        }
    }

    /// Returns the role name as stored in the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Actor => "actor",
            Role::Writer => "writer",
            Role::Director => "director",
        }
    }
}

/// One row of the flattened join between a unit and its related entities.
///
/// A unit with N related entities yields N rows sharing the same `id`; a unit
/// without any yields a single row whose related fields are all `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedJoinRow {
    /// Unit id.
    pub id: String,
    /// Unit title.
    pub title: String,
    /// Unit description.
    pub description: Option<String>,
    /// Unit rating.
    pub rating: Option<f64>,
    /// Unit type (movie, tv show, ...).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Unit creation timestamp.
    pub created_at: Option<String>,
    /// Unit modification timestamp.
    pub updated_at: Option<String>,
    /// Role of the related person.
    pub role: Option<String>,
    /// Related person id.
    pub person_id: Option<String>,
    /// Related person name.
    pub full_name: Option<String>,
    /// Related genre id.
    pub genre_id: Option<String>,
    /// Related genre name.
    pub genre_name: Option<String>,
}

impl FlattenedJoinRow {
    /// Creates a row for a unit without related entities.
    pub fn unit(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            rating: None,
            kind: None,
            created_at: None,
            updated_at: None,
            role: None,
            person_id: None,
            full_name: None,
            genre_id: None,
            genre_name: None,
        }
    }

    /// Sets the rating.
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Sets the related person.
    pub fn with_person(
        mut self,
        role: impl Into<String>,
        person_id: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        self.role = Some(role.into());
        self.person_id = Some(person_id.into());
        self.full_name = Some(full_name.into());
        self
    }

    /// Sets the related genre.
    pub fn with_genre(mut self, genre_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.genre_id = Some(genre_id.into());
        self.genre_name = Some(name.into());
        self
    }

    /// Returns the recognized role of the related person, if any.
    pub fn person_role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::from_name)
    }
}
