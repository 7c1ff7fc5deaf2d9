//! Index-side document model.

use serde::Serialize;

/// `{id, name}` pair nested inside the actors/writers document fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonRef {
    pub id: String,
    pub name: String,
}

/// The denormalized document written to the search index.
///
/// `id` doubles as the index `_id`, so re-writing a document with the same
/// id is a full replace. The role lists are always present, empty when the
/// filmwork has no related persons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieDoc {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub imdb_rating: Option<f64>,
    pub genre: Vec<String>,
    pub director: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub actors: Vec<PersonRef>,
    pub writers: Vec<PersonRef>,
}
