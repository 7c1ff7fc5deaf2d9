//! Source-side row model.

use serde::Deserialize;

/// One person relation attached to a filmwork, as aggregated by the source
/// query into a JSONB array of objects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonEdge {
    pub id: String,
    /// Raw role value from the join row. Parsed against the closed
    /// [`Role`](crate::Role) set during transformation.
    pub role: String,
    pub name: String,
}

/// One denormalized filmwork aggregate as returned by the change query.
#[derive(Debug, Clone, PartialEq)]
pub struct FilmworkRow {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub imdb_rating: Option<f64>,
    pub genres: Vec<String>,
    pub persons: Vec<PersonEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_edges_decode_from_jsonb_aggregate() {
        let raw = serde_json::json!([
            {"id": "p1", "role": "director", "name": "A"},
            {"id": "p2", "role": "actor", "name": "B"}
        ]);
        let edges: Vec<PersonEdge> = serde_json::from_value(raw).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].role, "director");
        assert_eq!(edges[1].name, "B");
    }

    #[test]
    fn empty_aggregate_decodes_to_empty_vec() {
        let edges: Vec<PersonEdge> = serde_json::from_value(serde_json::json!([])).unwrap();
        assert!(edges.is_empty());
    }
}
