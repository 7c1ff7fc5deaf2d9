//! Pure row-to-document transformation.

use moviesync_types::{FilmworkRow, MovieDoc, PersonRef, Role};

/// Map one denormalized source row into the index document shape.
///
/// Person edges are partitioned by role into the three role buckets; each
/// bucket gets a flat name list and, for actors and writers, an `{id, name}`
/// object list as well. A filmwork with no persons produces empty lists,
/// never null.
pub fn to_document(row: FilmworkRow) -> MovieDoc {
    let mut director = Vec::new();
    let mut actors_names = Vec::new();
    let mut writers_names = Vec::new();
    let mut actors = Vec::new();
    let mut writers = Vec::new();

    for edge in row.persons {
        match edge.role.parse::<Role>() {
            Ok(Role::Director) => director.push(edge.name),
            Ok(Role::Actor) => {
                actors_names.push(edge.name.clone());
                actors.push(PersonRef {
                    id: edge.id,
                    name: edge.name,
                });
            }
            Ok(Role::Writer) => {
                writers_names.push(edge.name.clone());
                writers.push(PersonRef {
                    id: edge.id,
                    name: edge.name,
                });
            }
            Err(unknown) => {
                // Inherited behavior: a role outside the closed set is
                // excluded from every bucket instead of failing the row.
                tracing::warn!(
                    filmwork = %row.id,
                    person = %edge.id,
                    role = %unknown.0,
                    "Dropping person with unrecognized role"
                );
            }
        }
    }

    MovieDoc {
        id: row.id,
        title: row.title,
        description: row.description,
        imdb_rating: row.imdb_rating,
        genre: row.genres,
        director,
        actors_names,
        writers_names,
        actors,
        writers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moviesync_types::PersonEdge;

    fn edge(id: &str, role: &str, name: &str) -> PersonEdge {
        PersonEdge {
            id: id.into(),
            role: role.into(),
            name: name.into(),
        }
    }

    fn row(persons: Vec<PersonEdge>) -> FilmworkRow {
        FilmworkRow {
            id: "fw1".into(),
            title: Some("Title".into()),
            description: Some("Desc".into()),
            imdb_rating: Some(8.1),
            genres: vec!["Drama".into(), "Sci-Fi".into()],
            persons,
        }
    }

    #[test]
    fn partitions_persons_by_role() {
        let doc = to_document(row(vec![
            edge("p1", "director", "A"),
            edge("p2", "actor", "B"),
            edge("p3", "writer", "C"),
        ]));

        assert_eq!(doc.director, vec!["A"]);
        assert_eq!(doc.actors_names, vec!["B"]);
        assert_eq!(doc.writers_names, vec!["C"]);
        assert_eq!(
            doc.actors,
            vec![PersonRef { id: "p2".into(), name: "B".into() }]
        );
        assert_eq!(
            doc.writers,
            vec![PersonRef { id: "p3".into(), name: "C".into() }]
        );
    }

    #[test]
    fn no_persons_yields_empty_lists() {
        let doc = to_document(row(vec![]));
        assert!(doc.director.is_empty());
        assert!(doc.actors_names.is_empty());
        assert!(doc.writers_names.is_empty());
        assert!(doc.actors.is_empty());
        assert!(doc.writers.is_empty());
    }

    #[test]
    fn unknown_roles_are_dropped_from_every_bucket() {
        let doc = to_document(row(vec![
            edge("p1", "producer", "X"),
            edge("p2", "actor", "B"),
        ]));
        assert_eq!(doc.actors_names, vec!["B"]);
        assert!(doc.director.is_empty());
        assert!(doc.writers.is_empty());
    }

    #[test]
    fn scalar_fields_and_genres_pass_through() {
        let doc = to_document(row(vec![]));
        assert_eq!(doc.id, "fw1");
        assert_eq!(doc.title.as_deref(), Some("Title"));
        assert_eq!(doc.imdb_rating, Some(8.1));
        assert_eq!(doc.genre, vec!["Drama", "Sci-Fi"]);
    }
}
