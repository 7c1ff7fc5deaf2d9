//! SQL used against the relational source.

/// Emptiness probe: is there at least one filmwork row at all?
pub(crate) const SELECT_ANY_FILMWORK: &str = "SELECT id FROM content.film_work LIMIT 1";

/// Changed-filmwork selection. One `$1 = since` parameter, compared against
/// the `updated_at` of the aggregate and of every related row, so an edit
/// anywhere in the aggregate re-selects the filmwork.
///
/// Genres aggregate to `text[]`; persons aggregate to a JSONB array of
/// `{id, role, name}` objects so the relation crosses the boundary as
/// structured values rather than a delimiter-encoded string. Both aggregates
/// coalesce to empty when the filmwork has no relations.
pub(crate) const SELECT_CHANGED_FILMWORKS: &str = "\
SELECT fw.id::text AS id,
       fw.title AS title,
       fw.description AS description,
       fw.rating AS imdb_rating,
       COALESCE(ARRAY_AGG(DISTINCT g.name) FILTER (WHERE g.name IS NOT NULL),
                ARRAY[]::text[]) AS genre,
       COALESCE(JSONB_AGG(DISTINCT JSONB_BUILD_OBJECT(
                    'id', p.id::text,
                    'role', pfw.role,
                    'name', p.full_name))
                FILTER (WHERE p.id IS NOT NULL),
                '[]'::jsonb) AS persons
FROM content.film_work fw
         LEFT JOIN content.person_film_work pfw ON fw.id = pfw.film_work_id
         LEFT JOIN content.person p ON pfw.person_id = p.id
         LEFT JOIN content.genre_film_work gfw ON fw.id = gfw.film_work_id
         LEFT JOIN content.genre g ON gfw.genre_id = g.id
GROUP BY fw.id
HAVING MAX(fw.updated_at) > $1
    OR MAX(p.updated_at) > $1
    OR MAX(gfw.updated_at) > $1
    OR MAX(pfw.updated_at) > $1
    OR MAX(g.updated_at) > $1";

/// Server-side cursor name used for streaming reads.
pub(crate) const CURSOR_NAME: &str = "moviesync_cursor";

/// Number of rows pulled per server-side cursor iteration.
pub(crate) const FETCH_CHUNK: usize = 100;
