use crate::models::db_operations::DbError;
use crate::models::Tag;
use rusqlite::{params, params_from_iter, Connection, Row};

fn map_tag_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
    })
}

pub fn create_tag(conn: &Connection, tag: &Tag) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO tags (id, name, slug) VALUES (?1, ?2, ?3)",
        params![tag.id, tag.name, tag.slug],
    )?;
    Ok(())
}

pub fn read_all_tags(conn: &Connection) -> Result<Vec<Tag>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name, slug FROM tags ORDER BY name")?;
    let tags = stmt
        .query_map([], map_tag_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

pub fn update_tag(conn: &Connection, tag: &Tag) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE tags SET name = ?1, slug = ?2 WHERE id = ?3",
        params![tag.name, tag.slug, tag.id],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("tag {}", tag.id)));
    }
    Ok(())
}

/// Removes the tag and its post links. Posts themselves are untouched.
pub fn delete_tag(conn: &Connection, tag_id: &str) -> Result<usize, DbError> {
    conn.execute("DELETE FROM post_tags WHERE tag_id = ?1", [tag_id])?;
    Ok(conn.execute("DELETE FROM tags WHERE id = ?1", [tag_id])?)
}

pub fn read_tags_for_post(conn: &Connection, post_id: &str) -> Result<Vec<Tag>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.slug FROM tags t
         JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ?1 ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map([post_id], map_tag_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

/// Resolves tag ids to tags, returning the ids that do not exist separately.
pub fn resolve_tags(conn: &Connection, tag_ids: &[String]) -> Result<(Vec<Tag>, Vec<String>), DbError> {
    if tag_ids.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let placeholders = vec!["?"; tag_ids.len()].join(", ");
    let sql = format!("SELECT id, name, slug FROM tags WHERE id IN ({}) ORDER BY name", placeholders);
    let mut stmt = conn.prepare(&sql)?;
    let found = stmt
        .query_map(params_from_iter(tag_ids.iter()), map_tag_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let missing = tag_ids
        .iter()
        .filter(|id| !found.iter().any(|t| &t.id == *id))
        .cloned()
        .collect();
    Ok((found, missing))
}

pub fn replace_post_tags(conn: &Connection, post_id: &str, tag_ids: &[String]) -> Result<(), DbError> {
    conn.execute("DELETE FROM post_tags WHERE post_id = ?1", [post_id])?;
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)")?;
    for tag_id in tag_ids {
        stmt.execute(params![post_id, tag_id])?;
    }
    Ok(())
}
