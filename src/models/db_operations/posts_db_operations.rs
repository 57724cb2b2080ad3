use crate::models::db_operations::{tags_db_operations, DbError};
use crate::models::{Post, PostNote, PostStatus};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const POST_COLUMNS: &str = "id, title, slug, excerpt, content, status, author_id, assigned_to, created_by, \
     submitted_at, approved_by, approved_at, admin_note, published_at, trashed, trashed_at, views, \
     created_at, updated_at";

fn map_post_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        excerpt: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        author_id: row.get(6)?,
        assigned_to: row.get(7)?,
        created_by: row.get(8)?,
        submitted_at: row.get(9)?,
        approved_by: row.get(10)?,
        approved_at: row.get(11)?,
        admin_note: row.get(12)?,
        published_at: row.get(13)?,
        trashed: row.get(14)?,
        trashed_at: row.get(15)?,
        views: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
        tags: Vec::new(),
    })
}

fn with_tags(conn: &Connection, mut post: Post) -> Result<Post, DbError> {
    post.tags = tags_db_operations::read_tags_for_post(conn, &post.id)?;
    Ok(post)
}

/// Which slice of the posts table a listing covers.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub trashed: Option<bool>,
    pub assigned: Option<bool>,
    /// Posts where this user is author or assignee.
    pub involving_user: Option<String>,
    pub tag_slug: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostOrder {
    #[default]
    UpdatedDesc,
    SubmittedDesc,
    PublishedDesc,
    TrashedDesc,
}

impl PostOrder {
    fn sql(&self) -> &'static str {
        match self {
            PostOrder::UpdatedDesc => "p.updated_at DESC, p.id",
            PostOrder::SubmittedDesc => "p.submitted_at DESC, p.id",
            PostOrder::PublishedDesc => "p.published_at DESC, p.id",
            PostOrder::TrashedDesc => "p.trashed_at DESC, p.id",
        }
    }
}

pub fn insert_post(conn: &Connection, post: &Post) -> Result<(), DbError> {
    let sql = format!(
        "INSERT INTO posts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        POST_COLUMNS
    );
    conn.execute(
        &sql,
        params![
            post.id,
            post.title,
            post.slug,
            post.excerpt,
            post.content,
            post.status,
            post.author_id,
            post.assigned_to,
            post.created_by,
            post.submitted_at,
            post.approved_by,
            post.approved_at,
            post.admin_note,
            post.published_at,
            post.trashed,
            post.trashed_at,
            post.views,
            post.created_at,
            post.updated_at
        ],
    )?;
    tags_db_operations::replace_post_tags(conn, &post.id, &post.tag_ids())?;
    Ok(())
}

pub fn read_post(conn: &Connection, post_id: &str) -> Result<Option<Post>, DbError> {
    let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
    match conn.query_row(&sql, [post_id], map_post_row).optional()? {
        Some(post) => Ok(Some(with_tags(conn, post)?)),
        None => Ok(None),
    }
}

pub fn read_post_by_slug(conn: &Connection, slug: &str) -> Result<Option<Post>, DbError> {
    let sql = format!("SELECT {} FROM posts WHERE slug = ?1", POST_COLUMNS);
    match conn.query_row(&sql, [slug], map_post_row).optional()? {
        Some(post) => Ok(Some(with_tags(conn, post)?)),
        None => Ok(None),
    }
}

/// Writes every mutable column of `post` back to its row, tags included.
/// Views are left alone: they only move through [`increment_views`].
pub fn update_post(conn: &Connection, post: &Post) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE posts SET title = ?1, slug = ?2, excerpt = ?3, content = ?4, status = ?5,
             author_id = ?6, assigned_to = ?7, submitted_at = ?8, approved_by = ?9, approved_at = ?10,
             admin_note = ?11, published_at = ?12, trashed = ?13, trashed_at = ?14, updated_at = ?15
         WHERE id = ?16",
        params![
            post.title,
            post.slug,
            post.excerpt,
            post.content,
            post.status,
            post.author_id,
            post.assigned_to,
            post.submitted_at,
            post.approved_by,
            post.approved_at,
            post.admin_note,
            post.published_at,
            post.trashed,
            post.trashed_at,
            post.updated_at,
            post.id
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("post {}", post.id)));
    }
    tags_db_operations::replace_post_tags(conn, &post.id, &post.tag_ids())?;
    Ok(())
}

/// Hard delete. Tag links and notes go first so the row can be removed.
pub fn delete_post(conn: &Connection, post_id: &str) -> Result<usize, DbError> {
    conn.execute("DELETE FROM post_tags WHERE post_id = ?1", [post_id])?;
    conn.execute("DELETE FROM post_notes WHERE post_id = ?1", [post_id])?;
    Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [post_id])?)
}

pub fn list_posts(
    conn: &Connection,
    filter: &PostFilter,
    order: PostOrder,
    limit: u32,
    offset: u32,
) -> Result<Vec<Post>, DbError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("p.status = ?");
        values.push(Box::new(status));
    }
    if let Some(trashed) = filter.trashed {
        clauses.push("p.trashed = ?");
        values.push(Box::new(trashed));
    }
    match filter.assigned {
        Some(true) => clauses.push("p.assigned_to IS NOT NULL"),
        Some(false) => clauses.push("p.assigned_to IS NULL"),
        None => {}
    }
    if let Some(user_id) = &filter.involving_user {
        clauses.push("(p.author_id = ? OR p.assigned_to = ?)");
        values.push(Box::new(user_id.clone()));
        values.push(Box::new(user_id.clone()));
    }
    if let Some(tag_slug) = &filter.tag_slug {
        clauses.push(
            "EXISTS (SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                     WHERE pt.post_id = p.id AND t.slug = ?)",
        );
        values.push(Box::new(tag_slug.clone()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let columns = POST_COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM posts p {} ORDER BY {} LIMIT ? OFFSET ?",
        columns,
        where_sql,
        order.sql()
    );
    values.push(Box::new(limit));
    values.push(Box::new(offset));

    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params_from_iter(values.iter()), map_post_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    posts.into_iter().map(|post| with_tags(conn, post)).collect()
}

/// Atomic counter bump; only published, untrashed posts count views.
pub fn increment_views(conn: &Connection, post_id: &str) -> Result<usize, DbError> {
    Ok(conn.execute(
        "UPDATE posts SET views = views + 1 WHERE id = ?1 AND status = 'published' AND trashed = 0",
        [post_id],
    )?)
}

/// Points every post reference to `from` at `to`. Returns the number of
/// posts touched.
pub fn reassign_user_posts(conn: &Connection, from: &str, to: &str) -> Result<usize, DbError> {
    let touched = conn.query_row(
        "SELECT COUNT(*) FROM posts
         WHERE author_id = ?1 OR assigned_to = ?1 OR created_by = ?1 OR approved_by = ?1",
        [from],
        |row| row.get::<_, i64>(0),
    )?;
    conn.execute("UPDATE posts SET author_id = ?2 WHERE author_id = ?1", params![from, to])?;
    conn.execute("UPDATE posts SET assigned_to = ?2 WHERE assigned_to = ?1", params![from, to])?;
    conn.execute("UPDATE posts SET created_by = ?2 WHERE created_by = ?1", params![from, to])?;
    conn.execute("UPDATE posts SET approved_by = ?2 WHERE approved_by = ?1", params![from, to])?;
    conn.execute("UPDATE post_notes SET author_id = ?2 WHERE author_id = ?1", params![from, to])?;
    Ok(touched as usize)
}

// --- Notes ---

pub fn insert_note(conn: &Connection, note: &PostNote) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO post_notes (id, post_id, author_id, note, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![note.id, note.post_id, note.author_id, note.note, note.created_at],
    )?;
    Ok(())
}

pub fn read_notes(conn: &Connection, post_id: &str) -> Result<Vec<PostNote>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, post_id, author_id, note, created_at FROM post_notes
         WHERE post_id = ?1 ORDER BY created_at, rowid",
    )?;
    let notes = stmt
        .query_map([post_id], |row| {
            Ok(PostNote {
                id: row.get(0)?,
                post_id: row.get(1)?,
                author_id: row.get(2)?,
                note: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(notes)
}
