use rusqlite::{params, OptionalExtension, Row};
use sea_query::{Expr, Iden, Order, Query, SqliteQueryBuilder};
use sea_query_rusqlite::RusqliteBinder;

use crate::{ctx::BaseParams, Error, Result};

use super::{is_blank, CreateNote, Note, NoteId, NoteStatus, UpdateNote};

#[derive(Iden)]
pub enum Notes {
    Table,
    Id,
    OwnerId,
    ParentId,
    Title,
    Content,
    Date,
    Priority,
    Status,
    CreatedAt,
    UpdatedAt,
}

const NOTE_COLUMNS: &str = "id, title, content, date, priority, status, parent_id, created_at, updated_at";

impl<'a> TryFrom<&Row<'a>> for Note {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'a>) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            date: row.get(3)?,
            priority: row.get(4)?,
            status: row.get(5)?,
            parent_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

fn require_known_status(status: Option<&NoteStatus>) -> Result<()> {
    match status {
        Some(status) if !status.is_recognized() => Err(Error::Validation(format!("Unknown status '{status}'"))),
        _ => Ok(()),
    }
}

/// All notes of the caller, most urgent first, then newest date, then most recently edited.
pub async fn find_notes(BaseParams { db, ctx }: BaseParams) -> Result<Vec<Note>> {
    let user_id = ctx.require_user_id()?;

    let notes = db
        .call(move |conn| {
            let (sql, values) = Query::select()
                .columns([
                    Notes::Id,
                    Notes::Title,
                    Notes::Content,
                    Notes::Date,
                    Notes::Priority,
                    Notes::Status,
                    Notes::ParentId,
                    Notes::CreatedAt,
                    Notes::UpdatedAt,
                ])
                .from(Notes::Table)
                .and_where(Expr::col(Notes::OwnerId).eq(user_id))
                .order_by(Notes::Priority, Order::Desc)
                .order_by(Notes::Date, Order::Desc)
                .order_by(Notes::UpdatedAt, Order::Desc)
                .build_rusqlite(SqliteQueryBuilder);

            let notes = conn
                .prepare(&sql)?
                .query_map(&*values.as_params(), |row| Note::try_from(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(notes)
        })
        .await?;

    Ok(notes)
}

pub async fn get_note(note_id: NoteId, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;

    db.call(move |conn| {
        conn.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ? AND owner_id = ?"),
            params![note_id, user_id],
            |row| Note::try_from(row),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound("Note not found".into()).into())
    })
    .await
    .map_err(Error::from)
}

/// Creates a note owned by the caller. Empty title and content are accepted here;
/// the non-empty rule applies to updates.
pub async fn create_note(
    CreateNote {
        title,
        content,
        parent_id,
        date,
        priority,
        status,
    }: CreateNote,
    BaseParams { db, ctx }: BaseParams,
) -> Result<Note> {
    let user_id = ctx.require_user_id()?;
    require_known_status(status.as_ref())?;

    let title = title.unwrap_or_default().trim().to_string();
    let content = content.unwrap_or_default().trim().to_string();
    let date = date.unwrap_or_else(chrono::Utc::now);
    let priority = priority.unwrap_or_default();
    let status = status.unwrap_or_default();

    let note = db
        .call(move |conn| {
            let tx = conn.transaction()?;

            if let Some(parent_id) = parent_id {
                let owned: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ? AND owner_id = ?)",
                    params![parent_id, user_id],
                    |row| row.get(0),
                )?;
                if !owned {
                    return Err(Error::NotFound("Parent note not found".into()).into());
                }
            }

            let now = chrono::Utc::now();
            let note = tx.query_row(
                &format!(
                    r#"INSERT INTO notes (owner_id, parent_id, title, content, date, priority, status, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    RETURNING {NOTE_COLUMNS}"#
                ),
                params![user_id, parent_id, title, content, date, priority, status, now, now],
                |row| Note::try_from(row),
            )?;

            tx.commit()?;
            Ok(note)
        })
        .await?;

    tracing::debug!(note_id = %note.id, "note created");

    Ok(note)
}

/// Applies a partial patch to a note owned by the caller.
///
/// The ownership lookup, the blank check against the merged title/content and
/// the write run in one transaction. Notes of other users are reported as not found.
pub async fn update_note(note_id: NoteId, patch: UpdateNote, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;
    require_known_status(patch.status.as_ref())?;

    let UpdateNote {
        title,
        content,
        date,
        priority,
        status,
    } = patch.trimmed();

    let note = db
        .call(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<(Option<String>, String)> = tx
                .query_row(
                    "SELECT title, content FROM notes WHERE id = ? AND owner_id = ?",
                    params![note_id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((current_title, current_content)) = existing else {
                return Err(Error::NotFound("Note not found".into()).into());
            };

            let merged_title = title.as_deref().or(current_title.as_deref());
            let merged_content = content.as_deref().unwrap_or(&current_content);
            if is_blank(merged_title, Some(merged_content)) {
                return Err(Error::Validation("Title or content is required".into()).into());
            }

            let note = tx.query_row(
                &format!(
                    r#"UPDATE notes SET
                        title = coalesce(?, title),
                        content = coalesce(?, content),
                        date = coalesce(?, date),
                        priority = coalesce(?, priority),
                        status = coalesce(?, status),
                        updated_at = ?
                    WHERE id = ? AND owner_id = ?
                    RETURNING {NOTE_COLUMNS}"#
                ),
                params![title, content, date, priority, status, chrono::Utc::now(), note_id, user_id],
                |row| Note::try_from(row),
            )?;

            tx.commit()?;
            Ok(note)
        })
        .await?;

    tracing::debug!(note_id = %note.id, "note updated");

    Ok(note)
}

pub async fn delete_note(note_id: NoteId, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let user_id = ctx.require_user_id()?;

    let note = db
        .call(move |conn| {
            conn.query_row(
                &format!("DELETE FROM notes WHERE id = ? AND owner_id = ? RETURNING {NOTE_COLUMNS}"),
                params![note_id, user_id],
                |row| Note::try_from(row),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound("Note not found".into()).into())
        })
        .await?;

    tracing::debug!(note_id = %note.id, "note deleted");

    Ok(note)
}
