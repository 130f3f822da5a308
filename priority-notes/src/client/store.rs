use std::{fmt, future::Future};

use chrono::{DateTime, Utc};

use crate::{
    ctx::{BaseParams, Ctx},
    notes::{self, handlers, CreateNote, Note, NoteStatus, Priority, UpdateNote},
    DB,
};

use super::Result;

/// Identity of a note held by the engine. Drafts live only in memory until
/// their first successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteId {
    Draft(u64),
    Persisted(notes::NoteId),
}

impl NoteId {
    pub fn is_draft(&self) -> bool {
        matches!(self, NoteId::Draft(_))
    }

    pub fn persisted(&self) -> Option<notes::NoteId> {
        match self {
            NoteId::Persisted(id) => Some(*id),
            NoteId::Draft(_) => None,
        }
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteId::Draft(n) => write!(f, "temp-{n}"),
            NoteId::Persisted(id) => write!(f, "{id}"),
        }
    }
}

impl From<notes::NoteId> for NoteId {
    fn from(id: notes::NoteId) -> Self {
        NoteId::Persisted(id)
    }
}

/// A note as the engine sees it: either a stored row or a local draft.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEntry {
    pub id: NoteId,
    pub title: Option<String>,
    pub content: String,
    pub date: DateTime<Utc>,
    pub priority: Priority,
    pub status: NoteStatus,
    pub parent_id: Option<notes::NoteId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NoteEntry {
    pub fn draft(n: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: NoteId::Draft(n),
            title: Some(String::new()),
            content: String::new(),
            date: now,
            priority: Priority::default(),
            status: NoteStatus::default(),
            parent_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Overwrites the fields present in `patch`. No trimming, no validation.
    pub fn apply(&mut self, patch: UpdateNote) {
        if let Some(title) = patch.title {
            self.title = Some(title);
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

impl From<Note> for NoteEntry {
    fn from(note: Note) -> Self {
        Self {
            id: NoteId::Persisted(note.id),
            title: note.title,
            content: note.content,
            date: note.date,
            priority: note.priority,
            status: note.status,
            parent_id: note.parent_id,
            created_at: Some(note.created_at),
            updated_at: Some(note.updated_at),
        }
    }
}

/// Remote side of the engine. Implementations act on behalf of one signed-in user.
pub trait NoteStore {
    fn list(&self) -> impl Future<Output = Result<Vec<Note>>> + Send;

    fn create(&self, note: CreateNote) -> impl Future<Output = Result<Note>> + Send;

    fn update(&self, id: notes::NoteId, patch: UpdateNote) -> impl Future<Output = Result<Note>> + Send;

    fn delete(&self, id: notes::NoteId) -> impl Future<Output = Result<()>> + Send;
}

/// In-process store running the note handlers directly against the database
/// with an explicit user context.
#[derive(Clone, Debug)]
pub struct DbNoteStore {
    base: BaseParams,
}

impl DbNoteStore {
    pub fn new(db: DB, ctx: Ctx) -> Self {
        Self {
            base: BaseParams::new(db, ctx),
        }
    }
}

impl NoteStore for DbNoteStore {
    async fn list(&self) -> Result<Vec<Note>> {
        Ok(handlers::find_notes(self.base.clone()).await?)
    }

    async fn create(&self, note: CreateNote) -> Result<Note> {
        Ok(handlers::create_note(note, self.base.clone()).await?)
    }

    async fn update(&self, id: notes::NoteId, patch: UpdateNote) -> Result<Note> {
        Ok(handlers::update_note(id, patch, self.base.clone()).await?)
    }

    async fn delete(&self, id: notes::NoteId) -> Result<()> {
        handlers::delete_note(id, self.base.clone()).await?;
        Ok(())
    }
}
