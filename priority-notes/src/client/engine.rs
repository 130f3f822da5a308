use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::notes::{is_blank, CreateNote, UpdateNote};

use super::{view::DateGroup, Error, NoteEntry, NoteId, NoteStore, Result, Sidebar};

/// Viewports narrower than this many pixels show the sidebar as an overlay.
pub const COMPACT_VIEWPORT_WIDTH: u32 = 768;

const BLANK_NOTE: &str = "Title or content is required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
}

impl Viewport {
    pub fn is_compact(&self) -> bool {
        self.width < COMPACT_VIEWPORT_WIDTH
    }
}

/// What the UI should do with the sidebar after a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    CloseSidebar,
}

/// Read-only view of the engine's saving flag, usable while a save holds the engine.
#[derive(Debug, Clone)]
pub struct SavingHandle(Arc<AtomicBool>);

impl SavingHandle {
    pub fn is_saving(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raises the saving flag for its own lifetime, so the flag drops back on
/// success, on error and when the save future is dropped mid-flight.
struct SavingGuard(Arc<AtomicBool>);

impl SavingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag.clone())
    }
}

impl Drop for SavingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Client-side note state: the loaded notes with any local edits applied on
/// top, the active note and the sidebar. Store calls happen only in `load`,
/// `save` and `delete_note`; every other operation is local and synchronous.
///
/// Mutating operations take `&mut self`, so one engine never has two saves in flight.
pub struct NoteEngine<S> {
    store: S,
    notes: Vec<NoteEntry>,
    active_id: Option<NoteId>,
    saving: Arc<AtomicBool>,
    sidebar: Sidebar,
    next_draft: u64,
}

impl<S: NoteStore> NoteEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            notes: Vec::new(),
            active_id: None,
            saving: Arc::new(AtomicBool::new(false)),
            sidebar: Sidebar::default(),
            next_draft: 1,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notes(&self) -> &[NoteEntry] {
        &self.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&NoteEntry> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn active_note_id(&self) -> Option<NoteId> {
        self.active_id
    }

    pub fn active_note(&self) -> Option<&NoteEntry> {
        self.active_id.and_then(|id| self.note(id))
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    pub fn saving_handle(&self) -> SavingHandle {
        SavingHandle(self.saving.clone())
    }

    pub fn sidebar(&self) -> &Sidebar {
        &self.sidebar
    }

    pub fn sidebar_mut(&mut self) -> &mut Sidebar {
        &mut self.sidebar
    }

    /// Sidebar groups for the current notes as seen at `now`.
    pub fn view<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<DateGroup<'_>> {
        self.sidebar.derive(&self.notes, now)
    }

    /// `view` at the current time in the system timezone.
    pub fn view_local(&self) -> Vec<DateGroup<'_>> {
        self.view(&Local::now())
    }

    /// Replaces the local notes with the store listing. Unsaved drafts and
    /// local edits are discarded. On failure nothing changes.
    pub async fn load(&mut self) -> Result<()> {
        let mut notes = self
            .store
            .list()
            .await?
            .into_iter()
            .map(NoteEntry::from)
            .collect::<Vec<_>>();

        notes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.date.cmp(&a.date))
                .then(b.updated_at.cmp(&a.updated_at))
        });
        self.notes = notes;

        if self.active_note().is_none() {
            self.active_id = self.notes.first().map(|note| note.id);
        }

        tracing::debug!(count = self.notes.len(), "notes loaded");
        Ok(())
    }

    pub fn select_note(&mut self, id: NoteId, viewport: Viewport) -> Navigation {
        self.active_id = Some(id);
        if viewport.is_compact() {
            Navigation::CloseSidebar
        } else {
            Navigation::Stay
        }
    }

    /// Prepends an empty draft, makes it active and resets the sidebar.
    pub fn create_draft(&mut self) -> NoteId {
        let draft = NoteEntry::draft(self.next_draft, Utc::now());
        self.next_draft += 1;

        let id = draft.id;
        self.notes.insert(0, draft);
        self.active_id = Some(id);
        self.sidebar.reset();
        id
    }

    /// Applies `patch` to the local copy only. Unknown ids are ignored.
    pub fn update_local(&mut self, id: NoteId, patch: UpdateNote) {
        if let Some(note) = self.notes.iter_mut().find(|note| note.id == id) {
            note.apply(patch);
        }
    }

    /// Writes a note to the store and replaces the local copy with the stored one.
    ///
    /// Drafts are created from their merged fields and take the store's id, which
    /// becomes the active id. Persisted notes are sent only the fields in `patch`;
    /// if that update fails the local notes are reloaded and the update error is
    /// returned.
    pub async fn save(&mut self, id: NoteId, patch: UpdateNote) -> Result<NoteId> {
        let index = self.position(id)?;
        let patch = patch.trimmed();
        let current = &self.notes[index];

        let title = patch.title.as_deref().or(current.title.as_deref());
        let content = patch.content.as_deref().unwrap_or(&current.content);
        if is_blank(title, Some(content)) {
            return Err(Error::ValidationFailed(BLANK_NOTE.into()));
        }

        match id {
            NoteId::Draft(_) => {
                let note = CreateNote {
                    title: title.map(|t| t.trim().to_string()),
                    content: Some(content.trim().to_string()),
                    parent_id: current.parent_id,
                    date: Some(patch.date.unwrap_or(current.date)),
                    priority: Some(patch.priority.unwrap_or(current.priority)),
                    status: Some(patch.status.unwrap_or_else(|| current.status.clone())),
                };

                let created = {
                    let _saving = SavingGuard::acquire(&self.saving);
                    self.store.create(note).await?
                };

                let new_id = NoteId::Persisted(created.id);
                self.notes[index] = NoteEntry::from(created);
                self.active_id = Some(new_id);

                tracing::debug!(draft = %id, note_id = %new_id, "draft saved");
                Ok(new_id)
            }
            NoteId::Persisted(note_id) => {
                let updated = {
                    let _saving = SavingGuard::acquire(&self.saving);
                    self.store.update(note_id, patch).await
                };

                match updated {
                    Ok(note) => {
                        self.notes[index] = NoteEntry::from(note);
                        Ok(id)
                    }
                    Err(error) => {
                        tracing::warn!(note_id = %id, "save failed, reloading notes: {error}");
                        if let Err(reload_error) = self.load().await {
                            tracing::warn!("reload after failed save failed: {reload_error}");
                        }
                        Err(error)
                    }
                }
            }
        }
    }

    /// Removes a note. Persisted notes are deleted from the store first; if
    /// that fails nothing changes locally. A deleted active note hands the
    /// active slot to the first remaining note.
    pub async fn delete_note(&mut self, id: NoteId) -> Result<()> {
        let index = self.position(id)?;

        if let NoteId::Persisted(note_id) = id {
            self.store.delete(note_id).await?;
        }

        self.notes.remove(index);
        if self.active_id == Some(id) {
            self.active_id = self.notes.first().map(|note| note.id);
        }
        Ok(())
    }

    fn position(&self, id: NoteId) -> Result<usize> {
        self.notes
            .iter()
            .position(|note| note.id == id)
            .ok_or_else(|| Error::NotFound(format!("Note '{id}' not found")))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        client::DbNoteStore,
        ctx::{Ctx, User},
        db::init_test_db,
        notes::{Note, NoteStatus, Priority},
    };

    #[derive(Default)]
    struct MockState {
        notes: Vec<Note>,
        calls: usize,
        fail_writes: bool,
        hang_writes: bool,
        saving_watch: Option<SavingHandle>,
        saving_seen: bool,
    }

    #[derive(Clone, Default)]
    struct MockStore(Arc<Mutex<MockState>>);

    impl MockStore {
        fn with_notes(notes: Vec<Note>) -> Self {
            let store = Self::default();
            store.0.lock().unwrap().notes = notes;
            store
        }

        fn calls(&self) -> usize {
            self.0.lock().unwrap().calls
        }

        fn set(&self, f: impl FnOnce(&mut MockState)) {
            f(&mut self.0.lock().unwrap());
        }

        /// Counts the call, records the saving flag and reports whether it should hang.
        fn begin_write(&self) -> Result<bool> {
            let mut state = self.0.lock().unwrap();
            state.calls += 1;
            if let Some(handle) = &state.saving_watch {
                state.saving_seen |= handle.is_saving();
            }
            if state.fail_writes {
                return Err(Error::Store("write refused".into()));
            }
            Ok(state.hang_writes)
        }
    }

    impl NoteStore for MockStore {
        async fn list(&self) -> Result<Vec<Note>> {
            let mut state = self.0.lock().unwrap();
            state.calls += 1;
            Ok(state.notes.clone())
        }

        async fn create(&self, note: CreateNote) -> Result<Note> {
            if self.begin_write()? {
                std::future::pending::<()>().await;
            }
            let now = Utc::now();
            let created = Note {
                id: Uuid::now_v7(),
                title: note.title,
                content: note.content.unwrap_or_default(),
                date: note.date.unwrap_or(now),
                priority: note.priority.unwrap_or_default(),
                status: note.status.unwrap_or_default(),
                parent_id: note.parent_id,
                created_at: now,
                updated_at: now,
            };
            self.0.lock().unwrap().notes.push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: Uuid, patch: UpdateNote) -> Result<Note> {
            self.begin_write()?;
            let mut state = self.0.lock().unwrap();
            let note = state
                .notes
                .iter_mut()
                .find(|note| note.id == id)
                .ok_or_else(|| Error::NotFound("Note not found".into()))?;
            if let Some(title) = patch.title {
                note.title = Some(title);
            }
            if let Some(content) = patch.content {
                note.content = content;
            }
            if let Some(priority) = patch.priority {
                note.priority = priority;
            }
            if let Some(status) = patch.status {
                note.status = status;
            }
            note.updated_at = Utc::now();
            Ok(note.clone())
        }

        async fn delete(&self, id: Uuid) -> Result<()> {
            self.begin_write()?;
            self.0.lock().unwrap().notes.retain(|note| note.id != id);
            Ok(())
        }
    }

    fn stored(title: &str, priority: Priority, date: &str) -> Note {
        let date = DateTime::parse_from_rfc3339(date).unwrap().with_timezone(&Utc);
        Note {
            id: Uuid::now_v7(),
            title: Some(title.into()),
            content: format!("{title} body"),
            date,
            priority,
            status: NoteStatus::NotStarted,
            parent_id: None,
            created_at: date,
            updated_at: date,
        }
    }

    fn scenario() -> Vec<Note> {
        vec![
            stored("B", Priority::Normal, "2024-01-02T09:00:00Z"),
            stored("A", Priority::Urgent, "2024-01-02T10:00:00Z"),
            stored("C", Priority::Major, "2024-01-01T10:00:00Z"),
        ]
    }

    fn titles<S: NoteStore>(engine: &NoteEngine<S>) -> Vec<String> {
        engine
            .notes()
            .iter()
            .map(|n| n.title.clone().unwrap_or_default())
            .collect()
    }

    fn title(text: &str) -> UpdateNote {
        UpdateNote {
            title: Some(text.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn load_orders_notes_and_activates_first() {
        let mut engine = NoteEngine::new(MockStore::with_notes(scenario()));
        engine.load().await.unwrap();

        assert_eq!(titles(&engine), ["A", "C", "B"]);
        assert_eq!(engine.active_note().and_then(|n| n.title.as_deref()), Some("A"));
    }

    #[tokio::test]
    async fn load_keeps_an_existing_active_note() {
        let mut engine = NoteEngine::new(MockStore::with_notes(scenario()));
        engine.load().await.unwrap();
        let c = engine.notes()[1].id;
        engine.select_note(c, Viewport { width: 1024 });

        engine.load().await.unwrap();
        assert_eq!(engine.active_note_id(), Some(c));
    }

    #[tokio::test]
    async fn load_failure_leaves_state_untouched() {
        struct Offline;

        impl NoteStore for Offline {
            async fn list(&self) -> Result<Vec<Note>> {
                Err(Error::Store("offline".into()))
            }
            async fn create(&self, _: CreateNote) -> Result<Note> {
                Err(Error::Store("offline".into()))
            }
            async fn update(&self, _: Uuid, _: UpdateNote) -> Result<Note> {
                Err(Error::Store("offline".into()))
            }
            async fn delete(&self, _: Uuid) -> Result<()> {
                Err(Error::Store("offline".into()))
            }
        }

        let mut engine = NoteEngine::new(Offline);
        let draft = engine.create_draft();

        assert!(engine.load().await.is_err());
        assert_eq!(engine.notes().len(), 1);
        assert_eq!(engine.active_note_id(), Some(draft));
    }

    #[test]
    fn select_note_closes_sidebar_on_compact_viewports() {
        let mut engine = NoteEngine::new(MockStore::default());
        let draft = engine.create_draft();

        assert_eq!(engine.select_note(draft, Viewport { width: 767 }), Navigation::CloseSidebar);
        assert_eq!(engine.select_note(draft, Viewport { width: 768 }), Navigation::Stay);
        assert_eq!(engine.active_note_id(), Some(draft));
    }

    #[test]
    fn drafts_are_distinct_and_prepended() {
        let mut engine = NoteEngine::new(MockStore::default());
        engine.sidebar_mut().set_search("old search");

        let first = engine.create_draft();
        let second = engine.create_draft();

        assert_ne!(first, second);
        assert!(first.is_draft() && second.is_draft());
        assert_eq!(engine.notes()[0].id, second);
        assert_eq!(engine.active_note_id(), Some(second));
        assert_eq!(engine.notes()[0].priority, Priority::Normal);
        assert_eq!(engine.notes()[0].status, NoteStatus::NotStarted);
        assert!(!engine.sidebar().filter().is_active());
        assert_eq!(engine.store().calls(), 0);
    }

    #[test]
    fn update_local_is_visible_immediately() {
        let mut engine = NoteEngine::new(MockStore::default());
        let draft = engine.create_draft();

        engine.update_local(draft, title("first"));
        engine.update_local(
            draft,
            UpdateNote {
                status: Some(NoteStatus::OnHold),
                ..title("second")
            },
        );

        let note = engine.active_note().unwrap();
        assert_eq!(note.title.as_deref(), Some("second"));
        assert_eq!(note.status, NoteStatus::OnHold);
        assert_eq!(engine.store().calls(), 0);
    }

    #[tokio::test]
    async fn blank_save_is_rejected_without_store_call() {
        let store = MockStore::default();
        let mut engine = NoteEngine::new(store.clone());
        let draft = engine.create_draft();

        let result = engine
            .save(
                draft,
                UpdateNote {
                    title: Some("   ".into()),
                    content: Some("\n".into()),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(Error::ValidationFailed(_))));
        assert_eq!(store.calls(), 0);
        assert!(engine.note(draft).is_some());
    }

    #[tokio::test]
    async fn saving_a_draft_replaces_it_with_the_stored_note() {
        let store = MockStore::default();
        let mut engine = NoteEngine::new(store.clone());
        store.set(|s| s.saving_watch = Some(engine.saving_handle()));

        let draft = engine.create_draft();
        engine.update_local(
            draft,
            UpdateNote {
                priority: Some(Priority::Urgent),
                ..Default::default()
            },
        );

        let id = engine
            .save(
                draft,
                UpdateNote {
                    title: Some("  plan  ".into()),
                    content: Some(" steps ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!id.is_draft());
        assert_eq!(engine.active_note_id(), Some(id));
        assert!(engine.note(draft).is_none());

        let note = engine.note(id).unwrap();
        assert_eq!(note.title.as_deref(), Some("plan"));
        assert_eq!(note.content, "steps");
        assert_eq!(note.priority, Priority::Urgent);

        assert!(store.0.lock().unwrap().saving_seen);
        assert!(!engine.is_saving());
    }

    #[tokio::test]
    async fn failed_draft_save_keeps_the_draft() {
        let store = MockStore::default();
        store.set(|s| s.fail_writes = true);
        let mut engine = NoteEngine::new(store.clone());
        let draft = engine.create_draft();
        engine.update_local(draft, title("unsaved"));

        let result = engine.save(draft, UpdateNote::default()).await;

        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(engine.note(draft).and_then(|n| n.title.as_deref()), Some("unsaved"));
        assert_eq!(store.calls(), 1);
        assert!(!engine.is_saving());
    }

    #[tokio::test]
    async fn saving_a_persisted_note_sends_the_patch() {
        let store = MockStore::with_notes(scenario());
        let mut engine = NoteEngine::new(store.clone());
        engine.load().await.unwrap();
        let a = engine.notes()[0].id;

        engine
            .save(
                a,
                UpdateNote {
                    status: Some(NoteStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let note = engine.note(a).unwrap();
        assert_eq!(note.status, NoteStatus::Completed);
        assert_eq!(note.content, "A body");
        assert!(note.updated_at > note.created_at);
    }

    #[tokio::test]
    async fn failed_update_reloads_from_store() {
        let store = MockStore::with_notes(scenario());
        let mut engine = NoteEngine::new(store.clone());
        engine.load().await.unwrap();
        let a = engine.notes()[0].id;

        engine.update_local(a, title("local only"));
        store.set(|s| s.fail_writes = true);

        let result = engine.save(a, title("local only")).await;

        assert!(matches!(result, Err(Error::Store(_))));
        assert_eq!(engine.note(a).and_then(|n| n.title.as_deref()), Some("A"));
        assert_eq!(store.calls(), 3);
        assert!(!engine.is_saving());
    }

    #[tokio::test]
    async fn save_of_unknown_note_is_not_found() {
        let mut engine = NoteEngine::new(MockStore::default());

        let result = engine.save(NoteId::Persisted(Uuid::now_v7()), title("x")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn dropping_a_save_clears_the_saving_flag() {
        let store = MockStore::default();
        store.set(|s| s.hang_writes = true);
        let mut engine = NoteEngine::new(store);
        let draft = engine.create_draft();

        let timed_out = tokio::time::timeout(Duration::from_millis(20), engine.save(draft, title("slow"))).await;

        assert!(timed_out.is_err());
        assert!(!engine.is_saving());
        assert!(engine.note(draft).is_some());
    }

    #[tokio::test]
    async fn deleting_the_active_note_activates_the_first_remaining() {
        let mut engine = NoteEngine::new(MockStore::with_notes(scenario()));
        engine.load().await.unwrap();
        let [a, c, b] = [engine.notes()[0].id, engine.notes()[1].id, engine.notes()[2].id];

        engine.select_note(c, Viewport { width: 1024 });
        engine.delete_note(b).await.unwrap();
        assert_eq!(engine.active_note_id(), Some(c));

        engine.delete_note(c).await.unwrap();
        assert_eq!(engine.active_note_id(), Some(a));

        engine.delete_note(a).await.unwrap();
        assert_eq!(engine.active_note_id(), None);
        assert!(engine.notes().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_draft_stays_local() {
        let store = MockStore::default();
        let mut engine = NoteEngine::new(store.clone());
        let draft = engine.create_draft();

        engine.delete_note(draft).await.unwrap();

        assert!(engine.notes().is_empty());
        assert_eq!(engine.active_note_id(), None);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn failed_delete_changes_nothing() {
        let store = MockStore::with_notes(scenario());
        let mut engine = NoteEngine::new(store.clone());
        engine.load().await.unwrap();
        let a = engine.notes()[0].id;
        store.set(|s| s.fail_writes = true);

        assert!(engine.delete_note(a).await.is_err());
        assert_eq!(engine.notes().len(), 3);
        assert_eq!(engine.active_note_id(), Some(a));
    }

    #[tokio::test]
    async fn view_groups_engine_notes() {
        let mut engine = NoteEngine::new(MockStore::with_notes(scenario()));
        engine.load().await.unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 2, 18, 0, 0).unwrap();
        let groups = engine.view(&now);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "오늘");
        assert_eq!(groups[1].label, "어제");
        assert_eq!(groups[0].notes.len(), 2);
    }

    #[tokio::test]
    async fn local_view_puts_a_fresh_draft_under_today() {
        let mut engine = NoteEngine::new(MockStore::with_notes(scenario()));
        engine.load().await.unwrap();
        let draft = engine.create_draft();

        let groups = engine.view_local();
        assert_eq!(groups[0].label, "오늘");
        assert!(groups[0].notes.iter().any(|n| n.id == draft));
        assert_eq!(groups.iter().map(|g| g.notes.len()).sum::<usize>(), 4);
    }

    #[tokio::test]
    async fn draft_round_trip_through_the_database() {
        let db = init_test_db().await.unwrap();
        let user = db
            .call(|conn| {
                let id: Uuid = conn.query_row(
                    "INSERT INTO users (email, password_hash) VALUES ('me@mail.com', 'x') RETURNING id",
                    [],
                    |row| row.get(0),
                )?;
                Ok(User {
                    id,
                    email: "me@mail.com".into(),
                })
            })
            .await
            .unwrap();

        let mut engine = NoteEngine::new(DbNoteStore::new(db.clone(), Ctx::new(Some(user))));
        let draft = engine.create_draft();
        engine.update_local(
            draft,
            UpdateNote {
                priority: Some(Priority::Major),
                status: Some(NoteStatus::InProgress),
                ..Default::default()
            },
        );
        let saved = engine
            .save(
                draft,
                UpdateNote {
                    title: Some(" trip ".into()),
                    content: Some(" there and back ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        engine.load().await.unwrap();
        let note = engine.note(saved).unwrap();

        assert_ne!(saved, draft);
        assert_eq!(note.title.as_deref(), Some("trip"));
        assert_eq!(note.content, "there and back");
        assert_eq!(note.priority, Priority::Major);
        assert_eq!(note.status, NoteStatus::InProgress);

        let anonymous = DbNoteStore::new(db, Ctx::new(None));
        assert!(matches!(anonymous.list().await, Err(Error::AuthenticationRequired)));
    }
}
