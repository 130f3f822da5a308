//! Client-side note state: the engine reconciling local edits with a note
//! store, and the sidebar's filter/group view derivation.

mod engine;
mod errors;
mod http;
mod store;
mod view;

pub use engine::{Navigation, NoteEngine, SavingHandle, Viewport, COMPACT_VIEWPORT_WIDTH};
pub use errors::{Error, Result};
pub use http::HttpNoteStore;
pub use store::{DbNoteStore, NoteEntry, NoteId, NoteStore};
pub use view::{
    bucket_label, derive_view, filter_notes, group_by_date, CollapseState, DateBucket, DateGroup, NoteFilter, Sidebar,
};
