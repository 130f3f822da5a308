use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};

use crate::notes::{NoteStatus, Priority};

use super::NoteEntry;

/// Search text plus the selected priority and status sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    pub search: String,
    pub priorities: BTreeSet<Priority>,
    pub statuses: BTreeSet<NoteStatus>,
}

impl NoteFilter {
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty() || !self.priorities.is_empty() || !self.statuses.is_empty()
    }

    /// Search is ORed across title, content and the localized labels; the
    /// search, priority and status criteria are ANDed.
    pub fn matches(&self, note: &NoteEntry) -> bool {
        let term = self.search.trim().to_lowercase();
        let status = note.status.effective();

        let matches_search = term.is_empty()
            || [
                note.title.as_deref().unwrap_or_default(),
                note.content.as_str(),
                note.priority.search_label(),
                status.label(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));

        matches_search
            && (self.priorities.is_empty() || self.priorities.contains(&note.priority))
            && (self.statuses.is_empty() || self.statuses.contains(&status))
    }
}

pub fn filter_notes<'a>(notes: &'a [NoteEntry], filter: &NoteFilter) -> Vec<&'a NoteEntry> {
    if !filter.is_active() {
        return notes.iter().collect();
    }
    notes.iter().filter(|note| filter.matches(note)).collect()
}

/// Notes sharing one calendar day, most urgent first.
#[derive(Debug, Clone, PartialEq)]
pub struct DateBucket<'a> {
    pub day: NaiveDate,
    pub notes: Vec<&'a NoteEntry>,
}

/// Buckets notes by the calendar day of their `date` in `tz`, newest day first.
/// Inside a bucket the sort is stable, so equal priorities keep input order.
pub fn group_by_date<'a, Tz: TimeZone>(notes: Vec<&'a NoteEntry>, tz: &Tz) -> Vec<DateBucket<'a>> {
    let mut days: BTreeMap<NaiveDate, Vec<&'a NoteEntry>> = BTreeMap::new();
    for note in notes {
        days.entry(note.date.with_timezone(tz).date_naive()).or_default().push(note);
    }

    days.into_iter()
        .rev()
        .map(|(day, mut notes)| {
            notes.sort_by(|a, b| b.priority.cmp(&a.priority));
            DateBucket { day, notes }
        })
        .collect()
}

pub fn bucket_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "오늘".into()
    } else if Some(day) == today.pred_opt() {
        "어제".into()
    } else {
        format!("{}년 {}월 {}일", day.year(), day.month(), day.day())
    }
}

/// Per-bucket collapse state. Buckets default to collapsed while no filter is
/// active and to expanded while one is. Explicit toggles are dropped when the
/// filter switches between the two and on every change of an active filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollapseState {
    filters_active: bool,
    toggled: HashMap<NaiveDate, bool>,
}

impl CollapseState {
    /// Called after the filter changed.
    pub fn filter_changed(&mut self, filters_active: bool) {
        if filters_active || self.filters_active != filters_active {
            self.toggled.clear();
        }
        self.filters_active = filters_active;
    }

    pub fn is_collapsed(&self, day: NaiveDate) -> bool {
        self.toggled.get(&day).copied().unwrap_or(!self.filters_active)
    }

    pub fn toggle(&mut self, day: NaiveDate) {
        let collapsed = self.is_collapsed(day);
        self.toggled.insert(day, !collapsed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup<'a> {
    pub day: NaiveDate,
    pub label: String,
    pub collapsed: bool,
    pub notes: Vec<&'a NoteEntry>,
}

/// Filter, bucket and label `notes` as seen at `now`. Pure: the same inputs
/// always give the same groups in the same order.
pub fn derive_view<'a, Tz: TimeZone>(
    notes: &'a [NoteEntry],
    filter: &NoteFilter,
    collapse: &CollapseState,
    now: &DateTime<Tz>,
) -> Vec<DateGroup<'a>> {
    let today = now.date_naive();

    group_by_date(filter_notes(notes, filter), &now.timezone())
        .into_iter()
        .map(|DateBucket { day, notes }| DateGroup {
            day,
            label: bucket_label(day, today),
            collapsed: collapse.is_collapsed(day),
            notes,
        })
        .collect()
}

/// Sidebar state: the active filter and the collapse state kept in step with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidebar {
    filter: NoteFilter,
    collapse: CollapseState,
}

impl Sidebar {
    pub fn filter(&self) -> &NoteFilter {
        &self.filter
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        if search != self.filter.search {
            self.filter.search = search;
            self.filter_changed();
        }
    }

    pub fn toggle_priority(&mut self, priority: Priority) {
        if !self.filter.priorities.remove(&priority) {
            self.filter.priorities.insert(priority);
        }
        self.filter_changed();
    }

    pub fn toggle_status(&mut self, status: NoteStatus) {
        let status = status.effective();
        if !self.filter.statuses.remove(&status) {
            self.filter.statuses.insert(status);
        }
        self.filter_changed();
    }

    pub fn toggle_group(&mut self, day: NaiveDate) {
        self.collapse.toggle(day);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn derive<'a, Tz: TimeZone>(&self, notes: &'a [NoteEntry], now: &DateTime<Tz>) -> Vec<DateGroup<'a>> {
        derive_view(notes, &self.filter, &self.collapse, now)
    }

    fn filter_changed(&mut self) {
        self.collapse.filter_changed(self.filter.is_active());
    }
}
