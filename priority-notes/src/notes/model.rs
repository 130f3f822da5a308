use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use schemars::{
    gen::SchemaGenerator,
    schema::{InstanceType, Schema, SchemaObject},
    JsonSchema,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub use crate::users::UserId;

pub type NoteId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: Option<String>,
    pub content: String,
    pub date: DateTime<Utc>,
    pub priority: Priority,
    pub status: NoteStatus,
    pub parent_id: Option<NoteId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /notes`. Every field is optional; empty notes are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
}

/// Partial patch: absent fields are left untouched. An explicit `null` title
/// or content clears that field to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNote {
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
}

impl UpdateNote {
    /// Same patch with title and content trimmed.
    pub fn trimmed(self) -> Self {
        Self {
            title: self.title.map(|t| t.trim().to_string()),
            content: self.content.map(|c| c.trim().to_string()),
            ..self
        }
    }
}

// Only runs for keys present in the body; missing keys fall back to `default`.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Some(Option::<String>::deserialize(deserializer)?.unwrap_or_default()))
}

/// True when neither field has any non-whitespace text.
pub fn is_blank(title: Option<&str>, content: Option<&str>) -> bool {
    title.unwrap_or_default().trim().is_empty() && content.unwrap_or_default().trim().is_empty()
}

// Priority

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    Major = 2,
    Urgent = 3,
}

impl Priority {
    /// Short label matched by sidebar search.
    pub fn search_label(self) -> &'static str {
        match self {
            Priority::Urgent => "긴급",
            Priority::Major => "주요",
            Priority::Normal => "일반",
            Priority::Low => "낮음",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Urgent => "🚨 긴급 처리",
            Priority::Major => "⭐ 주요 사항",
            Priority::Normal => "📝 일반 메모",
            Priority::Low => "📋 보관 메모",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("priority must be between 0 and 3, got {0}")]
pub struct InvalidPriority(pub i64);

impl TryFrom<i64> for Priority {
    type Error = InvalidPriority;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::Major),
            3 => Ok(Priority::Urgent),
            other => Err(InvalidPriority(other)),
        }
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        priority as i64
    }
}

impl JsonSchema for Priority {
    fn schema_name() -> String {
        String::from("Priority")
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::Integer.into()),
            enum_values: Some((0..=3).map(serde_json::Value::from).collect()),
            ..Default::default()
        }
        .into()
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(*self)))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let value = value.as_i64()?;
        Priority::try_from(value).map_err(|_| FromSqlError::OutOfRange(value))
    }
}

// Status

/// Workflow status. Values outside the four known ones can only come from
/// storage; they are kept verbatim and read as `NotStarted` for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoteStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    OnHold,
    Unrecognized(String),
}

impl NoteStatus {
    pub const ALL: [NoteStatus; 4] = [
        NoteStatus::NotStarted,
        NoteStatus::InProgress,
        NoteStatus::Completed,
        NoteStatus::OnHold,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            NoteStatus::NotStarted => "not_started",
            NoteStatus::InProgress => "in_progress",
            NoteStatus::Completed => "completed",
            NoteStatus::OnHold => "on_hold",
            NoteStatus::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, NoteStatus::Unrecognized(_))
    }

    /// The status used for display, search and filtering.
    pub fn effective(&self) -> NoteStatus {
        match self {
            NoteStatus::Unrecognized(_) => NoteStatus::NotStarted,
            status => status.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.effective() {
            NoteStatus::InProgress => "진행중",
            NoteStatus::Completed => "완료",
            NoteStatus::OnHold => "보류",
            _ => "대기",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NoteStatus {
    fn from(s: &str) -> Self {
        match s {
            "not_started" => NoteStatus::NotStarted,
            "in_progress" => NoteStatus::InProgress,
            "completed" => NoteStatus::Completed,
            "on_hold" => NoteStatus::OnHold,
            other => NoteStatus::Unrecognized(other.to_string()),
        }
    }
}

impl FromStr for NoteStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NoteStatus::from(s))
    }
}

impl Serialize for NoteStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NoteStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(NoteStatus::from(raw.as_str()))
    }
}

impl JsonSchema for NoteStatus {
    fn schema_name() -> String {
        String::from("NoteStatus")
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            enum_values: Some(
                NoteStatus::ALL
                    .iter()
                    .map(|s| serde_json::Value::from(s.as_str()))
                    .collect(),
            ),
            ..Default::default()
        }
        .into()
    }
}

impl ToSql for NoteStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NoteStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(NoteStatus::from(value.as_str()?))
    }
}
