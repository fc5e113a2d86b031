use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;

pub const DEFAULT_TAG_COLOR: &str =
  "#3b82f6";

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Pending,
  InProgress,
  Completed
}

impl TaskStatus {
  pub fn as_str(
    &self
  ) -> &'static str {
    match self {
      | TaskStatus::Pending => "pending",
      | TaskStatus::InProgress => {
        "in_progress"
      }
      | TaskStatus::Completed => {
        "completed"
      }
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "pending" => Ok(Self::Pending),
      | "in_progress"
      | "in-progress"
      | "inprogress" => {
        Ok(Self::InProgress)
      }
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | other => Err(format!(
        "unknown task status: {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
  Low,
  #[default]
  Medium,
  High
}

impl TaskPriority {
  pub fn as_str(
    &self
  ) -> &'static str {
    match self {
      | TaskPriority::Low => "low",
      | TaskPriority::Medium => "medium",
      | TaskPriority::High => "high"
    }
  }
}

impl fmt::Display for TaskPriority {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskPriority {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "low" => Ok(Self::Low),
      | "medium" => Ok(Self::Medium),
      | "high" => Ok(Self::High),
      | other => Err(format!(
        "unknown task priority: {other}"
      ))
    }
  }
}

/// Folder record as returned by the
/// remote store.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Folder {
  #[serde(rename = "_id", alias = "id")]
  pub id:    String,
  pub name:  String,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Tag {
  #[serde(rename = "_id", alias = "id")]
  pub id:    String,
  pub name:  String,
  #[serde(default = "default_tag_color")]
  pub color: String,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct FolderDetail {
  #[serde(alias = "_id")]
  pub id:   String,
  pub name: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TagDetail {
  #[serde(alias = "_id")]
  pub id:    String,
  pub name:  String,
  #[serde(default = "default_tag_color")]
  pub color: String
}

/// Task record. `folders`/`tags` are the
/// authoritative relationship ids; the
/// `*_details` fields are server-computed
/// conveniences.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Task {
  #[serde(rename = "_id", alias = "id")]
  pub id:             String,
  pub title:          String,
  #[serde(default)]
  pub description:    Option<String>,
  #[serde(default)]
  pub status:         TaskStatus,
  #[serde(default)]
  pub priority:       TaskPriority,
  #[serde(
    default,
    with = "due_date_serde::option"
  )]
  pub due_date:       Option<DateTime<Utc>>,
  #[serde(default)]
  pub folders:        Vec<String>,
  #[serde(default)]
  pub tags:           Vec<String>,
  #[serde(
    default,
    rename = "folderDetails",
    skip_serializing_if = "Option::is_none"
  )]
  pub folder_details:
    Option<Vec<FolderDetail>>,
  #[serde(
    default,
    rename = "tagDetails",
    skip_serializing_if = "Option::is_none"
  )]
  pub tag_details:
    Option<Vec<TagDetail>>,
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>
}

impl Task {
  pub fn is_completed(&self) -> bool {
    self.status == TaskStatus::Completed
  }

  pub fn in_folder(
    &self,
    folder_id: &str
  ) -> bool {
    self
      .folders
      .iter()
      .any(|id| id == folder_id)
  }

  pub fn has_tag(
    &self,
    tag_id: &str
  ) -> bool {
    self.tags.iter().any(|id| id == tag_id)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct FolderDraft {
  pub name: String
}

impl FolderDraft {
  pub fn new(
    name: impl Into<String>
  ) -> Self {
    Self { name: name.into() }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TagDraft {
  pub name:  String,
  pub color: String
}

impl TagDraft {
  pub fn new(
    name: impl Into<String>
  ) -> Self {
    Self {
      name:  name.into(),
      color: DEFAULT_TAG_COLOR.to_string()
    }
  }

  pub fn with_color(
    mut self,
    color: impl Into<String>
  ) -> Self {
    self.color = color.into();
    self
  }
}

impl From<&Tag> for TagDraft {
  fn from(tag: &Tag) -> Self {
    Self {
      name:  tag.name.clone(),
      color: tag.color.clone()
    }
  }
}

/// Full task body for create and
/// update. `due_date` is sent as `null`
/// when unset so an update clears it.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskDraft {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub status:      TaskStatus,
  #[serde(default)]
  pub priority:    TaskPriority,
  #[serde(
    default,
    with = "due_date_serde::option"
  )]
  pub due_date:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub folders:     Vec<String>,
  #[serde(default)]
  pub tags:        Vec<String>
}

impl TaskDraft {
  pub fn new(
    title: impl Into<String>
  ) -> Self {
    Self {
      title:       title.into(),
      description: String::new(),
      status:      TaskStatus::default(),
      priority:    TaskPriority::default(),
      due_date:    None,
      folders:     vec![],
      tags:        vec![]
    }
  }
}

impl From<&Task> for TaskDraft {
  fn from(task: &Task) -> Self {
    Self {
      title:       task.title.clone(),
      description: task
        .description
        .clone()
        .unwrap_or_default(),
      status:      task.status,
      priority:    task.priority,
      due_date:    task.due_date,
      folders:     task.folders.clone(),
      tags:        task.tags.clone()
    }
  }
}

/// Server-side task filter. Unset and
/// empty fields never reach the query
/// string.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct TaskFilters {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status:   Option<TaskStatus>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority: Option<TaskPriority>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub folder:   Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub tag:      Option<String>
}

impl TaskFilters {
  pub fn for_selection(
    folder: Option<String>,
    tag: Option<String>
  ) -> Self {
    Self {
      folder,
      tag,
      ..Self::default()
    }
  }

  pub fn query_pairs(
    &self
  ) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(status) = self.status {
      pairs.push((
        "status",
        status.as_str().to_string()
      ));
    }
    if let Some(priority) = self.priority
    {
      pairs.push((
        "priority",
        priority.as_str().to_string()
      ));
    }
    if let Some(folder) =
      non_empty(self.folder.as_deref())
    {
      pairs
        .push(("folder", folder.to_string()));
    }
    if let Some(tag) =
      non_empty(self.tag.as_deref())
    {
      pairs.push(("tag", tag.to_string()));
    }
    pairs
  }

  pub fn is_empty(&self) -> bool {
    self.query_pairs().is_empty()
  }
}

fn non_empty(
  value: Option<&str>
) -> Option<&str> {
  value.filter(|v| !v.trim().is_empty())
}

fn default_tag_color() -> String {
  DEFAULT_TAG_COLOR.to_string()
}

/// `due_date` accepts RFC 3339 or a
/// plain `YYYY-MM-DD` date and is
/// written back as RFC 3339 UTC.
pub mod due_date_serde {
  use chrono::{
    DateTime,
    NaiveDate,
    NaiveTime,
    SecondsFormat,
    Utc
  };

  pub fn parse(
    raw: &str
  ) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(dt) =
      DateTime::parse_from_rfc3339(trimmed)
    {
      return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
    .map(|date| {
      date.and_time(NaiveTime::MIN).and_utc()
    })
    .map_err(|_| {
      format!("invalid due date: {raw}")
    })
  }

  pub fn format(
    dt: &DateTime<Utc>
  ) -> String {
    dt.to_rfc3339_opts(
      SecondsFormat::Millis,
      true
    )
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => serializer
          .serialize_str(&super::format(
            value
          )),
        | None => serializer.serialize_none()
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
      D: Deserializer<'de>
    {
      let raw =
        Option::<String>::deserialize(
          deserializer
        )?;
      match raw {
        | Some(text)
          if !text.trim().is_empty() =>
        {
          super::parse(&text)
            .map(Some)
            .map_err(serde::de::Error::custom)
        }
        | _ => Ok(None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn task_decodes_remote_shape() {
    let raw = json!({
      "_id": "t1",
      "title": "Buy milk",
      "status": "in_progress",
      "priority": "high",
      "due_date": "2026-03-01",
      "folders": ["f1"],
      "tags": ["g1"],
      "folderDetails": [{"_id": "f1", "name": "Home"}],
      "tagDetails": [{"id": "g1", "name": "errand", "color": "#ff0000"}],
      "createdAt": "2026-02-01T10:00:00.000Z"
    });

    let task: Task =
      serde_json::from_value(raw)
        .expect("decode task");
    assert_eq!(task.id, "t1");
    assert_eq!(
      task.status,
      TaskStatus::InProgress
    );
    assert_eq!(
      task.priority,
      TaskPriority::High
    );
    assert!(task.in_folder("f1"));
    assert!(task.has_tag("g1"));
    assert_eq!(
      task
        .due_date
        .map(|d| due_date_serde::format(&d)),
      Some(
        "2026-03-01T00:00:00.000Z"
          .to_string()
      )
    );
    assert_eq!(
      task.folder_details,
      Some(vec![FolderDetail {
        id:   "f1".to_string(),
        name: "Home".to_string()
      }])
    );
    assert_eq!(
      task.extra.get("createdAt"),
      Some(&json!(
        "2026-02-01T10:00:00.000Z"
      ))
    );
  }

  #[test]
  fn task_defaults_and_null_due_date() {
    let task: Task = serde_json::from_value(
      json!({
        "id": "t9",
        "title": "bare",
        "due_date": null
      })
    )
    .expect("decode bare task");

    assert_eq!(task.id, "t9");
    assert_eq!(
      task.status,
      TaskStatus::Pending
    );
    assert_eq!(
      task.priority,
      TaskPriority::Medium
    );
    assert!(task.due_date.is_none());
    assert!(task.folder_details.is_none());

    let encoded = serde_json::to_value(&task)
      .expect("encode task");
    assert_eq!(encoded["_id"], "t9");
    assert!(
      encoded.get("folderDetails").is_none()
    );
  }

  #[test]
  fn draft_from_task_sends_null_due_date() {
    let task: Task = serde_json::from_value(
      json!({
        "_id": "t2",
        "title": "Write report",
        "description": "quarterly",
        "tags": ["g1", "g2"]
      })
    )
    .expect("decode task");

    let draft = TaskDraft::from(&task);
    let body = serde_json::to_value(&draft)
      .expect("encode draft");
    assert_eq!(body["title"], "Write report");
    assert_eq!(body["description"], "quarterly");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["due_date"], Value::Null);
    assert_eq!(body["tags"], json!(["g1", "g2"]));
    assert!(body.get("_id").is_none());
  }

  #[test]
  fn filters_omit_absent_and_blank_fields() {
    assert!(TaskFilters::default().is_empty());

    let filters = TaskFilters {
      status:   Some(TaskStatus::Completed),
      priority: None,
      folder:   Some(String::new()),
      tag:      Some("g3".to_string())
    };
    assert_eq!(
      filters.query_pairs(),
      vec![
        ("status", "completed".to_string()),
        ("tag", "g3".to_string()),
      ]
    );

    let encoded =
      serde_json::to_value(
        TaskFilters::for_selection(
          Some("f1".to_string()),
          None
        )
      )
      .expect("encode filters");
    assert_eq!(encoded, json!({"folder": "f1"}));
  }

  #[test]
  fn status_and_priority_parse_cli_spellings() {
    assert_eq!(
      "in-progress".parse::<TaskStatus>(),
      Ok(TaskStatus::InProgress)
    );
    assert_eq!(
      "HIGH".parse::<TaskPriority>(),
      Ok(TaskPriority::High)
    );
    assert!(
      "someday"
        .parse::<TaskStatus>()
        .is_err()
    );
  }
}
