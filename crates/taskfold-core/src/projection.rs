//! View Projection: read-only derivations over a [`StoreSnapshot`].

use taskfold_shared::Task;

use crate::store::StoreSnapshot;

pub const ALL_TASKS_TITLE: &str = "All Tasks";
pub const MISSING_FOLDER_TITLE: &str = "Tasks";
pub const UNKNOWN_NAME: &str = "Unknown";

/// Filtering already happened server-side, so this is the cached list as is.
pub fn visible_tasks(snapshot: &StoreSnapshot) -> &[Task] {
    &snapshot.tasks
}

pub fn list_title(snapshot: &StoreSnapshot) -> String {
    match snapshot.selected_folder.as_deref() {
        None => ALL_TASKS_TITLE.to_string(),
        Some(id) => match snapshot.folders.iter().find(|f| f.id == id) {
            Some(folder) => format!("Tasks in {}", folder.name),
            // selected folder vanished, e.g. deleted elsewhere
            None => MISSING_FOLDER_TITLE.to_string(),
        },
    }
}

pub fn folder_name<'a>(snapshot: &'a StoreSnapshot, id: &str) -> &'a str {
    snapshot
        .folders
        .iter()
        .find(|f| f.id == id)
        .map(|f| f.name.as_str())
        .unwrap_or(UNKNOWN_NAME)
}

pub fn tag_name<'a>(snapshot: &'a StoreSnapshot, id: &str) -> &'a str {
    snapshot
        .tags
        .iter()
        .find(|t| t.id == id)
        .map(|t| t.name.as_str())
        .unwrap_or(UNKNOWN_NAME)
}

/// The tag id the next selection-driven task load will send.
pub fn effective_tag(snapshot: &StoreSnapshot) -> Option<&str> {
    snapshot.selected_tags.first().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use taskfold_shared::{Folder, Tag};

    use super::*;

    fn folder(id: &str, name: &str) -> Folder {
        Folder {
            id: id.to_string(),
            name: name.to_string(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn title_tracks_folder_selection() {
        let mut snapshot = StoreSnapshot {
            folders: vec![folder("f1", "Work")],
            ..StoreSnapshot::default()
        };
        assert_eq!(list_title(&snapshot), "All Tasks");

        snapshot.selected_folder = Some("f1".to_string());
        assert_eq!(list_title(&snapshot), "Tasks in Work");

        snapshot.folders.clear();
        assert_eq!(list_title(&snapshot), "Tasks");
    }

    #[test]
    fn names_fall_back_to_unknown() {
        let snapshot = StoreSnapshot {
            folders: vec![folder("f1", "Work")],
            tags: vec![Tag {
                id: "g1".to_string(),
                name: "urgent".to_string(),
                color: "#f00".to_string(),
                extra: BTreeMap::new(),
            }],
            selected_tags: vec!["g1".to_string()],
            ..StoreSnapshot::default()
        };
        assert_eq!(folder_name(&snapshot, "f1"), "Work");
        assert_eq!(folder_name(&snapshot, "f9"), "Unknown");
        assert_eq!(tag_name(&snapshot, "g1"), "urgent");
        assert_eq!(tag_name(&snapshot, "g9"), "Unknown");
        assert_eq!(effective_tag(&snapshot), Some("g1"));
        assert!(visible_tasks(&snapshot).is_empty());
    }
}
