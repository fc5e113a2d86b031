//! In-process implementation of the remote collection contract.
//!
//! Behaves like the real store: it assigns ids, filters tasks server-side,
//! fills in `folderDetails`/`tagDetails`, and strips references when a folder
//! or tag is deleted. Used by the test suite and by embedders that want the
//! store without a network.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use taskfold_shared::{
    Folder, FolderDetail, FolderDraft, Tag, TagDetail, TagDraft, Task, TaskDraft, TaskFilters,
    TaskStatus,
};
use tracing::debug;

use super::{Aggregate, Collection, Gateway, RemoteResult, operation_name};
use crate::error::RemoteError;

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    folders: Vec<Folder>,
    tags: Vec<Tag>,
    tasks: Vec<Task>,
    next_folder: u64,
    next_tag: u64,
    next_task: u64,
    failures: VecDeque<String>,
    calls: Vec<String>,
    task_queries: Vec<TaskFilters>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call named `operation` (e.g. `"update task"`) fail once.
    pub fn fail_next(&self, operation: impl Into<String>) {
        self.inner.lock().failures.push_back(operation.into());
    }

    /// Operation names of every call received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    /// Filters of every task list request received, in order.
    pub fn task_queries(&self) -> Vec<TaskFilters> {
        self.inner.lock().task_queries.clone()
    }

    pub fn seed_folder(&self, name: &str) -> Folder {
        let mut state = self.inner.lock();
        state.insert_folder(name)
    }

    pub fn seed_tag(&self, name: &str, color: &str) -> Tag {
        let mut state = self.inner.lock();
        state.insert_tag(name, color)
    }

    pub fn seed_task(&self, draft: TaskDraft) -> Task {
        let mut state = self.inner.lock();
        let stored = state.insert_task(draft);
        state.hydrate(&stored)
    }
}

impl MemoryState {
    fn record(&mut self, operation: &str) -> RemoteResult<()> {
        self.calls.push(operation.to_string());
        if let Some(pos) = self.failures.iter().position(|op| op == operation) {
            self.failures.remove(pos);
            debug!(operation, "injected failure");
            return Err(RemoteError::rejected(operation, "injected failure"));
        }
        Ok(())
    }

    fn insert_folder(&mut self, name: &str) -> Folder {
        self.next_folder += 1;
        let folder = Folder {
            id: format!("f{}", self.next_folder),
            name: name.to_string(),
            extra: BTreeMap::new(),
        };
        self.folders.push(folder.clone());
        folder
    }

    fn insert_tag(&mut self, name: &str, color: &str) -> Tag {
        self.next_tag += 1;
        let tag = Tag {
            id: format!("g{}", self.next_tag),
            name: name.to_string(),
            color: color.to_string(),
            extra: BTreeMap::new(),
        };
        self.tags.push(tag.clone());
        tag
    }

    fn insert_task(&mut self, draft: TaskDraft) -> Task {
        self.next_task += 1;
        let mut task = Task {
            id: format!("t{}", self.next_task),
            title: String::new(),
            description: None,
            status: TaskStatus::default(),
            priority: Default::default(),
            due_date: None,
            folders: vec![],
            tags: vec![],
            folder_details: None,
            tag_details: None,
            extra: BTreeMap::new(),
        };
        apply_draft(&mut task, draft);
        self.tasks.push(task.clone());
        task
    }

    fn hydrate(&self, task: &Task) -> Task {
        let mut out = task.clone();
        out.folder_details = Some(
            task.folders
                .iter()
                .filter_map(|id| self.folders.iter().find(|f| &f.id == id))
                .map(|f| FolderDetail {
                    id: f.id.clone(),
                    name: f.name.clone(),
                })
                .collect(),
        );
        out.tag_details = Some(
            task.tags
                .iter()
                .filter_map(|id| self.tags.iter().find(|t| &t.id == id))
                .map(|t| TagDetail {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    color: t.color.clone(),
                })
                .collect(),
        );
        out
    }
}

fn apply_draft(task: &mut Task, draft: TaskDraft) {
    task.title = draft.title;
    task.description = Some(draft.description).filter(|d| !d.is_empty());
    task.status = draft.status;
    task.priority = draft.priority;
    task.due_date = draft.due_date;
    task.folders = draft.folders;
    task.tags = draft.tags;
}

fn matches_filters(task: &Task, filters: &TaskFilters) -> bool {
    if let Some(status) = filters.status
        && task.status != status
    {
        return false;
    }
    if let Some(priority) = filters.priority
        && task.priority != priority
    {
        return false;
    }
    if let Some(folder) = filters.folder.as_deref().filter(|f| !f.is_empty())
        && !task.in_folder(folder)
    {
        return false;
    }
    if let Some(tag) = filters.tag.as_deref().filter(|t| !t.is_empty())
        && !task.has_tag(tag)
    {
        return false;
    }
    true
}

fn not_found(operation: &str, collection: Collection, id: &str) -> RemoteError {
    RemoteError::status(operation, 404, format!("{} {id} not found", collection.singular()))
}

fn bad_request(operation: &str, message: &str) -> RemoteError {
    RemoteError::status(operation, 400, message)
}

#[async_trait]
impl Gateway for InMemoryGateway {
    async fn list_folders(&self) -> RemoteResult<Vec<Folder>> {
        let mut state = self.inner.lock();
        state.record(&operation_name("list", Collection::Folders))?;
        Ok(state.folders.clone())
    }

    async fn get_folder(&self, id: &str) -> RemoteResult<Folder> {
        let operation = operation_name("get", Collection::Folders);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        state
            .folders
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| not_found(&operation, Collection::Folders, id))
    }

    async fn create_folder(&self, draft: &FolderDraft) -> RemoteResult<Folder> {
        let operation = operation_name("create", Collection::Folders);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        if draft.name.trim().is_empty() {
            return Err(bad_request(&operation, "name is required"));
        }
        Ok(state.insert_folder(&draft.name))
    }

    async fn update_folder(&self, id: &str, draft: &FolderDraft) -> RemoteResult<Folder> {
        let operation = operation_name("update", Collection::Folders);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let folder = state
            .folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| not_found(&operation, Collection::Folders, id))?;
        folder.name = draft.name.clone();
        Ok(folder.clone())
    }

    async fn delete_folder(&self, id: &str) -> RemoteResult<()> {
        let operation = operation_name("delete", Collection::Folders);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let before = state.folders.len();
        state.folders.retain(|f| f.id != id);
        if state.folders.len() == before {
            return Err(not_found(&operation, Collection::Folders, id));
        }
        for task in &mut state.tasks {
            task.folders.retain(|f| f != id);
        }
        Ok(())
    }

    async fn list_tags(&self) -> RemoteResult<Vec<Tag>> {
        let mut state = self.inner.lock();
        state.record(&operation_name("list", Collection::Tags))?;
        Ok(state.tags.clone())
    }

    async fn get_tag(&self, id: &str) -> RemoteResult<Tag> {
        let operation = operation_name("get", Collection::Tags);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        state
            .tags
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| not_found(&operation, Collection::Tags, id))
    }

    async fn create_tag(&self, draft: &TagDraft) -> RemoteResult<Tag> {
        let operation = operation_name("create", Collection::Tags);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        if draft.name.trim().is_empty() {
            return Err(bad_request(&operation, "name is required"));
        }
        Ok(state.insert_tag(&draft.name, &draft.color))
    }

    async fn update_tag(&self, id: &str, draft: &TagDraft) -> RemoteResult<Tag> {
        let operation = operation_name("update", Collection::Tags);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let tag = state
            .tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found(&operation, Collection::Tags, id))?;
        tag.name = draft.name.clone();
        tag.color = draft.color.clone();
        Ok(tag.clone())
    }

    async fn delete_tag(&self, id: &str) -> RemoteResult<()> {
        let operation = operation_name("delete", Collection::Tags);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let before = state.tags.len();
        state.tags.retain(|t| t.id != id);
        if state.tags.len() == before {
            return Err(not_found(&operation, Collection::Tags, id));
        }
        for task in &mut state.tasks {
            task.tags.retain(|t| t != id);
        }
        Ok(())
    }

    async fn list_tasks(&self, filters: &TaskFilters) -> RemoteResult<Vec<Task>> {
        let mut state = self.inner.lock();
        state.task_queries.push(filters.clone());
        state.record(&operation_name("list", Collection::Tasks))?;
        Ok(state
            .tasks
            .iter()
            .filter(|task| matches_filters(task, filters))
            .map(|task| state.hydrate(task))
            .collect())
    }

    async fn get_task(&self, id: &str) -> RemoteResult<Task> {
        let operation = operation_name("get", Collection::Tasks);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let task = state
            .tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found(&operation, Collection::Tasks, id))?;
        Ok(state.hydrate(task))
    }

    async fn create_task(&self, draft: &TaskDraft) -> RemoteResult<Task> {
        let operation = operation_name("create", Collection::Tasks);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        if draft.title.trim().is_empty() {
            return Err(bad_request(&operation, "title is required"));
        }
        let stored = state.insert_task(draft.clone());
        Ok(state.hydrate(&stored))
    }

    async fn update_task(&self, id: &str, draft: &TaskDraft) -> RemoteResult<Task> {
        let operation = operation_name("update", Collection::Tasks);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found(&operation, Collection::Tasks, id))?;
        apply_draft(task, draft.clone());
        let stored = task.clone();
        Ok(state.hydrate(&stored))
    }

    async fn delete_task(&self, id: &str) -> RemoteResult<()> {
        let operation = operation_name("delete", Collection::Tasks);
        let mut state = self.inner.lock();
        state.record(&operation)?;
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        if state.tasks.len() == before {
            return Err(not_found(&operation, Collection::Tasks, id));
        }
        Ok(())
    }

    async fn aggregate(&self, query: Aggregate) -> RemoteResult<Value> {
        let mut state = self.inner.lock();
        state.record(query.path())?;

        let payload = match query {
            Aggregate::TasksByStatus => {
                let rows: Vec<Value> = [
                    TaskStatus::Pending,
                    TaskStatus::InProgress,
                    TaskStatus::Completed,
                ]
                .into_iter()
                .map(|status| {
                    let count = state.tasks.iter().filter(|t| t.status == status).count();
                    (status, count)
                })
                .filter(|(_, count)| *count > 0)
                .map(|(status, count)| json!({ "_id": status.as_str(), "count": count }))
                .collect();
                Value::Array(rows)
            }
            Aggregate::TasksByFolder => Value::Array(
                state
                    .folders
                    .iter()
                    .map(|folder| {
                        let count = state.tasks.iter().filter(|t| t.in_folder(&folder.id)).count();
                        json!({ "_id": folder.id, "name": folder.name, "count": count })
                    })
                    .collect(),
            ),
            Aggregate::TasksByTag => Value::Array(
                state
                    .tags
                    .iter()
                    .map(|tag| {
                        let count = state.tasks.iter().filter(|t| t.has_tag(&tag.id)).count();
                        json!({
                            "_id": tag.id,
                            "name": tag.name,
                            "color": tag.color,
                            "count": count
                        })
                    })
                    .collect(),
            ),
            Aggregate::TaskStats => {
                let now = Utc::now();
                let total = state.tasks.len();
                let count_status =
                    |status: TaskStatus| state.tasks.iter().filter(|t| t.status == status).count();
                let completed = count_status(TaskStatus::Completed);
                let overdue = state
                    .tasks
                    .iter()
                    .filter(|t| !t.is_completed() && t.due_date.is_some_and(|due| due < now))
                    .count();
                let completion_rate = if total == 0 {
                    0.0
                } else {
                    (completed as f64 / total as f64 * 1000.0).round() / 10.0
                };
                json!({
                    "total": total,
                    "pending": count_status(TaskStatus::Pending),
                    "in_progress": count_status(TaskStatus::InProgress),
                    "completed": completed,
                    "overdue": overdue,
                    "completionRate": completion_rate
                })
            }
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime")
            .block_on(future)
    }

    #[test]
    fn filters_and_details_follow_server_semantics() {
        let gw = InMemoryGateway::new();
        let work = gw.seed_folder("Work");
        let urgent = gw.seed_tag("urgent", "#ff0000");

        let mut draft = TaskDraft::new("Ship release");
        draft.folders = vec![work.id.clone()];
        draft.tags = vec![urgent.id.clone()];
        gw.seed_task(draft);
        gw.seed_task(TaskDraft::new("Unfiled"));

        let in_work = run_async(gw.list_tasks(&TaskFilters::for_selection(
            Some(work.id.clone()),
            None,
        )))
        .expect("list work tasks");
        assert_eq!(in_work.len(), 1);
        assert_eq!(in_work[0].title, "Ship release");
        assert_eq!(
            in_work[0].folder_details,
            Some(vec![FolderDetail {
                id: "f1".to_string(),
                name: "Work".to_string(),
            }])
        );

        run_async(gw.delete_tag(&urgent.id)).expect("delete tag");
        let by_tag = run_async(gw.list_tasks(&TaskFilters::for_selection(
            None,
            Some(urgent.id.clone()),
        )))
        .expect("list by deleted tag");
        assert!(by_tag.is_empty());
        assert_eq!(gw.task_queries().len(), 2);
    }

    #[test]
    fn injected_failure_fires_once() {
        let gw = InMemoryGateway::new();
        gw.fail_next("list folders");

        let err = run_async(gw.list_folders()).expect_err("first call fails");
        assert_eq!(err.operation, "list folders");
        assert!(run_async(gw.list_folders()).is_ok());
        assert_eq!(gw.calls(), vec!["list folders", "list folders"]);
    }

    #[test]
    fn stats_count_completion_and_overdue() {
        let gw = InMemoryGateway::new();
        let mut done = TaskDraft::new("done");
        done.status = TaskStatus::Completed;
        gw.seed_task(done);
        let mut late = TaskDraft::new("late");
        late.due_date = Some(Utc::now() - chrono::Duration::days(2));
        gw.seed_task(late);

        let stats = run_async(gw.task_stats()).expect("stats");
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["completed"], 1);
        assert_eq!(stats["overdue"], 1);
        assert_eq!(stats["completionRate"], 50.0);

        let by_status = run_async(gw.tasks_by_status()).expect("by status");
        assert_eq!(
            by_status,
            json!([
                { "_id": "pending", "count": 1 },
                { "_id": "completed", "count": 1 }
            ])
        );
    }

    #[test]
    fn missing_records_surface_as_not_found() {
        let gw = InMemoryGateway::new();
        let err = run_async(gw.update_task("t42", &TaskDraft::new("x"))).expect_err("missing");
        assert_eq!(err.status_code(), Some(404));
    }
}
