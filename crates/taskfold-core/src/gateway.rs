//! Remote Gateway: typed operations against the remote collection API.
//!
//! The gateway is stateless from the store's point of view. It never retries
//! and never touches cached state; every failure comes back as a
//! [`RemoteError`] naming the attempted operation.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use taskfold_shared::{Folder, FolderDraft, Tag, TagDraft, Task, TaskDraft, TaskFilters};

pub use http::HttpGateway;
pub use memory::InMemoryGateway;

use crate::error::RemoteError;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Folders,
    Tags,
    Tasks,
}

impl Collection {
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Folders => "folders",
            Collection::Tags => "tags",
            Collection::Tasks => "tasks",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Collection::Folders => "folder",
            Collection::Tags => "tag",
            Collection::Tasks => "task",
        }
    }
}

/// Read-only reporting queries. Their payloads are opaque to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    TasksByStatus,
    TasksByFolder,
    TasksByTag,
    TaskStats,
}

impl Aggregate {
    pub fn path(&self) -> &'static str {
        match self {
            Aggregate::TasksByStatus => "tasks-by-status",
            Aggregate::TasksByFolder => "tasks-by-folder",
            Aggregate::TasksByTag => "tasks-by-tag",
            Aggregate::TaskStats => "task-stats",
        }
    }
}

/// Operation name used in errors, logs and failure injection,
/// e.g. `"list tasks"` or `"update folder"`.
pub fn operation_name(action: &str, collection: Collection) -> String {
    if action == "list" {
        format!("list {}", collection.path())
    } else {
        format!("{action} {}", collection.singular())
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_folders(&self) -> RemoteResult<Vec<Folder>>;
    async fn get_folder(&self, id: &str) -> RemoteResult<Folder>;
    async fn create_folder(&self, draft: &FolderDraft) -> RemoteResult<Folder>;
    async fn update_folder(&self, id: &str, draft: &FolderDraft) -> RemoteResult<Folder>;
    async fn delete_folder(&self, id: &str) -> RemoteResult<()>;

    async fn list_tags(&self) -> RemoteResult<Vec<Tag>>;
    async fn get_tag(&self, id: &str) -> RemoteResult<Tag>;
    async fn create_tag(&self, draft: &TagDraft) -> RemoteResult<Tag>;
    async fn update_tag(&self, id: &str, draft: &TagDraft) -> RemoteResult<Tag>;
    async fn delete_tag(&self, id: &str) -> RemoteResult<()>;

    /// Filters travel as query parameters; unset fields are left out.
    async fn list_tasks(&self, filters: &TaskFilters) -> RemoteResult<Vec<Task>>;
    async fn get_task(&self, id: &str) -> RemoteResult<Task>;
    async fn create_task(&self, draft: &TaskDraft) -> RemoteResult<Task>;
    async fn update_task(&self, id: &str, draft: &TaskDraft) -> RemoteResult<Task>;
    async fn delete_task(&self, id: &str) -> RemoteResult<()>;

    async fn aggregate(&self, query: Aggregate) -> RemoteResult<Value>;

    async fn tasks_by_status(&self) -> RemoteResult<Value> {
        self.aggregate(Aggregate::TasksByStatus).await
    }

    async fn tasks_by_folder(&self) -> RemoteResult<Value> {
        self.aggregate(Aggregate::TasksByFolder).await
    }

    async fn tasks_by_tag(&self) -> RemoteResult<Value> {
        self.aggregate(Aggregate::TasksByTag).await
    }

    async fn task_stats(&self) -> RemoteResult<Value> {
        self.aggregate(Aggregate::TaskStats).await
    }
}
