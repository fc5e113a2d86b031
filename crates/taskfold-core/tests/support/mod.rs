#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taskfold_core::gateway::{Aggregate, Gateway, InMemoryGateway, RemoteResult};
use taskfold_shared::{Folder, FolderDraft, Tag, TagDraft, Task, TaskDraft, TaskFilters};
use tokio::sync::{mpsc, oneshot};

/// A task list request parked until the test releases it.
pub struct PendingLoad {
    pub filters: TaskFilters,
    release: oneshot::Sender<()>,
}

impl PendingLoad {
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// A folder or task the server has already committed, whose create response
/// is held until the test releases it.
pub struct PendingCreate {
    pub id: String,
    release: oneshot::Sender<()>,
}

impl PendingCreate {
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Wraps [`InMemoryGateway`] and parks chosen calls until the test releases
/// them, so response order can be chosen explicitly.
pub struct GatedGateway {
    pub inner: InMemoryGateway,
    loads: Option<mpsc::UnboundedSender<PendingLoad>>,
    creates: Option<mpsc::UnboundedSender<PendingCreate>>,
}

impl GatedGateway {
    /// Holds every `list_tasks` call.
    pub fn new(inner: InMemoryGateway) -> (Arc<Self>, mpsc::UnboundedReceiver<PendingLoad>) {
        let (loads, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            inner,
            loads: Some(loads),
            creates: None,
        };
        (Arc::new(gateway), rx)
    }

    /// Commits `create_folder` and `create_task` at once but holds their
    /// responses. Lists are answered immediately.
    pub fn parking_creates(
        inner: InMemoryGateway,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PendingCreate>) {
        let (creates, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            inner,
            loads: None,
            creates: Some(creates),
        };
        (Arc::new(gateway), rx)
    }

    async fn hold_create(&self, id: &str) {
        let Some(creates) = &self.creates else {
            return;
        };
        let (release, gate) = oneshot::channel();
        let _ = creates.send(PendingCreate {
            id: id.to_string(),
            release,
        });
        let _ = gate.await;
    }
}

#[async_trait]
impl Gateway for GatedGateway {
    async fn list_folders(&self) -> RemoteResult<Vec<Folder>> {
        self.inner.list_folders().await
    }

    async fn get_folder(&self, id: &str) -> RemoteResult<Folder> {
        self.inner.get_folder(id).await
    }

    async fn create_folder(&self, draft: &FolderDraft) -> RemoteResult<Folder> {
        let folder = self.inner.create_folder(draft).await?;
        self.hold_create(&folder.id).await;
        Ok(folder)
    }

    async fn update_folder(&self, id: &str, draft: &FolderDraft) -> RemoteResult<Folder> {
        self.inner.update_folder(id, draft).await
    }

    async fn delete_folder(&self, id: &str) -> RemoteResult<()> {
        self.inner.delete_folder(id).await
    }

    async fn list_tags(&self) -> RemoteResult<Vec<Tag>> {
        self.inner.list_tags().await
    }

    async fn get_tag(&self, id: &str) -> RemoteResult<Tag> {
        self.inner.get_tag(id).await
    }

    async fn create_tag(&self, draft: &TagDraft) -> RemoteResult<Tag> {
        self.inner.create_tag(draft).await
    }

    async fn update_tag(&self, id: &str, draft: &TagDraft) -> RemoteResult<Tag> {
        self.inner.update_tag(id, draft).await
    }

    async fn delete_tag(&self, id: &str) -> RemoteResult<()> {
        self.inner.delete_tag(id).await
    }

    async fn list_tasks(&self, filters: &TaskFilters) -> RemoteResult<Vec<Task>> {
        if let Some(loads) = &self.loads {
            let (release, gate) = oneshot::channel();
            let _ = loads.send(PendingLoad {
                filters: filters.clone(),
                release,
            });
            let _ = gate.await;
        }
        self.inner.list_tasks(filters).await
    }

    async fn get_task(&self, id: &str) -> RemoteResult<Task> {
        self.inner.get_task(id).await
    }

    async fn create_task(&self, draft: &TaskDraft) -> RemoteResult<Task> {
        let task = self.inner.create_task(draft).await?;
        self.hold_create(&task.id).await;
        Ok(task)
    }

    async fn update_task(&self, id: &str, draft: &TaskDraft) -> RemoteResult<Task> {
        self.inner.update_task(id, draft).await
    }

    async fn delete_task(&self, id: &str) -> RemoteResult<()> {
        self.inner.delete_task(id).await
    }

    async fn aggregate(&self, query: Aggregate) -> RemoteResult<Value> {
        self.inner.aggregate(query).await
    }
}

pub fn task_in(title: &str, folders: &[&str], tags: &[&str]) -> TaskDraft {
    let mut draft = TaskDraft::new(title);
    draft.folders = folders.iter().map(|id| id.to_string()).collect();
    draft.tags = tags.iter().map(|id| id.to_string()).collect();
    draft
}

pub fn titles(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|task| task.title.clone()).collect()
}
