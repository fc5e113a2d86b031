use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use taskfold_shared::{Folder, FolderDraft, Tag, TagDraft, Task, TaskDraft, TaskFilters};
use tracing::{debug, info, instrument, warn};

use super::{Aggregate, Collection, Gateway, RemoteResult, operation_name};
use crate::error::RemoteError;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Gateway over the remote collection API using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let trimmed = base_url.trim();
        let base_url =
            Url::parse(trimmed).with_context(|| format!("invalid api url: {trimmed}"))?;
        if base_url.cannot_be_a_base() {
            bail!("api url cannot carry a path: {base_url}");
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed building HTTP client for remote gateway")?;

        info!(base_url = %base_url, ?timeout, "remote gateway ready");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL plus escaped path segments; a trailing slash on the base is dropped.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn task_list_url(&self, filters: &TaskFilters) -> Url {
        let mut url = self.endpoint(&[Collection::Tasks.path()]);
        let pairs = filters.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        url
    }

    async fn execute(&self, operation: &str, request: RequestBuilder) -> RemoteResult<Vec<u8>> {
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| RemoteError::new(operation, err))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| RemoteError::new(operation, err))?;

        if !status.is_success() {
            warn!(operation, status = status.as_u16(), "remote returned non-success status");
            return Err(RemoteError::status(
                operation,
                status.as_u16(),
                summarize_body(&body),
            ));
        }

        debug!(operation, status = status.as_u16(), bytes = body.len(), "remote responded");
        Ok(body.to_vec())
    }

    async fn fetch<T: DeserializeOwned>(&self, operation: &str, url: Url) -> RemoteResult<T> {
        debug!(operation, url = %url, "GET");
        let body = self.execute(operation, self.client.get(url)).await?;
        decode(operation, &body)
    }

    async fn send_body<T, B>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        payload: &B,
    ) -> RemoteResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        debug!(operation, %method, url = %url, "sending body");
        let encoded = serde_json::to_vec(payload).map_err(|err| {
            RemoteError::rejected(operation, format!("failed to encode request body: {err}"))
        })?;
        let request = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .body(encoded);
        let body = self.execute(operation, request).await?;
        decode(operation, &body)
    }

    async fn list<T: DeserializeOwned>(&self, collection: Collection) -> RemoteResult<Vec<T>> {
        let operation = operation_name("list", collection);
        self.fetch(&operation, self.endpoint(&[collection.path()]))
            .await
    }

    async fn get<T: DeserializeOwned>(&self, collection: Collection, id: &str) -> RemoteResult<T> {
        let operation = operation_name("get", collection);
        self.fetch(&operation, self.endpoint(&[collection.path(), id]))
            .await
    }

    async fn create<T, B>(&self, collection: Collection, draft: &B) -> RemoteResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let operation = operation_name("create", collection);
        let url = self.endpoint(&[collection.path()]);
        self.send_body(&operation, Method::POST, url, draft).await
    }

    async fn update<T, B>(&self, collection: Collection, id: &str, draft: &B) -> RemoteResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let operation = operation_name("update", collection);
        let url = self.endpoint(&[collection.path(), id]);
        self.send_body(&operation, Method::PUT, url, draft).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
        let operation = operation_name("delete", collection);
        let url = self.endpoint(&[collection.path(), id]);
        debug!(operation = %operation, url = %url, "DELETE");
        // the ack body carries nothing the store needs
        self.execute(&operation, self.client.delete(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    #[instrument(skip(self))]
    async fn list_folders(&self) -> RemoteResult<Vec<Folder>> {
        self.list(Collection::Folders).await
    }

    #[instrument(skip(self))]
    async fn get_folder(&self, id: &str) -> RemoteResult<Folder> {
        self.get(Collection::Folders, id).await
    }

    #[instrument(skip(self, draft))]
    async fn create_folder(&self, draft: &FolderDraft) -> RemoteResult<Folder> {
        self.create(Collection::Folders, draft).await
    }

    #[instrument(skip(self, draft))]
    async fn update_folder(&self, id: &str, draft: &FolderDraft) -> RemoteResult<Folder> {
        self.update(Collection::Folders, id, draft).await
    }

    #[instrument(skip(self))]
    async fn delete_folder(&self, id: &str) -> RemoteResult<()> {
        self.delete(Collection::Folders, id).await
    }

    #[instrument(skip(self))]
    async fn list_tags(&self) -> RemoteResult<Vec<Tag>> {
        self.list(Collection::Tags).await
    }

    #[instrument(skip(self))]
    async fn get_tag(&self, id: &str) -> RemoteResult<Tag> {
        self.get(Collection::Tags, id).await
    }

    #[instrument(skip(self, draft))]
    async fn create_tag(&self, draft: &TagDraft) -> RemoteResult<Tag> {
        self.create(Collection::Tags, draft).await
    }

    #[instrument(skip(self, draft))]
    async fn update_tag(&self, id: &str, draft: &TagDraft) -> RemoteResult<Tag> {
        self.update(Collection::Tags, id, draft).await
    }

    #[instrument(skip(self))]
    async fn delete_tag(&self, id: &str) -> RemoteResult<()> {
        self.delete(Collection::Tags, id).await
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, filters: &TaskFilters) -> RemoteResult<Vec<Task>> {
        let operation = operation_name("list", Collection::Tasks);
        self.fetch(&operation, self.task_list_url(filters)).await
    }

    #[instrument(skip(self))]
    async fn get_task(&self, id: &str) -> RemoteResult<Task> {
        self.get(Collection::Tasks, id).await
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    async fn create_task(&self, draft: &TaskDraft) -> RemoteResult<Task> {
        self.create(Collection::Tasks, draft).await
    }

    #[instrument(skip(self, draft))]
    async fn update_task(&self, id: &str, draft: &TaskDraft) -> RemoteResult<Task> {
        self.update(Collection::Tasks, id, draft).await
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, id: &str) -> RemoteResult<()> {
        self.delete(Collection::Tasks, id).await
    }

    #[instrument(skip(self))]
    async fn aggregate(&self, query: Aggregate) -> RemoteResult<Value> {
        self.fetch(query.path(), self.endpoint(&[query.path()]))
            .await
    }
}

fn decode<T: DeserializeOwned>(operation: &str, body: &[u8]) -> RemoteResult<T> {
    serde_json::from_slice(body).map_err(|err| RemoteError::new(operation, err))
}

fn summarize_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use taskfold_shared::{TaskPriority, TaskStatus};

    use super::*;
    use crate::error::RemoteCause;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(base, None).expect("build gateway")
    }

    #[test]
    fn endpoints_join_under_base_path() {
        let gw = gateway("http://localhost:3000/api/");
        assert_eq!(
            gw.endpoint(&["folders"]).as_str(),
            "http://localhost:3000/api/folders"
        );
        assert_eq!(
            gw.endpoint(&["tasks", "a b/c"]).as_str(),
            "http://localhost:3000/api/tasks/a%20b%2Fc"
        );
        assert_eq!(
            gw.endpoint(&[Aggregate::TaskStats.path()]).as_str(),
            "http://localhost:3000/api/task-stats"
        );
    }

    #[test]
    fn task_list_url_omits_absent_filters() {
        let gw = gateway("http://localhost:3000/api");
        assert_eq!(
            gw.task_list_url(&TaskFilters::default()).as_str(),
            "http://localhost:3000/api/tasks"
        );

        let filters = TaskFilters {
            status: Some(TaskStatus::InProgress),
            priority: Some(TaskPriority::High),
            folder: None,
            tag: Some("g 1".to_string()),
        };
        assert_eq!(
            gw.task_list_url(&filters).as_str(),
            "http://localhost:3000/api/tasks?status=in_progress&priority=high&tag=g+1"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(HttpGateway::new("not a url", None).is_err());
        assert!(HttpGateway::new("mailto:someone@example.com", None).is_err());
    }

    #[test]
    fn decode_failure_names_operation() {
        let err = decode::<Vec<Folder>>("list folders", b"{\"oops\":").expect_err("bad json");
        assert_eq!(err.operation, "list folders");
        assert!(matches!(err.cause, RemoteCause::Decode(_)));
        assert!(err.to_string().starts_with("list folders failed: malformed response"));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 50);
        let summary = summarize_body(body.as_bytes());
        assert_eq!(summary.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert!(summary.ends_with('…'));
        assert_eq!(summarize_body(b"  not found \n"), "not found");
    }
}
