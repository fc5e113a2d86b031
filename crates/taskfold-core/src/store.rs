//! Entity Store: the single in-process cache of folders, tasks and tags.
//!
//! All mutation of the cached collections and of the selection goes through
//! [`EntityStore`]. Every mutation waits for the remote store to confirm it;
//! nothing is applied optimistically. The state lock is never held across an
//! `.await`, so operations may interleave freely at the gateway boundary.
//!
//! Loads are sequence-numbered per collection. A response is applied only if
//! its load is still the most recently issued one, so a slow response for an
//! older filter can never overwrite a newer result.

use std::sync::Arc;

use parking_lot::Mutex;
use taskfold_shared::{
    Folder, FolderDraft, Tag, TagDraft, Task, TaskDraft, TaskFilters, TaskPriority, TaskStatus,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{RemoteError, StoreError, ValidationError};
use crate::gateway::{Collection, Gateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadingState {
    pub folders: bool,
    pub tasks: bool,
    pub tags: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { count: usize },
    /// A newer load for the same collection was issued before this one finished.
    Superseded,
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied { .. })
    }
}

/// A consistent copy of everything the presentation layer may read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreSnapshot {
    pub folders: Vec<Folder>,
    pub tasks: Vec<Task>,
    pub tags: Vec<Tag>,
    pub selected_folder: Option<String>,
    pub selected_tags: Vec<String>,
    pub loading: LoadingState,
}

#[derive(Debug, Default, Clone, Copy)]
struct LoadTracker {
    issued: u64,
    in_flight: usize,
}

impl LoadTracker {
    fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.in_flight += 1;
        self.issued
    }

    /// Returns whether `seq` is still the latest issued load.
    fn finish(&mut self, seq: u64) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        seq == self.issued
    }

    fn supersede(&mut self) {
        self.issued += 1;
    }

    fn is_loading(&self) -> bool {
        self.in_flight > 0
    }
}

#[derive(Debug, Default)]
struct StoreState {
    folders: Vec<Folder>,
    tasks: Vec<Task>,
    tags: Vec<Tag>,
    selected_folder: Option<String>,
    // only the first entry is sent to the gateway
    selected_tags: Vec<String>,
    folder_loads: LoadTracker,
    task_loads: LoadTracker,
    tag_loads: LoadTracker,
    active: bool,
    // bumped by teardown; mutation results from an older epoch are dropped
    epoch: u64,
}

impl StoreState {
    fn tracker_mut(&mut self, collection: Collection) -> &mut LoadTracker {
        match collection {
            Collection::Folders => &mut self.folder_loads,
            Collection::Tasks => &mut self.task_loads,
            Collection::Tags => &mut self.tag_loads,
        }
    }

    fn loading(&self) -> LoadingState {
        LoadingState {
            folders: self.folder_loads.is_loading(),
            tasks: self.task_loads.is_loading(),
            tags: self.tag_loads.is_loading(),
        }
    }

    fn effective_tag(&self) -> Option<String> {
        self.selected_tags.first().cloned()
    }

    fn selection_filters(&self) -> TaskFilters {
        TaskFilters::for_selection(self.selected_folder.clone(), self.effective_tag())
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            folders: self.folders.clone(),
            tasks: self.tasks.clone(),
            tags: self.tags.clone(),
            selected_folder: self.selected_folder.clone(),
            selected_tags: self.selected_tags.clone(),
            loading: self.loading(),
        }
    }
}

pub struct EntityStore {
    gateway: Arc<dyn Gateway>,
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
}

impl EntityStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            gateway,
            state: Mutex::new(StoreState::default()),
            revision,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Receives a new revision number after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn changed(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state.lock().folders.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.state.lock().tags.clone()
    }

    pub fn selected_folder(&self) -> Option<String> {
        self.state.lock().selected_folder.clone()
    }

    pub fn selected_tags(&self) -> Vec<String> {
        self.state.lock().selected_tags.clone()
    }

    pub fn loading(&self) -> LoadingState {
        self.state.lock().loading()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().snapshot()
    }

    /// Issues the three initial loads concurrently. Later calls are no-ops
    /// until [`EntityStore::teardown`].
    #[instrument(skip(self))]
    pub async fn activate(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock();
            if state.active {
                debug!("entity store already active");
                return Ok(());
            }
            state.active = true;
        }
        info!("activating entity store");

        let (folders, tags, tasks) = tokio::join!(
            self.load_folders(),
            self.load_tags(),
            self.load_tasks(TaskFilters::default())
        );
        folders?;
        tags?;
        tasks?;
        Ok(())
    }

    /// Drops all cached state and selection. Loads and mutations still in
    /// flight are superseded: their responses are discarded when they arrive,
    /// though a mutation the server already committed stays committed.
    #[instrument(skip(self))]
    pub fn teardown(&self) {
        {
            let mut state = self.state.lock();
            state.folders.clear();
            state.tasks.clear();
            state.tags.clear();
            state.selected_folder = None;
            state.selected_tags.clear();
            state.folder_loads.supersede();
            state.task_loads.supersede();
            state.tag_loads.supersede();
            state.epoch += 1;
            state.active = false;
        }
        info!("entity store torn down");
        self.changed();
    }

    fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Applies a server-confirmed mutation unless the store was torn down
    /// after the request was issued.
    fn apply_confirmed(&self, epoch: u64, apply: impl FnOnce(&mut StoreState)) {
        let applied = {
            let mut state = self.state.lock();
            if state.epoch == epoch {
                apply(&mut *state);
                true
            } else {
                false
            }
        };
        if applied {
            self.changed();
        } else {
            debug!(epoch, "store torn down since request; discarding result");
        }
    }

    fn begin_load(&self, collection: Collection) -> u64 {
        let seq = self.state.lock().tracker_mut(collection).begin();
        self.changed();
        seq
    }

    fn finish_load<T>(
        &self,
        collection: Collection,
        seq: u64,
        result: Result<Vec<T>, RemoteError>,
        slot: impl FnOnce(&mut StoreState) -> &mut Vec<T>,
    ) -> Result<LoadOutcome, StoreError> {
        let outcome = {
            let mut state = self.state.lock();
            let latest = state.tracker_mut(collection).finish(seq);
            match result {
                Ok(records) if latest => {
                    let count = records.len();
                    *slot(&mut *state) = records;
                    Ok(LoadOutcome::Applied { count })
                }
                Ok(_) => Ok(LoadOutcome::Superseded),
                Err(err) => Err(err),
            }
        };
        self.changed();

        match &outcome {
            Ok(LoadOutcome::Applied { count }) => {
                debug!(collection = collection.path(), seq, count, "load applied")
            }
            Ok(LoadOutcome::Superseded) => {
                debug!(collection = collection.path(), seq, "discarding superseded load")
            }
            Err(err) => {
                warn!(collection = collection.path(), seq, error = %err, "load failed")
            }
        }
        outcome.map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    pub async fn load_folders(&self) -> Result<LoadOutcome, StoreError> {
        let seq = self.begin_load(Collection::Folders);
        let result = self.gateway.list_folders().await;
        self.finish_load(Collection::Folders, seq, result, |state| &mut state.folders)
    }

    #[instrument(skip(self))]
    pub async fn load_tags(&self) -> Result<LoadOutcome, StoreError> {
        let seq = self.begin_load(Collection::Tags);
        let result = self.gateway.list_tags().await;
        self.finish_load(Collection::Tags, seq, result, |state| &mut state.tags)
    }

    #[instrument(skip(self))]
    pub async fn load_tasks(&self, filters: TaskFilters) -> Result<LoadOutcome, StoreError> {
        let seq = self.begin_load(Collection::Tasks);
        debug!(seq, ?filters, "loading tasks");
        let result = self.gateway.list_tasks(&filters).await;
        self.finish_load(Collection::Tasks, seq, result, |state| &mut state.tasks)
    }

    #[instrument(skip(self, draft))]
    pub async fn create_folder(&self, draft: FolderDraft) -> Result<Folder, StoreError> {
        let draft = normalize_folder(draft)?;
        let epoch = self.epoch();
        let folder = self
            .gateway
            .create_folder(&draft)
            .await
            .inspect_err(|err| warn!(error = %err, "create folder failed"))?;
        self.apply_confirmed(epoch, |state| {
            upsert_by_id(&mut state.folders, folder.clone(), |f| &f.id)
        });
        info!(id = %folder.id, name = %folder.name, "folder created");
        Ok(folder)
    }

    #[instrument(skip(self, draft))]
    pub async fn create_tag(&self, draft: TagDraft) -> Result<Tag, StoreError> {
        let draft = normalize_tag(draft)?;
        let epoch = self.epoch();
        let tag = self
            .gateway
            .create_tag(&draft)
            .await
            .inspect_err(|err| warn!(error = %err, "create tag failed"))?;
        self.apply_confirmed(epoch, |state| {
            upsert_by_id(&mut state.tags, tag.clone(), |t| &t.id)
        });
        info!(id = %tag.id, name = %tag.name, "tag created");
        Ok(tag)
    }

    /// A task load that lands between the server commit and this response
    /// already holds the record; it is replaced in place, never duplicated.
    #[instrument(skip(self, draft))]
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let draft = normalize_task(draft)?;
        let epoch = self.epoch();
        let task = self
            .gateway
            .create_task(&draft)
            .await
            .inspect_err(|err| warn!(error = %err, "create task failed"))?;
        self.apply_confirmed(epoch, |state| {
            upsert_by_id(&mut state.tasks, task.clone(), |t| &t.id)
        });
        info!(id = %task.id, title = %task.title, "task created");
        Ok(task)
    }

    #[instrument(skip(self, draft))]
    pub async fn update_folder(&self, id: &str, draft: FolderDraft) -> Result<Folder, StoreError> {
        let draft = normalize_folder(draft)?;
        let epoch = self.epoch();
        let folder = self
            .gateway
            .update_folder(id, &draft)
            .await
            .inspect_err(|err| warn!(error = %err, "update folder failed"))?;
        self.apply_confirmed(epoch, |state| {
            replace_by_id(&mut state.folders, id, folder.clone(), |f| &f.id)
        });
        Ok(folder)
    }

    #[instrument(skip(self, draft))]
    pub async fn update_tag(&self, id: &str, draft: TagDraft) -> Result<Tag, StoreError> {
        let draft = normalize_tag(draft)?;
        let epoch = self.epoch();
        let tag = self
            .gateway
            .update_tag(id, &draft)
            .await
            .inspect_err(|err| warn!(error = %err, "update tag failed"))?;
        self.apply_confirmed(epoch, |state| {
            replace_by_id(&mut state.tags, id, tag.clone(), |t| &t.id)
        });
        Ok(tag)
    }

    #[instrument(skip(self, draft))]
    pub async fn update_task(&self, id: &str, draft: TaskDraft) -> Result<Task, StoreError> {
        let draft = normalize_task(draft)?;
        let epoch = self.epoch();
        let task = self
            .gateway
            .update_task(id, &draft)
            .await
            .inspect_err(|err| warn!(error = %err, "update task failed"))?;
        self.apply_confirmed(epoch, |state| {
            replace_by_id(&mut state.tasks, id, task.clone(), |t| &t.id)
        });
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn delete_folder(&self, id: &str) -> Result<(), StoreError> {
        let epoch = self.epoch();
        self.gateway
            .delete_folder(id)
            .await
            .inspect_err(|err| warn!(error = %err, "delete folder failed"))?;
        self.apply_confirmed(epoch, |state| {
            state.folders.retain(|f| f.id != id);
            if state.selected_folder.as_deref() == Some(id) {
                debug!("clearing selection of deleted folder");
                state.selected_folder = None;
            }
        });
        info!("folder deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_tag(&self, id: &str) -> Result<(), StoreError> {
        let epoch = self.epoch();
        self.gateway
            .delete_tag(id)
            .await
            .inspect_err(|err| warn!(error = %err, "delete tag failed"))?;
        self.apply_confirmed(epoch, |state| {
            state.tags.retain(|t| t.id != id);
            state.selected_tags.retain(|t| t != id);
        });
        info!("tag deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        let epoch = self.epoch();
        self.gateway
            .delete_task(id)
            .await
            .inspect_err(|err| warn!(error = %err, "delete task failed"))?;
        self.apply_confirmed(epoch, |state| state.tasks.retain(|t| t.id != id));
        info!("task deleted");
        Ok(())
    }

    /// Sets the selected folder (`None` = all tasks) and reloads tasks for
    /// that folder and the current effective tag. Tag selection is kept.
    #[instrument(skip(self))]
    pub async fn select_folder(&self, folder_id: Option<&str>) -> Result<LoadOutcome, StoreError> {
        let filters = {
            let mut state = self.state.lock();
            if let Some(id) = folder_id
                && !state.folders.iter().any(|f| f.id == id)
            {
                return Err(ValidationError::UnknownFolder(id.to_string()).into());
            }
            state.selected_folder = folder_id.map(str::to_string);
            state.selection_filters()
        };
        self.changed();
        self.load_tasks(filters).await
    }

    /// Toggles a tag in the selection and reloads tasks.
    ///
    /// The remote filter accepts a single tag, so selecting a tag replaces the
    /// whole selection, and deselecting falls back to the next remaining tag
    /// (if any). Only that one id is ever sent to the gateway.
    #[instrument(skip(self))]
    pub async fn toggle_tag_selection(&self, tag_id: &str) -> Result<LoadOutcome, StoreError> {
        let filters = {
            let mut state = self.state.lock();
            if let Some(pos) = state.selected_tags.iter().position(|t| t == tag_id) {
                state.selected_tags.remove(pos);
            } else {
                if !state.tags.iter().any(|t| t.id == tag_id) {
                    return Err(ValidationError::UnknownTag(tag_id.to_string()).into());
                }
                state.selected_tags = vec![tag_id.to_string()];
            }
            state.selection_filters()
        };
        self.changed();
        self.load_tasks(filters).await
    }

    /// Replaces folder and tag selection in one step and issues a single task
    /// load, optionally narrowed by status and priority. Nothing changes if
    /// either id is unknown.
    #[instrument(skip(self))]
    pub async fn select_view(
        &self,
        folder_id: Option<&str>,
        tag_id: Option<&str>,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
    ) -> Result<LoadOutcome, StoreError> {
        let filters = {
            let mut state = self.state.lock();
            if let Some(id) = folder_id
                && !state.folders.iter().any(|f| f.id == id)
            {
                return Err(ValidationError::UnknownFolder(id.to_string()).into());
            }
            if let Some(id) = tag_id
                && !state.tags.iter().any(|t| t.id == id)
            {
                return Err(ValidationError::UnknownTag(id.to_string()).into());
            }
            state.selected_folder = folder_id.map(str::to_string);
            state.selected_tags = tag_id.map(str::to_string).into_iter().collect();
            TaskFilters {
                status,
                priority,
                ..state.selection_filters()
            }
        };
        self.changed();
        self.load_tasks(filters).await
    }
}

fn upsert_by_id<T>(items: &mut Vec<T>, record: T, key: impl Fn(&T) -> &String) {
    match items.iter().position(|item| key(item) == key(&record)) {
        Some(pos) => items[pos] = record,
        None => items.push(record),
    }
}

fn replace_by_id<T>(items: &mut [T], id: &str, updated: T, key: impl Fn(&T) -> &String) {
    match items.iter_mut().find(|item| key(item) == id) {
        Some(slot) => *slot = updated,
        None => debug!(id, "updated record is not cached; leaving collection as is"),
    }
}

fn normalize_folder(draft: FolderDraft) -> Result<FolderDraft, ValidationError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::BlankFolderName);
    }
    Ok(FolderDraft::new(name))
}

fn normalize_tag(draft: TagDraft) -> Result<TagDraft, ValidationError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::BlankTagName);
    }
    let color = draft.color.trim();
    if !is_hex_color(color) {
        return Err(ValidationError::InvalidTagColor(draft.color.clone()));
    }
    Ok(TagDraft::new(name).with_color(color))
}

fn normalize_task(mut draft: TaskDraft) -> Result<TaskDraft, ValidationError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ValidationError::BlankTaskTitle);
    }
    draft.title = title.to_string();
    Ok(draft)
}

fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => {
            matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}
