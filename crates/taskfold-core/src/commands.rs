use anyhow::{Context, anyhow};
use chrono::Utc;
use taskfold_shared::{FolderDraft, TagDraft, TaskDraft};
use tracing::{debug, info, instrument};

use crate::cli::{
    Command, FolderCommand, StatsView, TagCommand, TaskCommand, TaskFieldArgs, TaskListArgs,
};
use crate::render::Renderer;
use crate::store::{EntityStore, StoreSnapshot};

/// Activates the store and runs one command against it.
#[instrument(skip(store, renderer, command))]
pub async fn dispatch(
    store: &EntityStore,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    store
        .activate()
        .await
        .context("failed to load folders, tags and tasks")?;

    match command {
        Command::Tasks(args) => cmd_tasks(store, renderer, args).await,
        Command::Folders => {
            info!("command folders");
            let snapshot = store.snapshot();
            renderer.print_folders(&snapshot.folders, snapshot.selected_folder.as_deref())
        }
        Command::Tags => {
            info!("command tags");
            renderer.print_tags(&store.tags())
        }
        Command::Folder(cmd) => cmd_folder(store, renderer, cmd).await,
        Command::Tag(cmd) => cmd_tag(store, renderer, cmd).await,
        Command::Task(cmd) => cmd_task(store, renderer, cmd).await,
        Command::Stats { view } => cmd_stats(store, renderer, view).await,
    }
}

#[instrument(skip(store, renderer, args))]
async fn cmd_tasks(
    store: &EntityStore,
    renderer: &mut Renderer,
    args: TaskListArgs,
) -> anyhow::Result<()> {
    info!("command tasks");

    let narrowed = args.folder.is_some()
        || args.tag.is_some()
        || args.status.is_some()
        || args.priority.is_some();
    if narrowed {
        let snapshot = store.snapshot();
        let folder = args.folder.as_deref().map(|raw| resolve_folder_id(&snapshot, raw));
        let tag = args.tag.as_deref().map(|raw| resolve_tag_id(&snapshot, raw));
        store
            .select_view(folder.as_deref(), tag.as_deref(), args.status, args.priority)
            .await?;
    }

    renderer.print_task_list(&store.snapshot(), Utc::now())
}

#[instrument(skip(store, renderer, cmd))]
async fn cmd_folder(
    store: &EntityStore,
    renderer: &mut Renderer,
    cmd: FolderCommand,
) -> anyhow::Result<()> {
    match cmd {
        FolderCommand::Add { name } => {
            info!("command folder add");
            let folder = store.create_folder(FolderDraft::new(name)).await?;
            renderer.print_message(&format!("Created folder {} ({})", folder.id, folder.name))
        }
        FolderCommand::Rename { id, name } => {
            info!("command folder rename");
            let id = resolve_folder_id(&store.snapshot(), &id);
            let folder = store.update_folder(&id, FolderDraft::new(name)).await?;
            renderer.print_message(&format!("Renamed folder {} to {}", folder.id, folder.name))
        }
        FolderCommand::Rm { id } => {
            info!("command folder rm");
            let id = resolve_folder_id(&store.snapshot(), &id);
            store.delete_folder(&id).await?;
            renderer.print_message(&format!("Deleted folder {id}"))
        }
    }
}

#[instrument(skip(store, renderer, cmd))]
async fn cmd_tag(
    store: &EntityStore,
    renderer: &mut Renderer,
    cmd: TagCommand,
) -> anyhow::Result<()> {
    match cmd {
        TagCommand::Add { name, color } => {
            info!("command tag add");
            let mut draft = TagDraft::new(name);
            if let Some(color) = color {
                draft = draft.with_color(color);
            }
            let tag = store.create_tag(draft).await?;
            renderer.print_message(&format!("Created tag {} (#{} {})", tag.id, tag.name, tag.color))
        }
        TagCommand::Edit { id, name, color } => {
            info!("command tag edit");
            let snapshot = store.snapshot();
            let id = resolve_tag_id(&snapshot, &id);
            let current = match snapshot.tags.iter().find(|t| t.id == id) {
                Some(tag) => tag.clone(),
                None => store.gateway().get_tag(&id).await?,
            };

            let mut draft = TagDraft::from(&current);
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(color) = color {
                draft.color = color;
            }
            let tag = store.update_tag(&id, draft).await?;
            renderer.print_message(&format!("Updated tag {} (#{} {})", tag.id, tag.name, tag.color))
        }
        TagCommand::Rm { id } => {
            info!("command tag rm");
            let id = resolve_tag_id(&store.snapshot(), &id);
            store.delete_tag(&id).await?;
            renderer.print_message(&format!("Deleted tag {id}"))
        }
    }
}

#[instrument(skip(store, renderer, cmd))]
async fn cmd_task(
    store: &EntityStore,
    renderer: &mut Renderer,
    cmd: TaskCommand,
) -> anyhow::Result<()> {
    match cmd {
        TaskCommand::Add { title, fields } => {
            info!("command task add");
            let mut draft = TaskDraft::new(title);
            apply_fields(&mut draft, fields, &store.snapshot());
            let task = store.create_task(draft).await?;
            renderer.print_message(&format!("Created task {}", task.id))
        }
        TaskCommand::Edit {
            id,
            title,
            no_due,
            fields,
        } => {
            info!("command task edit");
            let snapshot = store.snapshot();
            let current = match snapshot.tasks.iter().find(|t| t.id == id) {
                Some(task) => task.clone(),
                None => store.gateway().get_task(&id).await?,
            };

            let mut draft = TaskDraft::from(&current);
            if let Some(title) = title {
                draft.title = title;
            }
            apply_fields(&mut draft, fields, &snapshot);
            if no_due {
                draft.due_date = None;
            }
            let task = store.update_task(&id, draft).await?;
            renderer.print_message(&format!("Updated task {}", task.id))
        }
        TaskCommand::Rm { id } => {
            info!("command task rm");
            store.delete_task(&id).await?;
            renderer.print_message(&format!("Deleted task {id}"))
        }
        TaskCommand::Show { id } => {
            info!("command task show");
            let task = store
                .gateway()
                .get_task(&id)
                .await
                .with_context(|| format!("no task with id {id}"))?;
            renderer.print_task_info(&task, &store.snapshot())
        }
    }
}

#[instrument(skip(store, renderer))]
async fn cmd_stats(
    store: &EntityStore,
    renderer: &mut Renderer,
    view: StatsView,
) -> anyhow::Result<()> {
    info!("command stats");
    let gateway = store.gateway();
    let value = match view {
        StatsView::Summary => gateway.task_stats().await?,
        StatsView::Status => gateway.tasks_by_status().await?,
        StatsView::Folder => gateway.tasks_by_folder().await?,
        StatsView::Tag => gateway.tasks_by_tag().await?,
    };
    if value.is_null() {
        return Err(anyhow!("remote store returned no statistics"));
    }
    renderer.print_json(&value)
}

/// Folder/tag id lists on the command line replace the task's lists.
fn apply_fields(draft: &mut TaskDraft, fields: TaskFieldArgs, snapshot: &StoreSnapshot) {
    if let Some(description) = fields.description {
        draft.description = description;
    }
    if let Some(status) = fields.status {
        draft.status = status;
    }
    if let Some(priority) = fields.priority {
        draft.priority = priority;
    }
    if fields.due.is_some() {
        draft.due_date = fields.due;
    }
    if !fields.folders.is_empty() {
        draft.folders = fields
            .folders
            .iter()
            .map(|raw| resolve_folder_id(snapshot, raw))
            .collect();
    }
    if !fields.tags.is_empty() {
        draft.tags = fields
            .tags
            .iter()
            .map(|raw| resolve_tag_id(snapshot, raw))
            .collect();
    }
}

/// Accepts an id or a case-insensitive folder name. Unmatched input is
/// passed through so the store can reject it.
fn resolve_folder_id(snapshot: &StoreSnapshot, raw: &str) -> String {
    if snapshot.folders.iter().any(|f| f.id == raw) {
        return raw.to_string();
    }
    match snapshot
        .folders
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(raw))
    {
        Some(folder) => {
            debug!(name = raw, id = %folder.id, "resolved folder name");
            folder.id.clone()
        }
        None => raw.to_string(),
    }
}

fn resolve_tag_id(snapshot: &StoreSnapshot, raw: &str) -> String {
    let raw = raw.strip_prefix('#').unwrap_or(raw);
    if snapshot.tags.iter().any(|t| t.id == raw) {
        return raw.to_string();
    }
    match snapshot
        .tags
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(raw))
    {
        Some(tag) => {
            debug!(name = raw, id = %tag.id, "resolved tag name");
            tag.id.clone()
        }
        None => raw.to_string(),
    }
}
