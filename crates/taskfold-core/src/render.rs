use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use taskfold_shared::{Folder, Tag, Task, TaskPriority, TaskStatus};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::projection;
use crate::store::StoreSnapshot;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            color: cfg.color_enabled()? && io::stdout().is_terminal(),
        })
    }

    #[tracing::instrument(skip(self, snapshot, now))]
    pub fn print_task_list(&mut self, snapshot: &StoreSnapshot, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.write_task_list(io::stdout().lock(), snapshot, now)
    }

    fn write_task_list<W: Write>(
        &self,
        mut out: W,
        snapshot: &StoreSnapshot,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&projection::list_title(snapshot), "1"))?;

        let tasks = projection::visible_tasks(snapshot);
        if tasks.is_empty() {
            writeln!(out, "No tasks found")?;
            return Ok(());
        }

        let headers = ["ID", "Status", "Priority", "Due", "Folder", "Title", "Tags"]
            .map(str::to_string)
            .to_vec();

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due_date
                .map(|date| date.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let due = match task.due_date {
                Some(date) if date < now && !task.is_completed() => self.paint(&due, "31"),
                _ => due,
            };

            rows.push(vec![
                self.paint(&task.id, "33"),
                self.status_cell(task.status),
                self.priority_cell(task.priority),
                due,
                folder_label(task, snapshot),
                task.title.clone(),
                tag_labels(task, snapshot),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out, "{} task(s)", tasks.len())?;
        Ok(())
    }

    pub fn print_folders(&mut self, folders: &[Folder], selected: Option<&str>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if folders.is_empty() {
            writeln!(out, "No folders")?;
            return Ok(());
        }

        let headers = vec!["ID".to_string(), "Name".to_string()];
        let rows = folders
            .iter()
            .map(|folder| {
                let name = if selected == Some(folder.id.as_str()) {
                    self.paint(&folder.name, "1")
                } else {
                    folder.name.clone()
                };
                vec![self.paint(&folder.id, "33"), name]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_tags(&mut self, tags: &[Tag]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tags.is_empty() {
            writeln!(out, "No tags")?;
            return Ok(());
        }

        let headers = vec!["ID".to_string(), "Name".to_string(), "Color".to_string()];
        let rows = tags
            .iter()
            .map(|tag| vec![self.paint(&tag.id, "33"), format!("#{}", tag.name), tag.color.clone()])
            .collect();
        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, task, snapshot))]
    pub fn print_task_info(&mut self, task: &Task, snapshot: &StoreSnapshot) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status)?;
        writeln!(out, "priority  {}", task.priority)?;
        if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "desc      {description}")?;
        }
        if let Some(due) = task.due_date {
            writeln!(out, "due       {}", due.with_timezone(&Local).format("%Y-%m-%d %H:%M"))?;
        }
        writeln!(out, "folders   {}", folder_label(task, snapshot))?;
        writeln!(out, "tags      {}", tag_labels(task, snapshot))?;
        Ok(())
    }

    pub fn print_json(&mut self, value: &Value) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn print_message(&mut self, message: &str) -> anyhow::Result<()> {
        writeln!(io::stdout().lock(), "{message}")?;
        Ok(())
    }

    fn status_cell(&self, status: TaskStatus) -> String {
        match status {
            TaskStatus::Pending => status.to_string(),
            TaskStatus::InProgress => self.paint(status.as_str(), "36"),
            TaskStatus::Completed => self.paint(status.as_str(), "32"),
        }
    }

    fn priority_cell(&self, priority: TaskPriority) -> String {
        match priority {
            TaskPriority::Low => self.paint(priority.as_str(), "32"),
            TaskPriority::Medium => self.paint(priority.as_str(), "33"),
            TaskPriority::High => self.paint(priority.as_str(), "31"),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Prefers the server-joined details; falls back to the cached folder list.
fn folder_label(task: &Task, snapshot: &StoreSnapshot) -> String {
    match &task.folder_details {
        Some(details) if !details.is_empty() => details
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => task
            .folders
            .iter()
            .map(|id| projection::folder_name(snapshot, id))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn tag_labels(task: &Task, snapshot: &StoreSnapshot) -> String {
    let names: Vec<&str> = match &task.tag_details {
        Some(details) if !details.is_empty() => details.iter().map(|d| d.name.as_str()).collect(),
        _ => task
            .tags
            .iter()
            .map(|id| projection::tag_name(snapshot, id))
            .collect(),
    };
    names
        .iter()
        .map(|name| format!("#{name}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use taskfold_shared::{FolderDetail, Task};

    use super::*;

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            due_date: None,
            folders: vec![],
            tags: vec![],
            folder_details: None,
            tag_details: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[33mt1\x1b[0m".to_string(), "Écrire".to_string()],
                vec!["t10".to_string(), "x".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID  Title  ");
        assert_eq!(lines[1], "--- ------ ");
        assert_eq!(strip_ansi(lines[2]), "t1  Écrire ");
        assert_eq!(lines[3], "t10 x      ");
    }

    #[test]
    fn task_list_uses_details_then_cache_names() {
        let renderer = Renderer { color: false };
        let mut joined = task("t1", "Write report");
        joined.folders = vec!["f1".to_string()];
        joined.folder_details = Some(vec![FolderDetail {
            id: "f1".to_string(),
            name: "Work".to_string(),
        }]);
        let mut bare = task("t2", "Call bank");
        bare.tags = vec!["g9".to_string()];
        bare.due_date = Some(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).single().expect("valid date"));

        let snapshot = StoreSnapshot {
            tasks: vec![joined, bare],
            ..StoreSnapshot::default()
        };

        let mut buf = Vec::new();
        renderer
            .write_task_list(&mut buf, &snapshot, Utc::now())
            .expect("write list");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.starts_with("All Tasks\n"));
        assert!(text.contains("Work"));
        assert!(text.contains("#Unknown"));
        assert!(text.contains("2 task(s)"));
    }

    #[test]
    fn empty_list_says_so() {
        let renderer = Renderer { color: false };
        let mut buf = Vec::new();
        renderer
            .write_task_list(&mut buf, &StoreSnapshot::default(), Utc::now())
            .expect("write list");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "All Tasks\nNo tasks found\n");
    }
}
