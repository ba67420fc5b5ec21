use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use parking_lot::RwLock;
use schema::{
    Task, TaskDraft, TaskPriority, TaskStatus, ValidationError, validate_new_task,
    validate_task_patch,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Task not found with id: {0}")]
    MissingTask(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status == status)
            && self.priority.is_none_or(|priority| task.priority == priority)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
}

/// In-memory keyed task store. Ids come from a monotonic counter and are
/// never reused, even after deletes.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<BTreeMap<u64, Task>>,
    next_id: AtomicU64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let store = Self::new();
        let seeds = [
            (
                "Configure CI/CD pipeline",
                "Wire up the build workflow and the deployment agent",
                TaskStatus::Completed,
                TaskPriority::High,
            ),
            (
                "Learn infrastructure as code",
                "Work through stack templates and change sets",
                TaskStatus::InProgress,
                TaskPriority::High,
            ),
            (
                "Write unit tests",
                "Cover the task service with unit tests",
                TaskStatus::Pending,
                TaskPriority::Medium,
            ),
            (
                "Optimize database queries",
                "Review the slow query log and tune the hot paths",
                TaskStatus::Pending,
                TaskPriority::Low,
            ),
        ];
        for (title, description, status, priority) in seeds {
            let draft = TaskDraft {
                title: Some(title.to_string()),
                description: Some(description.to_string()),
                status: Some(status),
                priority: Some(priority),
            };
            if let Err(err) = store.create(draft) {
                warn!(error = %err, title, "seed task rejected");
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self, filter: TaskFilter) -> Vec<Task> {
        self.tasks
            .read()
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    pub fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        validate_new_task(&draft)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let task = Task {
            id,
            title: draft.title.unwrap_or_default().trim().to_string(),
            description: draft.description,
            status: draft.status.unwrap_or(TaskStatus::Pending),
            priority: draft.priority.unwrap_or(TaskPriority::Medium),
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().insert(id, task.clone());
        Ok(task)
    }

    pub fn update(&self, id: u64, patch: TaskDraft) -> Result<Task, StoreError> {
        validate_task_patch(&patch)?;
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(StoreError::MissingTask(id))?;
        if let Some(title) = patch.title
            && !title.trim().is_empty()
        {
            task.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    pub fn delete(&self, id: u64) -> Result<Task, StoreError> {
        self.tasks
            .write()
            .remove(&id)
            .ok_or(StoreError::MissingTask(id))
    }

    pub fn counts(&self) -> TaskCounts {
        let tasks = self.tasks.read();
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..TaskCounts::default()
        };
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
            }
            match task.priority {
                TaskPriority::High => counts.high_priority += 1,
                TaskPriority::Medium => counts.medium_priority += 1,
                TaskPriority::Low => counts.low_priority += 1,
            }
        }
        counts
    }
}
