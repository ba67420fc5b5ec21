use schema::{TaskDraft, TaskPriority, TaskStatus};
use store::TaskFilter;

use crate::api::{ApiError, ApiResponse, TaskStats};

use super::routes::{ok_envelope, parse_json_body};
use super::*;

pub(super) fn list_tasks(
    runtime: &SharedRuntime,
    query: &HashMap<String, String>,
) -> Result<HttpResponse, ApiError> {
    let filter = TaskFilter {
        status: parse_query::<TaskStatus>(query, "status", "TaskStatus")?,
        priority: parse_query::<TaskPriority>(query, "priority", "TaskPriority")?,
    };
    let tasks = runtime.tasks().list(filter);
    let count = tasks.len();
    Ok(ok_envelope(ApiResponse::success(tasks).with_count(count)))
}

pub(super) fn get_task(runtime: &SharedRuntime, id: u64) -> Result<HttpResponse, ApiError> {
    let task = runtime
        .tasks()
        .get(id)
        .ok_or(store::StoreError::MissingTask(id))?;
    Ok(ok_envelope(ApiResponse::success(task)))
}

pub(super) fn create_task(
    runtime: &SharedRuntime,
    request: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let draft: TaskDraft = parse_json_body(request)?;
    let task = runtime.tasks().create(draft)?;
    debug!(task_id = task.id, "task created");
    Ok(HttpResponse::json(
        201,
        &ApiResponse::success(task).with_message("Task created successfully"),
    ))
}

pub(super) fn update_task(
    runtime: &SharedRuntime,
    id: u64,
    request: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let patch: TaskDraft = parse_json_body(request)?;
    let task = runtime.tasks().update(id, patch)?;
    Ok(ok_envelope(
        ApiResponse::success(task).with_message("Task updated successfully"),
    ))
}

pub(super) fn delete_task(runtime: &SharedRuntime, id: u64) -> Result<HttpResponse, ApiError> {
    let task = runtime.tasks().delete(id)?;
    debug!(task_id = task.id, "task deleted");
    Ok(ok_envelope(
        ApiResponse::success(task).with_message("Task deleted successfully"),
    ))
}

pub(super) fn task_stats(runtime: &SharedRuntime) -> Result<HttpResponse, ApiError> {
    let stats = TaskStats::from(runtime.tasks().counts());
    Ok(ok_envelope(ApiResponse::success(stats)))
}
