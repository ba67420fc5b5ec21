use serde::de::DeserializeOwned;

use crate::api::{ApiError, ApiResponse};

use super::*;
use super::request::url_decode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    Index,
    Health,
    Info,
    Metrics,
    ListTasks,
    CreateTask,
    TaskStats,
    GetTask(u64),
    UpdateTask(u64),
    DeleteTask(u64),
    ExportTasks,
    ExportReports,
    BatchExport,
    StressExport,
    GenerateReport,
    ListReports,
    ReportStats,
    ClearReportCache,
    ReportDetail(String),
    Search,
    Suggest,
    SearchStats,
}

/// Maps a method and path onto a route. A known path with the wrong method
/// is a 405, anything else unknown is a 404.
pub(crate) fn resolve_route(method: &str, path: &str) -> Result<Route, ApiError> {
    let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let route = match (method, segments.as_slice()) {
        ("GET", []) => Route::Index,
        ("GET", ["health"]) => Route::Health,
        ("GET", ["info"]) => Route::Info,
        ("GET", ["metrics"]) => Route::Metrics,

        ("GET", ["api", "tasks"]) => Route::ListTasks,
        ("POST", ["api", "tasks"]) => Route::CreateTask,
        ("GET", ["api", "tasks", "stats"]) => Route::TaskStats,
        ("GET", ["api", "tasks", id]) => Route::GetTask(parse_task_id(id)?),
        ("PUT", ["api", "tasks", id]) => Route::UpdateTask(parse_task_id(id)?),
        ("DELETE", ["api", "tasks", id]) => Route::DeleteTask(parse_task_id(id)?),

        ("GET", ["api", "export", "tasks"]) => Route::ExportTasks,
        ("GET", ["api", "export", "reports"]) => Route::ExportReports,
        ("POST", ["api", "export", "batch"]) => Route::BatchExport,
        ("GET", ["api", "export", "stress"]) => Route::StressExport,

        ("POST", ["api", "reports", "generate"]) => Route::GenerateReport,
        ("GET", ["api", "reports"]) => Route::ListReports,
        ("GET", ["api", "reports", "stats"]) => Route::ReportStats,
        ("DELETE", ["api", "reports", "cache"]) => Route::ClearReportCache,
        ("GET", ["api", "reports", id]) => {
            Route::ReportDetail(url_decode(id).map_err(|_| ApiError::InvalidParameter {
                name: "reportId",
                value: id.to_string(),
                expected: "String",
            })?)
        }

        ("GET", ["api", "search"]) => Route::Search,
        ("GET", ["api", "search", "suggest"]) => Route::Suggest,
        ("GET", ["api", "search", "stats"]) => Route::SearchStats,

        (_, segments) if is_known_path(segments) => {
            return Err(ApiError::MethodNotAllowed(method.to_string()));
        }
        _ => return Err(ApiError::NotFound(path.to_string())),
    };
    Ok(route)
}

fn is_known_path(segments: &[&str]) -> bool {
    matches!(
        segments,
        [] | ["health"]
            | ["info"]
            | ["metrics"]
            | ["api", "tasks"]
            | ["api", "tasks", _]
            | ["api", "export", "tasks" | "reports" | "batch" | "stress"]
            | ["api", "reports"]
            | ["api", "reports", _]
            | ["api", "search"]
            | ["api", "search", "suggest" | "stats"]
    )
}

fn parse_task_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse::<u64>()
        .map_err(|_| ApiError::InvalidParameter {
            name: "id",
            value: raw.to_string(),
            expected: "Long",
        })
}

pub(crate) fn handle_request(runtime: &SharedRuntime, request: &HttpRequest) -> HttpResponse {
    let (path, query) = split_target(&request.target);
    let response = match resolve_route(&request.method, &path) {
        Ok(route) => match dispatch(runtime, route, &query, request) {
            Ok(response) => response,
            Err(err) => HttpResponse::from_error(&err),
        },
        Err(err) => HttpResponse::from_error(&err),
    };
    runtime.observe_response(response.status);
    if response.status >= 500 {
        error!(method = %request.method, path = %path, status = response.status, "request failed");
    } else {
        debug!(method = %request.method, path = %path, status = response.status, "request handled");
    }
    response
}

fn dispatch(
    runtime: &SharedRuntime,
    route: Route,
    query: &HashMap<String, String>,
    request: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    match route {
        Route::Index => Ok(HttpResponse::ok_plain(render_index(runtime))),
        Route::Health => Ok(HttpResponse::ok_json(&serde_json::json!({ "status": "ok" }))),
        Route::Info => Ok(HttpResponse::ok_json(&runtime.info())),
        Route::Metrics => Ok(HttpResponse::ok_text(runtime.metrics_text())),

        Route::ListTasks => task_routes::list_tasks(runtime, query),
        Route::CreateTask => task_routes::create_task(runtime, request),
        Route::TaskStats => task_routes::task_stats(runtime),
        Route::GetTask(id) => task_routes::get_task(runtime, id),
        Route::UpdateTask(id) => task_routes::update_task(runtime, id, request),
        Route::DeleteTask(id) => task_routes::delete_task(runtime, id),

        Route::ExportTasks => pressure_routes::export_tasks(runtime, query),
        Route::ExportReports => pressure_routes::export_reports(runtime, query),
        Route::BatchExport => pressure_routes::batch_export(runtime, request),
        Route::StressExport => pressure_routes::stress(runtime, query),
        Route::GenerateReport => pressure_routes::generate_report(runtime, request),
        Route::ListReports => pressure_routes::list_reports(runtime),
        Route::ReportStats => pressure_routes::report_stats(runtime),
        Route::ClearReportCache => pressure_routes::clear_report_cache(runtime),
        Route::ReportDetail(id) => pressure_routes::report_detail(runtime, &id),
        Route::Search => pressure_routes::search(runtime, query),
        Route::Suggest => pressure_routes::suggest(runtime, query),
        Route::SearchStats => pressure_routes::search_stats(runtime),
    }
}

/// JSON body for `T`. An empty body means "all defaults".
pub(super) fn parse_json_body<T: DeserializeOwned + Default>(
    request: &HttpRequest,
) -> Result<T, ApiError> {
    if let Some(content_type) = request.headers.get("content-type")
        && !content_type
            .to_ascii_lowercase()
            .contains("application/json")
    {
        return Err(ApiError::InvalidBody(
            "content-type must include application/json".to_string(),
        ));
    }
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&request.body).map_err(|err| ApiError::InvalidBody(err.to_string()))
}

pub(super) fn ok_envelope<T: serde::Serialize>(envelope: ApiResponse<T>) -> HttpResponse {
    HttpResponse::ok_json(&envelope)
}

fn render_index(runtime: &SharedRuntime) -> String {
    let mut out = String::new();
    out.push_str("Task Manager API\n");
    out.push_str(&format!("total tasks: {}\n", runtime.tasks().len()));
    out.push_str(&format!(
        "pressure profile: {}\n\n",
        runtime.engine().profile()
    ));
    out.push_str("endpoints:\n");
    for line in [
        "GET    /health",
        "GET    /info",
        "GET    /metrics",
        "GET    /api/tasks[?status=|?priority=]",
        "GET    /api/tasks/{id}",
        "GET    /api/tasks/stats",
        "POST   /api/tasks",
        "PUT    /api/tasks/{id}",
        "DELETE /api/tasks/{id}",
        "GET    /api/export/tasks?format=&records=",
        "GET    /api/export/reports?format=&dateRange=",
        "POST   /api/export/batch",
        "GET    /api/export/stress?sizeMB=&iterations=",
        "POST   /api/reports/generate",
        "GET    /api/reports",
        "GET    /api/reports/{id}",
        "GET    /api/reports/stats",
        "DELETE /api/reports/cache",
        "GET    /api/search?query=&page=&size=",
        "GET    /api/search/suggest?prefix=",
        "GET    /api/search/stats",
    ] {
        out.push_str(line);
        out.push('\n');
    }
    out
}
