use crate::api::{
    ApiError, ApiResponse, BatchExportRequest, GenerateReportRequest, ReportLookup,
};

use super::routes::{ok_envelope, parse_json_body};
use super::*;

const DEFAULT_TASK_EXPORT_FORMAT: &str = "csv";
const DEFAULT_TASK_EXPORT_RECORDS: i64 = 10_000;
const DEFAULT_REPORT_EXPORT_FORMAT: &str = "json";
const DEFAULT_REPORT_EXPORT_RANGE: &str = "last_month";
const DEFAULT_SEARCH_PAGE: i64 = 1;
const DEFAULT_SEARCH_SIZE: i64 = 10;

pub(super) fn export_tasks(
    runtime: &SharedRuntime,
    query: &HashMap<String, String>,
) -> Result<HttpResponse, ApiError> {
    let format = text_param(query, "format", DEFAULT_TASK_EXPORT_FORMAT);
    let records =
        parse_query::<i64>(query, "records", "int")?.unwrap_or(DEFAULT_TASK_EXPORT_RECORDS);
    let export = runtime.engine().export_tasks(format, records);
    Ok(ok_envelope(
        ApiResponse::success(export).with_message("Export completed"),
    ))
}

pub(super) fn export_reports(
    runtime: &SharedRuntime,
    query: &HashMap<String, String>,
) -> Result<HttpResponse, ApiError> {
    let format = text_param(query, "format", DEFAULT_REPORT_EXPORT_FORMAT);
    let date_range = text_param(query, "dateRange", DEFAULT_REPORT_EXPORT_RANGE);
    let export = runtime.engine().export_reports(format, date_range);
    Ok(ok_envelope(
        ApiResponse::success(export).with_message("Export completed"),
    ))
}

pub(super) fn batch_export(
    runtime: &SharedRuntime,
    request: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let batch: BatchExportRequest = parse_json_body(request)?;
    let export = runtime.engine().batch_export(batch);
    Ok(ok_envelope(
        ApiResponse::success(export).with_message("Batch export completed"),
    ))
}

pub(super) fn stress(
    runtime: &SharedRuntime,
    query: &HashMap<String, String>,
) -> Result<HttpResponse, ApiError> {
    let size_mb = parse_query::<i64>(query, "sizeMB", "int")?;
    let iterations = parse_query::<i64>(query, "iterations", "int")?;
    let run = runtime.engine().stress(size_mb, iterations);
    Ok(ok_envelope(
        ApiResponse::success(run).with_message("Stress export completed"),
    ))
}

pub(super) fn generate_report(
    runtime: &SharedRuntime,
    request: &HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let report: GenerateReportRequest = parse_json_body(request)?;
    let generated = runtime.engine().generate_report(report);
    Ok(ok_envelope(
        ApiResponse::success(generated).with_message("Report generated successfully"),
    ))
}

pub(super) fn list_reports(runtime: &SharedRuntime) -> Result<HttpResponse, ApiError> {
    let reports = runtime.engine().list_reports();
    let count = reports.len();
    Ok(ok_envelope(ApiResponse::success(reports).with_count(count)))
}

/// A missing report is answered with 200 and `success: false`, carrying
/// the requested id so callers can tell a miss from a transport failure.
pub(super) fn report_detail(runtime: &SharedRuntime, id: &str) -> Result<HttpResponse, ApiError> {
    match runtime.engine().report_detail(id) {
        ReportLookup::Found(detail) => Ok(ok_envelope(ApiResponse::success(detail))),
        ReportLookup::Missing(missing) => Ok(ok_envelope(ApiResponse::failure_with_data(
            missing,
            format!("Report not found: {id}"),
        ))),
    }
}

pub(super) fn report_stats(runtime: &SharedRuntime) -> Result<HttpResponse, ApiError> {
    Ok(ok_envelope(ApiResponse::success(
        runtime.engine().cache_stats(),
    )))
}

pub(super) fn clear_report_cache(runtime: &SharedRuntime) -> Result<HttpResponse, ApiError> {
    let cleared = runtime.engine().clear_cache();
    let message = cleared.message;
    Ok(ok_envelope(
        ApiResponse::success(cleared).with_message(message),
    ))
}

pub(super) fn search(
    runtime: &SharedRuntime,
    query: &HashMap<String, String>,
) -> Result<HttpResponse, ApiError> {
    let text = query
        .get("query")
        .ok_or(ApiError::MissingParameter("query"))?;
    let page = parse_query::<i64>(query, "page", "int")?.unwrap_or(DEFAULT_SEARCH_PAGE);
    let size = parse_query::<i64>(query, "size", "int")?.unwrap_or(DEFAULT_SEARCH_SIZE);
    let results = runtime
        .engine()
        .search(text, positive_usize(page), positive_usize(size));
    let count = results.results.len();
    Ok(ok_envelope(ApiResponse::success(results).with_count(count)))
}

pub(super) fn suggest(
    runtime: &SharedRuntime,
    query: &HashMap<String, String>,
) -> Result<HttpResponse, ApiError> {
    let prefix = query
        .get("prefix")
        .ok_or(ApiError::MissingParameter("prefix"))?;
    let suggestions = runtime.engine().suggest(prefix);
    let count = suggestions.len();
    Ok(ok_envelope(
        ApiResponse::success(suggestions).with_count(count),
    ))
}

pub(super) fn search_stats(runtime: &SharedRuntime) -> Result<HttpResponse, ApiError> {
    Ok(ok_envelope(ApiResponse::success(
        runtime.engine().search_stats(),
    )))
}

fn text_param<'a>(
    query: &'a HashMap<String, String>,
    key: &str,
    default: &'a str,
) -> &'a str {
    query
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

fn positive_usize(value: i64) -> usize {
    usize::try_from(value.max(1)).unwrap_or(usize::MAX)
}
