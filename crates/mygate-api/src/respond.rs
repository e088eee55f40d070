//! PostgREST-compatible response shaping

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use serde_json::{json, Value as JsonValue};

use mygate_common::error::Error;
use mygate_common::types::ApiError;
use mygate_query::Page;

use crate::executor::ExecOutcome;

const SINGULAR_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Upsert behavior selected by the `Resolution` request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    Plain,
    Merge,
    Ignore,
}

pub fn resolution_mode(req: &HttpRequest) -> UpsertMode {
    match header(req, "Resolution") {
        Some(value) if value.contains("merge-duplicates") => UpsertMode::Merge,
        Some(value) if value.contains("ignore-duplicates") => UpsertMode::Ignore,
        _ => UpsertMode::Plain,
    }
}

pub fn wants_exact_count(req: &HttpRequest) -> bool {
    header(req, "Prefer").is_some_and(|v| v.contains("count=exact"))
}

pub fn wants_representation(req: &HttpRequest) -> bool {
    header(req, "Prefer").is_some_and(|v| v.contains("return=representation"))
}

pub fn accepts_singular(req: &HttpRequest) -> bool {
    header(req, "Accept").is_some_and(|v| v.contains(SINGULAR_MEDIA_TYPE))
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// `Content-Range` value: `<start>-<end>/<total|*>`, or `*/<total|*>` for an
/// empty page. The total is only known under `Prefer: count=exact`.
pub fn content_range(offset: u64, len: usize, total: Option<u64>) -> String {
    let total = total.map_or_else(|| "*".to_string(), |t| t.to_string());
    if len == 0 {
        format!("*/{total}")
    } else {
        format!("{}-{}/{total}", offset, offset + len as u64 - 1)
    }
}

/// Shape a list or relational result: the row array or the negotiated
/// singular object, with `Content-Range` when an exact count was requested.
pub fn list_response(
    req: &HttpRequest,
    rows: Vec<JsonValue>,
    page: Page,
    total: Option<u64>,
) -> HttpResponse {
    let range = total.map(|t| content_range(page.offset, rows.len(), Some(t)));

    if accepts_singular(req) {
        if rows.len() == 1 {
            let mut builder = HttpResponse::Ok();
            if let Some(range) = range {
                builder.insert_header(("Content-Range", range));
            }
            let mut rows = rows;
            return builder.json(rows.remove(0));
        }
        return HttpResponse::NotAcceptable().json(ApiError::new(
            "singular_mismatch",
            format!("requested a single object but {} rows qualify", rows.len()),
        ));
    }

    let mut builder = HttpResponse::Ok();
    if let Some(range) = range {
        builder.insert_header(("Content-Range", range));
    }
    builder.json(rows)
}

/// Driver metadata body for mutations without return-representation
pub fn exec_metadata(outcome: ExecOutcome) -> JsonValue {
    json!({
        "affectedRows": outcome.affected_rows,
        "insertId": outcome.last_insert_id,
    })
}

/// Map a gateway error onto its HTTP response
pub fn error(e: &Error) -> HttpResponse {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match e {
        Error::Driver { code, message } => {
            ApiError::new(e.error_code(), message.clone()).with_details(json!({ "code": code }))
        }
        Error::Database(message) => ApiError::new(e.error_code(), "internal server error")
            .with_details(json!({ "message": message })),
        other => ApiError::new(other.error_code(), other.to_string()),
    };

    HttpResponse::build(status).json(body)
}
