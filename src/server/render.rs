//! Command result rendering.
//!
//! Text is the default: the command line, exit status and both streams in a
//! fixed plain format, `200` for exit 0 and `500` otherwise. JSON mode only
//! engages on success and only when the output actually parses; anything
//! else falls back to the error rendering so a caller never receives a
//! half-JSON response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::error::plain;
use crate::runner::CommandResult;

pub fn respond(result: CommandResult, json_mode: bool) -> Response {
    if json_mode && result.ok {
        if let Some(value) = parse_stdout(&result.stdout) {
            return (StatusCode::OK, Json(value)).into_response();
        }
        return plain(StatusCode::INTERNAL_SERVER_ERROR, result.render_text());
    }
    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    plain(status, result.render_text())
}

/// Whole-document parse first; failing that, one document per line (the
/// shape `--format json` listings produce).
fn parse_stdout(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let mut items = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        items.push(serde_json::from_str(line).ok()?);
    }
    if items.is_empty() {
        None
    } else {
        Some(Value::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ok: bool, stdout: &str) -> CommandResult {
        CommandResult {
            command: "docker ps".into(),
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: if ok { 0 } else { 1 },
            signal: None,
            ok,
        }
    }

    #[test]
    fn success_renders_200_text() {
        let response = respond(result(true, "up 2 hours\n"), false);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn failure_renders_500_text() {
        let response = respond(result(false, ""), false);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn json_mode_parses_whole_document() {
        let response = respond(result(true, r#"{"Containers": 3}"#), true);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn json_mode_handles_one_document_per_line() {
        let parsed = parse_stdout("{\"Name\":\"a\"}\n{\"Name\":\"b\"}\n").unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn json_mode_falls_back_to_500_on_unparseable_output() {
        let response = respond(result(true, "plain text, not json"), true);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn json_mode_on_failed_command_is_text_500() {
        let response = respond(result(false, r#"{"ok":false}"#), true);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
