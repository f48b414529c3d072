//! Request parameter collection.
//!
//! Arguments arrive through several channels; sources are consulted in a
//! fixed order and the first non-empty one wins outright; values from
//! different sources are never merged. Repeated query keys require parsing
//! the raw query string ourselves (`form_urlencoded`), since map-style
//! extractors collapse them.

use serde_json::Value;

use crate::error::ApiError;

pub struct Params {
    pairs: Vec<(String, String)>,
    /// Present when the body parsed as a JSON object.
    body_json: Option<Value>,
    /// Present when the body was non-empty free text.
    body_text: Option<String>,
}

impl Params {
    pub fn new(query: Option<&str>, body: &[u8]) -> Self {
        let pairs = query
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        let text = String::from_utf8_lossy(body);
        let trimmed = text.trim();
        let (body_json, body_text) = if trimmed.is_empty() {
            (None, None)
        } else {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) if value.is_object() => (Some(value), None),
                _ => (None, Some(trimmed.to_string())),
            }
        };

        Self {
            pairs,
            body_json,
            body_text,
        }
    }

    /// First value for a query key.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All non-empty values for a repeated query key, in order.
    pub fn repeated(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn json_flag(&self) -> bool {
        self.first("format")
            .is_some_and(|v| v.eq_ignore_ascii_case("json"))
    }

    /// Free-text parameter: query value, then a JSON body field of the same
    /// name, then the raw body.
    pub fn text(&self, key: &str) -> Option<String> {
        if let Some(value) = self.first(key) {
            if !value.trim().is_empty() {
                return Some(value.to_string());
            }
        }
        if let Some(doc) = &self.body_json {
            if let Some(value) = doc.get(key).and_then(Value::as_str) {
                if !value.trim().is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        self.body_text.clone()
    }

    /// Argument vector: repeated `arg` query params, then the `args` query
    /// param (comma- or shell-word-split), then a JSON body `args` array,
    /// then the shell-word-split raw body.
    pub fn args(&self) -> Result<Vec<String>, ApiError> {
        let repeated = self.repeated("arg");
        if !repeated.is_empty() {
            return Ok(repeated.into_iter().map(str::to_string).collect());
        }

        if let Some(raw) = self.first("args") {
            if !raw.trim().is_empty() {
                return split_args(raw);
            }
        }

        if let Some(doc) = &self.body_json {
            if let Some(listed) = doc.get("args") {
                let Some(array) = listed.as_array() else {
                    return Err(ApiError::InvalidInput(
                        "`args` must be an array of strings".into(),
                    ));
                };
                let mut out = Vec::with_capacity(array.len());
                for item in array {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => {
                            return Err(ApiError::InvalidInput(
                                "`args` must be an array of strings".into(),
                            ))
                        }
                    }
                }
                return Ok(out);
            }
            // A JSON body without `args` supplies no arguments; it is not
            // free text to be word-split.
            return Ok(Vec::new());
        }

        if let Some(text) = &self.body_text {
            return shell_split(text);
        }

        Ok(Vec::new())
    }
}

/// Comma-separated when a comma is present, shell-word rules otherwise.
fn split_args(raw: &str) -> Result<Vec<String>, ApiError> {
    if raw.contains(',') {
        return Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect());
    }
    shell_split(raw)
}

fn shell_split(raw: &str) -> Result<Vec<String>, ApiError> {
    shell_words::split(raw)
        .map_err(|err| ApiError::InvalidInput(format!("unparseable arguments: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(query: &str, body: &str) -> Params {
        Params::new(Some(query), body.as_bytes())
    }

    #[test]
    fn repeated_arg_beats_json_body() {
        let p = params("arg=foo", r#"{"args":["bar"]}"#);
        assert_eq!(p.args().unwrap(), vec!["foo"]);
    }

    #[test]
    fn repeated_args_preserve_order() {
        let p = params("arg=--cpus&arg=2&arg=--memory&arg=1g", "");
        assert_eq!(p.args().unwrap(), vec!["--cpus", "2", "--memory", "1g"]);
    }

    #[test]
    fn args_param_splits_on_commas() {
        let p = params("args=--cpus,2", "");
        assert_eq!(p.args().unwrap(), vec!["--cpus", "2"]);
    }

    #[test]
    fn args_param_shell_splits_without_commas() {
        let p = params("args=--label%20%22a%20b%22", "");
        assert_eq!(p.args().unwrap(), vec!["--label", "a b"]);
    }

    #[test]
    fn json_args_used_when_no_query_args() {
        let p = params("", r#"{"args":["ps","-q"]}"#);
        assert_eq!(p.args().unwrap(), vec!["ps", "-q"]);
    }

    #[test]
    fn json_args_must_be_strings() {
        let p = params("", r#"{"args":[1,2]}"#);
        assert!(matches!(p.args(), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn raw_body_is_shell_split() {
        let p = params("", "images -q --filter 'dangling=true'");
        assert_eq!(
            p.args().unwrap(),
            vec!["images", "-q", "--filter", "dangling=true"]
        );
    }

    #[test]
    fn unbalanced_quotes_are_invalid_input() {
        let p = params("", "echo 'oops");
        assert!(matches!(p.args(), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn json_body_without_args_is_not_word_split() {
        let p = params("", r#"{"cmd":"uptime"}"#);
        assert_eq!(p.args().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn text_prefers_query_then_json_then_body() {
        let p = params("cmd=from-query", r#"{"cmd":"from-json"}"#);
        assert_eq!(p.text("cmd").as_deref(), Some("from-query"));

        let p = params("", r#"{"cmd":"from-json"}"#);
        assert_eq!(p.text("cmd").as_deref(), Some("from-json"));

        let p = params("", "uptime -p");
        assert_eq!(p.text("cmd").as_deref(), Some("uptime -p"));

        let p = params("", "");
        assert_eq!(p.text("cmd"), None);
    }

    #[test]
    fn json_flag_detection() {
        assert!(params("format=json", "").json_flag());
        assert!(params("format=JSON", "").json_flag());
        assert!(!params("format=text", "").json_flag());
        assert!(!params("", "").json_flag());
    }
}
