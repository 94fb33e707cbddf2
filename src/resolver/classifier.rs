use super::executor::RawResponse;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

/// Why a response that arrived was still not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("HTTP {status}")]
    HttpStatus { status: u16 },
    #[error("malformed JSON despite content-type {content_type}: {detail}")]
    MalformedDeclaredJson { content_type: String, detail: String },
    #[error("Unexpected content-type: {content_type} (body is not JSON)")]
    UnexpectedContentType { content_type: String },
}

/// Decide whether a response carries the payload.
///
/// The status gate comes first. After that the declared content-type only
/// decides which error a bad body is reported as: DraftKings regularly
/// serves valid JSON as `text/html`, so the body is parsed either way.
pub fn classify(response: &RawResponse) -> Result<Value, ClassifyError> {
    if !(200..=299).contains(&response.status) {
        return Err(ClassifyError::HttpStatus { status: response.status });
    }

    let content_type = response
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let parsed = serde_json::from_str::<Value>(&response.body);
    match content_type {
        Some(ct) if declares_json(ct) => parsed.map_err(|e| ClassifyError::MalformedDeclaredJson {
            content_type: ct.to_string(),
            detail: e.to_string(),
        }),
        other => parsed.map_err(|_| ClassifyError::UnexpectedContentType {
            content_type: other.unwrap_or("<none>").to_string(),
        }),
    }
}

/// `application/json`, `application/problem+json`, with or without parameters.
fn declares_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
