use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

const TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SuggestError {
    #[error("no translation service configured")]
    NotConfigured,

    #[error("translation service did not answer within {TIMEOUT_SECS}s")]
    Timeout,

    #[error("translation service answered HTTP {0}; check the API key or try again later")]
    Status(u16),

    #[error("translation service returned an unexpected response")]
    Malformed,

    #[error("translation request failed: {0}")]
    Transport(String),
}

impl SuggestError {
    pub fn kind(&self) -> &'static str {
        match self {
            SuggestError::NotConfigured => "not_configured",
            SuggestError::Timeout => "timeout",
            SuggestError::Status(_) => "status",
            SuggestError::Malformed => "malformed",
            SuggestError::Transport(_) => "transport",
        }
    }

    /// Shape handed back to the editor instead of a server fault.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

fn endpoint_for(auth_key: &str) -> &'static str {
    if auth_key.to_lowercase().ends_with(":fx") {
        "https://api-free.deepl.com/v2/translate"
    } else {
        "https://api.deepl.com/v2/translate"
    }
}

pub fn translate_by_deepl(
    text: &str,
    to_language: &str,
    auth_key: Option<&str>,
) -> Result<String, SuggestError> {
    let auth_key = auth_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(SuggestError::NotConfigured)?;

    let client = Client::builder()
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .map_err(|e| SuggestError::Transport(e.to_string()))?;

    let target_lang = to_language.to_uppercase();
    let resp = client
        .post(endpoint_for(auth_key))
        .header("Authorization", format!("DeepL-Auth-Key {auth_key}"))
        .form(&[("target_lang", target_lang.as_str()), ("text", text)])
        .send()
        .map_err(classify)?;

    let status = resp.status();
    let body = resp.text().map_err(classify)?;
    parse_response(status, &body)
}

fn classify(err: reqwest::Error) -> SuggestError {
    if err.is_timeout() {
        SuggestError::Timeout
    } else {
        SuggestError::Transport(err.to_string())
    }
}

pub fn parse_response(status: StatusCode, body: &str) -> Result<String, SuggestError> {
    if status != StatusCode::OK {
        return Err(SuggestError::Status(status.as_u16()));
    }

    let v: Value = serde_json::from_str(body).map_err(|_| SuggestError::Malformed)?;
    v.get("translations")
        .and_then(|t| t.get(0))
        .and_then(|t| t.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or(SuggestError::Malformed)
}
