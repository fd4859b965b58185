//! Rendering of inference results and pipeline failures into reply text.
//!
//! Absent result fields always render as an explicit placeholder, never
//! silently dropped; every failure domain has a distinct, non-empty
//! rendering. Nothing in here can panic on attacker-shaped input.

use std::str::FromStr;

use serde_json::Value;

use crate::error::PipelineError;

/// Placeholder for absent result fields.
const PLACEHOLDER: &str = "n/a";

/// Rendered when a failing inference response carried no body to quote.
const EMPTY_BODY: &str = "(empty body)";

/// Deployment-dependent result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// `result.object_counts` map plus `result.total_objects`.
    ObjectCount,
    /// Optional merchant/date/total/currency/tax fields under `result`.
    Receipt,
}

impl FromStr for ReplyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object_count" => Ok(Self::ObjectCount),
            "receipt" => Ok(Self::Receipt),
            other => Err(format!(
                "unknown result format '{other}' (expected 'object_count' or 'receipt')"
            )),
        }
    }
}

/// Parse a raw inference body and render it.
///
/// The only error is a parse failure; a parsed result always renders,
/// whatever fields it happens to carry.
pub fn render_result(format: ReplyFormat, raw: &str) -> Result<String, PipelineError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| PipelineError::Parse(e.to_string()))?;
    let result = value.get("result").unwrap_or(&Value::Null);
    Ok(match format {
        ReplyFormat::ObjectCount => render_object_count(result),
        ReplyFormat::Receipt => render_receipt(result),
    })
}

fn render_object_count(result: &Value) -> String {
    let total = result
        .get("total_objects")
        .and_then(Value::as_i64)
        .map_or_else(|| PLACEHOLDER.to_string(), |t| t.to_string());

    let mut out = String::from(":brain: *Vision result*\n");
    out.push_str(&format!(":white_check_mark: Total objects found: {total}\n"));
    out.push_str(":1234: Breakdown:\n");

    match result.get("object_counts").and_then(Value::as_object) {
        Some(counts) if !counts.is_empty() => {
            for (name, count) in counts {
                let count = count
                    .as_i64()
                    .map_or_else(|| PLACEHOLDER.to_string(), |c| c.to_string());
                out.push_str(&format!("• {name}: {count}\n"));
            }
        }
        _ => out.push_str(&format!("• {PLACEHOLDER}\n")),
    }
    out.trim_end().to_string()
}

fn render_receipt(result: &Value) -> String {
    let total = scalar(result, "total_amount");
    let currency = scalar(result, "currency");
    format!(
        ":receipt: *Receipt summary*\n\
         Merchant: {}\n\
         Date: {}\n\
         Total: {total} {currency}\n\
         Tax: {}",
        scalar(result, "merchant_name"),
        scalar(result, "purchase_date"),
        scalar(result, "tax_amount"),
    )
}

/// Render a scalar result field, string or number, placeholder otherwise.
fn scalar(result: &Value, key: &str) -> String {
    match result.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Render a pipeline failure as reply text.
pub fn render_failure(err: &PipelineError, excerpt_chars: usize) -> String {
    match err {
        PipelineError::MissingDownloadUrl => {
            ":x: Attachment has no downloadable URL.".to_string()
        }
        PipelineError::Download { status } => {
            format!(":x: Failed to download image (status {status}).")
        }
        PipelineError::DownloadTransport { reason } => {
            format!(":x: Failed to download image: {reason}")
        }
        PipelineError::Inference { status, body } => {
            format!(":x: Vision API error {status}: {}", excerpt(body, excerpt_chars))
        }
        PipelineError::InferenceTransport { reason } => {
            format!(":x: Vision API request failed: {reason}")
        }
        PipelineError::Parse(reason) => {
            format!(":x: Could not read the vision result: {reason}")
        }
    }
}

/// Bounded excerpt of a raw response body, cut on a character boundary.
fn excerpt(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return EMPTY_BODY.to_string();
    }
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{cut}…")
}
