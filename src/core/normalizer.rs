use crate::core::policy::{is_paramtools_format, Policy};
use crate::domain::model::{Domain, NormalizedParamSet, ParamBlock, RawParamSet};
use crate::utils::error::{Result, StitchError};
use serde_json::Value;
use std::path::Path;

/// 依序處理四個領域，遇到第一個無效的領域就整個中止
pub fn normalize(raw: &RawParamSet) -> Result<NormalizedParamSet> {
    let mut normalized = NormalizedParamSet::default();
    for domain in Domain::ALL {
        let block = normalize_domain(domain, raw.get(domain))?;
        tracing::debug!("✅ {} inputs normalized ({} parameters)", domain, block.len());
        normalized.set(domain, block);
    }
    Ok(normalized)
}

pub fn normalize_domain(domain: Domain, input: Option<&str>) -> Result<ParamBlock> {
    let input = match input {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Ok(ParamBlock::new()),
    };

    let document = read_json(input).map_err(|message| StitchError::validation(domain, message))?;

    if domain != Domain::Policy {
        return Ok(document);
    }

    let policy = Policy::baseline()?;
    if is_paramtools_format(&document) {
        policy
            .validate_adjustment(&document)
            .map_err(|e| StitchError::validation(domain, e.to_string()))?;
        return Ok(document);
    }

    tracing::debug!("🔄 policy inputs are a legacy reform, translating to paramtools format");
    policy
        .implement_reform(&document)
        .map_err(|e| StitchError::validation(domain, e.to_string()))
}

/// 讀取 JSON 字串或本機 JSON 檔案，頂層必須是物件
fn read_json(input: &str) -> std::result::Result<ParamBlock, String> {
    let trimmed = input.trim();
    let document = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(e) if trimmed.starts_with('{') || trimmed.starts_with('[') => {
            return Err(format!("Invalid JSON: {}", e));
        }
        Err(_) => read_json_file(trimmed)?,
    };

    match document {
        Value::Object(map) => Ok(map),
        other => Err(format!("Expected a JSON object, got {}", json_kind(&other))),
    }
}

fn read_json_file(location: &str) -> std::result::Result<Value, String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Err(format!("Remote parameter files are not supported: {}", location));
    }
    let path = Path::new(location);
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => format!("File not found: {}", path.display()),
        _ => format!("Unable to read {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&contents).map_err(|e| format!("Invalid JSON in {}: {}", path.display(), e))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
