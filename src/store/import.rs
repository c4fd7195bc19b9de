use crate::errors::{AppError, AppResult};
use crate::models::SavedView;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

/// Wire shape accepted by `importState`. Extra fields (including a foreign
/// `activeByScope`) are ignored; only views travel across stores.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPayload {
    #[serde(default)]
    pub version: Option<u32>,
    pub views: Vec<SavedView>,
}

static IMPORT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "required": ["views"],
        "properties": {
            "views": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["id", "scope", "name"],
                    "properties": {
                        "id": { "type": "string", "minLength": 1 },
                        "scope": { "enum": ["demands", "tickets"] },
                        "name": { "type": "string" }
                    }
                }
            }
        }
    })
});

static COMPILED_SCHEMA: Lazy<jsonschema::JSONSchema> = Lazy::new(|| {
    jsonschema::JSONSchema::compile(&IMPORT_SCHEMA).expect("valid import schema")
});

/// Parses and validates a serialized import payload. This is the one store
/// operation allowed to fail loudly; the caller surfaces the message.
pub fn parse_import_payload(serialized: &str) -> AppResult<ImportPayload> {
    let raw: Value = serde_json::from_str(serialized)
        .map_err(|error| AppError::Import(format!("payload is not valid JSON: {error}")))?;

    let errors: Vec<String> = COMPILED_SCHEMA
        .validate(&raw)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    if !errors.is_empty() {
        return Err(AppError::Import(format!(
            "payload must contain at least one view ({})",
            errors.join("; ")
        )));
    }

    serde_json::from_value(raw)
        .map_err(|error| AppError::Import(format!("payload shape is invalid: {error}")))
}
