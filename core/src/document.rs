use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub description: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id, title: title.into(), description: description.into() }
    }

    /// Title and description joined by a single space; this is what gets indexed.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// Converts one JSON record, reporting missing or mistyped fields against `position`.
    pub fn from_json(value: serde_json::Value, position: usize) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::MalformedDocument { position, reason: e.to_string() })
    }
}

/// Accepts `{"movies": [...]}`, a bare array of records, or a single record.
pub fn documents_from_json(value: serde_json::Value) -> Result<Vec<Document>> {
    match value {
        serde_json::Value::Object(mut obj) if obj.contains_key("movies") => {
            let movies = obj.remove("movies").unwrap_or(serde_json::Value::Null);
            match movies {
                serde_json::Value::Array(arr) => records(arr),
                other => Err(Error::MalformedDocument {
                    position: 0,
                    reason: format!("\"movies\" must be an array, found {}", json_kind(&other)),
                }),
            }
        }
        serde_json::Value::Array(arr) => records(arr),
        obj @ serde_json::Value::Object(_) => Ok(vec![Document::from_json(obj, 0)?]),
        other => Err(Error::MalformedDocument {
            position: 0,
            reason: format!("expected an object or array, found {}", json_kind(&other)),
        }),
    }
}

fn records(arr: Vec<serde_json::Value>) -> Result<Vec<Document>> {
    arr.into_iter()
        .enumerate()
        .map(|(position, v)| Document::from_json(v, position))
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
