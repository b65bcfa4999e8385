//! Core data models used throughout ingres-rag.
//!
//! These types cover the structured groundwater records, the document index
//! entries written by ingestion, and the request/response shapes of the chat
//! and ingest operations.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One row of the structured groundwater collection.
///
/// The collection is produced by a spreadsheet export, so text columns may
/// arrive as numbers (`"season": 2021`) and numeric columns may be missing or
/// stored as strings. Deserialization accepts all of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    #[serde(default, deserialize_with = "text_or_number")]
    pub district: String,
    /// Free-form season label, often containing a year (`"Monsoon 2021"`).
    #[serde(default, deserialize_with = "text_or_number")]
    pub season: String,
    /// Groundwater level below ground, in metres.
    #[serde(rename = "gwl", default, deserialize_with = "lenient_number")]
    pub groundwater_level: Option<f64>,
    #[serde(rename = "pH", default, deserialize_with = "lenient_number")]
    pub ph: Option<f64>,
    /// Total dissolved solids, in mg/L.
    #[serde(rename = "TDS", default, deserialize_with = "lenient_number")]
    pub total_dissolved_solids: Option<f64>,
    #[serde(rename = "Classification", default, deserialize_with = "text_or_number")]
    pub classification: String,
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Index entry for one ingested document.
///
/// `path` is the location of the extracted-text artifact. `ingested_at` is
/// absent in index files written before timestamps were recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub filename: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<String>,
}

/// A document as enumerated from the index: its id plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedDocument {
    pub id: String,
    #[serde(flatten)]
    pub meta: DocumentMeta,
}

/// Receipt returned after a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub id: String,
    pub filename: String,
    /// Leading characters of the extracted text.
    pub snippet: String,
}

/// Incoming chat request. `message` is accepted as an alias of `question`.
///
/// A missing question deserializes as empty and is rejected by validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, alias = "message")]
    pub question: String,
}

/// Chat reply together with the retrieval context that grounded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub context_used: String,
}
