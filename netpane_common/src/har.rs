//! HAR 1.2 records - the high-level completed request stream
//!
//! Only the fields the panel reads are modelled; unknown fields are ignored so
//! captures from any exporter load.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// A HAR document (`{"log": {...}}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarFile {
    pub log: HarLog,
}

impl HarFile {
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarLog {
    #[serde(default)]
    pub pages: Vec<HarPage>,
    #[serde(default)]
    pub entries: Vec<CompletedRecord>,
}

impl HarLog {
    /// URL of the inspected page: the first page title, else the first entry
    pub fn page_url(&self) -> Option<&str> {
        self.pages
            .iter()
            .map(|p| p.title.as_str())
            .find(|t| t.contains("://"))
            .or_else(|| self.entries.first().map(|e| e.request.url.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarPage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// A finished request as reported by the high-level stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_date_time: Option<String>,

    pub request: HarRequest,
    pub response: HarResponse,

    /// Total elapsed time in milliseconds
    #[serde(default)]
    pub time: f64,

    #[serde(rename = "_resourceType", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(rename = "_transferSize", default, skip_serializing_if = "Option::is_none")]
    pub transfer_size: Option<f64>,
}

impl CompletedRecord {
    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn mime_type(&self) -> &str {
        &self.response.content.mime_type
    }

    /// Transfer size from the entry, or from the response where some exporters put it
    pub fn transfer_size(&self) -> Option<f64> {
        self.transfer_size.or(self.response.transfer_size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub query_string: Vec<NameValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub body_size: i64,
    #[serde(rename = "_transferSize", default, skip_serializing_if = "Option::is_none")]
    pub transfer_size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub params: Vec<PostParam>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
