//! Detail views for the selected request
//!
//! Rendering produces structured blocks; turning them into markup or terminal
//! widgets is up to the frontend, which must treat every text as literal.

use crate::engine::CompletedEntry;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use netpane_common::{CompletedRecord, NameValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Response body content as returned by a fetcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub content: String,
    /// `base64` when `content` is encoded
    pub encoding: Option<String>,
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Body fetch failed: {0}")]
    Fetch(String),

    #[error("Body is not available")]
    Unavailable,
}

/// Lazily fetches a response body from the producer
#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn fetch_body(&self) -> Result<Body, BodyError>;
}

/// Fetch the body of a completed entry
///
/// Uses the producer's fetcher when there is one and falls back to the
/// record's inline content when it is missing or fails.
pub async fn load_body(entry: &CompletedEntry) -> Body {
    if let Some(fetcher) = &entry.fetcher {
        match fetcher.fetch_body().await {
            Ok(body) => return body,
            Err(e) => tracing::warn!("{} ({}), using inline content", e, entry.record.request.url),
        }
    }

    let content = &entry.record.response.content;
    Body {
        content: content.text.clone().unwrap_or_default(),
        encoding: content.encoding.clone(),
    }
}

/// Detail tabs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailTab {
    #[default]
    Headers,
    Payload,
    Preview,
    Response,
}

impl DetailTab {
    pub const ALL: [DetailTab; 4] = [
        DetailTab::Headers,
        DetailTab::Payload,
        DetailTab::Preview,
        DetailTab::Response,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailTab::Headers => "headers",
            DetailTab::Payload => "payload",
            DetailTab::Preview => "preview",
            DetailTab::Response => "response",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DetailTab::Headers => "Headers",
            DetailTab::Payload => "Payload",
            DetailTab::Preview => "Preview",
            DetailTab::Response => "Response",
        }
    }

    /// Whether rendering needs the response body
    pub fn needs_body(&self) -> bool {
        matches!(self, DetailTab::Preview | DetailTab::Response)
    }

    pub fn next(&self) -> Self {
        let i = Self::ALL.iter().position(|t| t == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn prev(&self) -> Self {
        let i = Self::ALL.iter().position(|t| t == self).unwrap_or(0);
        Self::ALL[(i + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for DetailTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown detail tab: {}", s))
    }
}

/// One block of rendered detail content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Block {
    /// Name/value rows under a title
    Table { title: String, rows: Vec<NameValue> },
    /// Literal text, never interpreted as markup
    Text { title: Option<String>, text: String },
    Json { root: JsonNode },
    Image { mime_type: String, data_base64: String },
    Notice { message: String },
}

/// Rendered content of one detail tab
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailContent {
    pub tab: DetailTab,
    pub blocks: Vec<Block>,
}

/// Render the tabs that only need the record
pub fn render_headers(record: &CompletedRecord) -> DetailContent {
    let req = &record.request;
    let res = &record.response;

    let mut blocks = vec![Block::Table {
        title: "General".to_string(),
        rows: vec![
            NameValue::new("Request URL", req.url.as_str()),
            NameValue::new("Request Method", req.method.as_str()),
            NameValue::new("Status Code", format!("{} {}", res.status, res.status_text)),
        ],
    }];
    blocks.extend(header_table("Response Headers", &res.headers));
    blocks.extend(header_table("Request Headers", &req.headers));

    DetailContent {
        tab: DetailTab::Headers,
        blocks,
    }
}

fn header_table(title: &str, headers: &[NameValue]) -> Option<Block> {
    (!headers.is_empty()).then(|| Block::Table {
        title: title.to_string(),
        rows: headers.to_vec(),
    })
}

pub fn render_payload(record: &CompletedRecord) -> DetailContent {
    let req = &record.request;
    let mut blocks = Vec::new();

    if !req.query_string.is_empty() {
        blocks.push(Block::Table {
            title: "Query String Parameters".to_string(),
            rows: req.query_string.clone(),
        });
    }

    if let Some(post) = &req.post_data {
        if !post.params.is_empty() {
            blocks.push(Block::Table {
                title: "Form Data".to_string(),
                rows: post
                    .params
                    .iter()
                    .map(|p| NameValue::new(p.name.as_str(), p.value.clone().unwrap_or_default()))
                    .collect(),
            });
        }
        if let Some(text) = post.text.as_deref().filter(|t| !t.is_empty()) {
            blocks.push(Block::Text {
                title: Some("Request Body".to_string()),
                text: pretty_json(text),
            });
        }
    }

    if blocks.is_empty() {
        blocks.push(Block::Notice {
            message: "No payload for this request.".to_string(),
        });
    }

    DetailContent {
        tab: DetailTab::Payload,
        blocks,
    }
}

/// Pretty-print JSON, or return the text unchanged when it does not parse
pub fn pretty_json(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

pub fn render_preview(record: &CompletedRecord, body: &Body) -> DetailContent {
    let mime = record.mime_type();

    let block = if mime.contains("json") {
        match serde_json::from_str::<Value>(&body.content) {
            Ok(value) => Block::Json {
                root: JsonNode::from_value(&value),
            },
            Err(e) => {
                tracing::debug!("Preview falls back to raw text: {}", e);
                raw_text(&body.content)
            }
        }
    } else if mime.contains("html") {
        raw_text(&body.content)
    } else if mime.starts_with("image/") {
        let data_base64 = if body.encoding.as_deref() == Some("base64") {
            body.content.clone()
        } else {
            STANDARD.encode(body.content.as_bytes())
        };
        Block::Image {
            mime_type: mime.to_string(),
            data_base64,
        }
    } else {
        raw_text(&body.content)
    };

    DetailContent {
        tab: DetailTab::Preview,
        blocks: vec![block],
    }
}

pub fn render_response(body: &Body) -> DetailContent {
    DetailContent {
        tab: DetailTab::Response,
        blocks: vec![raw_text(&body.content)],
    }
}

fn raw_text(content: &str) -> Block {
    let text = if content.is_empty() { "(empty)" } else { content };
    Block::Text {
        title: None,
        text: text.to_string(),
    }
}

/// Render a tab for a completed entry, fetching the body when the tab needs it
pub async fn render(entry: &CompletedEntry, tab: DetailTab) -> DetailContent {
    match tab {
        DetailTab::Headers => render_headers(&entry.record),
        DetailTab::Payload => render_payload(&entry.record),
        DetailTab::Preview => render_preview(&entry.record, &load_body(entry).await),
        DetailTab::Response => render_response(&load_body(entry).await),
    }
}

/// Node of a collapsible JSON tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonNode {
    /// Object key; `None` for the root and array items
    pub key: Option<String>,
    pub value: JsonValue,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Array(Vec<JsonNode>),
    Object(Vec<JsonNode>),
}

/// One display line of a flattened tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    /// Child indices from the root to this node
    pub path: Vec<usize>,
    pub text: String,
    pub expandable: bool,
}

impl JsonNode {
    /// Build a tree with the root expanded and everything below collapsed
    pub fn from_value(value: &Value) -> Self {
        Self::build(value, None, true)
    }

    fn build(value: &Value, key: Option<String>, expanded: bool) -> Self {
        let value = match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => JsonValue::Number(n.to_string()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => {
                JsonValue::Array(items.iter().map(|v| Self::build(v, None, false)).collect())
            }
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| Self::build(v, Some(k.clone()), false))
                    .collect(),
            ),
        };
        Self {
            key,
            value,
            expanded,
        }
    }

    pub fn children(&self) -> &[JsonNode] {
        match &self.value {
            JsonValue::Array(c) | JsonValue::Object(c) => c,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<JsonNode>> {
        match &mut self.value {
            JsonValue::Array(c) | JsonValue::Object(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.value, JsonValue::Array(_) | JsonValue::Object(_))
    }

    /// Collapsed summary, e.g. `…2 keys` or `…3 items`; empty for empty containers
    pub fn summary(&self) -> String {
        match &self.value {
            JsonValue::Array(c) if !c.is_empty() => format!("\u{2026}{} items", c.len()),
            JsonValue::Object(c) if !c.is_empty() => format!("\u{2026}{} keys", c.len()),
            _ => String::new(),
        }
    }

    /// Toggle the container at `path`; returns its new expanded state
    pub fn toggle(&mut self, path: &[usize]) -> Option<bool> {
        let mut node = self;
        for &i in path {
            node = node.children_mut()?.get_mut(i)?;
        }
        if !node.is_container() {
            return None;
        }
        node.expanded = !node.expanded;
        Some(node.expanded)
    }

    /// Flatten the visible part of the tree into display lines
    pub fn lines(&self) -> Vec<TreeLine> {
        let mut out = Vec::new();
        self.push_lines(0, &mut Vec::new(), &mut out);
        out
    }

    fn push_lines(&self, depth: usize, path: &mut Vec<usize>, out: &mut Vec<TreeLine>) {
        let key = self
            .key
            .as_ref()
            .map(|k| format!("{}: ", Value::String(k.clone())))
            .unwrap_or_default();

        let text = match &self.value {
            JsonValue::Null => format!("{}null", key),
            JsonValue::Bool(b) => format!("{}{}", key, b),
            JsonValue::Number(n) => format!("{}{}", key, n),
            JsonValue::String(s) => format!("{}{}", key, Value::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                let (open, close) = match self.value {
                    JsonValue::Array(_) => ('[', ']'),
                    _ => ('{', '}'),
                };
                let marker = if self.expanded { '\u{25BC}' } else { '\u{25B6}' };
                if self.expanded {
                    format!("{} {}{}", marker, key, open)
                } else {
                    format!("{} {}{}{}{}", marker, key, open, self.summary(), close)
                }
            }
        };

        out.push(TreeLine {
            depth,
            path: path.clone(),
            text,
            expandable: self.is_container(),
        });

        if self.is_container() && self.expanded {
            for (i, child) in self.children().iter().enumerate() {
                path.push(i);
                child.push_lines(depth + 1, path, out);
                path.pop();
            }
            let close = if matches!(self.value, JsonValue::Array(_)) { "]" } else { "}" };
            out.push(TreeLine {
                depth,
                path: path.clone(),
                text: close.to_string(),
                expandable: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Completion;
    use crate::format::SizeDisplay;
    use netpane_common::{PostData, PostParam};
    use std::sync::Arc;

    struct FailingFetcher;

    #[async_trait]
    impl BodyFetcher for FailingFetcher {
        async fn fetch_body(&self) -> Result<Body, BodyError> {
            Err(BodyError::Fetch("inspected page went away".to_string()))
        }
    }

    struct FixedFetcher(&'static str);

    #[async_trait]
    impl BodyFetcher for FixedFetcher {
        async fn fetch_body(&self) -> Result<Body, BodyError> {
            Ok(Body {
                content: self.0.to_string(),
                encoding: None,
            })
        }
    }

    fn record(mime: &str, inline: Option<&str>) -> CompletedRecord {
        let mut record = CompletedRecord::default();
        record.request.method = "GET".to_string();
        record.request.url = "https://x.test/api/users".to_string();
        record.response.status = 200;
        record.response.status_text = "OK".to_string();
        record.response.content.mime_type = mime.to_string();
        record.response.content.text = inline.map(str::to_string);
        record
    }

    fn entry(completion: Completion) -> CompletedEntry {
        CompletedEntry {
            size: SizeDisplay::from_record(&completion.record, None),
            record: completion.record,
            fetcher: completion.fetcher,
        }
    }

    fn body(content: &str) -> Body {
        Body {
            content: content.to_string(),
            encoding: None,
        }
    }

    #[test]
    fn test_headers_omit_empty_lists() {
        let mut r = record("application/json", None);
        r.response.headers = vec![NameValue::new("content-type", "application/json")];

        let content = render_headers(&r);
        let titles: Vec<_> = content
            .blocks
            .iter()
            .map(|b| match b {
                Block::Table { title, .. } => title.as_str(),
                _ => panic!("headers tab renders tables only"),
            })
            .collect();
        assert_eq!(titles, vec!["General", "Response Headers"]);

        match &content.blocks[0] {
            Block::Table { rows, .. } => assert_eq!(rows[2].value, "200 OK"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_payload_sections_in_order() {
        let mut r = record("application/json", None);
        r.request.query_string = vec![NameValue::new("page", "2")];
        r.request.post_data = Some(PostData {
            mime_type: "application/x-www-form-urlencoded".to_string(),
            text: Some("{\"a\":1}".to_string()),
            params: vec![PostParam {
                name: "q".to_string(),
                value: None,
            }],
        });

        let content = render_payload(&r);
        assert_eq!(content.blocks.len(), 3);
        assert!(matches!(&content.blocks[0], Block::Table { title, .. } if title == "Query String Parameters"));
        assert!(matches!(&content.blocks[1], Block::Table { rows, .. } if rows[0].value.is_empty()));
        match &content.blocks[2] {
            Block::Text { text, .. } => assert_eq!(text, "{\n  \"a\": 1\n}"),
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_payload_absent() {
        let content = render_payload(&record("text/html", None));
        assert_eq!(
            content.blocks,
            vec![Block::Notice {
                message: "No payload for this request.".to_string()
            }]
        );
    }

    #[test]
    fn test_pretty_json_falls_back_to_literal() {
        assert_eq!(pretty_json("user=ada&x=1"), "user=ada&x=1");
    }

    #[test]
    fn test_preview_json_tree() {
        let r = record("application/json", None);
        let content = render_preview(&r, &body(r#"{"a":1,"b":[2,3]}"#));

        let root = match &content.blocks[0] {
            Block::Json { root } => root,
            other => panic!("expected json tree, got {:?}", other),
        };
        assert!(root.expanded);
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].key.as_deref(), Some("a"));

        let nested = &root.children()[1];
        assert!(!nested.expanded);
        assert_eq!(nested.summary(), "\u{2026}2 items");

        let lines: Vec<_> = root.lines().into_iter().map(|l| l.text).collect();
        assert_eq!(
            lines,
            vec!["\u{25BC} {", "\"a\": 1", "\u{25B6} \"b\": [\u{2026}2 items]", "}"]
        );
    }

    #[test]
    fn test_json_tree_toggle() {
        let value: Value = serde_json::from_str(r#"{"b":[2,{"c":null}]}"#).unwrap();
        let mut root = JsonNode::from_value(&value);

        assert_eq!(root.toggle(&[0]), Some(true));
        let lines = root.lines();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[3].path, vec![0, 1]);
        assert!(lines[3].expandable);

        // Scalars cannot be toggled, bad paths are rejected
        assert_eq!(root.toggle(&[0, 0]), None);
        assert_eq!(root.toggle(&[5]), None);
    }

    #[test]
    fn test_preview_invalid_json_is_raw() {
        let r = record("application/json", None);
        let content = render_preview(&r, &body("{not json"));
        assert_eq!(
            content.blocks[0],
            Block::Text {
                title: None,
                text: "{not json".to_string()
            }
        );
    }

    #[test]
    fn test_preview_html_is_literal() {
        let r = record("text/html; charset=utf-8", None);
        let content = render_preview(&r, &body("<script>alert(1)</script>"));
        assert!(matches!(&content.blocks[0], Block::Text { text, .. } if text == "<script>alert(1)</script>"));
    }

    #[test]
    fn test_preview_image_encoding() {
        let r = record("image/png", None);
        let encoded = Body {
            content: "iVBORw0KGgo=".to_string(),
            encoding: Some("base64".to_string()),
        };
        match &render_preview(&r, &encoded).blocks[0] {
            Block::Image { data_base64, mime_type } => {
                assert_eq!(data_base64, "iVBORw0KGgo=");
                assert_eq!(mime_type, "image/png");
            }
            other => panic!("unexpected block {:?}", other),
        }

        let svg = record("image/svg+xml", None);
        match &render_preview(&svg, &body("<svg/>")).blocks[0] {
            Block::Image { data_base64, .. } => assert_eq!(data_base64, "PHN2Zy8+"),
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_empty_body_placeholder() {
        let r = record("text/plain", None);
        let expected = Block::Text {
            title: None,
            text: "(empty)".to_string(),
        };
        assert_eq!(render_preview(&r, &body("")).blocks[0], expected);
        assert_eq!(render_response(&body("")).blocks[0], expected);
    }

    #[tokio::test]
    async fn test_load_body_prefers_fetcher() {
        let completion = Completion::new(record("text/plain", Some("inline")))
            .with_fetcher(Arc::new(FixedFetcher("fetched")));
        assert_eq!(load_body(&entry(completion)).await.content, "fetched");
    }

    #[tokio::test]
    async fn test_load_body_falls_back_on_failure() {
        let completion = Completion::new(record("text/plain", Some("inline")))
            .with_fetcher(Arc::new(FailingFetcher));
        assert_eq!(load_body(&entry(completion)).await.content, "inline");

        let bare = Completion::new(record("text/plain", None));
        assert_eq!(load_body(&entry(bare)).await, Body::default());
    }

    #[tokio::test]
    async fn test_render_response_tab() {
        let completion = Completion::new(record("application/json", Some("{\"ok\":true}")));
        let content = render(&entry(completion), DetailTab::Response).await;
        assert_eq!(content.tab, DetailTab::Response);
        assert!(matches!(&content.blocks[0], Block::Text { text, .. } if text == "{\"ok\":true}"));
    }

    #[test]
    fn test_tab_cycle_and_parse() {
        assert_eq!(DetailTab::Response.next(), DetailTab::Headers);
        assert_eq!(DetailTab::Headers.prev(), DetailTab::Response);
        assert_eq!("Preview".parse::<DetailTab>().unwrap(), DetailTab::Preview);
        assert!("timing".parse::<DetailTab>().is_err());
    }
}
