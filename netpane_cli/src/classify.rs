//! Request categorization by resource type tag or MIME type

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse content category used for filtering and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fetch,
    Doc,
    Css,
    Js,
    Img,
    Media,
    Font,
    Websocket,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Fetch,
        Category::Doc,
        Category::Css,
        Category::Js,
        Category::Img,
        Category::Media,
        Category::Font,
        Category::Websocket,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fetch => "fetch",
            Category::Doc => "doc",
            Category::Css => "css",
            Category::Js => "js",
            Category::Img => "img",
            Category::Media => "media",
            Category::Font => "font",
            Category::Websocket => "websocket",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fetch" | "xhr" => Ok(Category::Fetch),
            "doc" => Ok(Category::Doc),
            "css" => Ok(Category::Css),
            "js" => Ok(Category::Js),
            "img" => Ok(Category::Img),
            "media" => Ok(Category::Media),
            "font" => Ok(Category::Font),
            "websocket" | "ws" => Ok(Category::Websocket),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// Classify a request. A non-empty resource type tag wins over the MIME type.
pub fn classify(resource_type: Option<&str>, mime_type: Option<&str>) -> Category {
    match resource_type.filter(|t| !t.is_empty()) {
        Some(tag) => classify_resource_type(tag),
        None => classify_mime(mime_type.unwrap_or_default()),
    }
}

/// Map a resource type tag from either producer to a category
///
/// Covers the observer's tags (`xmlhttprequest`, `main_frame`, ...) and the
/// HAR exporter's `_resourceType` values (`xhr`, `document`, ...).
pub fn classify_resource_type(tag: &str) -> Category {
    match tag.to_ascii_lowercase().as_str() {
        "xmlhttprequest" | "xhr" | "fetch" => Category::Fetch,
        "main_frame" | "sub_frame" | "document" => Category::Doc,
        "stylesheet" => Category::Css,
        "script" => Category::Js,
        "image" => Category::Img,
        "media" => Category::Media,
        "font" => Category::Font,
        "websocket" => Category::Websocket,
        _ => Category::Other,
    }
}

/// Classify by MIME type. Rule order matters: `application/xhtml+xml` is fetch.
pub fn classify_mime(mime_type: &str) -> Category {
    let m = mime_type.to_ascii_lowercase();

    if m.contains("json") || m.contains("xml") || m == "text/plain" {
        Category::Fetch
    } else if m.contains("html") {
        Category::Doc
    } else if m.contains("css") {
        Category::Css
    } else if m.contains("javascript") {
        Category::Js
    } else if m.starts_with("image/") {
        Category::Img
    } else if m.starts_with("video/") || m.starts_with("audio/") {
        Category::Media
    } else if m.starts_with("font/") || m.contains("woff") || m.contains("opentype") {
        Category::Font
    } else {
        Category::Other
    }
}

/// Compact type label for request lists
pub fn short_type(mime_type: &str) -> String {
    let label = match mime_type {
        "" => return String::new(),
        "application/json" => "json",
        "application/javascript" | "text/javascript" => "js",
        "text/html" => "html",
        "text/css" => "css",
        "text/plain" => "text",
        "application/xml" | "text/xml" => "xml",
        "image/png" => "png",
        "image/jpeg" => "jpeg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "font/woff2" => "woff2",
        "font/woff" => "woff",
        "application/wasm" => "wasm",
        other => other
            .strip_prefix("application/")
            .or_else(|| other.strip_prefix("text/"))
            .unwrap_or(other),
    };
    label.to_string()
}
