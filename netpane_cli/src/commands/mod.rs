//! CLI command implementations

pub mod config;
pub mod list;
pub mod open;
pub mod push;
pub mod serve;

use crate::config::Config;
use crate::source::Capture;
use crate::view::Filter;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Where a capture comes from and how to scope it
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub har: PathBuf,
    pub events: Option<PathBuf>,
    pub host: Option<String>,
    pub filter: Option<Filter>,
}

impl CaptureOptions {
    pub fn load(&self) -> Result<Capture> {
        Capture::load(&self.har, self.events.as_deref())
    }

    /// Filter from the command line, else the configured default
    pub fn filter_or(&self, config: &Config) -> Filter {
        self.filter.unwrap_or(config.default_filter)
    }

    /// File name shown as the capture's label
    pub fn label(&self) -> String {
        file_label(&self.har)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
