//! Open command: browse a capture in the terminal UI

use super::CaptureOptions;
use crate::config::Config;
use crate::source::Follower;
use crate::tui::{self, TuiApp};
use anyhow::Result;

pub async fn run(opts: CaptureOptions, follow: bool) -> Result<()> {
    let config = Config::load()?;
    let capture = opts.load()?;

    let panel = capture
        .replay(opts.host.as_deref(), opts.filter_or(&config), &config)
        .await;
    tracing::info!(
        "Opened {} with {} rows in scope {}",
        opts.har.display(),
        panel.counts().total,
        panel.scope().label()
    );

    let follower = if follow {
        Some(Follower::new(opts.har.clone(), opts.events.clone(), &capture)?)
    } else {
        None
    };

    let app = TuiApp::new(panel, opts.label());
    tui::run(app, follower, opts.host, config.retry_policy()).await
}
