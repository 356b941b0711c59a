//! Terminal User Interface for browsing a capture

mod app;
mod ui;

pub use app::{TuiApp, TuiEvent};
pub use ui::draw;

use crate::scope::{resolve_scope, RetryPolicy, StaticHost};
use crate::source::{Follower, LiveInput};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Aborts background tasks when the loop exits
struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for task in self.0.drain(..) {
            task.abort();
        }
    }
}

/// Run the TUI until the user quits
pub async fn run(
    mut app: TuiApp,
    follower: Option<Follower>,
    host_override: Option<String>,
    policy: RetryPolicy,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (tui_tx, tui_rx) = mpsc::channel::<TuiEvent>(100);

    let mut guard = TaskGuard(Vec::new());
    if let Some(follower) = follower {
        let live_tx = tui_tx.clone();
        guard.0.push(tokio::spawn(async move {
            if let Err(e) = follower.run(live_tx).await {
                tracing::error!("Stopped following capture: {:#}", e);
            }
        }));
    }

    let result = run_loop(&mut terminal, &mut app, tui_tx, tui_rx, host_override, policy).await;
    drop(guard);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    tui_tx: mpsc::Sender<TuiEvent>,
    mut tui_rx: mpsc::Receiver<TuiEvent>,
    host_override: Option<String>,
    policy: RetryPolicy,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        terminal.draw(|f| draw(f, app))?;

        // Render off the loop; stale results are dropped by the panel
        if let Some(request) = app.take_render_request() {
            let tx = tui_tx.clone();
            tokio::spawn(async move {
                let rendered = request.run().await;
                let _ = tx.send(TuiEvent::Rendered(rendered)).await;
            });
        }

        tokio::select! {
            _ = tick_interval.tick() => {
                while event::poll(Duration::from_millis(0))? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind == KeyEventKind::Press {
                            app.handle_event(TuiEvent::Key(key));
                        }
                    }
                }
                if app.should_quit {
                    return Ok(());
                }
                app.handle_event(TuiEvent::Tick);
            }

            Some(event) = tui_rx.recv() => match event {
                TuiEvent::Live(LiveInput::Navigated { page_url, entries }) => {
                    let ticket = app.navigate(entries);
                    let resolver = match &host_override {
                        Some(host) => StaticHost(Some(host.clone())),
                        None => StaticHost::from_page_url(page_url.as_deref()),
                    };
                    tracing::info!("Page changed to {}", page_url.as_deref().unwrap_or("(unknown)"));

                    let tx = tui_tx.clone();
                    tokio::spawn(async move {
                        let scope = resolve_scope(&resolver, policy, &ticket).await;
                        let _ = tx.send(TuiEvent::ScopeResolved(ticket, scope)).await;
                    });
                }
                event => app.handle_event(event),
            },
        }
    }
}
