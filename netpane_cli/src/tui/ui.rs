//! TUI rendering functions

use super::app::{DetailLine, LineKind, TuiApp};
use crate::detail::DetailTab;
use crate::view::{EntryRow, Filter};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState, Tabs,
    },
    Frame,
};

/// Draw the TUI
pub fn draw(frame: &mut Frame, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title bar
            Constraint::Length(1), // Filter bar
            Constraint::Min(5),    // Requests (+ detail)
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    draw_title_bar(frame, app, chunks[0]);
    draw_filter_bar(frame, app.panel.filter(), chunks[1]);

    if app.detail_open {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(chunks[2]);
        draw_requests(frame, app, body[0], true);
        draw_detail(frame, app, body[1]);
    } else {
        draw_requests(frame, app, chunks[2], false);
    }

    draw_footer(frame, app, chunks[3]);
}

/// Title bar: capture, scope and pending count
fn draw_title_bar(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let pending = app.panel.pending_count();

    let mut spans = vec![
        Span::styled(" NETPANE ", Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(&app.source_label, Style::default().fg(Color::White)),
        Span::styled("  host ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.panel.scope().label(), Style::default().fg(Color::Green)),
    ];
    if pending > 0 {
        spans.push(Span::styled(
            format!("  {} pending", pending),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Filter bar, active filter highlighted; digits select directly
fn draw_filter_bar(frame: &mut Frame, active: Filter, area: Rect) {
    let mut spans = Vec::with_capacity(Filter::ALL.len() * 2);
    for (i, filter) in Filter::ALL.iter().enumerate() {
        let label = if i < 10 {
            format!("{}:{}", i, filter.as_str())
        } else {
            filter.as_str().to_string()
        };
        let style = if *filter == active {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {} ", label), style));
        spans.push(Span::raw(" "));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw the request table with scrolling and scrollbar
fn draw_requests(frame: &mut Frame, app: &TuiApp, area: Rect, compact: bool) {
    let rows: Vec<EntryRow> = app.panel.visible_rows();
    let selected = app.panel.selected();

    let header_cells = if compact {
        vec!["Method", "Stat", "Path", "Size"]
    } else {
        vec!["Start", "Method", "Stat", "Path", "Type", "Size", "Time"]
    };
    let header = Row::new(header_cells)
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .bottom_margin(0);

    let table_rows: Vec<Row> = rows
        .iter()
        .map(|row| {
            let row_style = if app.is_flashing(row.index) {
                Style::default().bg(Color::Rgb(30, 60, 30))
            } else if selected == Some(row.index) {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            let method = Cell::from(format!("{:>6}", truncate_str(&row.method, 6))).style(method_style(&row.method));
            let status = Cell::from(row.status.clone()).style(status_style(row));
            let path = Cell::from(row.path.clone());
            let size = Cell::from(row.size.clone()).style(size_style(row));

            let cells = if compact {
                vec![method, status, path, size]
            } else {
                vec![
                    Cell::from(row.started.clone()).style(Style::default().fg(Color::DarkGray)),
                    method,
                    status,
                    path,
                    Cell::from(row.type_label.clone()),
                    size,
                    Cell::from(row.time.clone()),
                ]
            };
            Row::new(cells).style(row_style)
        })
        .collect();

    let widths: Vec<Constraint> = if compact {
        vec![
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Length(14),
        ]
    } else {
        vec![
            Constraint::Length(12),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Length(10),
            Constraint::Length(14),
            Constraint::Length(9),
        ]
    };

    // Split area to leave room for scrollbar
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let table = Table::new(table_rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(format!(" {} ", app.panel.count_label()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let mut state = TableState::default();
    if !rows.is_empty() {
        state.select(Some(app.cursor.min(rows.len() - 1)));
    }

    frame.render_stateful_widget(table, chunks[0], &mut state);

    if !rows.is_empty() {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");

        let mut scrollbar_state = ScrollbarState::new(rows.len()).position(app.cursor);

        frame.render_stateful_widget(scrollbar, chunks[1], &mut scrollbar_state);
    }
}

/// Draw the detail pane: tabs and content lines
fn draw_detail(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(1)])
        .split(area);

    let titles: Vec<&str> = DetailTab::ALL.iter().map(|t| t.title()).collect();
    let active = DetailTab::ALL
        .iter()
        .position(|t| *t == app.panel.active_tab())
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(active)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::BOTTOM).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(tabs, chunks[0]);

    let lines = app.detail_lines();
    let text: Vec<Line> = if app.panel.detail().is_none() {
        vec![Line::from(Span::styled("Loading…", Style::default().fg(Color::DarkGray)))]
    } else {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| detail_line(line, i == app.detail_cursor))
            .collect()
    };

    // Keep the cursor line in view
    let height = chunks[1].height.saturating_sub(2) as usize;
    let scroll = app.detail_cursor.saturating_sub(height.saturating_sub(1));

    let paragraph = Paragraph::new(text)
        .scroll((scroll as u16, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(paragraph, chunks[1]);
}

fn detail_line(line: &DetailLine, is_cursor: bool) -> Line<'_> {
    let mut spans = match &line.kind {
        LineKind::Heading => vec![Span::styled(
            line.text.as_str(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )],
        LineKind::Row { name } => vec![
            Span::styled(format!("  {}: ", name), Style::default().fg(Color::DarkGray)),
            Span::styled(line.text.as_str(), Style::default().fg(Color::White)),
        ],
        LineKind::Text => vec![Span::raw(line.text.as_str())],
        LineKind::Tree {
            depth, expandable, ..
        } => {
            let style = if *expandable {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            vec![
                Span::raw("  ".repeat(*depth)),
                Span::styled(line.text.as_str(), style),
            ]
        }
        LineKind::Notice => vec![Span::styled(
            line.text.as_str(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )],
    };

    if is_cursor {
        spans.insert(0, Span::styled("›", Style::default().fg(Color::Cyan)));
    } else {
        spans.insert(0, Span::raw(" "));
    }
    Line::from(spans)
}

/// Draw the footer with key hints, or the status message
fn draw_footer(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Cyan));
    let hint = |h: &'static str| Span::styled(h, Style::default().fg(Color::DarkGray));

    let text = if let Some((message, _)) = &app.status {
        Line::from(Span::styled(message.as_str(), Style::default().fg(Color::Yellow)))
    } else if app.detail_open {
        Line::from(vec![
            key("Esc"),
            hint(" Close  "),
            key("Tab"),
            hint(" Next tab  "),
            key("↑/↓"),
            hint(" Move  "),
            key("Space"),
            hint(" Expand  "),
            key("q"),
            hint(" Quit"),
        ])
    } else {
        Line::from(vec![
            key("↑/↓"),
            hint(" Navigate  "),
            key("Enter"),
            hint(" Details  "),
            key("f/0-9"),
            hint(" Filter  "),
            key("c"),
            hint(" Clear  "),
            key("q"),
            hint(" Quit"),
        ])
    };

    frame.render_widget(Paragraph::new(text), area);
}

/// Get style for HTTP method
fn method_style(method: &str) -> Style {
    match method {
        "GET" => Style::default().fg(Color::Green),
        "POST" => Style::default().fg(Color::Yellow),
        "PUT" => Style::default().fg(Color::Blue),
        "PATCH" => Style::default().fg(Color::Magenta),
        "DELETE" => Style::default().fg(Color::Red),
        "HEAD" => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::White),
    }
}

/// Get style for the status column
fn status_style(row: &EntryRow) -> Style {
    match row.state {
        "pending" => return Style::default().fg(Color::DarkGray),
        "failed" => return Style::default().fg(Color::Red),
        _ => {}
    }

    let status: u16 = row.status.parse().unwrap_or(0);
    if status >= 500 {
        Style::default().fg(Color::Red)
    } else if status >= 400 {
        Style::default().fg(Color::Yellow)
    } else if status >= 300 {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Green)
    }
}

fn size_style(row: &EntryRow) -> Style {
    if row.size.starts_with('(') {
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)
    } else {
        Style::default()
    }
}

/// Truncate any string to max length
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        s.chars().take(max_len).collect()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_is_char_safe() {
        assert_eq!(truncate_str("OPTIONS", 6), "OPTION");
        assert_eq!(truncate_str("GET", 6), "GET");
        assert_eq!(truncate_str("ÜBERLANG", 3), "ÜBE");
    }
}
