//! List command: print the panel as a table

use super::CaptureOptions;
use crate::config::Config;
use crate::view::EntryRow;
use anyhow::Result;
use console::style;

pub async fn run(opts: CaptureOptions, json: bool) -> Result<()> {
    let config = Config::load()?;
    let capture = opts.load()?;
    let panel = capture
        .replay(opts.host.as_deref(), opts.filter_or(&config), &config)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&panel.snapshot())?);
        return Ok(());
    }

    let rows = panel.visible_rows();
    if rows.is_empty() {
        println!("No requests in scope {}.", panel.scope().label());
        println!();
        println!("Try another filter with: netpane list {} --filter all", opts.har.display());
        return Ok(());
    }

    println!(
        "{:<6} {:<7} {:<7} {:<50} {:<10} {:>14} {:>9}",
        "#", "METHOD", "STATUS", "PATH", "TYPE", "SIZE", "TIME"
    );
    println!("{}", "-".repeat(108));

    for row in &rows {
        println!(
            "{:<6} {:<7} {} {:<50} {:<10} {:>14} {:>9}",
            row.index,
            style(truncate(&row.method, 7)).bold(),
            status_cell(row),
            truncate(&row.path, 48),
            truncate(&row.type_label, 10),
            row.size,
            row.time
        );
        if let Some(error) = &row.error {
            println!("       {} {}", style("^").red(), style(error).dim());
        }
    }

    println!();
    println!(
        "{}  {}  {}",
        style(panel.count_label()).cyan(),
        style("scope").dim(),
        style(panel.scope().label()).green()
    );

    Ok(())
}

fn status_cell(row: &EntryRow) -> String {
    let cell = format!("{:<7}", row.status);
    let styled = match row.state {
        "pending" => style(cell).dim(),
        "failed" => style(cell).red(),
        _ => match row.status.parse::<u16>().unwrap_or(0) {
            500.. => style(cell).red(),
            400..=499 => style(cell).yellow(),
            300..=399 => style(cell).cyan(),
            _ => style(cell).green(),
        },
    };
    styled.to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("/api/users", 48), "/api/users");
        assert_eq!(truncate("/a/very/long/path", 10), "/a/very...");
    }
}
