//! Config command: show or initialize the configuration

use crate::config::{config_file, Config};
use anyhow::{Context, Result};
use console::style;

pub async fn run(init: bool) -> Result<()> {
    let path = config_file();

    if init {
        if path.exists() {
            println!("Config already exists at {}", style(path.display()).cyan());
            return Ok(());
        }
        Config::default().save()?;
        println!("Wrote default config to {}", style(path.display()).green());
        return Ok(());
    }

    let config = Config::load()?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "defaults (no config file)".to_string()
    };

    println!("{} {}", style("#").dim(), style(source).dim());
    print!(
        "{}",
        serde_yaml::to_string(&config).context("Failed to serialize config")?
    );
    Ok(())
}
