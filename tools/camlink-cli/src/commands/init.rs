//! Write the default config file.

use std::path::PathBuf;

use camlink_common::config::{config_file_path, AppConfig};

pub fn run(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config_file_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    AppConfig::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    println!("Set channels[].source_url to your camera URLs before serving.");

    Ok(())
}
