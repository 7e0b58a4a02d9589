//! Show the configured channel table.

use camlink_common::config::AppConfig;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    println!("{:<4} {:<8} {:<48} SOURCE", "ID", "PORT", "VIEWER URL");
    for channel in &config.channels {
        let url = format!("ws://{}:{}/", config.relay.public_host, channel.relay_port);
        println!(
            "{:<4} {:<8} {:<48} {}",
            channel.id,
            channel.relay_port,
            url,
            channel.source_url.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("Capture base: {}", config.capture.base_dir.display());
    match &config.upload.collector_url {
        Some(url) if config.upload.enabled => println!("Uploads: on -> {url}"),
        _ => println!("Uploads: off"),
    }
    if let Some(remote) = &config.control.remote_url {
        println!("Remote ingest: {remote}");
    }

    Ok(())
}
