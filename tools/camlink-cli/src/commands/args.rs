//! Print the transcoder command line a profile produces.

use std::path::Path;

use camlink_common::config::AppConfig;
use camlink_transcoder::{Invocation, RelaySettings};

use crate::ProfileArg;

pub fn run(
    config: &AppConfig,
    profile: ProfileArg,
    source: &str,
    dir: &Path,
    fps: Option<u32>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let invocation = build(config, profile, source, dir, fps, host, port);
    println!("{}", invocation.command_line(&config.transcoder.program));
    Ok(())
}

fn build(
    config: &AppConfig,
    profile: ProfileArg,
    source: &str,
    dir: &Path,
    fps: Option<u32>,
    host: &str,
    port: u16,
) -> Invocation {
    match profile {
        ProfileArg::Relay => Invocation::relay(
            source,
            &RelaySettings {
                bitrate: config.transcoder.relay_bitrate.clone(),
                fps: config.transcoder.relay_fps,
            },
        ),
        ProfileArg::Capture => Invocation::capture(source, dir, fps),
        ProfileArg::Forward => Invocation::forward(source, host, port),
    }
}
