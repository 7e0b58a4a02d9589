//! Check that the host can run every configured channel.

use std::net::{IpAddr, SocketAddr, TcpListener};

use camlink_common::config::AppConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Camlink System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;

    // Config
    match config.validate() {
        Ok(()) => println!("[OK] Config: {} channels", config.channels.len()),
        Err(e) => {
            println!("[FAIL] Config: {e}");
            all_ok = false;
        }
    }

    // Transcoder
    let program = &config.transcoder.program;
    match tokio::process::Command::new(program)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().unwrap_or("unknown version");
            println!("[OK] Transcoder: {version}");
        }
        Ok(output) => {
            println!(
                "[FAIL] Transcoder {} exited with {}",
                program.display(),
                output.status
            );
            all_ok = false;
        }
        Err(e) => {
            println!("[FAIL] Transcoder {} cannot run: {e}", program.display());
            all_ok = false;
        }
    }

    // Capture directory
    let base = &config.capture.base_dir;
    match tokio::fs::create_dir_all(base).await {
        Ok(()) => println!("[OK] Capture base: {}", base.display()),
        Err(e) => {
            println!("[FAIL] Capture base {}: {e}", base.display());
            all_ok = false;
        }
    }

    // Relay ports
    match config.relay.bind_host.parse::<IpAddr>() {
        Ok(host) => {
            for channel in &config.channels {
                let addr = SocketAddr::new(host, channel.relay_port);
                match TcpListener::bind(addr) {
                    Ok(_) => println!("[OK] Channel {} relay port: {addr}", channel.id),
                    Err(e) => {
                        println!("[FAIL] Channel {} relay port {addr}: {e}", channel.id);
                        all_ok = false;
                    }
                }
                if channel.source_url.is_none() {
                    println!("[WARN] Channel {} has no configured source", channel.id);
                }
            }
        }
        Err(e) => {
            println!("[FAIL] relay.bind_host {:?}: {e}", config.relay.bind_host);
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All checks passed. Camlink is ready.");
        Ok(())
    } else {
        anyhow::bail!("Some checks failed. See above for details.")
    }
}
