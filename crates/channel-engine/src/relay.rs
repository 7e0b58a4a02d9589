//! Relay lifecycle: a relay-profile transcoder feeding the viewer endpoint.

use std::net::SocketAddr;

use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_transcoder::{Invocation, ProcessExit, ProcessSpawner, TranscoderProcess};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::broadcast::BroadcastTransport;
use crate::registry::EngineSettings;

/// Where viewers reach a running relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayInfo {
    /// Bound viewer endpoint.
    pub address: SocketAddr,
    /// WebSocket URL handed to viewers.
    pub url: String,
}

/// One running relay of a channel.
pub(crate) struct RelaySession {
    pub(crate) generation: u64,
    source: String,
    transport: BroadcastTransport,
    process: TranscoderProcess,
}

impl RelaySession {
    /// Bind the viewer endpoint, then start the transcoder and pump its
    /// output to viewers. Nothing is left running on failure.
    pub(crate) async fn start(
        label: &str,
        generation: u64,
        spawner: &dyn ProcessSpawner,
        settings: &EngineSettings,
        addr: SocketAddr,
        source: &str,
    ) -> CamlinkResult<(Self, Option<oneshot::Receiver<ProcessExit>>)> {
        let mut transport = BroadcastTransport::bind(addr, settings.fanout_capacity).await?;

        let invocation = Invocation::relay(source, &settings.relay);
        let mut process = match spawner.spawn(label, &invocation) {
            Ok(process) => process,
            Err(e) => {
                transport.shutdown().await;
                return Err(e);
            }
        };

        let Some(output) = process.take_stdout() else {
            process.kill();
            transport.shutdown().await;
            return Err(CamlinkError::relay(format!(
                "{label}: transcoder has no output stream"
            )));
        };
        transport.attach(output, settings.chunk_size);
        let exit = process.take_exit();

        Ok((
            Self {
                generation,
                source: source.to_string(),
                transport,
                process,
            },
            exit,
        ))
    }

    pub(crate) fn info(&self, public_host: &str) -> RelayInfo {
        let address = self.transport.local_addr();
        RelayInfo {
            address,
            url: format!("ws://{public_host}:{}/", address.port()),
        }
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn viewers(&self) -> usize {
        self.transport.viewer_count()
    }

    /// Kill the transcoder and close the endpoint.
    pub(crate) async fn stop(self) {
        self.process.kill();
        self.transport.shutdown().await;
    }
}
