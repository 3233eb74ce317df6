use crate::codec::{AgentLine, AgentLineCodec};
use crate::protocol::{format_roster_ids, parse_label, parse_telemetry};
use crate::session::SessionRegistry;
use anyhow::{Context, Result};
use chrono::Local;
use futures_util::stream::StreamExt;
use rollcall_presence::{Observation, PresenceStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type LineReader = FramedRead<OwnedReadHalf, AgentLineCodec>;

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Telemetry listener for scanning agents
pub struct IngestServer {
    listener: TcpListener,
    store: PresenceStore,
    sessions: Arc<SessionRegistry>,
    tracker: TaskTracker,
}

impl IngestServer {
    pub async fn bind(addr: &str, store: PresenceStore) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind listener on {}", addr))?;
        Ok(Self {
            listener,
            store,
            sessions: Arc::new(SessionRegistry::new()),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        self.sessions.clone()
    }

    /// Accept agents until `shutdown` fires, then wait for every session to
    /// finish its current line and close.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!("Ingestion listener on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let store = self.store.clone();
                        let sessions = self.sessions.clone();
                        let shutdown = shutdown.clone();
                        self.tracker.spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, peer, store, sessions, shutdown).await
                            {
                                tracing::warn!("Agent {} session ended: {:#}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(self.listener);
        self.tracker.close();
        let open = self.sessions.list().await;
        if !open.is_empty() {
            let labels: Vec<&str> = open.iter().map(|s| s.label.as_str()).collect();
            tracing::info!(
                "Waiting for {} agent sessions to close: {}",
                open.len(),
                labels.join(", ")
            );
        }
        self.tracker.wait().await;
        tracing::info!("Ingestion listener stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: PresenceStore,
    sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = FramedRead::new(reader, AgentLineCodec::new());

    let first = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        first = lines.next() => first,
    };
    let Some(first) = first else {
        tracing::debug!("Agent {} closed before sending a label", peer);
        return Ok(());
    };
    let label = match first.context("Failed to read agent label")? {
        AgentLine::Text(line) => parse_label(&line),
        malformed => {
            tracing::warn!("Agent {} sent an unusable label ({:?})", peer, malformed);
            return Ok(());
        }
    };

    let reply = format_roster_ids(store.roster().ids());
    writer
        .write_all(reply.as_bytes())
        .await
        .context("Failed to send roster ids")?;

    let session = sessions.register(label.clone(), peer).await;
    tracing::info!(
        "Agent '{}' connected from {} ({} active)",
        label,
        peer,
        sessions.count().await
    );

    let result = ingest(&mut lines, &label, peer, &store, &shutdown).await;

    sessions.remove(&session.id).await;
    tracing::info!(
        "Agent '{}' from {} disconnected ({} active)",
        label,
        peer,
        sessions.count().await
    );
    result
}

async fn ingest(
    lines: &mut LineReader,
    label: &str,
    peer: SocketAddr,
    store: &PresenceStore,
    shutdown: &CancellationToken,
) -> Result<()> {
    let agent_addr = peer.to_string();
    let mut accepted = 0u64;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = lines.next() => next,
        };
        let Some(line) = next else { break };
        // Only socket errors end the session; bad lines are skipped.
        let line = match line.context("Failed to read telemetry")? {
            AgentLine::Text(line) => line,
            malformed => {
                tracing::debug!("Dropping {:?} line from {}", malformed, peer);
                continue;
            }
        };

        match parse_telemetry(&line) {
            Ok(telemetry) => {
                let observation =
                    Observation::new(telemetry.entity_id, label, Local::now().naive_local())
                        .with_rssi(telemetry.rssi)
                        .with_agent_addr(agent_addr.as_str());
                if store.upsert(observation).await {
                    accepted += 1;
                }
            }
            Err(e) => tracing::debug!("Dropping line {:?} from {}: {}", line, peer, e),
        }
    }

    tracing::debug!("Agent '{}' sent {} sightings", label, accepted);
    Ok(())
}
