//! Client link reader.
//!
//! Reads the downstream socket, turns PCM frames into upstream append events
//! and text commands into upstream control events. All writes go through
//! egress handles; this task never touches a sink.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::base::{KeepalivePolicy, RelayError, RelayResult, TurnDetectionMode};
use super::egress::EgressHandle;
use super::frame::{Inbound, WsFrame};
use super::generation::DownstreamFramer;
use super::openai::ClientEvent;
use super::translator::{self, ClientCommand};

/// Longest slice of unrecognized client text echoed into the log.
const MAX_LOGGED_TEXT: usize = 64;

/// Reader half of the client link.
pub struct ClientLink<C, U> {
    /// Client socket egress (interruption notices)
    pub downstream: EgressHandle<C>,
    /// Upstream socket egress (append and command events)
    pub upstream: EgressHandle<U>,
    pub framer: DownstreamFramer,
    pub keepalive: KeepalivePolicy,
    pub turn_detection: TurnDetectionMode,
    pub idle_commit: Duration,
    pub cancel: CancellationToken,
}

impl<C: WsFrame, U: WsFrame> ClientLink<C, U> {
    /// Run until the client closes, the socket fails, or the session is cancelled.
    pub async fn run<S, E>(self, mut stream: S) -> RelayResult<()>
    where
        S: Stream<Item = Result<C, E>> + Unpin,
        E: std::fmt::Display,
    {
        let manual = self.turn_detection == TurnDetectionMode::Manual;
        let mut bytes_since_commit: usize = 0;
        let mut deadline = Instant::now() + self.keepalive.pong_wait;

        let idle = tokio::time::sleep(self.idle_commit);
        tokio::pin!(idle);

        loop {
            let next = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),

                _ = &mut idle, if manual && bytes_since_commit > 0 => {
                    info!(bytes = bytes_since_commit, "Client idle, committing turn");
                    self.send_ordered(translator::commit_turn()).await?;
                    bytes_since_commit = 0;
                    continue;
                }

                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => {
                    warn!("Client keepalive expired");
                    return Err(RelayError::KeepaliveExpired(self.keepalive.pong_wait));
                }
                Ok(None) => {
                    info!("Client disconnected");
                    return Ok(());
                }
                Ok(Some(Err(e))) => {
                    warn!("Client read error: {}", e);
                    return Err(RelayError::Transport(e.to_string()));
                }
                Ok(Some(Ok(frame))) => frame,
            };

            deadline = Instant::now() + self.keepalive.pong_wait;

            match frame.into_inbound() {
                Inbound::Binary(pcm) => {
                    if pcm.is_empty() {
                        continue;
                    }
                    let append = translator::audio_append(&pcm).to_json()?;
                    if self.upstream.send_audio(U::text(append))? {
                        debug!("Upstream audio lane full, oldest append evicted");
                    }
                    bytes_since_commit += pcm.len();
                    idle.as_mut().reset(Instant::now() + self.idle_commit);
                }
                Inbound::Text(text) => match ClientCommand::parse(&text) {
                    Some(command) => {
                        self.handle_command(command, &mut bytes_since_commit)
                            .await?
                    }
                    None => warn!(
                        "Ignoring unrecognized client text: {:?}",
                        truncate(&text, MAX_LOGGED_TEXT)
                    ),
                },
                Inbound::Close => {
                    info!("Client sent close");
                    return Ok(());
                }
                Inbound::Ping | Inbound::Pong | Inbound::Other => {}
            }
        }
    }

    async fn handle_command(
        &self,
        command: ClientCommand,
        bytes_since_commit: &mut usize,
    ) -> RelayResult<()> {
        match command {
            ClientCommand::Commit if *bytes_since_commit == 0 => {
                debug!("Commit with no new audio, skipped");
                return Ok(());
            }
            ClientCommand::Commit | ClientCommand::Clear => *bytes_since_commit = 0,
            ClientCommand::Cancel | ClientCommand::Force => {}
        }

        info!(command = command.as_str(), "Client command");
        self.send_ordered(translator::command_events(command)).await?;

        if command == ClientCommand::Cancel {
            self.framer.interrupt("client_cancel", &self.downstream).await?;
        }
        Ok(())
    }

    async fn send_ordered(&self, events: Vec<ClientEvent>) -> RelayResult<()> {
        for event in events {
            self.upstream
                .send_control_ordered(U::text(event.to_json()?))
                .await?;
        }
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
