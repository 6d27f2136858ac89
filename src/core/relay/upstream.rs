//! Upstream link reader.

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::base::{KeepalivePolicy, RelayError, RelayResult};
use super::egress::EgressHandle;
use super::frame::{Inbound, WsFrame};
use super::generation::DownstreamFramer;
use super::translator::{self, UpstreamAction};

/// Reader half of the upstream link.
///
/// Dispatches each upstream event onto the client egress: audio onto the
/// lossy lane, diagnostics and interruption notices onto the control lane.
pub struct UpstreamLink<C> {
    pub downstream: EgressHandle<C>,
    pub framer: DownstreamFramer,
    pub keepalive: KeepalivePolicy,
    /// Advance the generation on `speech_started`
    pub interrupt_on_speech: bool,
    pub cancel: CancellationToken,
}

impl<C: WsFrame> UpstreamLink<C> {
    /// Run until the upstream closes, fails, or the session is cancelled.
    ///
    /// An upstream close is never retried.
    pub async fn run<U, S, E>(self, mut stream: S) -> RelayResult<()>
    where
        U: WsFrame,
        S: Stream<Item = Result<U, E>> + Unpin,
        E: std::fmt::Display,
    {
        let mut deadline = Instant::now() + self.keepalive.pong_wait;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => {
                    warn!("Upstream keepalive expired");
                    return Err(RelayError::KeepaliveExpired(self.keepalive.pong_wait));
                }
                Ok(None) => {
                    info!("Upstream closed");
                    return Ok(());
                }
                Ok(Some(Err(e))) => {
                    warn!("Upstream read error: {}", e);
                    return Err(RelayError::Transport(e.to_string()));
                }
                Ok(Some(Ok(frame))) => frame,
            };

            deadline = Instant::now() + self.keepalive.pong_wait;

            match frame.into_inbound() {
                Inbound::Text(text) => self.dispatch(translator::translate_upstream(&text)).await?,
                Inbound::Binary(data) => {
                    debug!(len = data.len(), "Ignoring binary frame from upstream")
                }
                Inbound::Close => {
                    info!("Upstream sent close");
                    return Ok(());
                }
                Inbound::Ping | Inbound::Pong | Inbound::Other => {}
            }
        }
    }

    async fn dispatch(&self, action: UpstreamAction) -> RelayResult<()> {
        match action {
            UpstreamAction::RelayAudio(pcm) => {
                trace!(len = pcm.len(), "Relaying audio delta");
                if self.framer.relay_audio(&pcm, &self.downstream)? {
                    debug!("Client audio lane full, oldest frame evicted");
                }
            }
            UpstreamAction::Interrupt { reason } => {
                if self.interrupt_on_speech {
                    self.framer.interrupt(reason, &self.downstream).await?;
                } else {
                    debug!(reason, "Interruption disabled, ignoring");
                }
            }
            UpstreamAction::Diagnostic { message, payload } => {
                error!("OpenAI error: {}", message);
                self.downstream.send_control(C::text(payload)).await?;
            }
            UpstreamAction::Milestone {
                response_id,
                status,
            } => {
                info!(
                    response_id = response_id.as_deref().unwrap_or("-"),
                    status = status.as_deref().unwrap_or("-"),
                    "Response done"
                );
            }
            UpstreamAction::Observe(event_type) => debug!(event_type = %event_type, "Upstream event"),
            UpstreamAction::Discard(reason) => warn!("Discarding upstream event: {}", reason),
        }
        Ok(())
    }
}
