//! Session coordinator.
//!
//! One session bridges one client socket and one upstream socket with four
//! tasks: client reader, client egress, upstream reader, upstream egress.
//! Each task holds a drop guard on the shared cancellation token, so the
//! first task to finish for any reason tears the others down.

use futures::{Sink, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::base::{RelayError, RelayResult, SessionSettings};
use super::client::ClientLink;
use super::egress::{EgressScheduler, EgressStatsSnapshot};
use super::frame::WsFrame;
use super::generation::{DownstreamFramer, GenerationTracker};
use super::translator;
use super::upstream::UpstreamLink;

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub final_generation: u64,
    /// Frames written to the client socket
    pub client: EgressStatsSnapshot,
    /// Frames written to the upstream socket
    pub upstream: EgressStatsSnapshot,
    /// First task error, if the session did not end cleanly
    pub error: Option<RelayError>,
}

/// One live bridge between a client and the realtime service.
pub struct Session {
    id: Uuid,
    settings: SessionSettings,
    raw_mode: bool,
    tracker: GenerationTracker,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(settings: SessionSettings, raw_mode: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            raw_mode,
            tracker: GenerationTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the generation tracker, e.g. to resume from a known value.
    pub fn with_tracker(mut self, tracker: GenerationTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    pub fn tracker(&self) -> &GenerationTracker {
        &self.tracker
    }

    /// Token that ends the session when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Relay between `client` and `upstream` until either side ends.
    ///
    /// Both sockets are closed by their egress schedulers before this returns.
    pub async fn run<C, CS, CE, U, US, UE>(self, client: CS, upstream: US) -> SessionSummary
    where
        C: WsFrame,
        U: WsFrame,
        CS: Stream<Item = Result<C, CE>> + Sink<C, Error = CE> + Send + 'static,
        US: Stream<Item = Result<U, UE>> + Sink<U, Error = UE> + Send + 'static,
        CE: std::fmt::Display + Send + 'static,
        UE: std::fmt::Display + Send + 'static,
    {
        let span = info_span!("session", session_id = %self.id, raw_mode = self.raw_mode);
        self.run_inner(client, upstream).instrument(span).await
    }

    async fn run_inner<C, CS, CE, U, US, UE>(self, client: CS, upstream: US) -> SessionSummary
    where
        C: WsFrame,
        U: WsFrame,
        CS: Stream<Item = Result<C, CE>> + Sink<C, Error = CE> + Send + 'static,
        US: Stream<Item = Result<U, UE>> + Sink<U, Error = UE> + Send + 'static,
        CE: std::fmt::Display + Send + 'static,
        UE: std::fmt::Display + Send + 'static,
    {
        info!("Session started");

        let (client_sink, client_stream) = client.split();
        let (upstream_sink, upstream_stream) = upstream.split();

        let (client_tx, client_sched) = EgressScheduler::<C>::new(self.settings.lanes);
        let (upstream_tx, upstream_sched) = EgressScheduler::<U>::new(self.settings.lanes);
        let client_stats = client_tx.stats();
        let upstream_stats = upstream_tx.stats();

        let mut first_error = None;

        // The session configuration must be the first frame the upstream sees.
        if let Err(e) = self.configure_upstream(&upstream_tx).await {
            error!("Failed to queue session.update: {}", e);
            self.cancel.cancel();
            first_error = Some(e);
        }

        let keepalive = self.settings.keepalive;
        let framer = DownstreamFramer::new(self.raw_mode, self.tracker.clone());

        let client_link = ClientLink {
            downstream: client_tx.clone(),
            upstream: upstream_tx,
            framer: framer.clone(),
            keepalive,
            turn_detection: self.settings.upstream.turn_detection,
            idle_commit: self.settings.upstream.idle_commit,
            cancel: self.cancel.clone(),
        };
        let upstream_link = UpstreamLink {
            downstream: client_tx,
            framer,
            keepalive,
            interrupt_on_speech: self.settings.upstream.interrupt_on_speech,
            cancel: self.cancel.clone(),
        };

        let tasks = [
            (
                "client_writer",
                self.spawn_guarded(client_sched.run(client_sink, keepalive, self.cancel.clone())),
            ),
            (
                "upstream_writer",
                self.spawn_guarded(upstream_sched.run(
                    upstream_sink,
                    keepalive,
                    self.cancel.clone(),
                )),
            ),
            (
                "client_reader",
                self.spawn_guarded(client_link.run(client_stream)),
            ),
            (
                "upstream_reader",
                self.spawn_guarded(upstream_link.run(upstream_stream)),
            ),
        ];

        for (name, handle) in tasks {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(task = name, "Session task failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(task = name, "Session task panicked: {}", e);
                    first_error.get_or_insert(RelayError::Transport(e.to_string()));
                }
            }
        }

        let summary = SessionSummary {
            session_id: self.id,
            final_generation: self.tracker.current(),
            client: client_stats.snapshot(),
            upstream: upstream_stats.snapshot(),
            error: first_error,
        };

        info!(
            final_generation = summary.final_generation,
            audio_to_client = summary.client.audio_sent,
            audio_to_upstream = summary.upstream.audio_sent,
            evicted = summary.client.evicted + summary.upstream.evicted,
            purged = summary.client.purged,
            clean = summary.error.is_none(),
            "Session ended"
        );

        summary
    }

    async fn configure_upstream<U: WsFrame>(
        &self,
        upstream: &super::egress::EgressHandle<U>,
    ) -> RelayResult<()> {
        let update = translator::session_update(&self.settings.upstream).to_json()?;
        upstream.send_control(U::text(update)).await?;
        info!(
            turn_detection = ?self.settings.upstream.turn_detection,
            voice = %self.settings.upstream.voice,
            "session.update queued"
        );
        Ok(())
    }

    fn spawn_guarded<F>(&self, task: F) -> JoinHandle<RelayResult<()>>
    where
        F: std::future::Future<Output = RelayResult<()>> + Send + 'static,
    {
        let guard = self.cancel.clone().drop_guard();
        tokio::spawn(
            async move {
                let _guard = guard;
                task.await
            }
            .in_current_span(),
        )
    }
}
