//! Egress scheduler: the single writer of one socket.
//!
//! Producers never touch the socket. They submit frames through a cloneable
//! [`EgressHandle`] onto one of two lanes:
//!
//! - **control**: bounded mpsc channel, senders wait when full, never drops,
//!   strict FIFO.
//! - **audio**: small ring with drop-oldest eviction, FIFO among survivors.
//!
//! The [`EgressScheduler`] loop serves control first, then audio, then the
//! heartbeat ping. Control items submitted with
//! [`EgressHandle::send_control_ordered`] carry an audio fence and are held
//! back until every audio item submitted before them has been written or
//! evicted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::{Sink, SinkExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{KeepalivePolicy, LaneCapacity, RelayError, RelayResult};
use super::frame::WsFrame;

// =============================================================================
// Statistics
// =============================================================================

/// Counters for one scheduler, shared with its handles.
#[derive(Debug, Default)]
pub struct EgressStats {
    control_sent: AtomicU64,
    audio_sent: AtomicU64,
    evicted: AtomicU64,
    purged: AtomicU64,
    pings: AtomicU64,
}

impl EgressStats {
    pub fn snapshot(&self) -> EgressStatsSnapshot {
        EgressStatsSnapshot {
            control_sent: self.control_sent.load(Ordering::Relaxed),
            audio_sent: self.audio_sent.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EgressStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgressStatsSnapshot {
    pub control_sent: u64,
    pub audio_sent: u64,
    pub evicted: u64,
    pub purged: u64,
    pub pings: u64,
}

// =============================================================================
// Audio lane
// =============================================================================

struct AudioItem<M> {
    msg: M,
    seq: u64,
    generation: u64,
}

struct AudioQueue<M> {
    items: VecDeque<AudioItem<M>>,
    next_seq: u64,
}

struct AudioLane<M> {
    queue: Mutex<AudioQueue<M>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl<M> AudioLane<M> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(AudioQueue {
                items: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true when an older item was evicted to make room.
    fn push(&self, msg: M, generation: u64) -> RelayResult<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::LaneClosed);
        }

        let evicted = {
            let mut queue = self.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            let evicted = if queue.items.len() >= self.capacity {
                queue.items.pop_front();
                true
            } else {
                false
            };
            queue.items.push_back(AudioItem {
                msg,
                seq,
                generation,
            });
            evicted
        };

        self.notify.notify_one();
        Ok(evicted)
    }

    fn pop(&self) -> Option<AudioItem<M>> {
        self.queue.lock().items.pop_front()
    }

    /// Pop the front item only if it was submitted before `fence`.
    fn pop_before(&self, fence: u64) -> Option<AudioItem<M>> {
        let mut queue = self.queue.lock();
        match queue.items.front() {
            Some(item) if item.seq < fence => queue.items.pop_front(),
            _ => None,
        }
    }

    fn next_seq(&self) -> u64 {
        self.queue.lock().next_seq
    }

    fn purge_before(&self, generation: u64) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.items.len();
        queue.items.retain(|item| item.generation >= generation);
        before - queue.items.len()
    }

    fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue.lock().items.clear();
    }
}

// =============================================================================
// Handle
// =============================================================================

struct ControlItem<M> {
    msg: M,
    /// Audio items with a lower sequence number must leave first
    fence: Option<u64>,
}

/// Producer side of an egress scheduler.
pub struct EgressHandle<M> {
    control_tx: mpsc::Sender<ControlItem<M>>,
    audio: Arc<AudioLane<M>>,
    stats: Arc<EgressStats>,
}

impl<M> Clone for EgressHandle<M> {
    fn clone(&self) -> Self {
        Self {
            control_tx: self.control_tx.clone(),
            audio: self.audio.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<M: WsFrame> EgressHandle<M> {
    /// Queue a control frame with strict priority over audio.
    ///
    /// Waits while the control lane is full.
    pub async fn send_control(&self, msg: M) -> RelayResult<()> {
        self.control_tx
            .send(ControlItem { msg, fence: None })
            .await
            .map_err(|_| RelayError::LaneClosed)
    }

    /// Queue a control frame that must follow all audio already submitted.
    pub async fn send_control_ordered(&self, msg: M) -> RelayResult<()> {
        let fence = self.audio.next_seq();
        self.control_tx
            .send(ControlItem {
                msg,
                fence: Some(fence),
            })
            .await
            .map_err(|_| RelayError::LaneClosed)
    }

    /// Queue an audio frame, evicting the oldest queued one when full.
    ///
    /// Returns `true` if an eviction happened.
    pub fn send_audio(&self, msg: M) -> RelayResult<bool> {
        self.send_audio_tagged(msg, 0)
    }

    /// Queue an audio frame tagged with its playback generation.
    pub fn send_audio_tagged(&self, msg: M, generation: u64) -> RelayResult<bool> {
        let evicted = self.audio.push(msg, generation)?;
        if evicted {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(evicted)
    }

    /// Drop queued audio tagged with a generation older than `generation`.
    pub fn purge_audio_before(&self, generation: u64) -> usize {
        let purged = self.audio.purge_before(generation);
        if purged > 0 {
            self.stats.purged.fetch_add(purged as u64, Ordering::Relaxed);
        }
        purged
    }

    /// Audio items currently waiting.
    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_closed(&self) -> bool {
        self.control_tx.is_closed()
    }

    pub fn stats(&self) -> Arc<EgressStats> {
        self.stats.clone()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Consumer side: owns the sink while running.
pub struct EgressScheduler<M> {
    control_rx: mpsc::Receiver<ControlItem<M>>,
    audio: Arc<AudioLane<M>>,
    stats: Arc<EgressStats>,
}

impl<M: WsFrame> EgressScheduler<M> {
    pub fn new(lanes: LaneCapacity) -> (EgressHandle<M>, Self) {
        let (control_tx, control_rx) = mpsc::channel(lanes.control.max(1));
        let audio = Arc::new(AudioLane::new(lanes.audio));
        let stats = Arc::new(EgressStats::default());

        let handle = EgressHandle {
            control_tx,
            audio: audio.clone(),
            stats: stats.clone(),
        };
        let scheduler = Self {
            control_rx,
            audio,
            stats,
        };
        (handle, scheduler)
    }

    /// Serve the lanes into `sink` until cancelled, until every handle is
    /// dropped and the lanes are drained, or until a write fails.
    ///
    /// The sink is closed exactly once on the way out.
    pub async fn run<S>(
        mut self,
        mut sink: S,
        policy: KeepalivePolicy,
        cancel: CancellationToken,
    ) -> RelayResult<()>
    where
        S: Sink<M> + Unpin,
        S::Error: std::fmt::Display,
    {
        let result = self.serve(&mut sink, policy, &cancel).await;

        self.audio.close();
        self.control_rx.close();

        match tokio::time::timeout(policy.write_wait, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Socket close failed: {}", e),
            Err(_) => debug!("Socket close timed out"),
        }

        result
    }

    async fn serve<S>(
        &mut self,
        sink: &mut S,
        policy: KeepalivePolicy,
        cancel: &CancellationToken,
    ) -> RelayResult<()>
    where
        S: Sink<M> + Unpin,
        S::Error: std::fmt::Display,
    {
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + policy.ping_interval,
            policy.ping_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut pending: Option<ControlItem<M>> = None;
        let mut producers_gone = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            if pending.is_none() && !producers_gone {
                match self.control_rx.try_recv() {
                    Ok(item) => pending = Some(item),
                    Err(mpsc::error::TryRecvError::Empty) => {}
                    Err(mpsc::error::TryRecvError::Disconnected) => producers_gone = true,
                }
            }

            if let Some(item) = pending.take() {
                let held = item
                    .fence
                    .and_then(|fence| self.audio.pop_before(fence));
                match held {
                    Some(audio) => {
                        pending = Some(item);
                        write_frame(sink, audio.msg, policy.write_wait).await?;
                        self.stats.audio_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        write_frame(sink, item.msg, policy.write_wait).await?;
                        self.stats.control_sent.fetch_add(1, Ordering::Relaxed);
                    }
                }
                continue;
            }

            if let Some(audio) = self.audio.pop() {
                write_frame(sink, audio.msg, policy.write_wait).await?;
                self.stats.audio_sent.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if producers_gone {
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(()),

                item = self.control_rx.recv() => match item {
                    Some(item) => pending = Some(item),
                    None => producers_gone = true,
                },

                _ = self.audio.notify.notified() => {}

                _ = heartbeat.tick() => {
                    write_frame(sink, M::ping(), policy.write_wait).await?;
                    self.stats.pings.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

async fn write_frame<S, M>(sink: &mut S, msg: M, write_wait: Duration) -> RelayResult<()>
where
    S: Sink<M> + Unpin,
    S::Error: std::fmt::Display,
{
    match tokio::time::timeout(write_wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RelayError::Transport(e.to_string())),
        Err(_) => {
            warn!("Write deadline of {:?} exceeded", write_wait);
            Err(RelayError::WriteTimeout(write_wait))
        }
    }
}
