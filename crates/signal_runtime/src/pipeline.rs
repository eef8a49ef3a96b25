//! The pipeline actor: one tokio task owns the pipeline state, the heartbeat
//! and the auto-clear deadline, and serialises every step through its
//! mailbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use signal_core::{
    Direction, DisplayUpdate, Ingest, Payload, PipelineConfig, RawSignal, SignalPipeline,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::sink::DisplaySink;
use crate::source::{EventSource, PayloadHandler, SourceError, SubscriptionHandle};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to register for channel '{channel}'")]
    Registration {
        channel: String,
        #[source]
        source: SourceError,
    },
    #[error("pipeline is not running")]
    NotRunning,
}

/// Point-in-time view of the pipeline task's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub uptime_ms: u64,
    pub direction_history: Direction,
    pub last_valid_event_ms: u64,
    pub next_auto_clear_ms: Option<u64>,
}

enum Command {
    Payload(Payload),
    Inject(RawSignal),
    Snapshot(oneshot::Sender<PipelineSnapshot>),
}

struct Running {
    subscription: SubscriptionHandle,
    mailbox: mpsc::UnboundedSender<Command>,
    /// Raised by `stop` before the abort; the actor checks it before every
    /// step and before every sink push.
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Registers with an event source on `start`, pushes display updates to the
/// sink, and forgets everything on `stop`.
pub struct TrafficLightPipeline {
    config: PipelineConfig,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn DisplaySink>,
    running: Mutex<Option<Running>>,
}

impl TrafficLightPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn EventSource>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_registered(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Subscribes and starts the heartbeat. No-op when already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("pipeline already registered");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let forward = tx.clone();
        // Deliveries may come from any thread; hop onto the mailbox before
        // anything decodes them.
        let handler: PayloadHandler = Arc::new(move |payload| {
            if forward.send(Command::Payload(payload)).is_err() {
                trace!("payload delivered after pipeline stopped");
            }
        });
        let subscription = self
            .source
            .subscribe(&self.config.channel, handler)
            .map_err(|source| PipelineError::Registration {
                channel: self.config.channel.clone(),
                source,
            })?;

        let epoch = Instant::now();
        let stopped = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_pipeline(
            self.config.clone(),
            Arc::clone(&self.sink),
            rx,
            Arc::clone(&stopped),
            epoch,
        ));
        *running = Some(Running {
            subscription,
            mailbox: tx,
            stopped,
            task,
        });
        info!(channel = %self.config.channel, "pipeline started");
        Ok(())
    }

    /// Drops the registration and cancels both timers. Safe to call twice.
    ///
    /// Nothing reaches the sink once this returns, except an update the
    /// sink was already in the middle of receiving.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.stopped.store(true, Ordering::SeqCst);
        self.source.unsubscribe(running.subscription);
        running.task.abort();
        info!(channel = %self.config.channel, "pipeline stopped");
    }

    /// Test entry point: runs raw fields through normalize and freshness as
    /// if they had arrived in a live payload.
    pub fn inject(&self, raw: RawSignal) -> Result<(), PipelineError> {
        self.send(Command::Inject(raw))
    }

    pub async fn snapshot(&self) -> Result<PipelineSnapshot, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| PipelineError::NotRunning)
    }

    fn send(&self, command: Command) -> Result<(), PipelineError> {
        let running = self.running.lock();
        let running = running.as_ref().ok_or(PipelineError::NotRunning)?;
        running
            .mailbox
            .send(command)
            .map_err(|_| PipelineError::NotRunning)
    }
}

impl Drop for TrafficLightPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn elapsed_ms(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_pipeline(
    config: PipelineConfig,
    sink: Arc<dyn DisplaySink>,
    mut mailbox: mpsc::UnboundedReceiver<Command>,
    stopped: Arc<AtomicBool>,
    epoch: Instant,
) {
    let period = Duration::from_millis(config.heartbeat_interval_ms.max(1));
    let mut heartbeat = tokio::time::interval_at(epoch + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pipeline = SignalPipeline::new(config, 0);

    loop {
        // A ready mailbox never yields, so the abort alone can arrive late.
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        // A deadline past the end of the clock never fires.
        let auto_clear_at = pipeline
            .next_auto_clear_ms()
            .and_then(|ms| epoch.checked_add(Duration::from_millis(ms)));

        // Mailbox first: a signal that lands on the same turn as a timer
        // replaces the pending auto-clear before it can fire.
        let update = tokio::select! {
            biased;
            command = mailbox.recv() => {
                let Some(command) = command else { break };
                handle_command(&mut pipeline, elapsed_ms(epoch), command)
            }
            _ = heartbeat.tick() => pipeline.heartbeat(elapsed_ms(epoch)),
            () = sleep_until_opt(auto_clear_at) => pipeline.fire_auto_clear(elapsed_ms(epoch)),
        };

        if let Some(update) = update {
            if stopped.load(Ordering::SeqCst) {
                break;
            }
            match &update {
                DisplayUpdate::Signal(signal) => debug!(
                    status = ?signal.status,
                    countdown = signal.countdown,
                    direction = ?signal.direction,
                    source = %signal.source,
                    "emitting signal"
                ),
                DisplayUpdate::Clear { reason } => debug!(?reason, "clearing display"),
            }
            sink.update(update);
        }
    }
    debug!("pipeline task exiting");
}

fn handle_command(
    pipeline: &mut SignalPipeline,
    now_ms: u64,
    command: Command,
) -> Option<DisplayUpdate> {
    let ingest = match command {
        Command::Payload(payload) => pipeline.handle_payload(now_ms, &payload),
        Command::Inject(raw) => pipeline.inject(now_ms, raw),
        Command::Snapshot(reply) => {
            let snapshot = PipelineSnapshot {
                uptime_ms: now_ms,
                direction_history: pipeline.direction_history(),
                last_valid_event_ms: pipeline.last_valid_event_ms(),
                next_auto_clear_ms: pipeline.next_auto_clear_ms(),
            };
            if reply.send(snapshot).is_err() {
                warn!("snapshot requester went away");
            }
            return None;
        }
    };
    match &ingest {
        Ingest::Foreign => trace!("ignoring payload with foreign type tag"),
        Ingest::Dropped(signal) => debug!(
            raw_status = signal.raw_status,
            raw_direction = signal.raw_direction,
            "dropping signal with no active status"
        ),
        Ingest::Emitted(_) => {}
    }
    ingest.into_update()
}
