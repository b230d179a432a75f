// ABOUTME: Single-threaded actor that streams the selected track to registered listeners.
// ABOUTME: Commands and store change notifications share one FIFO queue on a dedicated thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle as TaskHandle;
use trailstore_core::updater::DEFAULT_MIN_RECORDING_DISTANCE_M;
use trailstore_core::{TrackId, TrackPoint, TrackPointId, TrackStatistics, TrackStatisticsUpdater};
use trailstore_store::{StoreChange, StoreError, TrackStore};

use crate::listener::{ListenerId, TrackDataListener};
use crate::sampling::{Delivery, SamplingState, sampling_frequency};

pub const DEFAULT_TARGET_POINTS: u64 = 5000;
pub const DEFAULT_MAX_MARKERS: usize = 128;

const COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub channel closed")]
    ChannelClosed,

    #[error("failed to spawn hub thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("hub thread panicked")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Sampled-in points a listener should hold before the track is resampled.
    pub target_points: u64,
    /// Markers replayed per marker pass, oldest first.
    pub max_markers: usize,
    pub min_recording_distance_m: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            target_points: DEFAULT_TARGET_POINTS,
            max_markers: DEFAULT_MAX_MARKERS,
            min_recording_distance_m: DEFAULT_MIN_RECORDING_DISTANCE_M,
        }
    }
}

/// Which track, if any, is being recorded right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStatus {
    pub track_id: Option<TrackId>,
    pub paused: bool,
}

impl RecordingStatus {
    pub fn recording(track_id: TrackId) -> Self {
        Self {
            track_id: Some(track_id),
            paused: false,
        }
    }
}

/// Point-in-time view of the hub, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSnapshot {
    pub started: bool,
    pub selected_track: Option<TrackId>,
    pub listeners: usize,
    pub num_loaded: u64,
    pub num_sampled_in: u64,
    pub first_seen: Option<TrackPointId>,
    pub last_seen: Option<TrackPointId>,
}

enum HubCommand {
    Start,
    Stop,
    LoadTrack(TrackId),
    Register(ListenerId, Box<dyn TrackDataListener>),
    Unregister(ListenerId),
    SetRecordingStatus(RecordingStatus),
    Shutdown,
}

enum HubMessage {
    Command(HubCommand, oneshot::Sender<()>),
    Snapshot(oneshot::Sender<HubSnapshot>),
    StoreChanged(StoreChange),
}

/// Public handle for the hub actor. Every call is queued behind the ones
/// before it and resolves once the hub has finished processing it.
pub struct TrackDataHubHandle {
    cmd_tx: mpsc::Sender<HubMessage>,
    next_listener: AtomicU64,
    thread: Option<JoinHandle<()>>,
}

impl TrackDataHubHandle {
    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubMessage::Command(command, tx))
            .await
            .map_err(|_| HubError::ChannelClosed)?;
        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Begin following store changes. Streams the selected track, if any.
    pub async fn start(&self) -> Result<(), HubError> {
        self.send(HubCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), HubError> {
        self.send(HubCommand::Stop).await
    }

    /// Select a track. Selecting the current track again does nothing.
    pub async fn load_track(&self, track_id: TrackId) -> Result<(), HubError> {
        self.send(HubCommand::LoadTrack(track_id)).await
    }

    pub async fn register_listener(
        &self,
        listener: impl TrackDataListener + 'static,
    ) -> Result<ListenerId, HubError> {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.send(HubCommand::Register(id, Box::new(listener))).await?;
        Ok(id)
    }

    pub async fn unregister_listener(&self, id: ListenerId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister(id)).await
    }

    pub async fn set_recording_status(&self, status: RecordingStatus) -> Result<(), HubError> {
        self.send(HubCommand::SetRecordingStatus(status)).await
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubMessage::Snapshot(tx))
            .await
            .map_err(|_| HubError::ChannelClosed)?;
        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Stop the hub and wait for its thread to exit.
    pub async fn shutdown(mut self) -> Result<(), HubError> {
        self.send(HubCommand::Shutdown).await?;
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| HubError::Panicked)?
            .map_err(|_| HubError::Panicked)
    }
}

/// Spawn the hub on its own thread and return the handle for driving it.
pub fn spawn(store: Arc<TrackStore>, config: HubConfig) -> Result<TrackDataHubHandle, HubError> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<HubMessage>(COMMAND_QUEUE_CAPACITY);
    let forward_tx = cmd_tx.downgrade();

    let thread = std::thread::Builder::new()
        .name("track-data-hub".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "failed to build hub runtime");
                    return;
                }
            };
            let hub = TrackDataHub::new(store, config, forward_tx);
            runtime.block_on(hub.run(cmd_rx));
        })?;

    Ok(TrackDataHubHandle {
        cmd_tx,
        next_listener: AtomicU64::new(1),
        thread: Some(thread),
    })
}

/// Who a callback goes to.
#[derive(Debug, Clone, Copy)]
enum Audience {
    All,
    One(ListenerId),
}

#[derive(Default)]
struct Listeners {
    entries: Vec<(ListenerId, Box<dyn TrackDataListener>)>,
}

impl Listeners {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn each(&mut self, audience: Audience, mut f: impl FnMut(&mut dyn TrackDataListener)) {
        for (id, listener) in &mut self.entries {
            match audience {
                Audience::All => f(listener.as_mut()),
                Audience::One(target) if target == *id => f(listener.as_mut()),
                Audience::One(_) => {}
            }
        }
    }

    fn deliver(
        &mut self,
        audience: Audience,
        delivery: Delivery,
        point: &TrackPoint,
        statistics: &TrackStatistics,
    ) {
        self.each(audience, |listener| {
            if delivery.is_sampled_in() {
                listener.on_sampled_in_point(point, statistics);
            } else {
                listener.on_sampled_out_point(point, statistics);
            }
        });
    }
}

struct TrackDataHub {
    store: Arc<TrackStore>,
    config: HubConfig,
    forward_tx: mpsc::WeakSender<HubMessage>,
    forwarder: Option<TaskHandle<()>>,
    listeners: Listeners,
    selected: Option<TrackId>,
    recording: RecordingStatus,
    sampling: SamplingState,
}

impl TrackDataHub {
    fn new(
        store: Arc<TrackStore>,
        config: HubConfig,
        forward_tx: mpsc::WeakSender<HubMessage>,
    ) -> Self {
        let sampling = SamplingState::new(config.min_recording_distance_m);
        Self {
            store,
            config,
            forward_tx,
            forwarder: None,
            listeners: Listeners::default(),
            selected: None,
            recording: RecordingStatus::default(),
            sampling,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<HubMessage>) {
        while let Some(message) = cmd_rx.recv().await {
            match message {
                HubMessage::Command(HubCommand::Shutdown, reply) => {
                    self.stop();
                    let _ = reply.send(());
                    break;
                }
                HubMessage::Command(command, reply) => {
                    self.handle(command);
                    // The caller may have stopped waiting.
                    let _ = reply.send(());
                }
                HubMessage::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                HubMessage::StoreChanged(change) => self.on_store_change(change),
            }
        }
        self.stop();
        tracing::debug!("hub loop exited");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Start => self.start(),
            HubCommand::Stop => self.stop(),
            HubCommand::LoadTrack(track_id) => self.load_track(track_id),
            HubCommand::Register(id, listener) => self.register(id, listener),
            HubCommand::Unregister(id) => {
                self.listeners.entries.retain(|(entry, _)| *entry != id);
                tracing::info!(listener = %id, "listener unregistered");
            }
            HubCommand::SetRecordingStatus(status) => self.recording = status,
            HubCommand::Shutdown => self.stop(),
        }
    }

    fn is_started(&self) -> bool {
        self.forwarder.is_some()
    }

    fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            started: self.is_started(),
            selected_track: self.selected,
            listeners: self.listeners.len(),
            num_loaded: self.sampling.num_loaded,
            num_sampled_in: self.sampling.num_sampled_in,
            first_seen: self.sampling.first_seen,
            last_seen: self.sampling.last_seen,
        }
    }

    fn start(&mut self) {
        if self.is_started() {
            tracing::info!("hub already started, ignoring start");
            return;
        }
        let mut changes = self.store.subscribe();
        let forward_tx = self.forward_tx.clone();
        self.forwarder = Some(tokio::spawn(async move {
            loop {
                let batch = match changes.recv().await {
                    Ok(change) => vec![change],
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "hub fell behind store changes, reloading everything");
                        vec![StoreChange::Tracks, StoreChange::TrackPoints, StoreChange::Markers]
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(tx) = forward_tx.upgrade() else {
                    break;
                };
                for change in batch {
                    if tx.send(HubMessage::StoreChanged(change)).await.is_err() {
                        return;
                    }
                }
            }
        }));
        tracing::info!("hub started");
        if self.selected.is_some() {
            self.load_data_for_all();
        }
    }

    fn stop(&mut self) {
        let Some(forwarder) = self.forwarder.take() else {
            tracing::debug!("hub not started, ignoring stop");
            return;
        };
        forwarder.abort();
        self.sampling.reset();
        tracing::info!("hub stopped");
    }

    fn load_track(&mut self, track_id: TrackId) {
        if self.selected == Some(track_id) {
            tracing::info!(track_id = %track_id, "track already selected, not reloading");
            return;
        }
        self.selected = Some(track_id);
        self.sampling.reset();
        if self.is_started() {
            self.load_data_for_all();
        }
    }

    fn register(&mut self, id: ListenerId, listener: Box<dyn TrackDataListener>) {
        self.listeners.entries.push((id, listener));
        tracing::info!(listener = %id, total = self.listeners.len(), "listener registered");
        if self.is_started() && self.selected.is_some() {
            self.load_data_for_listener(id);
        }
    }

    fn on_store_change(&mut self, change: StoreChange) {
        if !self.is_started() || self.selected.is_none() || self.listeners.is_empty() {
            return;
        }
        match change {
            StoreChange::Tracks => self.notify_track(Audience::All),
            StoreChange::Markers => self.notify_markers(Audience::All),
            StoreChange::TrackPoints if self.sampling.is_primed() => self.stream_points(),
            StoreChange::TrackPoints => self.reload_points(),
        }
    }

    fn is_selected_track_recording(&self) -> bool {
        self.selected.is_some() && self.recording.track_id == self.selected && !self.recording.paused
    }

    fn load_data_for_all(&mut self) {
        self.sampling.reset();
        if self.listeners.is_empty() {
            return;
        }
        self.notify_track(Audience::All);
        self.reload_points();
        self.notify_markers(Audience::All);
    }

    /// Bring one new listener up to date without touching the others.
    fn load_data_for_listener(&mut self, id: ListenerId) {
        let audience = Audience::One(id);
        self.notify_track(audience);
        if self.listeners.len() == 1 {
            self.reload_points();
        } else {
            self.listeners.each(audience, |l| l.clear_track_points());
            self.replay_points(id);
        }
        self.notify_markers(audience);
    }

    fn notify_track(&mut self, audience: Audience) {
        let Some(track_id) = self.selected else {
            return;
        };
        match self.store.get_track(track_id) {
            Ok(Some(track)) => self.listeners.each(audience, |l| l.on_track_updated(&track)),
            Ok(None) => tracing::debug!(track_id = %track_id, "selected track no longer exists"),
            Err(e) => tracing::warn!(track_id = %track_id, error = %e, "failed to load track"),
        }
    }

    fn notify_markers(&mut self, audience: Audience) {
        let Some(track_id) = self.selected else {
            return;
        };
        let markers = match self.store.get_markers(track_id, None, self.config.max_markers) {
            Ok(markers) => markers,
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "failed to load markers");
                return;
            }
        };
        self.listeners.each(audience, |l| l.clear_markers());
        for marker in &markers {
            self.listeners.each(audience, |l| l.on_new_marker(marker));
        }
        self.listeners.each(audience, |l| l.on_marker_stream_done());
    }

    fn reload_points(&mut self) {
        self.sampling.reset();
        self.listeners.each(Audience::All, |l| l.clear_track_points());
        self.stream_points();
    }

    /// Deliver points after the last one seen to every listener. When a
    /// continuation reaches a stride hit the budget has no room for, the
    /// stream is cleared and resampled from scratch at a lower frequency.
    fn stream_points(&mut self) {
        let Some(track_id) = self.selected else {
            return;
        };
        let continuing = self.sampling.is_primed();
        match self.point_pass(track_id, continuing) {
            Ok(PassEnd::CaughtUp) => {}
            Ok(PassEnd::OverBudget) => {
                tracing::info!(
                    track_id = %track_id,
                    loaded = self.sampling.num_loaded,
                    "resampling track at a lower frequency"
                );
                self.sampling.reset();
                self.listeners.each(Audience::All, |l| l.clear_track_points());
                if let Err(e) = self.point_pass(track_id, false) {
                    log_stream_failure(track_id, &e);
                }
            }
            Err(e) => log_stream_failure(track_id, &e),
        }
        tracing::debug!(
            track_id = %track_id,
            loaded = self.sampling.num_loaded,
            sampled_in = self.sampling.num_sampled_in,
            "point pass finished"
        );
        self.listeners.each(Audience::All, |l| l.on_point_stream_done());
    }

    fn point_pass(&mut self, track_id: TrackId, enforce_budget: bool) -> Result<PassEnd, StoreError> {
        let target = self.config.target_points;
        let recording = self.is_selected_track_recording();
        let store = Arc::clone(&self.store);
        let sampling = &mut self.sampling;
        let listeners = &mut self.listeners;
        let last_point = store.last_track_point_id(track_id)?;
        store.with_track_points(track_id, sampling.last_seen, |points| {
            let mut frequency = None;
            while points.has_next()? {
                let point = points.next_point()?;
                let Some(point_id) = point.id else {
                    continue;
                };
                let first_seen = *sampling.first_seen.get_or_insert(point_id);
                let frequency =
                    *frequency.get_or_insert_with(|| sampling_frequency(first_seen, last_point, target));

                let is_tail = Some(point_id) == last_point && !recording;
                let delivery =
                    Delivery::classify(sampling.num_loaded, frequency, point.point_type, is_tail);
                if enforce_budget && delivery == Delivery::Stride && sampling.budget_spent(target) {
                    return Ok(PassEnd::OverBudget);
                }

                sampling.updater.add_point(&point);
                let statistics = sampling.updater.statistics();
                listeners.deliver(Audience::All, delivery, &point, &statistics);

                if delivery == Delivery::Stride {
                    sampling.num_sampled_in += 1;
                }
                sampling.num_loaded += 1;
                sampling.last_seen = Some(point_id);
            }
            Ok(PassEnd::CaughtUp)
        })
    }

    /// Replay what the other listeners already hold to a late joiner, using
    /// throwaway counters so the shared stream is left untouched.
    fn replay_points(&mut self, id: ListenerId) {
        let audience = Audience::One(id);
        let (Some(track_id), Some(last_seen)) = (self.selected, self.sampling.last_seen) else {
            self.listeners.each(audience, |l| l.on_point_stream_done());
            return;
        };
        let target = self.config.target_points;
        let recording = self.is_selected_track_recording();
        let mut updater = TrackStatisticsUpdater::new(self.config.min_recording_distance_m);
        let store = Arc::clone(&self.store);
        let listeners = &mut self.listeners;

        let result = store.last_track_point_id(track_id).and_then(|last_point| {
            store.with_track_points(track_id, None, |points| {
                let mut index = 0u64;
                let mut frequency = None;
                while points.has_next()? {
                    let point = points.next_point()?;
                    let Some(point_id) = point.id else {
                        continue;
                    };
                    if point_id > last_seen {
                        break;
                    }
                    let frequency = *frequency
                        .get_or_insert_with(|| sampling_frequency(point_id, last_point, target));

                    updater.add_point(&point);
                    let statistics = updater.statistics();
                    let is_tail = Some(point_id) == last_point && !recording;
                    let delivery = Delivery::classify(index, frequency, point.point_type, is_tail);
                    listeners.deliver(audience, delivery, &point, &statistics);
                    index += 1;
                }
                Ok(())
            })
        });
        if let Err(e) = result {
            log_stream_failure(track_id, &e);
        }
        listeners.each(audience, |l| l.on_point_stream_done());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    CaughtUp,
    /// Stopped before a stride hit that would exceed the point budget.
    OverBudget,
}

fn log_stream_failure(track_id: TrackId, error: &StoreError) {
    tracing::warn!(track_id = %track_id, error = %error, "point pass aborted, keeping delivered state");
}
