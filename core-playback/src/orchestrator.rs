//! # Fallback Orchestrator
//!
//! Owns the playback session and exactly one active backend, and performs
//! the one-way swap from the primary to the fallback backend.
//!
//! ## State machine
//!
//! ```text
//!            open                  format failure              fallback opened
//! Idle ─────────────> PrimaryActive ─────────────> SwitchingToFallback ─────────────> FallbackActive
//!   ^                      │                                                              │
//!   └──────── stop ────────┴──────────────────────────────────────────────────────────────┘
//!
//! any state ── dispose ──> Disposed
//! ```
//!
//! ## Control loop
//!
//! Backend failures, audio-focus changes, display changes and settle timers
//! arrive on different threads. Each of them only enqueues a
//! [`ControlMessage`] on a bounded channel; a single control task consumes
//! them in order. Swaps are therefore serialized, and a failure stamped with
//! an old backend epoch is recognized and dropped.
//!
//! Commands from the caller take the state lock briefly and enqueue work on
//! the active backend's worker; they never wait on native I/O.

use crate::backend::{
    ActiveBackend, BackendContext, FailureReporter, FallbackBackend, PrimaryBackend,
};
use crate::bridge::PropertyBridge;
use crate::config::PlaybackConfig;
use crate::error::{BackendFailure, FailureClass, PlaybackError, Result};
use crate::focus::{AudioFocusArbiter, FocusAction, FocusState};
use crate::frame_rate::{FrameRateDecision, FrameRateMatcher, FrameRateState};
use crate::session::{PlaybackSession, SessionState};
use crate::traits::{
    AddSubtitleRequest, BackendAdapter, BackendKind, OpenRequest, StatsMap, SubtitleSelection,
};
use crate::tracks::{TrackRef, TrackRegistry};
use bridge_traits::{
    DisplayChange, DisplayListener, FocusChange, FocusListener, HardwarePlayerFactory,
    NativeErrorKind, PlaybackSessionId, PropertyFormat, SoftwarePlayerFactory,
};
use core_runtime::config::{ClientIdentity, EngineConfig};
use core_runtime::events::MessageSink;
use core_runtime::logging::redact_uri;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Work item for the orchestrator's control loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// A backend reported a failure. `epoch` identifies the backend.
    BackendFailure { epoch: u64, failure: BackendFailure },
    Focus(FocusChange),
    Display(DisplayChange),
    /// The settle delay started for display change `token` has elapsed.
    SettleElapsed { token: u64 },
}

struct Inner {
    state: SessionState,
    session: Option<PlaybackSession>,
    backend: Option<ActiveBackend>,
    next_epoch: u64,
    settle_token: u64,
    resume_after_settle: bool,
}

struct Shared {
    identity: ClientIdentity,
    hardware: Arc<dyn HardwarePlayerFactory>,
    software: Arc<dyn SoftwarePlayerFactory>,
    config: Arc<PlaybackConfig>,
    bridge: Arc<PropertyBridge>,
    tracks: Arc<TrackRegistry>,
    focus: AudioFocusArbiter,
    frame_rate: FrameRateMatcher,
    control: mpsc::Sender<ControlMessage>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

/// What the swap needs from the session once the primary is detached.
struct SwapPlan {
    primary: ActiveBackend,
    position_ms: Option<i64>,
    paused: bool,
}

/// Top-level playback engine. See the module documentation.
pub struct FallbackOrchestrator {
    shared: Arc<Shared>,
}

impl FallbackOrchestrator {
    /// Builds the engine and starts its control loop. Must be called within
    /// a Tokio runtime.
    pub fn new(
        engine: EngineConfig,
        config: PlaybackConfig,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidArgument)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PlaybackError::NoRuntime(e.to_string()))?;

        let (control, receiver) = mpsc::channel(config.control_channel_capacity);
        let cancel = CancellationToken::new();

        let shared = Arc::new(Shared {
            identity: engine.identity,
            hardware: engine.hardware_factory,
            software: engine.software_factory,
            focus: AudioFocusArbiter::new(engine.audio_focus),
            frame_rate: FrameRateMatcher::new(engine.display, config.short_video_threshold_ms),
            config: Arc::new(config),
            bridge: Arc::new(PropertyBridge::new(sink)),
            tracks: Arc::new(TrackRegistry::new()),
            control,
            cancel: cancel.clone(),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
                backend: None,
                next_epoch: 0,
                settle_token: 0,
                resume_after_settle: false,
            }),
        });

        runtime.spawn(control_loop(Arc::downgrade(&shared), receiver, cancel));

        info!(
            client_id = %shared.identity.client_id,
            platform = %shared.identity.platform,
            "Playback engine created"
        );
        Ok(Self { shared })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.shared.identity
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    pub fn session_id(&self) -> Option<PlaybackSessionId> {
        self.shared.inner.lock().session.as_ref().map(|s| s.id)
    }

    /// Backend serving the current session; `Primary` when idle.
    pub fn player_type(&self) -> BackendKind {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .map_or(BackendKind::Primary, |s| s.backend)
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == SessionState::Disposed
    }

    pub fn focus_state(&self) -> FocusState {
        self.shared.focus.state()
    }

    pub fn frame_rate_state(&self) -> FrameRateState {
        self.shared.frame_rate.state()
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.shared.tracks
    }

    /// Opens `request` on a fresh primary backend, replacing any current
    /// session.
    #[instrument(skip(self, request), fields(uri = %redact_uri(&request.uri)))]
    pub async fn open(&self, request: OpenRequest) -> Result<()> {
        if request.uri.trim().is_empty() {
            return Err(PlaybackError::InvalidArgument("Missing 'uri'".to_string()));
        }

        let previous = self.shared.end_session()?;
        if let Some(previous) = previous {
            previous.adapter().dispose().await;
        }

        let replaced = {
            let mut inner = self.shared.inner.lock();
            if inner.state == SessionState::Disposed {
                return Err(PlaybackError::Disposed);
            }

            inner.next_epoch += 1;
            let epoch = inner.next_epoch;
            self.shared.tracks.clear();
            self.shared.bridge.reset_samples();

            let emitter = self.shared.bridge.attach(BackendKind::Primary);
            let backend = PrimaryBackend::spawn(
                Arc::clone(&self.shared.hardware),
                self.shared.context(emitter, epoch),
            );
            backend.open(&request);

            let session = PlaybackSession::new(request, epoch);
            info!(session = %session.id, epoch, "Session opened on primary backend");
            inner.session = Some(session);
            inner.state = SessionState::PrimaryActive;
            inner.backend.replace(ActiveBackend::Primary(backend))
        };

        // Only reachable when two opens race; the older one loses.
        if let Some(replaced) = replaced {
            replaced.adapter().dispose().await;
        }
        Ok(())
    }

    pub fn play(&self) {
        self.shared.play();
    }

    pub fn pause(&self) {
        self.shared.pause();
    }

    /// Stops playback and ends the session. Releasing the native player
    /// stops it.
    pub async fn stop(&self) {
        let backend = match self.shared.end_session() {
            Ok(backend) => backend,
            Err(_) => return,
        };
        if let Some(backend) = backend {
            backend.adapter().dispose().await;
            info!("Session stopped");
        }
    }

    pub fn seek(&self, position_ms: i64) {
        self.shared
            .command(|_| {}, |backend| backend.seek(position_ms.max(0)));
    }

    /// `volume` in `0.0..=1.0`.
    pub fn set_volume(&self, volume: f64) {
        self.shared.command(
            |intent| intent.volume = Some(volume),
            |backend| backend.set_volume(volume),
        );
    }

    pub fn set_playback_rate(&self, rate: f64) {
        let rate = self.shared.config.clamp_rate(rate);
        self.shared.command(
            |intent| intent.rate = Some(rate),
            |backend| backend.set_playback_rate(rate),
        );
    }

    pub fn select_audio_track(&self, id: &str) {
        self.shared.command(
            |intent| intent.audio_track = Some(id.to_string()),
            |backend| backend.select_audio_track(id),
        );
    }

    pub fn select_subtitle_track(&self, selection: SubtitleSelection) {
        self.shared.command(
            |intent| intent.subtitle = Some(selection.clone()),
            |backend| backend.select_subtitle_track(&selection),
        );
    }

    /// Registers an external subtitle for the session and returns its
    /// `ext_sub_N` id.
    pub fn add_subtitle_track(&self, request: AddSubtitleRequest) -> Result<String> {
        if request.uri.trim().is_empty() {
            return Err(PlaybackError::InvalidArgument("Missing 'uri'".to_string()));
        }

        let mut inner = self.shared.inner.lock();
        if inner.state == SessionState::Disposed {
            return Err(PlaybackError::Disposed);
        }
        let Some(session) = inner.session.as_mut() else {
            return Err(PlaybackError::NoMedia);
        };

        let subtitle = self.shared.tracks.add_external(&request);
        if request.select {
            session.intent.subtitle = Some(SubtitleSelection::Track(subtitle.id.clone()));
        }
        if let Some(backend) = &inner.backend {
            backend.adapter().add_subtitle_track(&subtitle, request.select);
        }
        debug!(id = %subtitle.id, select = request.select, "External subtitle added");
        Ok(subtitle.id)
    }

    pub fn set_visible(&self, visible: bool) {
        self.shared.command(
            |intent| intent.visible = Some(visible),
            |backend| backend.set_visible(visible),
        );
    }

    /// Adds a property to the telemetry stream, for the current backend and
    /// every later one.
    pub fn observe(&self, name: &str, format: PropertyFormat) {
        if self.shared.bridge.observe(name, format) {
            self.shared.command(|_| {}, |backend| backend.observe(name, format));
        }
    }

    /// Backend diagnostics plus `playerType`.
    pub async fn get_stats(&self) -> StatsMap {
        let (backend, kind) = {
            let inner = self.shared.inner.lock();
            let kind = inner
                .session
                .as_ref()
                .map_or(BackendKind::Primary, |s| s.backend);
            (inner.backend.clone(), kind)
        };

        let mut stats = match backend {
            Some(backend) => backend.adapter().get_stats().await,
            None => StatsMap::new(),
        };
        stats.insert("playerType".to_string(), Value::String(kind.as_str().to_string()));
        stats
    }

    /// Requests media audio focus. Returns whether it was granted.
    pub fn request_audio_focus(&self) -> bool {
        self.shared.request_focus()
    }

    pub fn abandon_audio_focus(&self) {
        self.shared.focus.abandon();
    }

    pub fn set_video_frame_rate(&self, fps: f32, duration_ms: i64) -> FrameRateDecision {
        let control = self.shared.control.clone();
        let listener: DisplayListener = Arc::new(move |change| {
            if control.try_send(ControlMessage::Display(change)).is_err() {
                warn!("Control channel full; display change dropped");
            }
        });

        let decision = self
            .shared
            .frame_rate
            .set_video_frame_rate(fps, duration_ms, listener);
        if decision.is_applied() {
            let playing = self.shared.bridge.is_playing();
            let mut inner = self.shared.inner.lock();
            inner.settle_token += 1;
            inner.resume_after_settle = playing;
        }
        decision
    }

    pub fn clear_video_frame_rate(&self) {
        self.shared.frame_rate.clear();
        let mut inner = self.shared.inner.lock();
        inner.settle_token += 1;
        inner.resume_after_settle = false;
    }

    /// Tears down the active backend and releases focus and display
    /// listeners. Listeners are gone before this returns its first await.
    /// Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn dispose(&self) {
        let backend = {
            let mut inner = self.shared.inner.lock();
            if inner.state == SessionState::Disposed {
                return;
            }
            inner.state = SessionState::Disposed;
            inner.session = None;
            inner.settle_token += 1;
            inner.backend.take()
        };

        self.shared.bridge.detach();
        self.shared.frame_rate.clear();
        self.shared.focus.abandon();
        self.shared.cancel.cancel();

        if let Some(backend) = backend {
            backend.adapter().dispose().await;
        }
        info!("Playback engine disposed");
    }
}

impl Drop for FallbackOrchestrator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl Shared {
    fn context(&self, emitter: crate::bridge::BridgeEmitter, epoch: u64) -> BackendContext {
        let control = self.control.clone();
        let failures: FailureReporter = Arc::new(move |failure| {
            if let Err(e) = control.try_send(ControlMessage::BackendFailure { epoch, failure }) {
                warn!(epoch, error = %e, "Backend failure could not be queued");
            }
        });

        BackendContext {
            emitter,
            tracks: Arc::clone(&self.tracks),
            config: Arc::clone(&self.config),
            failures,
        }
    }

    /// Detaches and returns the current backend, leaving the engine idle.
    fn end_session(&self) -> Result<Option<ActiveBackend>> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Disposed {
            return Err(PlaybackError::Disposed);
        }
        self.bridge.detach();
        inner.session = None;
        inner.state = SessionState::Idle;
        Ok(inner.backend.take())
    }

    /// Records intent on the session and forwards the command to the active
    /// backend. Without a backend the command is only recorded, or dropped
    /// when no session exists.
    fn command(
        &self,
        record: impl FnOnce(&mut crate::session::SessionIntent),
        issue: impl FnOnce(&dyn BackendAdapter),
    ) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.as_mut() {
            record(&mut session.intent);
        }
        if let Some(backend) = &inner.backend {
            issue(backend.adapter());
        }
    }

    fn play(&self) {
        self.command(|intent| intent.paused = Some(false), |backend| backend.play());
    }

    fn pause(&self) {
        self.command(|intent| intent.paused = Some(true), |backend| backend.pause());
    }

    fn request_focus(&self) -> bool {
        let control = self.control.clone();
        let listener: FocusListener = Arc::new(move |change| {
            if control.try_send(ControlMessage::Focus(change)).is_err() {
                warn!(%change, "Control channel full; focus change dropped");
            }
        });
        self.focus.request(listener)
    }

    async fn handle_control(self: &Arc<Self>, message: ControlMessage) {
        match message {
            ControlMessage::BackendFailure { epoch, failure } => {
                self.on_backend_failure(epoch, failure).await
            }
            ControlMessage::Focus(change) => self.on_focus_change(change),
            ControlMessage::Display(change) => self.on_display_change(change),
            ControlMessage::SettleElapsed { token } => self.on_settle_elapsed(token),
        }
    }

    async fn on_backend_failure(self: &Arc<Self>, epoch: u64, failure: BackendFailure) {
        let plan = {
            let mut inner = self.inner.lock();
            let current = inner.session.as_ref().map(|s| s.epoch);
            if current != Some(epoch) {
                debug!(epoch, ?current, %failure, "Ignoring failure from a retired backend");
                return;
            }

            let swappable = inner.state == SessionState::PrimaryActive
                && failure.class() == FailureClass::FormatUnsupported
                && inner.session.as_ref().is_some_and(|s| s.can_fall_back());

            if swappable {
                self.begin_swap(&mut inner)
            } else {
                let message = terminal_message(inner.state, &failure);
                drop(inner);
                warn!(epoch, %failure, "Terminal playback failure");
                self.bridge.emit_engine_event(
                    "end-file",
                    Some(json!({ "reason": "error", "message": message })),
                );
                return;
            }
        };

        if let Some(plan) = plan {
            info!(epoch, %failure, "Primary backend cannot play this format; switching");
            self.swap_to_fallback(plan).await;
        }
    }

    /// First half of the swap, under the state lock: detach the primary so
    /// nothing it still emits is delivered, and capture where to resume.
    fn begin_swap(&self, inner: &mut Inner) -> Option<SwapPlan> {
        let primary = inner.backend.take()?;
        self.bridge.detach();
        inner.state = SessionState::SwitchingToFallback;

        let session = inner.session.as_mut()?;
        session.backend = BackendKind::Fallback;

        let paused = match self.bridge.is_paused() {
            Some(paused) => paused,
            None => session
                .intent
                .paused
                .unwrap_or(!session.request.autoplay),
        };
        // Anything recorded from here on was issued during the swap.
        session.intent.paused = None;

        Some(SwapPlan {
            primary,
            position_ms: self.bridge.last_position_ms(),
            paused,
        })
    }

    #[instrument(skip_all)]
    async fn swap_to_fallback(self: &Arc<Self>, plan: SwapPlan) {
        plan.primary.adapter().dispose().await;

        let (position_ms, switched) = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::SwitchingToFallback {
                debug!(state = %inner.state, "Session ended during swap");
                return;
            }

            inner.next_epoch += 1;
            let epoch = inner.next_epoch;
            let Some(session) = inner.session.as_mut() else {
                return;
            };
            session.epoch = epoch;

            let paused = session.intent.paused.unwrap_or(plan.paused);
            let request = session.resume_request(plan.position_ms, paused);
            let intent = session.intent.clone();

            let emitter = self.bridge.attach(BackendKind::Fallback);
            self.tracks.reset_embedded();
            let backend = FallbackBackend::spawn(
                Arc::clone(&self.software),
                self.context(emitter, epoch),
                self.bridge.subscriptions(),
            );

            backend.open(&request);
            for subtitle in self.tracks.externals() {
                backend.add_subtitle_track(&subtitle, false);
            }
            backend.set_visible(intent.visible.unwrap_or(true));
            if let Some(volume) = intent.volume {
                backend.set_volume(volume);
            }
            if let Some(rate) = intent.rate {
                backend.set_playback_rate(rate);
            }
            match &intent.subtitle {
                Some(SubtitleSelection::None) => {
                    backend.select_subtitle_track(&SubtitleSelection::None)
                }
                Some(selection @ SubtitleSelection::Track(id)) => {
                    // Embedded ids are re-discovered by the new backend.
                    if matches!(self.tracks.resolve(id), Some(TrackRef::External(_))) {
                        backend.select_subtitle_track(selection);
                    }
                }
                None => {}
            }

            inner.backend = Some(ActiveBackend::Fallback(backend));
            inner.state = SessionState::FallbackActive;
            (request.start_position_ms, inner.session.as_ref().map(|s| s.id))
        };

        let granted = self.request_focus();
        debug!(granted, "Audio focus after swap");

        self.bridge.emit_engine_event(
            "backend-switched",
            Some(json!({
                "from": BackendKind::Primary.as_str(),
                "to": BackendKind::Fallback.as_str(),
                "positionMs": position_ms,
            })),
        );
        if let Some(session) = switched {
            info!(%session, position_ms, "Fallback backend active");
        }
    }

    fn on_focus_change(&self, change: FocusChange) {
        let playing = self.bridge.is_playing();
        match self.focus.on_focus_change(change, playing) {
            FocusAction::Pause => {
                debug!(%change, playing, "Pausing for focus loss");
                self.pause();
            }
            FocusAction::Resume => {
                debug!(%change, "Resuming after focus gain");
                self.play();
            }
            FocusAction::None => {}
        }
    }

    fn on_display_change(&self, change: DisplayChange) {
        if !self.frame_rate.on_display_changed() {
            return;
        }

        let token = {
            let mut inner = self.inner.lock();
            inner.settle_token += 1;
            inner.settle_token
        };
        debug!(refresh_rate = change.refresh_rate, token, "Display changed; settling");

        let control = self.control.clone();
        let cancel = self.cancel.clone();
        let delay = self.config.settle_delay();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = control.send(ControlMessage::SettleElapsed { token }).await;
                }
            }
        });
    }

    fn on_settle_elapsed(&self, token: u64) {
        let resume = {
            let mut inner = self.inner.lock();
            if token != inner.settle_token || inner.state == SessionState::Disposed {
                return;
            }
            std::mem::take(&mut inner.resume_after_settle)
        };

        if resume && self.bridge.is_paused() == Some(true) {
            self.play();
        }
        self.bridge.emit_engine_event("display-settled", None);
    }
}

async fn control_loop(
    shared: Weak<Shared>,
    mut messages: mpsc::Receiver<ControlMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = messages.recv() => {
                let Some(message) = message else { break };
                let Some(shared) = shared.upgrade() else { break };
                shared.handle_control(message).await;
            }
        }
    }
    debug!("Control loop stopped");
}

/// Human-readable message for a terminal `end-file`.
fn terminal_message(state: SessionState, failure: &BackendFailure) -> String {
    if state == SessionState::FallbackActive && failure.kind == NativeErrorKind::InitFailed {
        format!("Fallback failed: {}", failure.message)
    } else {
        failure.message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_message_names_fallback_init() {
        let failure = BackendFailure::new(NativeErrorKind::InitFailed, "no GPU context");
        assert_eq!(
            terminal_message(SessionState::FallbackActive, &failure),
            "Fallback failed: no GPU context"
        );
        assert_eq!(terminal_message(SessionState::PrimaryActive, &failure), "no GPU context");
    }

    #[test]
    fn test_terminal_message_passes_other_failures() {
        let failure = BackendFailure::new(NativeErrorKind::Network, "connection reset");
        assert_eq!(
            terminal_message(SessionState::FallbackActive, &failure),
            "connection reset"
        );
    }
}
