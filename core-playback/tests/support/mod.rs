//! Hand-written fakes shared by the integration tests.
//!
//! Native players record every call as a short string ("prepare film.mkv 0
//! true", "pause", ...) and let a test push native events through the sink
//! the engine handed to the factory.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioFocusService, BridgeError, DisplayChange, DisplayListener, DisplayService, FocusChange,
    FocusListener, FocusRequest, FrameRateStrategy, HardwareEvent, HardwareEventSink,
    HardwarePlayer, HardwarePlayerFactory, HardwareStats, ListenerId, MatchContentPreference,
    MediaItem, NativeTrackGroup, NativeTrackKind, PlayerSample, PropertyFormat, SoftwareEvent,
    SoftwareEventSink, SoftwarePlayer, SoftwarePlayerFactory,
};
use core_playback::{FallbackOrchestrator, PlaybackConfig};
use core_runtime::config::{ClientIdentity, EngineConfig};
use core_runtime::events::{EngineMessage, MessageSink, PropertyValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Telemetry
// ============================================================================

type MessageHook = Arc<dyn Fn(&EngineMessage) + Send + Sync>;

#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<EngineMessage>>,
    hook: Mutex<Option<MessageHook>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs `hook` on every delivered message, after it is recorded.
    pub fn on_message(&self, hook: impl Fn(&EngineMessage) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    pub fn messages(&self) -> Vec<EngineMessage> {
        self.messages.lock().clone()
    }

    pub fn events(&self, name: &str) -> Vec<EngineMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.is_event() && m.name() == name)
            .collect()
    }

    pub fn properties(&self, name: &str) -> Vec<PropertyValue> {
        self.messages()
            .into_iter()
            .filter(|m| !m.is_event() && m.name() == name)
            .filter_map(|m| m.value().cloned())
            .collect()
    }

    pub fn last_property(&self, name: &str) -> Option<PropertyValue> {
        self.properties(name).pop()
    }
}

impl MessageSink for RecordingSink {
    fn deliver(&self, message: EngineMessage) {
        self.messages.lock().push(message.clone());
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&message);
        }
    }
}

// ============================================================================
// Hardware player
// ============================================================================

#[derive(Default)]
pub struct FakeHardware {
    calls: Mutex<Vec<String>>,
    sample: Mutex<PlayerSample>,
    groups: Mutex<Vec<NativeTrackGroup>>,
    sink: Mutex<Option<HardwareEventSink>>,
    prepared: Mutex<Vec<MediaItem>>,
}

impl FakeHardware {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pushes a native event. Dropped until the factory has created the
    /// player; wait on [`FakeHardware::is_attached`] first.
    pub fn emit(&self, event: HardwareEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn set_sample(&self, sample: PlayerSample) {
        *self.sample.lock() = sample;
    }

    pub fn set_groups(&self, groups: Vec<NativeTrackGroup>) {
        *self.groups.lock() = groups;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn prepared(&self) -> Vec<MediaItem> {
        self.prepared.lock().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl HardwarePlayer for FakeHardware {
    async fn prepare(&self, item: MediaItem, start_ms: i64, play_when_ready: bool) -> BridgeResult<()> {
        self.record(format!("prepare {} {} {}", item.uri, start_ms, play_when_ready));
        self.prepared.lock().push(item);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record("play");
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record("pause");
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record("stop");
        Ok(())
    }

    async fn seek_to(&self, position_ms: i64) -> BridgeResult<()> {
        self.record(format!("seek {}", position_ms));
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.record(format!("volume {}", volume));
        Ok(())
    }

    async fn set_speed(&self, speed: f32) -> BridgeResult<()> {
        self.record(format!("speed {}", speed));
        Ok(())
    }

    async fn sample(&self) -> BridgeResult<PlayerSample> {
        Ok(*self.sample.lock())
    }

    async fn track_groups(&self) -> BridgeResult<Vec<NativeTrackGroup>> {
        Ok(self.groups.lock().clone())
    }

    async fn select_track(&self, kind: NativeTrackKind, index: usize) -> BridgeResult<()> {
        self.record(format!("select {:?} {}", kind, index));
        Ok(())
    }

    async fn disable_tracks(&self, kind: NativeTrackKind) -> BridgeResult<()> {
        self.record(format!("disable {:?}", kind));
        Ok(())
    }

    async fn set_visible(&self, visible: bool) -> BridgeResult<()> {
        self.record(format!("visible {}", visible));
        Ok(())
    }

    async fn stats(&self) -> BridgeResult<HardwareStats> {
        Ok(HardwareStats {
            video_codec: Some("hevc".to_string()),
            video_width: Some(3840),
            video_height: Some(2160),
            ..Default::default()
        })
    }

    async fn release(&self) -> BridgeResult<()> {
        self.record("release");
        Ok(())
    }
}

pub struct FakeHardwareFactory {
    pub player: Arc<FakeHardware>,
    created: AtomicUsize,
}

impl FakeHardwareFactory {
    pub fn new(player: Arc<FakeHardware>) -> Arc<Self> {
        Arc::new(Self {
            player,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HardwarePlayerFactory for FakeHardwareFactory {
    async fn create(&self, events: HardwareEventSink) -> BridgeResult<Arc<dyn HardwarePlayer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.player.sink.lock() = Some(events);
        Ok(self.player.clone())
    }
}

// ============================================================================
// Software player
// ============================================================================

#[derive(Default)]
pub struct FakeSoftware {
    calls: Mutex<Vec<String>>,
    properties: Mutex<HashMap<String, String>>,
    sink: Mutex<Option<SoftwareEventSink>>,
}

impl FakeSoftware {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pushes a native event. Dropped until the factory has created the
    /// player; wait on [`FakeSoftware::is_attached`] first.
    pub fn emit(&self, event: SoftwareEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub fn set_stat(&self, name: &str, value: &str) {
        self.properties
            .lock()
            .insert(name.to_string(), value.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn find(&self, prefix: &str) -> Option<String> {
        self.calls().into_iter().find(|c| c.starts_with(prefix))
    }

    pub fn all(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl SoftwarePlayer for FakeSoftware {
    async fn set_option(&self, name: &str, value: &str) -> BridgeResult<()> {
        self.record(format!("option {}={}", name, value));
        Ok(())
    }

    async fn initialize(&self) -> BridgeResult<()> {
        self.record("initialize");
        Ok(())
    }

    async fn observe_property(&self, name: &str, format: PropertyFormat) -> BridgeResult<()> {
        self.record(format!("observe {} {:?}", name, format));
        Ok(())
    }

    async fn set_property(&self, name: &str, value: &str) -> BridgeResult<()> {
        self.record(format!("set {}={}", name, value));
        Ok(())
    }

    async fn get_property(&self, name: &str) -> BridgeResult<Option<String>> {
        Ok(self.properties.lock().get(name).cloned())
    }

    async fn command(&self, args: &[String]) -> BridgeResult<()> {
        self.record(format!("command {}", args.join(" ")));
        Ok(())
    }

    async fn set_visible(&self, visible: bool) -> BridgeResult<()> {
        self.record(format!("visible {}", visible));
        Ok(())
    }

    async fn destroy(&self) -> BridgeResult<()> {
        self.record("destroy");
        Ok(())
    }
}

pub struct FakeSoftwareFactory {
    pub player: Arc<FakeSoftware>,
    fail: bool,
    created: AtomicUsize,
}

impl FakeSoftwareFactory {
    pub fn new(player: Arc<FakeSoftware>) -> Arc<Self> {
        Arc::new(Self {
            player,
            fail: false,
            created: AtomicUsize::new(0),
        })
    }

    /// A factory whose player can never be created.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            player: FakeSoftware::new(),
            fail: true,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SoftwarePlayerFactory for FakeSoftwareFactory {
    async fn create(&self, events: SoftwareEventSink) -> BridgeResult<Arc<dyn SoftwarePlayer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BridgeError::NotAvailable("no GPU context".to_string()));
        }
        *self.player.sink.lock() = Some(events);
        Ok(self.player.clone())
    }
}

// ============================================================================
// Host services
// ============================================================================

pub struct FakeFocus {
    grant: bool,
    requests: AtomicUsize,
    abandons: AtomicUsize,
    listener: Mutex<Option<FocusListener>>,
}

impl FakeFocus {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self {
            grant: true,
            requests: AtomicUsize::new(0),
            abandons: AtomicUsize::new(0),
            listener: Mutex::new(None),
        })
    }

    pub fn fire(&self, change: FocusChange) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(change);
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn abandons(&self) -> usize {
        self.abandons.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        usize::from(self.listener.lock().is_some())
    }
}

impl AudioFocusService for FakeFocus {
    fn request_focus(&self, _request: FocusRequest, listener: FocusListener) -> BridgeResult<bool> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock() = Some(listener);
        Ok(self.grant)
    }

    fn abandon_focus(&self) -> BridgeResult<()> {
        self.abandons.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock() = None;
        Ok(())
    }
}

pub struct FakeDisplay {
    current: f32,
    alternatives: Vec<f32>,
    preference: MatchContentPreference,
    hints: Mutex<Vec<(f32, FrameRateStrategy)>>,
    listeners: Mutex<HashMap<u64, DisplayListener>>,
    next_id: AtomicUsize,
}

impl FakeDisplay {
    pub fn new(current: f32, alternatives: Vec<f32>, preference: MatchContentPreference) -> Arc<Self> {
        Arc::new(Self {
            current,
            alternatives,
            preference,
            hints: Mutex::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        })
    }

    /// Reports a mode change to every registered listener.
    pub fn change_mode(&self, refresh_rate: f32) {
        let listeners: Vec<DisplayListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(DisplayChange {
                display_id: 0,
                refresh_rate,
            });
        }
    }

    pub fn hints(&self) -> Vec<(f32, FrameRateStrategy)> {
        self.hints.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl DisplayService for FakeDisplay {
    fn current_refresh_rate(&self) -> f32 {
        self.current
    }

    fn alternative_refresh_rates(&self) -> Vec<f32> {
        self.alternatives.clone()
    }

    fn match_content_preference(&self) -> MatchContentPreference {
        self.preference
    }

    fn set_frame_rate(&self, fps: f32, strategy: FrameRateStrategy) -> BridgeResult<()> {
        self.hints.lock().push((fps, strategy));
        Ok(())
    }

    fn register_listener(&self, listener: DisplayListener) -> BridgeResult<ListenerId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64;
        self.listeners.lock().insert(id, listener);
        Ok(ListenerId(id))
    }

    fn unregister_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id.0);
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An engine wired to fakes.
pub struct Harness {
    pub engine: Arc<FallbackOrchestrator>,
    pub sink: Arc<RecordingSink>,
    pub hardware: Arc<FakeHardware>,
    pub hardware_factory: Arc<FakeHardwareFactory>,
    pub software: Arc<FakeSoftware>,
    pub software_factory: Arc<FakeSoftwareFactory>,
    pub focus: Arc<FakeFocus>,
    pub display: Arc<FakeDisplay>,
}

pub struct HarnessBuilder {
    config: PlaybackConfig,
    software_factory: Option<Arc<FakeSoftwareFactory>>,
    display: Option<Arc<FakeDisplay>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn failing_fallback(mut self) -> Self {
        self.software_factory = Some(FakeSoftwareFactory::failing());
        self
    }

    pub fn display(mut self, display: Arc<FakeDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn build(self) -> Harness {
        let sink = RecordingSink::new();
        let hardware = FakeHardware::new();
        let hardware_factory = FakeHardwareFactory::new(hardware.clone());
        let software_factory = self
            .software_factory
            .unwrap_or_else(|| FakeSoftwareFactory::new(FakeSoftware::new()));
        let software = software_factory.player.clone();
        let focus = FakeFocus::granting();
        let display = self
            .display
            .unwrap_or_else(|| FakeDisplay::new(60.0, vec![60.0], MatchContentPreference::SeamlessOnly));

        let engine_config = EngineConfig::builder()
            .identity(ClientIdentity::new("client-test", "Test TV", "test"))
            .hardware_factory(hardware_factory.clone())
            .software_factory(software_factory.clone())
            .audio_focus(focus.clone())
            .display(display.clone())
            .build()
            .expect("engine config");

        let engine = FallbackOrchestrator::new(engine_config, self.config, sink.clone())
            .map(Arc::new)
            .expect("engine");

        Harness {
            engine,
            sink,
            hardware,
            hardware_factory,
            software,
            software_factory,
            focus,
            display,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: test_config(),
            software_factory: None,
            display: None,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }
}

/// Fast polling, no frame watchdog, short settle delay.
pub fn test_config() -> PlaybackConfig {
    PlaybackConfig::default()
        .with_poll_interval_ms(10)
        .with_settle_delay_ms(50)
        .with_frame_watchdog(false)
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Gives background tasks time to run when asserting that nothing happens.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
