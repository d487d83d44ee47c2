//! # Fallback Backend
//!
//! Software decoding through a [`SoftwarePlayer`], installed only after the
//! primary backend rejected the media's format.
//!
//! The software player pushes property changes from its decode loop; the
//! worker translates them into engine ids and forwards them. Native track ids
//! are numeric per type, so embedded tracks are named `"{type}_{native id}"`
//! and external subtitles are matched back to their `ext_sub_N` ids through
//! the file name the player reports.

use super::{BackendContext, WorkerHandle};
use crate::bridge::Subscription;
use crate::error::BackendFailure;
use crate::traits::{BackendAdapter, BackendKind, OpenRequest, StatsMap, SubtitleSelection};
use crate::tracks::{ExternalSubtitle, TrackDescriptor, TrackKind, TrackOrigin, TrackRef};
use async_trait::async_trait;
use bridge_traits::{
    EndFileReason, LogLevel, NativeErrorKind, NativeValue, PropertyFormat, SoftwareEvent,
    SoftwareEventSink, SoftwarePlayer, SoftwarePlayerFactory,
};
use core_runtime::events::PropertyValue;
use core_runtime::logging::{redact_header, redact_uri, strip_path, NATIVE_TARGET};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Diagnostic properties collected by `get_stats`.
pub const STATS_PROPERTIES: &[&str] = &[
    "video-codec",
    "video-params/w",
    "video-params/h",
    "container-fps",
    "estimated-vf-fps",
    "video-bitrate",
    "hwdec-current",
    "audio-codec-name",
    "audio-params/samplerate",
    "audio-params/hr-channels",
    "audio-bitrate",
    "total-avsync-change",
    "cache-used",
    "cache-speed",
    "display-fps",
    "frame-drop-count",
    "decoder-frame-drop-count",
    "demuxer-cache-duration",
    "video-params/pixelformat",
    "video-params/hw-pixelformat",
    "video-params/colormatrix",
    "video-params/primaries",
    "video-params/gamma",
    "video-params/max-luma",
    "video-params/min-luma",
    "video-params/max-cll",
    "video-params/max-fall",
    "video-params/aspect-name",
    "video-params/rotate",
];

enum Job {
    Open(OpenRequest),
    Play,
    Pause,
    Stop,
    Seek(i64),
    SetVolume(f64),
    SetRate(f64),
    SelectAudio(String),
    SelectSubtitle(SubtitleSelection),
    AddSubtitle { subtitle: ExternalSubtitle, select: bool },
    SetVisible(bool),
    Observe(String, PropertyFormat),
    Stats(oneshot::Sender<StatsMap>),
    Native(SoftwareEvent),
}

/// Software-decoding [`BackendAdapter`].
pub struct FallbackBackend {
    jobs: mpsc::UnboundedSender<Job>,
    worker: WorkerHandle,
}

impl FallbackBackend {
    /// Starts the worker, which creates, configures and initializes the
    /// native player, then observes `observed`. Commands issued meanwhile are
    /// queued. Must be called within a Tokio runtime.
    pub fn spawn(
        factory: Arc<dyn SoftwarePlayerFactory>,
        context: BackendContext,
        observed: Vec<Subscription>,
    ) -> Arc<Self> {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let native = jobs.clone();
        let events: SoftwareEventSink = Arc::new(move |event| {
            let _ = native.send(Job::Native(event));
        });

        let task = tokio::spawn(run(factory, events, context, observed, receiver, cancel.clone()));

        Arc::new(Self {
            jobs,
            worker: WorkerHandle::new(cancel, task),
        })
    }

    fn submit(&self, job: Job) {
        if self.worker.is_cancelled() {
            return;
        }
        if self.jobs.send(job).is_err() {
            debug!("Fallback backend worker has stopped; command dropped");
        }
    }
}

#[async_trait]
impl BackendAdapter for FallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn open(&self, request: &OpenRequest) {
        self.submit(Job::Open(request.clone()));
    }

    fn play(&self) {
        self.submit(Job::Play);
    }

    fn pause(&self) {
        self.submit(Job::Pause);
    }

    fn stop(&self) {
        self.submit(Job::Stop);
    }

    fn seek(&self, position_ms: i64) {
        self.submit(Job::Seek(position_ms));
    }

    fn set_volume(&self, volume: f64) {
        self.submit(Job::SetVolume(volume));
    }

    fn set_playback_rate(&self, rate: f64) {
        self.submit(Job::SetRate(rate));
    }

    fn select_audio_track(&self, id: &str) {
        self.submit(Job::SelectAudio(id.to_string()));
    }

    fn select_subtitle_track(&self, selection: &SubtitleSelection) {
        self.submit(Job::SelectSubtitle(selection.clone()));
    }

    fn add_subtitle_track(&self, subtitle: &ExternalSubtitle, select: bool) {
        self.submit(Job::AddSubtitle {
            subtitle: subtitle.clone(),
            select,
        });
    }

    fn set_visible(&self, visible: bool) {
        self.submit(Job::SetVisible(visible));
    }

    fn observe(&self, name: &str, format: PropertyFormat) {
        self.submit(Job::Observe(name.to_string(), format));
    }

    async fn get_stats(&self) -> StatsMap {
        if self.worker.is_cancelled() {
            return StatsMap::new();
        }
        let (tx, rx) = oneshot::channel();
        self.submit(Job::Stats(tx));
        rx.await.unwrap_or_default()
    }

    async fn dispose(&self) {
        self.worker.shutdown(BackendKind::Fallback).await;
    }
}

async fn run(
    factory: Arc<dyn SoftwarePlayerFactory>,
    events: SoftwareEventSink,
    context: BackendContext,
    observed: Vec<Subscription>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
) {
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        created = create_player(factory.as_ref(), events, &context, &observed) => created,
    };

    let player = match created {
        Ok(player) => player,
        Err(e) => {
            error!(error = %e, "Software player initialization failed");
            context.report(BackendFailure::new(NativeErrorKind::InitFailed, e.to_string()));
            return;
        }
    };
    info!("Software player initialized");

    let mut worker = FallbackWorker::new(player, context);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => worker.handle(job).await,
                None => break,
            },
        }
    }

    worker.destroy().await;
}

async fn create_player(
    factory: &dyn SoftwarePlayerFactory,
    events: SoftwareEventSink,
    context: &BackendContext,
    observed: &[Subscription],
) -> bridge_traits::error::Result<Arc<dyn SoftwarePlayer>> {
    let player = factory.create(events).await?;

    let config = &context.config;
    player.set_option("hwdec", &config.hwdec).await?;
    player.set_option("vo", &config.video_output).await?;
    player.set_option("ao", &config.audio_output).await?;
    player.initialize().await?;

    for subscription in observed {
        player
            .observe_property(&subscription.name, subscription.format)
            .await?;
    }
    Ok(player)
}

struct FallbackWorker {
    player: Arc<dyn SoftwarePlayer>,
    ctx: BackendContext,
    file_loaded: bool,
    /// `sub-add` commands waiting for the file to load.
    pending_subtitles: Vec<(ExternalSubtitle, bool)>,
    /// External subtitle to select once its native id is known.
    pending_selection: Option<String>,
    /// `ext_sub_N` -> native subtitle id, from the last track list.
    external_ids: HashMap<String, i64>,
    failed: bool,
}

impl FallbackWorker {
    fn new(player: Arc<dyn SoftwarePlayer>, ctx: BackendContext) -> Self {
        Self {
            player,
            ctx,
            file_loaded: false,
            pending_subtitles: Vec::new(),
            pending_selection: None,
            external_ids: HashMap::new(),
            failed: false,
        }
    }

    async fn handle(&mut self, job: Job) {
        match job {
            Job::Open(request) => self.open(request).await,
            Job::Play => self.set_property("pause", "no").await,
            Job::Pause => self.set_property("pause", "yes").await,
            Job::Stop => self.command(vec!["stop".to_string()]).await,
            Job::Seek(position_ms) => {
                let seconds = position_ms.max(0) as f64 / 1000.0;
                self.command(vec!["seek".into(), seconds.to_string(), "absolute".into()])
                    .await;
            }
            Job::SetVolume(volume) => {
                let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
                self.set_property("volume", &(volume * 100.0).to_string()).await;
            }
            Job::SetRate(rate) => {
                let rate = self.ctx.config.clamp_rate(rate);
                self.set_property("speed", &rate.to_string()).await;
            }
            Job::SelectAudio(id) => {
                let native = native_suffix(&id);
                self.set_property("aid", &native.to_string()).await;
            }
            Job::SelectSubtitle(selection) => self.select_subtitle(selection).await,
            Job::AddSubtitle { subtitle, select } => {
                if self.file_loaded {
                    self.sub_add(&subtitle, select).await;
                } else {
                    self.pending_subtitles.push((subtitle, select));
                }
            }
            Job::SetVisible(visible) => {
                if let Err(e) = self.player.set_visible(visible).await {
                    warn!(error = %e, visible, "Software visibility change failed");
                }
            }
            Job::Observe(name, format) => {
                if let Err(e) = self.player.observe_property(&name, format).await {
                    warn!(error = %e, property = %name, "Observing property failed");
                }
            }
            Job::Stats(reply) => {
                let stats = self.stats().await;
                let _ = reply.send(stats);
            }
            Job::Native(event) => self.handle_native(event).await,
        }
    }

    async fn open(&mut self, request: OpenRequest) {
        info!(
            uri = %redact_uri(&request.uri),
            start_ms = request.start_position_ms,
            autoplay = request.autoplay,
            "Loading media on software player"
        );
        for (name, value) in &request.headers {
            debug!(header = %name, value = redact_header(name, value), "Request header");
        }
        self.file_loaded = false;
        self.failed = false;
        self.external_ids.clear();
        self.command(loadfile_args(&request)).await;
    }

    async fn select_subtitle(&mut self, selection: SubtitleSelection) {
        let id = match &selection {
            SubtitleSelection::None => {
                self.pending_selection = None;
                self.set_property("sid", selection.as_sid()).await;
                return;
            }
            SubtitleSelection::Track(id) => id.clone(),
        };

        match self.ctx.tracks.resolve(&id) {
            Some(TrackRef::External(subtitle)) => {
                if let Some(native) = self.external_ids.get(&subtitle.id).copied() {
                    self.set_property("sid", &native.to_string()).await;
                } else if let Some(pending) = self
                    .pending_subtitles
                    .iter_mut()
                    .find(|(s, _)| s.id == subtitle.id)
                {
                    pending.1 = true;
                } else {
                    self.pending_selection = Some(subtitle.id);
                }
            }
            _ => {
                let native = native_suffix(&id);
                self.set_property("sid", &native.to_string()).await;
            }
        }
    }

    async fn sub_add(&mut self, subtitle: &ExternalSubtitle, select: bool) {
        debug!(id = %subtitle.id, file = strip_path(&subtitle.uri), select, "Adding external subtitle");
        let mut args = vec![
            "sub-add".to_string(),
            subtitle.uri.clone(),
            if select { "select" } else { "auto" }.to_string(),
            subtitle.display_title().to_string(),
        ];
        if let Some(language) = &subtitle.language {
            args.push(language.clone());
        }
        self.command(args).await;
    }

    async fn handle_native(&mut self, event: SoftwareEvent) {
        match event {
            SoftwareEvent::PropertyChange { name, value } => self.on_property(&name, value).await,
            SoftwareEvent::FileLoaded => {
                self.file_loaded = true;
                for (subtitle, select) in std::mem::take(&mut self.pending_subtitles) {
                    self.sub_add(&subtitle, select).await;
                }
                self.ctx.emitter.event("file-loaded", None);
            }
            SoftwareEvent::PlaybackRestart => {
                self.ctx.emitter.event("playback-restart", None);
            }
            SoftwareEvent::EndFile { reason, error } => match reason {
                EndFileReason::Eof => {
                    self.ctx
                        .emitter
                        .event("end-file", Some(json!({ "reason": "eof" })));
                }
                EndFileReason::Error => {
                    let message = error.unwrap_or_else(|| "Playback failed".to_string());
                    if !self.failed {
                        self.failed = true;
                        warn!(%message, "Software player failed");
                        self.ctx
                            .report(BackendFailure::new(classify_end_file_error(&message), message));
                    }
                }
                other => trace!(reason = ?other, "Ignoring end-file"),
            },
            SoftwareEvent::LogMessage {
                prefix,
                level,
                text,
            } => self.on_log(prefix, level, text),
            SoftwareEvent::Shutdown => debug!("Software player shut down"),
        }
    }

    async fn on_property(&mut self, name: &str, value: NativeValue) {
        match name {
            "track-list" => {
                let Some(node) = node_value(value) else {
                    return;
                };
                self.on_track_list(&node).await;
            }
            "aid" => {
                let id = match native_id(&value) {
                    Some(n) => format!("audio_{}", n),
                    None => "no".to_string(),
                };
                self.ctx.emitter.property("aid", id);
            }
            "sid" => {
                let sid = match native_id(&value) {
                    Some(n) => self
                        .external_ids
                        .iter()
                        .find(|(_, native)| **native == n)
                        .map(|(ext, _)| ext.clone())
                        .unwrap_or_else(|| format!("sub_{}", n)),
                    None => "no".to_string(),
                };
                self.ctx
                    .tracks
                    .set_subtitle_selection(SubtitleSelection::from_id(Some(&sid)));
                self.ctx.emitter.property("sid", sid);
            }
            _ => {
                if let Some(value) = property_value(value) {
                    self.ctx.emitter.property(name, value);
                }
            }
        }
    }

    async fn on_track_list(&mut self, node: &Value) {
        let Some(entries) = node.as_array() else {
            return;
        };

        let mut embedded = Vec::new();
        self.external_ids.clear();

        for entry in entries {
            let Some(kind) = entry.get("type").and_then(Value::as_str).and_then(TrackKind::parse)
            else {
                continue;
            };
            let Some(native) = entry.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let external = entry.get("external").and_then(Value::as_bool).unwrap_or(false);
            let filename = entry.get("external-filename").and_then(Value::as_str);

            if external {
                if let Some(subtitle) = filename.and_then(|f| self.ctx.tracks.external_by_uri(f)) {
                    self.external_ids.insert(subtitle.id, native);
                }
                continue;
            }
            embedded.push(descriptor_from_entry(kind, native, entry));
        }

        self.ctx.tracks.record_pass(embedded);
        self.ctx
            .emitter
            .property("track-list", self.ctx.tracks.track_list_node());

        if let Some(pending) = self.pending_selection.clone() {
            if let Some(native) = self.external_ids.get(&pending).copied() {
                self.pending_selection = None;
                self.set_property("sid", &native.to_string()).await;
            }
        }
    }

    fn on_log(&self, prefix: String, level: String, text: String) {
        let text = text.trim_end().to_string();
        match LogLevel::from_native(&level) {
            LogLevel::Error => error!(target: NATIVE_TARGET, %prefix, "{}", text),
            LogLevel::Warn => warn!(target: NATIVE_TARGET, %prefix, "{}", text),
            LogLevel::Info => info!(target: NATIVE_TARGET, %prefix, "{}", text),
            LogLevel::Debug => debug!(target: NATIVE_TARGET, %prefix, "{}", text),
            LogLevel::Trace => trace!(target: NATIVE_TARGET, %prefix, "{}", text),
        }

        if self.ctx.config.debug_logging {
            self.ctx.emitter.event(
                "log-message",
                Some(json!({ "prefix": prefix, "level": level, "text": text })),
            );
        }
    }

    async fn stats(&self) -> StatsMap {
        let mut map = StatsMap::new();
        for key in STATS_PROPERTIES {
            match self.player.get_property(key).await {
                Ok(Some(value)) => {
                    map.insert((*key).to_string(), Value::String(value));
                }
                Ok(None) => {}
                Err(e) => trace!(property = *key, error = %e, "Stats property unavailable"),
            }
        }
        map
    }

    async fn set_property(&self, name: &str, value: &str) {
        if let Err(e) = self.player.set_property(name, value).await {
            warn!(error = %e, property = name, value, "Setting software player property failed");
        }
    }

    async fn command(&self, args: Vec<String>) {
        if let Err(e) = self.player.command(&args).await {
            warn!(error = %e, command = ?args.first(), "Software player command failed");
        }
    }

    async fn destroy(&mut self) {
        if let Err(e) = self.player.destroy().await {
            warn!(error = %e, "Software player destroy failed");
        }
        debug!("Software player destroyed");
    }
}

/// `loadfile <uri> replace -1 <options>` for an open request.
fn loadfile_args(request: &OpenRequest) -> Vec<String> {
    let mut options = vec![format!("start={}", request.start_position_ms as f64 / 1000.0)];
    if !request.autoplay {
        options.push("pause=yes".to_string());
    }
    for (name, value) in &request.headers {
        options.push(format!("http-header-fields-append={}: {}", name, value));
    }

    vec![
        "loadfile".to_string(),
        request.uri.clone(),
        "replace".to_string(),
        "-1".to_string(),
        options.join(","),
    ]
}

/// Native numeric id from a `"{kind}_{n}"` track id. Defaults to the first
/// track.
fn native_suffix(id: &str) -> i64 {
    id.rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

/// Numeric track id from an `aid`/`sid` value; `None` for "no"/false.
fn native_id(value: &NativeValue) -> Option<i64> {
    match value {
        NativeValue::String(s) => s.parse().ok(),
        NativeValue::Double(d) => Some(*d as i64),
        NativeValue::Node(node) => node.as_i64(),
        NativeValue::Flag(_) | NativeValue::None => None,
    }
}

fn node_value(value: NativeValue) -> Option<Value> {
    match value {
        NativeValue::Node(node) => Some(node),
        NativeValue::String(raw) => match serde_json::from_str(&raw) {
            Ok(node) => Some(node),
            Err(e) => {
                debug!(error = %e, "Unparseable track list");
                None
            }
        },
        _ => None,
    }
}

fn property_value(value: NativeValue) -> Option<PropertyValue> {
    match value {
        NativeValue::None => None,
        NativeValue::Double(d) => Some(PropertyValue::Double(d)),
        NativeValue::Flag(b) => Some(PropertyValue::Bool(b)),
        NativeValue::String(s) => Some(PropertyValue::String(s)),
        NativeValue::Node(node) => Some(PropertyValue::Node(node)),
    }
}

fn descriptor_from_entry(kind: TrackKind, native: i64, entry: &Value) -> TrackDescriptor {
    let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
    let flag = |key: &str| entry.get(key).and_then(Value::as_bool).unwrap_or(false);
    let number = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };

    TrackDescriptor {
        id: format!("{}_{}", kind.as_str(), native),
        kind,
        title: text("title"),
        language: text("lang"),
        codec: text("codec"),
        origin: TrackOrigin::Embedded,
        selected: flag("selected"),
        is_default: flag("default"),
        channel_count: number("demux-channel-count"),
        sample_rate: number("demux-samplerate"),
        external_filename: None,
    }
}

/// Native error text to a failure kind.
fn classify_end_file_error(message: &str) -> NativeErrorKind {
    let message = message.to_lowercase();
    if message.contains("unrecognized file format")
        || message.contains("no video or audio")
        || message.contains("codec")
    {
        NativeErrorKind::DecodingFailed
    } else if message.contains("loading failed") || message.contains("network") {
        NativeErrorKind::Network
    } else {
        NativeErrorKind::Other
    }
}
