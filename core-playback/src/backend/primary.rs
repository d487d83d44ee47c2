//! # Primary Backend
//!
//! Hardware-accelerated playback through a [`HardwarePlayer`].
//!
//! ## Telemetry
//!
//! The hardware player only reports state transitions, so position,
//! duration and buffer depth are *sampled* every `position_poll_interval_ms`
//! and emitted only when they differ from the last emitted value.
//!
//! ## Frame watchdog
//!
//! Some pipelines accept a stream, play its audio and never render a video
//! frame. Once the player reaches ready, a watchdog checks the rendered-frame
//! counter; if playback runs with a selected video track and no frame for
//! `frame_watchdog_timeout_ms`, the backend reports `DecodingFailed` so the
//! orchestrator swaps to the fallback.

use super::{BackendContext, WorkerHandle};
use crate::error::BackendFailure;
use crate::traits::{
    BackendAdapter, BackendKind, OpenRequest, StatsMap, SubtitleSelection,
};
use crate::tracks::{ExternalSubtitle, TrackDescriptor, TrackKind, TrackRef};
use async_trait::async_trait;
use bridge_traits::{
    HardwareEvent, HardwareEventSink, HardwarePlayer, HardwarePlayerFactory, HardwareState,
    MediaItem, NativeErrorKind, NativeTrackGroup, NativeTrackKind, PlayerSample, PropertyFormat,
    SubtitleConfig,
};
use core_runtime::logging::{redact_header, redact_uri, strip_path};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Properties produced by the sampler.
const SAMPLED_PROPERTIES: &[&str] = &["time-pos", "duration", "demuxer-cache-time"];

/// Properties produced from player events and command echoes.
const EVENT_PROPERTIES: &[&str] = &[
    "pause",
    "paused-for-cache",
    "eof-reached",
    "track-list",
    "aid",
    "sid",
    "volume",
    "speed",
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
    Stats(oneshot::Sender<StatsMap>),
    Native(HardwareEvent),
}

/// Hardware-accelerated [`BackendAdapter`].
pub struct PrimaryBackend {
    jobs: mpsc::UnboundedSender<Job>,
    worker: WorkerHandle,
}

impl PrimaryBackend {
    /// Starts the worker, which creates the native player. Commands issued
    /// before creation completes are queued. Must be called within a Tokio
    /// runtime.
    pub fn spawn(factory: Arc<dyn HardwarePlayerFactory>, context: BackendContext) -> Arc<Self> {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let native = jobs.clone();
        let events: HardwareEventSink = Arc::new(move |event| {
            let _ = native.send(Job::Native(event));
        });

        let task = tokio::spawn(run(factory, events, context, receiver, cancel.clone()));

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
            debug!("Primary backend worker has stopped; command dropped");
        }
    }
}

#[async_trait]
impl BackendAdapter for PrimaryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Primary
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

    fn observe(&self, name: &str, _format: PropertyFormat) {
        if !SAMPLED_PROPERTIES.contains(&name) && !EVENT_PROPERTIES.contains(&name) {
            debug!(property = name, "Property is not reported by the hardware player");
        }
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
        self.worker.shutdown(BackendKind::Primary).await;
    }
}

async fn run(
    factory: Arc<dyn HardwarePlayerFactory>,
    events: HardwareEventSink,
    context: BackendContext,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
) {
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        created = factory.create(events) => created,
    };

    let player = match created {
        Ok(player) => player,
        Err(e) => {
            warn!(error = %e, "Hardware player creation failed");
            context.report(BackendFailure::new(NativeErrorKind::InitFailed, e.to_string()));
            return;
        }
    };
    debug!("Hardware player created");

    let mut poll = interval(context.config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut watchdog = interval(context.config.watchdog_interval());
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut worker = PrimaryWorker::new(player, context);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => worker.handle(job).await,
                None => break,
            },
            _ = poll.tick() => worker.sample().await,
            _ = watchdog.tick(), if worker.watchdog_armed() => worker.check_watchdog().await,
        }
    }

    worker.release().await;
}

#[derive(Default)]
struct LastEmitted {
    position_ms: Option<i64>,
    duration_ms: Option<i64>,
    buffered_ms: Option<i64>,
}

struct PrimaryWorker {
    player: Arc<dyn HardwarePlayer>,
    ctx: BackendContext,
    current: Option<OpenRequest>,
    /// Start position to restore if the player reaches ready near zero.
    pending_start_ms: i64,
    last: LastEmitted,
    speed: f64,
    watchdog_started: Option<Instant>,
    failed: bool,
}

impl PrimaryWorker {
    fn new(player: Arc<dyn HardwarePlayer>, ctx: BackendContext) -> Self {
        Self {
            player,
            ctx,
            current: None,
            pending_start_ms: 0,
            last: LastEmitted::default(),
            speed: 1.0,
            watchdog_started: None,
            failed: false,
        }
    }

    fn watchdog_armed(&self) -> bool {
        self.watchdog_started.is_some()
    }

    async fn handle(&mut self, job: Job) {
        match job {
            Job::Open(request) => self.open(request).await,
            Job::Play => {
                if let Err(e) = self.player.play().await {
                    warn!(error = %e, "Hardware play failed");
                }
            }
            Job::Pause => {
                if let Err(e) = self.player.pause().await {
                    warn!(error = %e, "Hardware pause failed");
                }
            }
            Job::Stop => {
                self.watchdog_started = None;
                if let Err(e) = self.player.stop().await {
                    warn!(error = %e, "Hardware stop failed");
                }
                if let Err(e) = self.player.set_visible(false).await {
                    debug!(error = %e, "Hiding hardware surface failed");
                }
            }
            Job::Seek(position_ms) => {
                if let Err(e) = self.player.seek_to(position_ms.max(0)).await {
                    warn!(error = %e, position_ms, "Hardware seek failed");
                }
            }
            Job::SetVolume(volume) => {
                let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
                if let Err(e) = self.player.set_volume(volume as f32).await {
                    warn!(error = %e, "Hardware volume change failed");
                }
                self.ctx.emitter.property("volume", volume * 100.0);
            }
            Job::SetRate(rate) => {
                let rate = self.ctx.config.clamp_rate(rate);
                if let Err(e) = self.player.set_speed(rate as f32).await {
                    warn!(error = %e, "Hardware speed change failed");
                }
                self.speed = rate;
                self.ctx.emitter.property("speed", rate);
            }
            Job::SelectAudio(id) => self.select_audio(&id).await,
            Job::SelectSubtitle(selection) => self.select_subtitle(selection).await,
            Job::AddSubtitle { subtitle, select } => {
                self.emit_track_list().await;
                if select {
                    self.select_subtitle(SubtitleSelection::Track(subtitle.id)).await;
                }
            }
            Job::SetVisible(visible) => {
                if let Err(e) = self.player.set_visible(visible).await {
                    warn!(error = %e, visible, "Hardware visibility change failed");
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
            "Opening media on hardware player"
        );
        for (name, value) in &request.headers {
            debug!(header = %name, value = redact_header(name, value), "Request header");
        }

        self.pending_start_ms = request.start_position_ms;
        self.last = LastEmitted::default();
        self.watchdog_started = None;
        self.failed = false;

        let item = self.media_item(&request, None);
        let start = request.start_position_ms;
        let autoplay = request.autoplay;
        self.current = Some(request);

        if let Err(e) = self.player.prepare(item, start, autoplay).await {
            self.fail(BackendFailure::new(NativeErrorKind::Other, e.to_string()))
                .await;
        }
    }

    fn media_item(&self, request: &OpenRequest, selected: Option<&str>) -> MediaItem {
        let subtitles = self
            .ctx
            .tracks
            .externals()
            .iter()
            .map(|subtitle| subtitle_config(subtitle, selected == Some(subtitle.id.as_str())))
            .collect();

        MediaItem::new(request.uri.clone())
            .with_headers(request.headers.clone())
            .with_subtitles(subtitles)
    }

    async fn select_audio(&mut self, id: &str) {
        let Some(TrackRef::Embedded {
            kind: TrackKind::Audio,
            index,
        }) = self.ctx.tracks.resolve(id)
        else {
            debug!(track = id, "Ignoring unknown audio track");
            return;
        };

        let groups = self.track_groups().await;
        let Some(native) = native_index(&groups, NativeTrackKind::Audio, index) else {
            debug!(track = id, "Audio track not present");
            return;
        };

        match self.player.select_track(NativeTrackKind::Audio, native).await {
            Ok(()) => {
                self.ctx.emitter.property("aid", id);
            }
            Err(e) => warn!(error = %e, track = id, "Audio track selection failed"),
        }
    }

    async fn select_subtitle(&mut self, selection: SubtitleSelection) {
        let id = match &selection {
            SubtitleSelection::None => {
                if let Err(e) = self.player.disable_tracks(NativeTrackKind::Text).await {
                    warn!(error = %e, "Disabling subtitles failed");
                }
                self.ctx.tracks.set_subtitle_selection(SubtitleSelection::None);
                self.ctx.emitter.property("sid", selection.as_sid());
                return;
            }
            SubtitleSelection::Track(id) => id.clone(),
        };

        match self.ctx.tracks.resolve(&id) {
            Some(TrackRef::Embedded {
                kind: TrackKind::Subtitle,
                index,
            }) => {
                let groups = self.track_groups().await;
                let Some(native) = native_index(&groups, NativeTrackKind::Text, index) else {
                    debug!(track = %id, "Subtitle track not present");
                    return;
                };
                match self.player.select_track(NativeTrackKind::Text, native).await {
                    Ok(()) => {
                        self.ctx.tracks.set_subtitle_selection(selection);
                        self.ctx.emitter.property("sid", id);
                    }
                    Err(e) => warn!(error = %e, track = %id, "Subtitle selection failed"),
                }
            }
            Some(TrackRef::External(subtitle)) => self.reload_with_subtitle(&subtitle).await,
            _ => debug!(track = %id, "Ignoring unknown subtitle track"),
        }
    }

    /// Sideloaded subtitles only take effect on prepare, so the current item
    /// is prepared again at the current position with `subtitle` selected.
    async fn reload_with_subtitle(&mut self, subtitle: &ExternalSubtitle) {
        let Some(request) = self.current.clone() else {
            return;
        };

        let sample = self.player.sample().await.unwrap_or_default();
        let item = self.media_item(&request, Some(&subtitle.id));
        self.pending_start_ms = sample.position_ms;
        info!(
            id = %subtitle.id,
            file = strip_path(&subtitle.uri),
            position_ms = sample.position_ms,
            "Preparing again with external subtitle"
        );

        if let Err(e) = self
            .player
            .prepare(item, sample.position_ms, sample.is_playing)
            .await
        {
            warn!(error = %e, "Reloading with external subtitle failed");
            return;
        }

        self.ctx
            .tracks
            .set_subtitle_selection(SubtitleSelection::Track(subtitle.id.clone()));
        self.ctx.emitter.property("sid", subtitle.id.as_str());
    }

    async fn handle_native(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::StateChanged(HardwareState::Buffering) => {
                self.ctx.emitter.property("paused-for-cache", true);
            }
            HardwareEvent::StateChanged(HardwareState::Ready) => self.on_ready().await,
            HardwareEvent::StateChanged(HardwareState::Ended) => {
                self.watchdog_started = None;
                self.ctx.emitter.property("eof-reached", true);
                self.ctx
                    .emitter
                    .event("end-file", Some(json!({ "reason": "eof" })));
            }
            HardwareEvent::StateChanged(HardwareState::Idle) => {}
            HardwareEvent::IsPlayingChanged(playing) => {
                self.ctx.emitter.property("pause", !playing);
            }
            HardwareEvent::TracksChanged => self.emit_track_list().await,
            HardwareEvent::MediaItemTransition => {
                self.ctx.emitter.event("file-loaded", None);
                self.ctx.emitter.property("eof-reached", false);
            }
            HardwareEvent::Error { kind, message } => {
                warn!(?kind, %message, "Hardware player error");
                self.watchdog_started = None;
                self.fail(BackendFailure::new(kind, message)).await;
            }
        }
    }

    async fn on_ready(&mut self) {
        if self.pending_start_ms > 0 {
            let position = self
                .player
                .sample()
                .await
                .map(|s| s.position_ms)
                .unwrap_or_default();
            if position < self.ctx.config.start_position_restore_threshold_ms {
                warn!(
                    position_ms = position,
                    expected_ms = self.pending_start_ms,
                    "Start position lost, restoring"
                );
                if let Err(e) = self.player.seek_to(self.pending_start_ms).await {
                    warn!(error = %e, "Restoring start position failed");
                }
            }
            self.pending_start_ms = 0;
        }

        self.ctx.emitter.property("paused-for-cache", false);
        self.ctx.emitter.event("playback-restart", None);
        self.emit_track_list().await;

        if self.ctx.config.frame_watchdog_enabled && !self.failed {
            self.watchdog_started = Some(Instant::now());
        }
    }

    async fn track_groups(&self) -> Vec<NativeTrackGroup> {
        match self.player.track_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                debug!(error = %e, "Track enumeration failed");
                Vec::new()
            }
        }
    }

    async fn emit_track_list(&mut self) {
        let pass = track_pass(&self.track_groups().await);
        self.ctx.tracks.record_pass(pass.descriptors);

        if let Some(aid) = &pass.selected_audio {
            self.ctx.emitter.property("aid", aid.as_str());
        }

        match self.ctx.tracks.subtitle_selection() {
            Some(SubtitleSelection::Track(id)) if self.ctx.tracks.external(&id).is_some() => {
                self.ctx.emitter.property("sid", id);
            }
            _ => match pass.selected_subtitle {
                Some(sid) => {
                    self.ctx.emitter.property("sid", sid);
                }
                None if pass.has_subtitles => {
                    self.ctx.emitter.property("sid", "no");
                }
                None => {}
            },
        }

        self.ctx
            .emitter
            .property("track-list", self.ctx.tracks.track_list_node());
    }

    async fn sample(&mut self) {
        if self.current.is_none() {
            return;
        }
        let sample = match self.player.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                debug!(error = %e, "Hardware sample failed");
                return;
            }
        };
        self.emit_sample(&sample);
    }

    fn emit_sample(&mut self, sample: &PlayerSample) {
        // Until ready, the player may report zero instead of the requested
        // start; the swap resumes from the last reported position.
        let unapplied_start = sample.position_ms < self.pending_start_ms;
        if !unapplied_start && self.last.position_ms != Some(sample.position_ms) {
            self.last.position_ms = Some(sample.position_ms);
            self.ctx.emitter.timing_ms("time-pos", sample.position_ms);
        }

        if let Some(duration) = sample.duration_ms.filter(|d| *d >= 0) {
            if self.last.duration_ms != Some(duration) {
                self.last.duration_ms = Some(duration);
                self.ctx.emitter.timing_ms("duration", duration);
            }
        }

        if self.last.buffered_ms != Some(sample.buffered_position_ms) {
            self.last.buffered_ms = Some(sample.buffered_position_ms);
            self.ctx
                .emitter
                .timing_ms("demuxer-cache-time", sample.buffered_position_ms);
        }
    }

    async fn check_watchdog(&mut self) {
        let Some(started) = self.watchdog_started else {
            return;
        };
        let Ok(sample) = self.player.sample().await else {
            return;
        };

        if sample.rendered_frames > 0 {
            debug!(frames = sample.rendered_frames, "Frames rendered, watchdog cleared");
            self.watchdog_started = None;
            return;
        }

        let elapsed = started.elapsed();
        if elapsed >= self.ctx.config.watchdog_timeout() && sample.is_playing && sample.video_selected
        {
            self.watchdog_started = None;
            let message = format!(
                "Black screen detected: 0 video frames rendered after {}ms",
                elapsed.as_millis()
            );
            warn!(%message, "Frame watchdog tripped");
            self.fail(BackendFailure::new(NativeErrorKind::DecodingFailed, message))
                .await;
        }
    }

    /// Reports the first failure of the current item, after flushing a final
    /// position sample so the orchestrator resumes from the latest position.
    async fn fail(&mut self, failure: BackendFailure) {
        if self.failed {
            debug!(%failure, "Ignoring repeated failure");
            return;
        }
        self.failed = true;
        self.sample().await;
        self.ctx.report(failure);
    }

    async fn stats(&self) -> StatsMap {
        let mut map = StatsMap::new();

        if let Ok(stats) = self.player.stats().await {
            put(&mut map, "videoCodec", stats.video_codec);
            put(&mut map, "videoMimeType", stats.video_mime_type);
            put(&mut map, "videoWidth", stats.video_width);
            put(&mut map, "videoHeight", stats.video_height);
            put(&mut map, "videoFps", stats.video_fps);
            put(&mut map, "videoBitrate", stats.video_bitrate);
            put(&mut map, "videoDecoderName", stats.video_decoder_name);
            put(&mut map, "videoDroppedFrames", stats.dropped_frames);
            put(&mut map, "videoRenderedFrames", stats.rendered_frames);
            put(&mut map, "audioCodec", stats.audio_codec);
            put(&mut map, "audioMimeType", stats.audio_mime_type);
            put(&mut map, "audioSampleRate", stats.audio_sample_rate);
            put(&mut map, "audioChannels", stats.audio_channels);
            put(&mut map, "audioBitrate", stats.audio_bitrate);
        }

        if let Ok(sample) = self.player.sample().await {
            map.insert("bufferedPositionMs".into(), json!(sample.buffered_position_ms));
            map.insert("currentPositionMs".into(), json!(sample.position_ms));
            map.insert("isPlaying".into(), json!(sample.is_playing));
        }
        map.insert("playbackSpeed".into(), json!(self.speed));
        map
    }

    async fn release(&mut self) {
        self.watchdog_started = None;
        if let Err(e) = self.player.release().await {
            warn!(error = %e, "Hardware player release failed");
        }
        debug!("Hardware player released");
    }
}

fn put<T: Serialize>(map: &mut StatsMap, key: &str, value: Option<T>) {
    if let Some(value) = value {
        map.insert(key.to_string(), json!(value));
    }
}

fn subtitle_config(subtitle: &ExternalSubtitle, selected: bool) -> SubtitleConfig {
    SubtitleConfig {
        uri: subtitle.uri.clone(),
        mime_type: subtitle.mime_type.clone(),
        language: subtitle.language.clone(),
        label: Some(subtitle.display_title().to_string()),
        selected,
    }
}

/// Embedded tracks found in one enumeration of the hardware player.
#[derive(Debug, Default)]
struct TrackPass {
    descriptors: Vec<TrackDescriptor>,
    selected_audio: Option<String>,
    selected_subtitle: Option<String>,
    has_subtitles: bool,
}

/// Builds embedded descriptors from native groups. Sideloaded subtitle
/// groups are skipped: the registry lists them under their `ext_sub_N` ids.
fn track_pass(groups: &[NativeTrackGroup]) -> TrackPass {
    let mut pass = TrackPass::default();
    let (mut audio, mut text, mut video) = (0usize, 0usize, 0usize);

    for group in groups.iter().filter(|g| g.external_uri.is_none()) {
        let Some(native_kind) = group.kind else {
            continue;
        };
        let (kind, ordinal) = match native_kind {
            NativeTrackKind::Audio => (TrackKind::Audio, &mut audio),
            NativeTrackKind::Text => (TrackKind::Subtitle, &mut text),
            NativeTrackKind::Video => (TrackKind::Video, &mut video),
        };

        let mut descriptor = TrackDescriptor::embedded(kind, *ordinal)
            .with_title(group.label.clone())
            .with_language(group.language.clone())
            .with_codec(group.codec.clone())
            .with_default(group.is_default)
            .with_selected(group.selected);
        *ordinal += 1;

        match kind {
            TrackKind::Audio => {
                descriptor = descriptor.with_audio_format(group.channel_count, group.sample_rate);
                if group.selected && pass.selected_audio.is_none() {
                    pass.selected_audio = Some(descriptor.id.clone());
                }
            }
            TrackKind::Subtitle => {
                pass.has_subtitles = true;
                if group.selected && pass.selected_subtitle.is_none() {
                    pass.selected_subtitle = Some(descriptor.id.clone());
                }
            }
            TrackKind::Video => {}
        }
        pass.descriptors.push(descriptor);
    }

    pass.descriptors.sort_by_key(|d| match d.kind {
        TrackKind::Audio => 0,
        TrackKind::Subtitle => 1,
        TrackKind::Video => 2,
    });
    pass
}

/// Position among the player's groups of `kind` of the `ordinal`-th embedded
/// (not sideloaded) group.
fn native_index(groups: &[NativeTrackGroup], kind: NativeTrackKind, ordinal: usize) -> Option<usize> {
    groups
        .iter()
        .filter(|g| g.kind == Some(kind))
        .enumerate()
        .filter(|(_, g)| g.external_uri.is_none())
        .nth(ordinal)
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(kind: NativeTrackKind) -> NativeTrackGroup {
        NativeTrackGroup {
            kind: Some(kind),
            ..Default::default()
        }
    }

    #[test]
    fn test_track_pass_orders_and_names() {
        let groups = vec![
            group(NativeTrackKind::Video),
            NativeTrackGroup {
                selected: true,
                channel_count: Some(6),
                language: Some("en".into()),
                ..group(NativeTrackKind::Audio)
            },
            group(NativeTrackKind::Audio),
            group(NativeTrackKind::Text),
        ];

        let pass = track_pass(&groups);
        let ids: Vec<&str> = pass.descriptors.iter().map(|d| d.id.as_str()).collect();

        assert_eq!(ids, vec!["audio_0", "audio_1", "sub_0", "video_0"]);
        assert_eq!(pass.selected_audio.as_deref(), Some("audio_0"));
        assert_eq!(pass.descriptors[0].channel_count, Some(6));
        assert!(pass.has_subtitles);
        assert_eq!(pass.selected_subtitle, None);
    }

    #[test]
    fn test_track_pass_skips_sideloaded_groups() {
        let groups = vec![
            group(NativeTrackKind::Text),
            NativeTrackGroup {
                external_uri: Some("https://s/en.srt".into()),
                selected: true,
                ..group(NativeTrackKind::Text)
            },
            NativeTrackGroup {
                selected: true,
                ..group(NativeTrackKind::Text)
            },
        ];

        let pass = track_pass(&groups);
        assert_eq!(pass.descriptors.len(), 2);
        assert_eq!(pass.selected_subtitle.as_deref(), Some("sub_1"));
    }

    #[test]
    fn test_native_index_skips_sideloaded() {
        let groups = vec![
            group(NativeTrackKind::Audio),
            group(NativeTrackKind::Text),
            NativeTrackGroup {
                external_uri: Some("en.srt".into()),
                ..group(NativeTrackKind::Text)
            },
            group(NativeTrackKind::Text),
        ];

        assert_eq!(native_index(&groups, NativeTrackKind::Text, 0), Some(0));
        assert_eq!(native_index(&groups, NativeTrackKind::Text, 1), Some(2));
        assert_eq!(native_index(&groups, NativeTrackKind::Text, 2), None);
        assert_eq!(native_index(&groups, NativeTrackKind::Audio, 0), Some(0));
    }

    #[test]
    fn test_subtitle_config_uses_display_title() {
        let subtitle = ExternalSubtitle {
            id: "ext_sub_0".into(),
            index: 0,
            uri: "https://s/en.srt".into(),
            title: None,
            language: Some("en".into()),
            mime_type: "application/x-subrip".into(),
        };
        let config = subtitle_config(&subtitle, true);
        assert_eq!(config.label.as_deref(), Some("External"));
        assert!(config.selected);
    }
}
