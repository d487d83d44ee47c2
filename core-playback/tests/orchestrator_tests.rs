//! End-to-end tests for the fallback orchestrator
//!
//! This test suite verifies:
//! - The one-way primary → fallback swap and its resume position
//! - External subtitle identity across the swap
//! - Terminal failures and fallback construction failures
//! - Dispose idempotence and listener cleanup
//! - Audio focus and display frame-rate policies through the control loop

mod support;

use bridge_traits::{
    FrameRateStrategy, HardwareEvent, MatchContentPreference, NativeErrorKind, PlayerSample,
    SoftwareEvent,
};
use core_playback::{
    AddSubtitleRequest, BackendKind, FrameRateDecision, OpenRequest, PlaybackError,
    SessionState, SubtitleSelection,
};
use core_runtime::events::PropertyValue;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{eventually, settle, FakeDisplay, Harness};

fn playing_at(position_ms: i64) -> PlayerSample {
    PlayerSample {
        position_ms,
        duration_ms: Some(7_200_000),
        buffered_position_ms: position_ms + 5_000,
        is_playing: true,
        rendered_frames: 240,
        video_selected: true,
    }
}

fn decoder_init_failed() -> HardwareEvent {
    HardwareEvent::Error {
        kind: NativeErrorKind::DecoderInitFailed,
        message: "MediaCodec could not be configured for hevc main10".to_string(),
    }
}

async fn open_playing(h: &Harness, position_ms: i64) {
    h.engine
        .open(OpenRequest::new("file.mkv").with_autoplay(true))
        .await
        .unwrap();
    eventually("hardware prepare", || h.hardware.count_prefix("prepare ") == 1).await;

    h.hardware.set_sample(playing_at(position_ms));
    h.hardware.emit(HardwareEvent::IsPlayingChanged(true));
    let expected = position_ms as f64 / 1000.0;
    eventually("position sample", || {
        h.sink.last_property("time-pos") == Some(PropertyValue::Double(expected))
    })
    .await;
}

// ============================================================================
// Swap
// ============================================================================

#[tokio::test]
async fn test_open_starts_primary() {
    let h = Harness::new();
    h.engine
        .open(
            OpenRequest::new("https://cdn.example/film.mkv")
                .with_header("Authorization", "Bearer t")
                .with_start_position_ms(10_000),
        )
        .await
        .unwrap();

    assert_eq!(h.engine.state(), SessionState::PrimaryActive);
    assert_eq!(h.engine.player_type(), BackendKind::Primary);
    eventually("prepare", || {
        h.hardware.calls().contains(&"prepare https://cdn.example/film.mkv 10000 true".to_string())
    })
    .await;

    let item = h.hardware.prepared().remove(0);
    assert_eq!(item.headers.get("Authorization").map(String::as_str), Some("Bearer t"));
    assert_eq!(h.hardware_factory.created(), 1);
    assert_eq!(h.software_factory.created(), 0);
}

#[tokio::test]
async fn test_decoder_failure_at_45s_resumes_on_fallback() {
    let h = Harness::new();
    open_playing(&h, 45_000).await;

    h.hardware.emit(decoder_init_failed());
    eventually("fallback active", || h.engine.state() == SessionState::FallbackActive).await;
    eventually("loadfile", || h.software.find("command loadfile").is_some()).await;

    eventually("switch event", || !h.sink.events("backend-switched").is_empty()).await;

    let loadfile = h.software.find("command loadfile").unwrap();
    assert_eq!(loadfile, "command loadfile file.mkv replace -1 start=45");
    assert_eq!(h.engine.player_type(), BackendKind::Fallback);
    assert_eq!(h.hardware.count("release"), 1);

    let switched = h.sink.events("backend-switched");
    assert_eq!(switched.len(), 1);
    assert_eq!(
        switched[0].data(),
        Some(&json!({"from": "primary", "to": "fallback", "positionMs": 45_000}))
    );
}

#[tokio::test]
async fn test_failure_before_start_is_applied_resumes_at_start() {
    let h = Harness::new();
    h.engine
        .open(OpenRequest::new("file.mkv").with_start_position_ms(60_000))
        .await
        .unwrap();
    eventually("hardware prepare", || h.hardware.count_prefix("prepare ") == 1).await;

    // The native player still reports zero; let the sampler run a few times.
    settle().await;
    h.hardware.emit(decoder_init_failed());
    eventually("loadfile", || h.software.find("command loadfile").is_some()).await;

    assert_eq!(
        h.software.find("command loadfile").unwrap(),
        "command loadfile file.mkv replace -1 start=60"
    );
    assert!(h.sink.properties("time-pos").is_empty());
}

#[tokio::test]
async fn test_fallback_is_configured_before_loading() {
    let h = Harness::new();
    open_playing(&h, 1_000).await;
    h.hardware.emit(decoder_init_failed());
    eventually("surface shown", || h.software.count("visible true") == 1).await;

    let calls = h.software.calls();
    let position = |call: &str| calls.iter().position(|c| c == call).unwrap();
    assert!(position("option hwdec=auto") < position("initialize"));
    assert!(position("option vo=gpu") < position("initialize"));
    assert!(position("option ao=audiotrack") < position("initialize"));
    assert!(position("initialize") < position("observe time-pos Double"));
    assert!(position("observe track-list Node") < position(&h.software.find("command loadfile").unwrap()));
    assert!(position(&h.software.find("command loadfile").unwrap()) < position("visible true"));
}

#[tokio::test]
async fn test_swap_happens_exactly_once() {
    let h = Harness::new();
    open_playing(&h, 5_000).await;

    h.hardware.emit(decoder_init_failed());
    eventually("fallback active", || h.engine.state() == SessionState::FallbackActive).await;
    eventually("file loaded", || h.software.find("command loadfile").is_some()).await;

    // A later format failure from the fallback is terminal.
    h.software.emit(SoftwareEvent::EndFile {
        reason: bridge_traits::EndFileReason::Error,
        error: Some("unrecognized file format".to_string()),
    });
    eventually("terminal end-file", || !h.sink.events("end-file").is_empty()).await;
    settle().await;

    assert_eq!(h.engine.state(), SessionState::FallbackActive);
    assert_eq!(h.software_factory.created(), 1);
    assert_eq!(h.sink.events("backend-switched").len(), 1);
    let end = &h.sink.events("end-file")[0];
    assert_eq!(end.data().unwrap()["reason"], "error");
}

#[tokio::test]
async fn test_paused_session_reopens_paused() {
    let h = Harness::new();
    open_playing(&h, 20_000).await;
    h.engine.pause();
    h.hardware.emit(HardwareEvent::IsPlayingChanged(false));
    eventually("pause property", || {
        h.sink.last_property("pause") == Some(PropertyValue::Bool(true))
    })
    .await;

    h.hardware.emit(decoder_init_failed());
    eventually("loadfile", || h.software.find("command loadfile").is_some()).await;
    assert_eq!(
        h.software.find("command loadfile").unwrap(),
        "command loadfile file.mkv replace -1 start=20,pause=yes"
    );
}

#[tokio::test]
async fn test_non_format_failure_is_terminal() {
    let h = Harness::new();
    open_playing(&h, 3_000).await;

    h.hardware.emit(HardwareEvent::Error {
        kind: NativeErrorKind::Network,
        message: "Source error: connection reset".to_string(),
    });
    eventually("end-file", || !h.sink.events("end-file").is_empty()).await;
    settle().await;

    let end = &h.sink.events("end-file")[0];
    assert_eq!(
        end.data(),
        Some(&json!({"reason": "error", "message": "Source error: connection reset"}))
    );
    assert_eq!(h.engine.state(), SessionState::PrimaryActive);
    assert_eq!(h.software_factory.created(), 0);
    assert!(h.sink.events("backend-switched").is_empty());
}

#[tokio::test]
async fn test_fallback_construction_failure_is_terminal() {
    let h = Harness::builder().failing_fallback().build();
    open_playing(&h, 8_000).await;

    h.hardware.emit(decoder_init_failed());
    eventually("end-file", || !h.sink.events("end-file").is_empty()).await;
    settle().await;

    let end = &h.sink.events("end-file")[0];
    assert_eq!(end.data().unwrap()["reason"], "error");
    assert!(end.data().unwrap()["message"]
        .as_str()
        .unwrap()
        .starts_with("Fallback failed:"));
    assert_eq!(h.software_factory.created(), 1);
    assert_eq!(h.sink.events("end-file").len(), 1);
}

#[tokio::test]
async fn test_stale_primary_messages_are_discarded_after_swap() {
    let h = Harness::new();
    open_playing(&h, 10_000).await;
    h.hardware.emit(decoder_init_failed());
    eventually("fallback active", || h.engine.state() == SessionState::FallbackActive).await;

    let before = h.sink.messages().len();
    h.hardware.emit(HardwareEvent::IsPlayingChanged(false));
    h.hardware.emit(HardwareEvent::MediaItemTransition);
    settle().await;

    let after: Vec<_> = h.sink.messages().into_iter().skip(before).collect();
    assert!(after.iter().all(|m| m.name() != "file-loaded"));
}

#[tokio::test]
async fn test_telemetry_sequence_is_strictly_increasing() {
    let h = Harness::new();
    open_playing(&h, 10_000).await;
    h.hardware.emit(decoder_init_failed());
    eventually("loadfile", || h.software.find("command loadfile").is_some()).await;
    h.software.emit(SoftwareEvent::FileLoaded);
    eventually("file-loaded", || !h.sink.events("file-loaded").is_empty()).await;

    let sequences: Vec<u64> = h.sink.messages().iter().map(|m| m.sequence()).collect();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1), "{sequences:?}");
}

// ============================================================================
// Tracks across the swap
// ============================================================================

#[tokio::test]
async fn test_external_subtitles_survive_swap() {
    let h = Harness::new();
    open_playing(&h, 12_000).await;

    let first = h
        .engine
        .add_subtitle_track(AddSubtitleRequest::new("https://subs/en.srt").with_title("English"))
        .unwrap();
    let second = h
        .engine
        .add_subtitle_track(
            AddSubtitleRequest::new("https://subs/fr.ass")
                .with_language("fr")
                .selected(true),
        )
        .unwrap();
    assert_eq!((first.as_str(), second.as_str()), ("ext_sub_0", "ext_sub_1"));

    h.hardware.emit(decoder_init_failed());
    eventually("loadfile", || h.software.find("command loadfile").is_some()).await;

    // sub-add waits for the file to load.
    assert!(h.software.find("command sub-add").is_none());
    h.software.emit(SoftwareEvent::FileLoaded);
    eventually("sub-add", || h.software.all("command sub-add").len() == 2).await;
    assert_eq!(
        h.software.all("command sub-add"),
        vec![
            "command sub-add https://subs/en.srt auto English".to_string(),
            "command sub-add https://subs/fr.ass select External fr".to_string(),
        ]
    );

    let ids: Vec<String> = h.engine.tracks().externals().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["ext_sub_0", "ext_sub_1"]);

    // The native player reports the sideloaded files with its own ids.
    h.software.emit(SoftwareEvent::PropertyChange {
        name: "track-list".to_string(),
        value: bridge_traits::NativeValue::Node(json!([
            {"id": 1, "type": "video", "codec": "hevc", "selected": true},
            {"id": 1, "type": "audio", "lang": "eng", "codec": "eac3", "selected": true},
            {"id": 1, "type": "sub", "lang": "eng", "codec": "subrip"},
            {"id": 2, "type": "sub", "external": true, "external-filename": "https://subs/en.srt"},
            {"id": 3, "type": "sub", "external": true, "external-filename": "https://subs/fr.ass", "selected": true},
        ])),
    });
    h.software.emit(SoftwareEvent::PropertyChange {
        name: "sid".to_string(),
        value: bridge_traits::NativeValue::String("3".to_string()),
    });
    // The primary already reported ext_sub_1 before the swap; only count the
    // fallback's report.
    let switched = h.sink.events("backend-switched")[0].sequence();
    eventually("sid from fallback", || {
        h.sink.messages().iter().any(|m| {
            m.sequence() > switched
                && m.name() == "sid"
                && m.value() == Some(&PropertyValue::String("ext_sub_1".to_string()))
        })
    })
    .await;
    eventually("fallback track-list", || {
        matches!(
            h.sink.last_property("track-list"),
            Some(PropertyValue::Node(list)) if list[0]["id"] == "video_1"
        )
    })
    .await;

    let Some(PropertyValue::Node(list)) = h.sink.last_property("track-list") else {
        panic!("track-list is not a node");
    };
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["video_1", "audio_1", "sub_1", "ext_sub_0", "ext_sub_1"]);
}

#[tokio::test]
async fn test_add_subtitle_without_media_is_rejected() {
    let h = Harness::new();
    let result = h
        .engine
        .add_subtitle_track(AddSubtitleRequest::new("https://subs/en.srt"));
    assert!(matches!(result, Err(PlaybackError::NoMedia)));
}

#[tokio::test]
async fn test_intent_recorded_before_swap_is_reapplied() {
    let h = Harness::new();
    open_playing(&h, 30_000).await;
    h.engine.set_volume(0.4);
    h.engine.set_playback_rate(1.5);
    h.engine.select_subtitle_track(SubtitleSelection::None);

    h.hardware.emit(decoder_init_failed());
    eventually("loadfile", || h.software.find("command loadfile").is_some()).await;
    eventually("intent", || h.software.find("set sid=no").is_some()).await;

    assert_eq!(h.software.count("set volume=40"), 1);
    assert_eq!(h.software.count("set speed=1.5"), 1);
}

// ============================================================================
// Volume round-trip
// ============================================================================

#[tokio::test]
async fn test_volume_round_trip() {
    let h = Harness::new();
    open_playing(&h, 0).await;

    h.engine.set_volume(0.35);
    eventually("volume", || h.sink.last_property("volume").is_some()).await;

    let volume = h.sink.last_property("volume").and_then(|v| v.as_f64()).unwrap();
    assert!((volume - 35.0).abs() < 0.01, "{volume}");
    assert!(h.hardware.calls().contains(&"volume 0.35".to_string()));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_dispose_twice_tears_down_once() {
    let h = Harness::new();
    open_playing(&h, 2_000).await;
    assert!(h.engine.request_audio_focus());
    h.engine.set_video_frame_rate(24.0, 7_200_000);
    assert_eq!(h.display.listener_count(), 1);

    h.engine.dispose().await;
    h.engine.dispose().await;

    assert_eq!(h.engine.state(), SessionState::Disposed);
    assert_eq!(h.hardware.count("release"), 1);
    assert_eq!(h.focus.abandons(), 1);
    assert_eq!(h.focus.listener_count(), 0);
    assert_eq!(h.display.listener_count(), 0);
    assert!(matches!(
        h.engine.open(OpenRequest::new("file.mkv")).await,
        Err(PlaybackError::Disposed)
    ));
}

#[tokio::test]
async fn test_dispose_without_open() {
    let h = Harness::new();
    h.engine.dispose().await;
    h.engine.dispose().await;
    assert_eq!(h.engine.state(), SessionState::Disposed);
    assert_eq!(h.hardware_factory.created(), 0);
}

#[tokio::test]
async fn test_stop_ends_session() {
    let h = Harness::new();
    open_playing(&h, 2_000).await;

    h.engine.stop().await;
    assert_eq!(h.engine.state(), SessionState::Idle);
    assert!(h.engine.session_id().is_none());
    assert_eq!(h.hardware.count("release"), 1);

    // Commands without a backend are no-ops.
    h.engine.play();
    h.engine.set_visible(false);
    settle().await;
    assert_eq!(h.hardware.count("play"), 0);
}

#[tokio::test]
async fn test_reopen_discards_previous_session() {
    let h = Harness::new();
    open_playing(&h, 2_000).await;
    let first = h.engine.session_id().unwrap();
    h.engine
        .add_subtitle_track(AddSubtitleRequest::new("https://subs/en.srt"))
        .unwrap();

    h.engine.open(OpenRequest::new("next.mkv")).await.unwrap();
    eventually("second player", || h.hardware_factory.created() == 2).await;
    assert_ne!(h.engine.session_id().unwrap(), first);
    assert!(h.engine.tracks().externals().is_empty());
    assert_eq!(h.hardware.count("release"), 1);
    assert_eq!(h.hardware_factory.created(), 2);
}

#[tokio::test]
async fn test_empty_uri_is_rejected() {
    let h = Harness::new();
    let result = h.engine.open(OpenRequest::new("  ")).await;
    assert!(matches!(result, Err(PlaybackError::InvalidArgument(_))));
    assert_eq!(h.engine.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_stats_carry_player_type() {
    let h = Harness::new();
    let idle = h.engine.get_stats().await;
    assert_eq!(idle["playerType"], "primary");

    open_playing(&h, 4_000).await;
    let stats = h.engine.get_stats().await;
    assert_eq!(stats["playerType"], "primary");
    assert_eq!(stats["videoCodec"], "hevc");
    assert_eq!(stats["currentPositionMs"], 4_000);

    h.hardware.emit(decoder_init_failed());
    eventually("fallback active", || h.engine.state() == SessionState::FallbackActive).await;
    h.software.set_stat("video-codec", "hevc (main 10)");
    h.software.set_stat("video-params/max-cll", "1000");

    let stats = h.engine.get_stats().await;
    assert_eq!(stats["playerType"], "fallback");
    assert_eq!(stats["video-codec"], "hevc (main 10)");
    assert_eq!(stats["video-params/max-cll"], "1000");
    assert!(stats.get("cache-speed").is_none());
}

// ============================================================================
// Audio focus
// ============================================================================

#[tokio::test]
async fn test_focus_loss_pauses_once_and_gain_resumes_once() {
    let h = Harness::new();
    open_playing(&h, 6_000).await;
    assert!(h.engine.request_audio_focus());
    assert!(h.engine.focus_state().held);

    h.focus.fire(bridge_traits::FocusChange::Loss);
    eventually("pause", || h.hardware.count("pause") == 1).await;
    assert!(h.engine.focus_state().was_playing_before_loss);
    assert!(!h.engine.focus_state().held);

    h.focus.fire(bridge_traits::FocusChange::Gain);
    eventually("play", || h.hardware.count("play") == 1).await;
    settle().await;

    assert_eq!(h.hardware.count("pause"), 1);
    assert_eq!(h.hardware.count("play"), 1);
    assert!(!h.engine.focus_state().was_playing_before_loss);
    assert!(h.engine.focus_state().held);
}

#[tokio::test]
async fn test_ducking_does_not_pause() {
    let h = Harness::new();
    open_playing(&h, 6_000).await;
    h.engine.request_audio_focus();

    h.focus.fire(bridge_traits::FocusChange::LossTransientCanDuck);
    settle().await;
    assert_eq!(h.hardware.count("pause"), 0);
}

#[tokio::test]
async fn test_focus_requested_again_after_swap() {
    let h = Harness::new();
    open_playing(&h, 6_000).await;
    h.engine.request_audio_focus();

    h.hardware.emit(decoder_init_failed());
    eventually("switched", || !h.sink.events("backend-switched").is_empty()).await;
    assert_eq!(h.focus.requests(), 2);
}

// ============================================================================
// Frame rate
// ============================================================================

#[tokio::test]
async fn test_short_video_is_seamless_only() {
    let display = FakeDisplay::new(60.0, vec![60.0], MatchContentPreference::Always);
    let h = Harness::builder().display(display).build();

    let decision = h.engine.set_video_frame_rate(24.0, 120_000);
    assert_eq!(decision, FrameRateDecision::Seamless);
    assert_eq!(h.display.hints(), vec![(24.0, FrameRateStrategy::SeamlessOnly)]);
}

#[tokio::test]
async fn test_display_change_settles_and_resumes() {
    let display = FakeDisplay::new(60.0, vec![24.0, 60.0], MatchContentPreference::SeamlessOnly);
    let h = Harness::builder().display(display).build();
    open_playing(&h, 1_000).await;

    h.engine.set_video_frame_rate(23.976, 7_200_000);
    assert_eq!(h.engine.frame_rate_state().current_fps, 23.976);

    // The host paused rendering for the mode switch.
    h.hardware.emit(HardwareEvent::IsPlayingChanged(false));
    eventually("paused", || h.sink.last_property("pause") == Some(PropertyValue::Bool(true))).await;

    h.display.change_mode(24.0);
    eventually("listener removed", || h.display.listener_count() == 0).await;
    eventually("display-settled", || !h.sink.events("display-settled").is_empty()).await;
    eventually("resume", || h.hardware.count("play") == 1).await;

    // One-shot: a second change does nothing.
    h.display.change_mode(60.0);
    settle().await;
    assert_eq!(h.sink.events("display-settled").len(), 1);
}

#[tokio::test]
async fn test_clear_frame_rate_cancels_pending_settle() {
    let display = FakeDisplay::new(60.0, vec![24.0, 60.0], MatchContentPreference::SeamlessOnly);
    let h = Harness::builder().display(display).build();

    h.engine.set_video_frame_rate(24.0, 7_200_000);
    h.engine.clear_video_frame_rate();
    h.engine.clear_video_frame_rate();

    assert_eq!(h.display.listener_count(), 0);
    assert_eq!(h.engine.frame_rate_state().current_fps, 0.0);
    assert_eq!(
        h.display.hints(),
        vec![
            (24.0, FrameRateStrategy::SeamlessOnly),
            (0.0, FrameRateStrategy::SeamlessOnly)
        ]
    );
}

// ============================================================================
// Re-entrant telemetry consumers
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sink_may_call_back_into_engine() {
    let display = FakeDisplay::new(60.0, vec![24.0, 60.0], MatchContentPreference::SeamlessOnly);
    let h = Harness::builder().display(display).build();

    // Matching the frame rate once playback starts is a common host pattern.
    let engine = Arc::downgrade(&h.engine);
    h.sink.on_message(move |message| {
        if message.name() == "pause" && message.value() == Some(&PropertyValue::Bool(false)) {
            if let Some(engine) = engine.upgrade() {
                engine.set_video_frame_rate(24.0, 7_200_000);
                let _ = engine.state();
            }
        }
    });

    open_playing(&h, 1_000).await;

    let engine = Arc::clone(&h.engine);
    let observed = tokio::time::timeout(
        Duration::from_secs(2),
        tokio::task::spawn_blocking(move || {
            (engine.state(), engine.frame_rate_state().current_fps)
        }),
    )
    .await
    .expect("engine is still responsive")
    .unwrap();
    assert_eq!(observed, (SessionState::PrimaryActive, 24.0));
    assert_eq!(h.display.listener_count(), 1);

    // Telemetry keeps flowing after the re-entrant call.
    h.hardware.set_sample(playing_at(2_000));
    eventually("next sample", || {
        h.sink.last_property("time-pos") == Some(PropertyValue::Double(2.0))
    })
    .await;

    tokio::time::timeout(Duration::from_secs(2), h.engine.dispose())
        .await
        .expect("dispose completes");
    assert_eq!(h.engine.state(), SessionState::Disposed);
}
