//! # Playback Configuration
//!
//! Timing constants and native options for the playback engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback engine configuration.
///
/// Controls telemetry polling, frame-rate matching, the frame watchdog and
/// the options handed to the software backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How often the primary backend samples position, duration and buffer.
    ///
    /// Default: 250 ms.
    #[serde(default = "default_position_poll_interval_ms")]
    pub position_poll_interval_ms: u64,

    /// Videos shorter than this only get seamless display-mode hints.
    ///
    /// Default: 5 minutes (300000 ms).
    #[serde(default = "default_short_video_threshold_ms")]
    pub short_video_threshold_ms: i64,

    /// Wait after a display change before resuming playback.
    ///
    /// Default: 2000 ms.
    #[serde(default = "default_display_settle_delay_ms")]
    pub display_settle_delay_ms: u64,

    /// Lower clamp for `setPlaybackRate`.
    ///
    /// Default: 0.25.
    #[serde(default = "default_min_playback_rate")]
    pub min_playback_rate: f64,

    /// Upper clamp for `setPlaybackRate`.
    ///
    /// Default: 4.0.
    #[serde(default = "default_max_playback_rate")]
    pub max_playback_rate: f64,

    /// Capacity of the channel carrying OS callbacks and backend failures to
    /// the orchestrator.
    ///
    /// Default: 64.
    #[serde(default = "default_control_channel_capacity")]
    pub control_channel_capacity: usize,

    /// Detect hardware pipelines that play without rendering frames and treat
    /// them as unsupported formats.
    ///
    /// Default: true.
    #[serde(default = "default_frame_watchdog_enabled")]
    pub frame_watchdog_enabled: bool,

    /// Default: 1000 ms.
    #[serde(default = "default_frame_watchdog_interval_ms")]
    pub frame_watchdog_interval_ms: u64,

    /// Playing this long with zero rendered frames trips the watchdog.
    ///
    /// Default: 8000 ms.
    #[serde(default = "default_frame_watchdog_timeout_ms")]
    pub frame_watchdog_timeout_ms: u64,

    /// If the hardware player reports ready below this position while a
    /// start position is pending, the engine seeks to the start position.
    ///
    /// Default: 1000 ms.
    #[serde(default = "default_start_position_restore_threshold_ms")]
    pub start_position_restore_threshold_ms: i64,

    /// Forward native log lines as `log-message` events.
    ///
    /// Default: false.
    #[serde(default)]
    pub debug_logging: bool,

    /// Software backend `hwdec` option.
    ///
    /// Default: "auto".
    #[serde(default = "default_hwdec")]
    pub hwdec: String,

    /// Software backend `vo` option.
    ///
    /// Default: "gpu".
    #[serde(default = "default_video_output")]
    pub video_output: String,

    /// Software backend `ao` option.
    ///
    /// Default: "audiotrack".
    #[serde(default = "default_audio_output")]
    pub audio_output: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            position_poll_interval_ms: default_position_poll_interval_ms(),
            short_video_threshold_ms: default_short_video_threshold_ms(),
            display_settle_delay_ms: default_display_settle_delay_ms(),
            min_playback_rate: default_min_playback_rate(),
            max_playback_rate: default_max_playback_rate(),
            control_channel_capacity: default_control_channel_capacity(),
            frame_watchdog_enabled: default_frame_watchdog_enabled(),
            frame_watchdog_interval_ms: default_frame_watchdog_interval_ms(),
            frame_watchdog_timeout_ms: default_frame_watchdog_timeout_ms(),
            start_position_restore_threshold_ms: default_start_position_restore_threshold_ms(),
            debug_logging: false,
            hwdec: default_hwdec(),
            video_output: default_video_output(),
            audio_output: default_audio_output(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.position_poll_interval_ms = interval_ms;
        self
    }

    pub fn with_settle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.display_settle_delay_ms = delay_ms;
        self
    }

    pub fn with_frame_watchdog(mut self, enabled: bool) -> Self {
        self.frame_watchdog_enabled = enabled;
        self
    }

    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.position_poll_interval_ms == 0 {
            return Err("position_poll_interval_ms must be > 0".to_string());
        }

        if self.short_video_threshold_ms < 0 {
            return Err("short_video_threshold_ms must be >= 0".to_string());
        }

        if !(self.min_playback_rate > 0.0 && self.min_playback_rate <= self.max_playback_rate) {
            return Err("playback rate range must satisfy 0 < min <= max".to_string());
        }

        if self.control_channel_capacity == 0 {
            return Err("control_channel_capacity must be > 0".to_string());
        }

        if self.frame_watchdog_enabled
            && (self.frame_watchdog_interval_ms == 0
                || self.frame_watchdog_timeout_ms < self.frame_watchdog_interval_ms)
        {
            return Err(
                "frame watchdog needs interval > 0 and timeout >= interval".to_string(),
            );
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.display_settle_delay_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.frame_watchdog_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_watchdog_timeout_ms)
    }

    /// Clamp a requested playback rate into the configured range.
    pub fn clamp_rate(&self, rate: f64) -> f64 {
        if rate.is_nan() {
            return 1.0;
        }
        rate.clamp(self.min_playback_rate, self.max_playback_rate)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_position_poll_interval_ms() -> u64 {
    250
}

fn default_short_video_threshold_ms() -> i64 {
    5 * 60 * 1000
}

fn default_display_settle_delay_ms() -> u64 {
    2000
}

fn default_min_playback_rate() -> f64 {
    0.25
}

fn default_max_playback_rate() -> f64 {
    4.0
}

fn default_control_channel_capacity() -> usize {
    64
}

fn default_frame_watchdog_enabled() -> bool {
    true
}

fn default_frame_watchdog_interval_ms() -> u64 {
    1000
}

fn default_frame_watchdog_timeout_ms() -> u64 {
    8000
}

fn default_start_position_restore_threshold_ms() -> i64 {
    1000
}

fn default_hwdec() -> String {
    "auto".to_string()
}

fn default_video_output() -> String {
    "gpu".to_string()
}

fn default_audio_output() -> String {
    "audiotrack".to_string()
}
