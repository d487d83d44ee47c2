//! Command surface of the playback engine.
//!
//! The presentation layer talks to the engine through method names and JSON
//! arguments, the way a platform channel delivers them. [`PlayerService`]
//! validates arguments, lazily builds the [`FallbackOrchestrator`] on
//! `initialize` and maps every failure to a [`ServiceError`] with a stable
//! code.
//!
//! Telemetry does not flow through here: it goes to the [`MessageSink`]
//! handed to [`PlayerService::new`], whose messages serialize with
//! `EngineMessage::to_json`.
//!
//! ```ignore
//! use core_service::PlayerService;
//! use serde_json::json;
//!
//! let service = PlayerService::new(engine_config, PlaybackConfig::default(), sink);
//! service.handle("initialize", &json!(null)).await?;
//! service
//!     .handle("open", &json!({"uri": "https://cdn/film.mkv", "startPositionMs": 45000}))
//!     .await?;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{DesktopAudioFocus, DesktopDisplay};

use bridge_traits::PropertyFormat;
use core_playback::{
    AddSubtitleRequest, FallbackOrchestrator, OpenRequest, PlaybackConfig, SubtitleSelection,
};
use core_runtime::config::EngineConfig;
use core_runtime::events::MessageSink;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Methods accepted before `initialize`. Each is a no-op (or reports the
/// idle state) without an engine.
const ALLOWED_UNINITIALIZED: &[&str] = &[
    "dispose",
    "isInitialized",
    "getPlayerType",
    "setVisible",
    "abandonAudioFocus",
    "clearVideoFrameRate",
];

/// Method-call front end of one playback engine.
pub struct PlayerService {
    engine: EngineConfig,
    config: PlaybackConfig,
    sink: Arc<dyn MessageSink>,
    player: Mutex<Option<Arc<FallbackOrchestrator>>>,
}

impl PlayerService {
    pub fn new(engine: EngineConfig, config: PlaybackConfig, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            engine,
            config,
            sink,
            player: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.player.lock().is_some()
    }

    /// Builds the engine. Calling it again while initialized returns `true`
    /// without rebuilding.
    pub fn initialize(&self) -> Result<bool> {
        let mut player = self.player.lock();
        if player.is_some() {
            debug!("Already initialized");
            return Ok(true);
        }

        let orchestrator =
            FallbackOrchestrator::new(self.engine.clone(), self.config.clone(), self.sink.clone())
                .map_err(|e| ServiceError::InitFailed(e.to_string()))?;
        *player = Some(Arc::new(orchestrator));
        info!("Player service initialized");
        Ok(true)
    }

    /// Disposes the engine; a later `initialize` builds a new one.
    pub async fn dispose(&self) {
        let player = self.player.lock().take();
        if let Some(player) = player {
            player.dispose().await;
            info!("Player service disposed");
        }
    }

    /// The current engine, if initialized.
    pub fn orchestrator(&self) -> Option<Arc<FallbackOrchestrator>> {
        self.player.lock().clone()
    }

    fn require(&self) -> Result<Arc<FallbackOrchestrator>> {
        self.orchestrator().ok_or(ServiceError::NotInitialized)
    }

    /// Runs one command and returns its JSON result (`null` for commands
    /// without one).
    ///
    /// # Errors
    ///
    /// - `INVALID_ARGS` for missing or malformed arguments, and for commands
    ///   the engine rejects (no media open, engine disposed)
    /// - `NOT_INITIALIZED` for engine commands issued before `initialize`
    /// - `INIT_FAILED` when the engine cannot be built
    /// - `NOT_IMPLEMENTED` for unknown methods
    #[instrument(skip(self, args))]
    pub async fn handle(&self, method: &str, args: &Value) -> Result<Value> {
        let args = Args(args);

        if !self.is_initialized() && ALLOWED_UNINITIALIZED.contains(&method) {
            return match method {
                "isInitialized" => Ok(json!(false)),
                "getPlayerType" => Ok(json!("primary")),
                "setVisible" => args.required_bool("visible").map(|_| Value::Null),
                _ => Ok(Value::Null),
            };
        }

        match method {
            "initialize" => self.initialize().map(Value::Bool),
            "dispose" => {
                self.dispose().await;
                Ok(Value::Null)
            }
            "isInitialized" => Ok(json!(self.is_initialized())),
            "open" => {
                let uri = args.required_str("uri")?;
                let mut request = OpenRequest::new(uri)
                    .with_start_position_ms(args.i64("startPositionMs").unwrap_or(0))
                    .with_autoplay(args.bool("autoPlay").unwrap_or(true));
                request.headers = args.headers();
                self.require()?.open(request).await?;
                Ok(Value::Null)
            }
            "play" => {
                self.require()?.play();
                Ok(Value::Null)
            }
            "pause" => {
                self.require()?.pause();
                Ok(Value::Null)
            }
            "stop" => {
                self.require()?.stop().await;
                Ok(Value::Null)
            }
            "seek" => {
                let position_ms = args.required_i64("positionMs")?;
                self.require()?.seek(position_ms);
                Ok(Value::Null)
            }
            "setVolume" => {
                let volume = args.required_f64("volume")?;
                self.require()?.set_volume(volume / 100.0);
                Ok(Value::Null)
            }
            "setRate" => {
                let rate = args.required_f64("rate")?;
                self.require()?.set_playback_rate(rate);
                Ok(Value::Null)
            }
            "selectAudioTrack" => {
                let id = args.required_str("trackId")?;
                self.require()?.select_audio_track(id);
                Ok(Value::Null)
            }
            "selectSubtitleTrack" => {
                let selection = SubtitleSelection::from_id(args.str("trackId"));
                self.require()?.select_subtitle_track(selection);
                Ok(Value::Null)
            }
            "addSubtitleTrack" => {
                let mut request = AddSubtitleRequest::new(args.required_str("uri")?)
                    .selected(args.bool("select").unwrap_or(false));
                request.title = args.str("title").map(str::to_string);
                request.language = args.str("language").map(str::to_string);
                request.mime_type = args.str("mimeType").map(str::to_string);
                let id = self.require()?.add_subtitle_track(request)?;
                Ok(Value::String(id))
            }
            "setVisible" => {
                let visible = args.required_bool("visible")?;
                self.require()?.set_visible(visible);
                Ok(Value::Null)
            }
            "observeProperty" => {
                let name = args.required_str("name")?;
                let format = match args.str("format") {
                    Some(format) => parse_format(format)?,
                    None => PropertyFormat::String,
                };
                self.require()?.observe(name, format);
                Ok(Value::Null)
            }
            "setVideoFrameRate" => {
                let fps = args.f64("fps").unwrap_or(0.0) as f32;
                let duration_ms = args
                    .i64("durationMs")
                    .or_else(|| args.i64("duration"))
                    .unwrap_or(0);
                let decision = self.require()?.set_video_frame_rate(fps, duration_ms);
                debug!(fps, duration_ms, ?decision, "Frame rate requested");
                Ok(Value::Null)
            }
            "clearVideoFrameRate" => {
                self.require()?.clear_video_frame_rate();
                Ok(Value::Null)
            }
            "requestAudioFocus" => Ok(json!(self.require()?.request_audio_focus())),
            "abandonAudioFocus" => {
                self.require()?.abandon_audio_focus();
                Ok(Value::Null)
            }
            "getStats" => {
                let stats = self.require()?.get_stats().await;
                Ok(Value::Object(stats))
            }
            "getPlayerType" => Ok(json!(self.require()?.player_type().as_str())),
            other => Err(ServiceError::NotImplemented(other.to_string())),
        }
    }
}

fn missing(name: &str) -> ServiceError {
    ServiceError::InvalidArgs(format!("Missing '{}'", name))
}

fn parse_format(format: &str) -> Result<PropertyFormat> {
    serde_json::from_value(Value::String(format.to_lowercase()))
        .map_err(|_| ServiceError::InvalidArgs(format!("Unknown property format '{}'", format)))
}

/// Typed access to a method's argument map. `null` counts as absent.
struct Args<'a>(&'a Value);

impl<'a> Args<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    fn str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Value::as_str)
    }

    fn required_str(&self, name: &str) -> Result<&'a str> {
        self.str(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| missing(name))
    }

    fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    fn required_f64(&self, name: &str) -> Result<f64> {
        self.f64(name).ok_or_else(|| missing(name))
    }

    /// Accepts integral and floating numbers; fractions are truncated.
    fn i64(&self, name: &str) -> Option<i64> {
        self.get(name)
            .and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
    }

    fn required_i64(&self, name: &str) -> Result<i64> {
        self.i64(name).ok_or_else(|| missing(name))
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    fn required_bool(&self, name: &str) -> Result<bool> {
        self.bool(name).ok_or_else(|| missing(name))
    }

    /// String-valued entries of the `headers` object; others are dropped.
    fn headers(&self) -> BTreeMap<String, String> {
        self.get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|value| (name.clone(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_treat_null_as_missing() {
        let value = json!({"trackId": null, "positionMs": 1500.7, "volume": 40});
        let args = Args(&value);

        assert_eq!(args.str("trackId"), None);
        assert_eq!(args.i64("positionMs"), Some(1500));
        assert_eq!(args.f64("volume"), Some(40.0));
        assert_eq!(
            args.required_str("uri").unwrap_err().to_string(),
            "Missing 'uri'"
        );
    }

    #[test]
    fn test_args_on_non_object() {
        let value = Value::Null;
        let args = Args(&value);
        assert!(args.get("anything").is_none());
        assert!(args.headers().is_empty());
    }

    #[test]
    fn test_headers_keep_strings_only() {
        let value = json!({"headers": {"Cookie": "a=b", "X-Retries": 3}});
        let headers = Args(&value).headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Cookie").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("Node").unwrap(), PropertyFormat::Node);
        assert_eq!(parse_format("flag").unwrap(), PropertyFormat::Flag);
        assert_eq!(parse_format("int64").unwrap_err().code(), "INVALID_ARGS");
    }
}
