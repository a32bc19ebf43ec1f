use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::{self, CaptureRequest, FfmpegCapture};
use crate::feed::{self, GestureConfig};
use crate::tier::{Tier, Viewer};

const DEFAULT_ENV_PREFIX: &str = "SHORTS_TUI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "default_handle")]
    pub handle: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub tier: Tier,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            handle: default_handle(),
            display_name: default_display_name(),
            avatar_url: String::new(),
            tier: Tier::Free,
        }
    }
}

impl ViewerConfig {
    pub fn to_viewer(&self) -> Viewer {
        let fallback = Viewer::default();
        let avatar = if self.avatar_url.trim().is_empty() {
            fallback.avatar_url
        } else {
            self.avatar_url.clone()
        };
        Viewer::new(
            fallback.id,
            self.handle.clone(),
            self.display_name.clone(),
            avatar,
            self.tier,
        )
    }
}

fn default_handle() -> String {
    "@viewer".into()
}

fn default_display_name() -> String {
    "You".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default = "default_media_root")]
    pub media_root: String,
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold_px: f64,
    #[serde(default = "default_wheel_threshold")]
    pub wheel_threshold: f64,
    #[serde(default = "default_nav_cooldown", with = "humantime_serde")]
    pub nav_cooldown: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            media_root: default_media_root(),
            swipe_threshold_px: default_swipe_threshold(),
            wheel_threshold: default_wheel_threshold(),
            nav_cooldown: default_nav_cooldown(),
        }
    }
}

impl FeedConfig {
    pub fn gestures(&self) -> GestureConfig {
        GestureConfig {
            swipe_threshold_px: self.swipe_threshold_px,
            wheel_threshold: self.wheel_threshold,
            cooldown: self.nav_cooldown,
        }
    }
}

fn default_media_root() -> String {
    "public".into()
}

fn default_swipe_threshold() -> f64 {
    feed::SWIPE_THRESHOLD_PX
}

fn default_wheel_threshold() -> f64 {
    feed::WHEEL_THRESHOLD
}

fn default_nav_cooldown() -> Duration {
    feed::NAV_COOLDOWN
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_enabled")]
    pub enabled: bool,
    #[serde(default = "default_mpv_path")]
    pub mpv_path: String,
    #[serde(default)]
    pub start_muted: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: default_player_enabled(),
            mpv_path: default_mpv_path(),
            start_muted: false,
        }
    }
}

fn default_player_enabled() -> bool {
    true
}

fn default_mpv_path() -> String {
    "mpv".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "capture::default_ffmpeg_args")]
    pub command: Vec<String>,
    #[serde(default = "default_capture_duration", with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            command: capture::default_ffmpeg_args(),
            duration: default_capture_duration(),
            output_dir: None,
        }
    }
}

impl CaptureConfig {
    pub fn request(&self) -> CaptureRequest {
        CaptureRequest {
            duration: self.duration,
            ..CaptureRequest::default()
        }
    }

    pub fn device(&self) -> FfmpegCapture {
        FfmpegCapture {
            ffmpeg_path: self.ffmpeg_path.clone(),
            args: self.command.clone(),
            output_dir: self.output_dir.clone(),
            ..FfmpegCapture::default()
        }
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".into()
}

fn default_capture_duration() -> Duration {
    capture::REPLY_DURATION
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "viewer.handle" => cfg.viewer.handle = value,
        "viewer.display_name" => cfg.viewer.display_name = value,
        "viewer.avatar_url" => cfg.viewer.avatar_url = value,
        "viewer.tier" => {
            if let Ok(tier) = value.parse::<Tier>() {
                cfg.viewer.tier = tier;
            }
        }
        "feed.catalog" => cfg.feed.catalog = Some(PathBuf::from(value)),
        "feed.media_root" => cfg.feed.media_root = value,
        "feed.swipe_threshold_px" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.feed.swipe_threshold_px = parsed;
            }
        }
        "feed.wheel_threshold" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.feed.wheel_threshold = parsed;
            }
        }
        "feed.nav_cooldown" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.nav_cooldown = duration;
            }
        }
        "player.enabled" => cfg.player.enabled = parse_bool(&value),
        "player.mpv_path" => cfg.player.mpv_path = value,
        "player.start_muted" => cfg.player.start_muted = parse_bool(&value),
        "capture.ffmpeg_path" => cfg.capture.ffmpeg_path = value,
        "capture.command" => {
            cfg.capture.command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "capture.duration" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.capture.duration = duration;
            }
        }
        "capture.output_dir" => cfg.capture.output_dir = Some(PathBuf::from(value)),
        _ => {}
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True" | "yes")
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shorts-tui").join("config.yaml"))
}

pub fn to_yaml(cfg: &Config) -> Result<String> {
    serde_yaml::to_string(cfg).context("config: failed to serialize config")
}

/// Writes the default configuration to `path` (or the default location)
/// unless a file already exists there. Returns the path and whether it was
/// written.
pub fn write_default(path: Option<PathBuf>) -> Result<(PathBuf, bool)> {
    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    if path.exists() {
        return Ok((path, false));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = to_yaml(&Config::default())?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok((path, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("SHORTS_TUI_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.viewer.tier, Tier::Free);
        assert_eq!(cfg.feed.nav_cooldown, Duration::from_millis(500));
        assert_eq!(cfg.feed.swipe_threshold_px, 90.0);
        assert_eq!(cfg.capture.duration, Duration::from_secs(7));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "viewer:\n  tier: plus\nfeed:\n  nav_cooldown: 250ms\nplayer:\n  enabled: false\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("SHORTS_TUI_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.viewer.tier, Tier::Plus);
        assert_eq!(cfg.viewer.handle, "@viewer");
        assert_eq!(cfg.feed.nav_cooldown, Duration::from_millis(250));
        assert_eq!(cfg.feed.wheel_threshold, 60.0);
        assert!(!cfg.player.enabled);
        assert_eq!(cfg.player.mpv_path, "mpv");
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let (written_to, created) = write_default(Some(path.clone())).unwrap();
        assert!(created);
        assert_eq!(written_to, path);
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved, Config::default());

        let (_, created_again) = write_default(Some(path)).unwrap();
        assert!(!created_again);
    }

    #[test]
    fn env_overrides() {
        env::set_var("SHORTS_TUI_ENVTEST_VIEWER__TIER", "creator");
        env::set_var("SHORTS_TUI_ENVTEST_CAPTURE__DURATION", "3s");
        env::set_var("SHORTS_TUI_ENVTEST_PLAYER__ENABLED", "0");
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("SHORTS_TUI_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.viewer.tier, Tier::Creator);
        assert_eq!(cfg.capture.duration, Duration::from_secs(3));
        assert!(!cfg.player.enabled);
        env::remove_var("SHORTS_TUI_ENVTEST_VIEWER__TIER");
        env::remove_var("SHORTS_TUI_ENVTEST_CAPTURE__DURATION");
        env::remove_var("SHORTS_TUI_ENVTEST_PLAYER__ENABLED");
    }

    #[test]
    fn viewer_starts_with_tier_allowance() {
        let cfg = ViewerConfig {
            tier: Tier::Plus,
            ..ViewerConfig::default()
        };
        let viewer = cfg.to_viewer();
        assert_eq!(viewer.id, "me");
        assert_eq!(viewer.credits, Tier::Plus.policy().monthly_allowance);
        assert!(!viewer.avatar_url.is_empty());
    }
}
