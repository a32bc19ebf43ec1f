use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;

use crate::capture::CaptureDevice;
use crate::catalog::Catalog;
use crate::clip::{Player, PlayerEvent};
use crate::config::{self, Config};
use crate::logging::debug_log;
use crate::tier::EntitlementStore;
use crate::ui;
use crate::video::{MpvLaunchOptions, MpvPlayer, NullPlayer};

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let display_path = friendly_path(config::default_path().as_ref());
    debug_log(format!("config: {display_path}"));

    let catalog = load_catalog(&cfg)?;
    let store = EntitlementStore::new(cfg.viewer.to_viewer());
    let (player, player_events, player_status) = start_player(&cfg);
    let capture: Arc<dyn CaptureDevice> = Arc::new(cfg.capture.device());

    let status_message = player_status.unwrap_or_else(|| {
        format!(
            "{} shorts loaded. ↑/↓ to swipe, r to reply, q to quit.",
            catalog.feed_ids().len()
        )
    });

    let options = ui::Options {
        store,
        catalog,
        gestures: cfg.feed.gestures(),
        player,
        player_events,
        media_root: cfg.feed.media_root.clone(),
        start_muted: cfg.player.start_muted,
        capture,
        capture_request: cfg.capture.request(),
        preview_player: cfg
            .player
            .enabled
            .then(|| cfg.player.mpv_path.clone()),
        status_message,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    Ok(())
}

fn load_catalog(cfg: &Config) -> Result<Catalog> {
    match cfg.feed.catalog.as_ref() {
        Some(path) => Catalog::from_yaml_file(path),
        None => Ok(Catalog::demo()),
    }
}

type PlayerSetup = (
    Box<dyn Player>,
    Option<Receiver<PlayerEvent>>,
    Option<String>,
);

/// Starts mpv when playback is enabled. Falls back to a silent player so the
/// feed stays usable without it.
fn start_player(cfg: &Config) -> PlayerSetup {
    if !cfg.player.enabled {
        return (Box::new(NullPlayer), None, None);
    }
    let launched = MpvPlayer::spawn(MpvLaunchOptions {
        mpv_path: &cfg.player.mpv_path,
        title: "Shorts",
        muted: cfg.player.start_muted,
    });
    match launched {
        Ok(player) => {
            let events = player.events();
            (Box::new(player), Some(events), None)
        }
        Err(err) => {
            debug_log(format!("mpv unavailable: {err:#}"));
            (
                Box::new(NullPlayer),
                None,
                Some(format!("Playback disabled: {err}")),
            )
        }
    }
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/shorts-tui/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_player_is_silent() {
        let mut cfg = Config::default();
        cfg.player.enabled = false;
        let (_, events, status) = start_player(&cfg);
        assert!(events.is_none());
        assert!(status.is_none());
    }

    #[test]
    fn missing_mpv_falls_back() {
        let mut cfg = Config::default();
        cfg.player.mpv_path = "/nonexistent/shorts-tui-mpv".into();
        let (_, events, status) = start_player(&cfg);
        assert!(events.is_none());
        assert!(status.is_some_and(|msg| msg.starts_with("Playback disabled")));
    }

    #[test]
    fn demo_catalog_without_path() {
        let catalog = load_catalog(&Config::default()).unwrap();
        assert!(!catalog.is_empty());
    }

    #[test]
    fn friendly_path_without_config_dir() {
        assert_eq!(friendly_path(None), "~/.config/shorts-tui/config.yaml");
    }
}
