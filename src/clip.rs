use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::catalog::Short;
use crate::logging::debug_log;

/// How close to the window end playback may get before it is sent back to
/// the start.
pub const LOOP_EPSILON_SECS: f64 = 0.1;

/// Configured play segment. A negative start counts back from the end of
/// the media.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipBounds {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start: f64,
    pub end: f64,
}

impl ClipBounds {
    pub fn is_configured(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Returns `None` until the media reports a usable duration.
    pub fn resolve(&self, duration: f64) -> Option<ClipWindow> {
        if !duration.is_finite() || duration <= 0.0 {
            return None;
        }
        let start = match self.start {
            None => 0.0,
            Some(start) if start >= 0.0 => start,
            Some(start) => (duration + start).max(0.0),
        };
        let end = match self.end {
            Some(end) if end > 0.0 => end,
            _ => duration,
        };
        Some(ClipWindow { start, end })
    }
}

/// Events reported by a playback backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    MetadataLoaded { duration: f64 },
    TimeUpdate { position: f64 },
    Ended,
    Exited,
}

/// Playback backend driven by [`PlaybackController`].
pub trait Player {
    fn load(&mut self, location: &str, native_loop: bool) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn seek(&mut self, seconds: f64) -> Result<()>;
    fn set_muted(&mut self, muted: bool) -> Result<()>;
}

impl<P: Player + ?Sized> Player for Box<P> {
    fn load(&mut self, location: &str, native_loop: bool) -> Result<()> {
        (**self).load(location, native_loop)
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<()> {
        (**self).pause()
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        (**self).seek(seconds)
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        (**self).set_muted(muted)
    }
}

#[derive(Debug, Clone)]
struct ActiveClip {
    short_id: String,
    bounds: ClipBounds,
    window: Option<ClipWindow>,
    position: Option<f64>,
    playing: bool,
}

/// Keeps the active short playing inside its clip window.
pub struct PlaybackController<P: Player> {
    player: P,
    media_root: String,
    muted: bool,
    active: Option<ActiveClip>,
}

impl<P: Player> PlaybackController<P> {
    pub fn new(player: P, media_root: impl Into<String>, muted: bool) -> Self {
        Self {
            player,
            media_root: media_root.into(),
            muted,
            active: None,
        }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|clip| clip.short_id.as_str())
    }

    pub fn is_playing(&self) -> bool {
        self.active.as_ref().is_some_and(|clip| clip.playing)
    }

    pub fn window(&self) -> Option<ClipWindow> {
        self.active.as_ref().and_then(|clip| clip.window)
    }

    pub fn position(&self) -> Option<f64> {
        self.active.as_ref().and_then(|clip| clip.position)
    }

    /// Makes `short` the playing item. Re-activating the current item only
    /// resumes it.
    pub fn activate(&mut self, short: &Short) -> Result<()> {
        if self.active_id() == Some(short.id.as_str()) {
            return self.resume();
        }
        let bounds = short.clip;
        let location = short.media_location(&self.media_root);
        debug_log(format!("playback: activate {} ({location})", short.id));
        self.active = Some(ActiveClip {
            short_id: short.id.clone(),
            bounds,
            window: None,
            position: None,
            playing: false,
        });
        self.player.load(&location, !bounds.is_configured())?;
        self.player.set_muted(self.muted)?;
        self.resume()
    }

    pub fn deactivate(&mut self) -> Result<()> {
        if let Some(clip) = self.active.as_mut() {
            if clip.playing {
                clip.playing = false;
                self.player.pause()?;
            }
        }
        Ok(())
    }

    pub fn on_metadata(&mut self, duration: f64) -> Result<()> {
        let Some(clip) = self.active.as_mut() else {
            return Ok(());
        };
        let Some(window) = clip.bounds.resolve(duration) else {
            debug_log(format!(
                "playback: {} duration {duration} not usable yet",
                clip.short_id
            ));
            return Ok(());
        };
        clip.window = Some(window);
        clip.position = Some(window.start);
        self.player.seek(window.start)
    }

    pub fn on_time(&mut self, position: f64) -> Result<()> {
        let Some(clip) = self.active.as_mut() else {
            return Ok(());
        };
        clip.position = Some(position);
        if !clip.bounds.is_configured() {
            return Ok(());
        }
        let Some(window) = clip.window else {
            return Ok(());
        };
        if position >= window.end - LOOP_EPSILON_SECS {
            clip.position = Some(window.start);
            self.player.seek(window.start)?;
        }
        Ok(())
    }

    pub fn on_ended(&mut self) -> Result<()> {
        let Some(clip) = self.active.as_mut() else {
            return Ok(());
        };
        if !clip.bounds.is_configured() {
            return Ok(());
        }
        if let Some(window) = clip.window {
            clip.position = Some(window.start);
            self.player.seek(window.start)?;
        }
        if clip.playing {
            self.player.play()?;
        }
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        self.player.set_muted(muted)?;
        if !muted && self.is_playing() {
            self.resume()?;
        }
        Ok(())
    }

    pub fn handle(&mut self, event: PlayerEvent) -> Result<()> {
        match event {
            PlayerEvent::MetadataLoaded { duration } => self.on_metadata(duration),
            PlayerEvent::TimeUpdate { position } => self.on_time(position),
            PlayerEvent::Ended => self.on_ended(),
            PlayerEvent::Exited => {
                if let Some(clip) = self.active.as_mut() {
                    clip.playing = false;
                }
                Ok(())
            }
        }
    }

    fn resume(&mut self) -> Result<()> {
        if let Some(clip) = self.active.as_mut() {
            clip.playing = true;
            self.player.play()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Load(String, bool),
        Play,
        Pause,
        Seek(f64),
        Muted(bool),
    }

    #[derive(Default)]
    pub(crate) struct RecordingPlayer {
        pub calls: Vec<Call>,
    }

    impl Player for RecordingPlayer {
        fn load(&mut self, location: &str, native_loop: bool) -> Result<()> {
            self.calls.push(Call::Load(location.to_string(), native_loop));
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            self.calls.push(Call::Play);
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.calls.push(Call::Pause);
            Ok(())
        }

        fn seek(&mut self, seconds: f64) -> Result<()> {
            self.calls.push(Call::Seek(seconds));
            Ok(())
        }

        fn set_muted(&mut self, muted: bool) -> Result<()> {
            self.calls.push(Call::Muted(muted));
            Ok(())
        }
    }

    fn controller() -> PlaybackController<RecordingPlayer> {
        PlaybackController::new(RecordingPlayer::default(), "/media", false)
    }

    #[test]
    fn last_minute_of_one_minute_media() {
        let bounds = ClipBounds {
            start: Some(-60.0),
            end: Some(0.0),
        };
        assert_eq!(
            bounds.resolve(60.0),
            Some(ClipWindow {
                start: 0.0,
                end: 60.0
            })
        );
        let unset_end = ClipBounds {
            start: Some(-60.0),
            end: None,
        };
        assert_eq!(unset_end.resolve(60.0), bounds.resolve(60.0));
    }

    #[test]
    fn explicit_window() {
        let bounds = ClipBounds {
            start: Some(10.0),
            end: Some(40.0),
        };
        assert_eq!(
            bounds.resolve(90.0),
            Some(ClipWindow {
                start: 10.0,
                end: 40.0
            })
        );
    }

    #[test]
    fn no_bounds_plays_whole_media() {
        assert_eq!(
            ClipBounds::default().resolve(42.5),
            Some(ClipWindow {
                start: 0.0,
                end: 42.5
            })
        );
    }

    #[test]
    fn negative_start_counts_from_end() {
        let bounds = ClipBounds {
            start: Some(-60.0),
            end: None,
        };
        assert_eq!(bounds.resolve(200.0).unwrap().start, 140.0);
    }

    #[test]
    fn unusable_duration_defers() {
        let bounds = ClipBounds {
            start: Some(5.0),
            end: None,
        };
        assert_eq!(bounds.resolve(f64::NAN), None);
        assert_eq!(bounds.resolve(f64::INFINITY), None);
        assert_eq!(bounds.resolve(0.0), None);
        assert_eq!(bounds.resolve(-3.0), None);
    }

    #[test]
    fn activation_loads_and_plays() {
        let catalog = Catalog::demo();
        let mut ctl = controller();
        ctl.activate(catalog.get("s1").unwrap()).unwrap();
        assert_eq!(
            ctl.player().calls,
            vec![
                Call::Load("/media/videos/video1.mp4".into(), false),
                Call::Muted(false),
                Call::Play,
            ]
        );
        assert!(ctl.is_playing());
        assert_eq!(ctl.active_id(), Some("s1"));
    }

    #[test]
    fn unclipped_media_uses_native_loop() {
        let catalog = Catalog::demo();
        let mut ctl = controller();
        ctl.activate(catalog.get("s1r1").unwrap()).unwrap();
        assert!(matches!(ctl.player().calls[0], Call::Load(_, true)));

        ctl.on_metadata(30.0).unwrap();
        ctl.on_time(29.95).unwrap();
        ctl.on_ended().unwrap();
        let seeks: Vec<&Call> = ctl
            .player()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Seek(_)))
            .collect();
        assert_eq!(seeks, vec![&Call::Seek(0.0)]);
    }

    #[test]
    fn loops_inside_window() {
        let catalog = Catalog::demo();
        let mut ctl = controller();
        ctl.activate(catalog.get("s3").unwrap()).unwrap();
        ctl.on_metadata(240.0).unwrap();
        assert_eq!(
            ctl.window(),
            Some(ClipWindow {
                start: 180.0,
                end: 240.0
            })
        );
        ctl.player.calls.clear();

        ctl.on_time(200.0).unwrap();
        assert!(ctl.player().calls.is_empty());
        ctl.on_time(239.95).unwrap();
        assert_eq!(ctl.player().calls, vec![Call::Seek(180.0)]);
        ctl.player.calls.clear();

        ctl.on_ended().unwrap();
        assert_eq!(ctl.player().calls, vec![Call::Seek(180.0), Call::Play]);
    }

    #[test]
    fn time_updates_before_metadata_do_not_seek() {
        let catalog = Catalog::demo();
        let mut ctl = controller();
        ctl.activate(catalog.get("s1").unwrap()).unwrap();
        ctl.player.calls.clear();
        ctl.on_metadata(f64::NAN).unwrap();
        ctl.on_time(59.99).unwrap();
        assert!(ctl.player().calls.is_empty());
        assert_eq!(ctl.window(), None);
    }

    #[test]
    fn unmute_while_active_forces_play() {
        let catalog = Catalog::demo();
        let mut ctl = controller();
        ctl.activate(catalog.get("s2").unwrap()).unwrap();
        ctl.set_muted(true).unwrap();
        ctl.player.calls.clear();

        ctl.set_muted(false).unwrap();
        assert_eq!(ctl.player().calls, vec![Call::Muted(false), Call::Play]);
        assert!(ctl.is_playing());
    }

    #[test]
    fn deactivate_pauses_and_stays_paused_on_unmute() {
        let catalog = Catalog::demo();
        let mut ctl = controller();
        ctl.activate(catalog.get("s2").unwrap()).unwrap();
        ctl.set_muted(true).unwrap();
        ctl.player.calls.clear();

        ctl.deactivate().unwrap();
        assert_eq!(ctl.player().calls, vec![Call::Pause]);
        assert!(!ctl.is_playing());

        ctl.set_muted(false).unwrap();
        assert_eq!(ctl.player().calls, vec![Call::Pause, Call::Muted(false)]);
    }

    #[test]
    fn reactivating_same_item_does_not_reload() {
        let catalog = Catalog::demo();
        let short = catalog.get("s2").unwrap();
        let mut ctl = controller();
        ctl.activate(short).unwrap();
        ctl.deactivate().unwrap();
        ctl.player.calls.clear();
        ctl.activate(short).unwrap();
        assert_eq!(ctl.player().calls, vec![Call::Play]);
    }
}
