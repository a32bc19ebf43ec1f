use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde_json::{json, Value};

#[cfg(unix)]
use rand::{distributions::Alphanumeric, Rng};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::clip::{Player, PlayerEvent};
use crate::logging::{debug_enabled, debug_log};

const IPC_CONNECT_ATTEMPTS: usize = 40;
const IPC_CONNECT_DELAY: Duration = Duration::from_millis(50);

const OBSERVE_DURATION: u64 = 1;
const OBSERVE_TIME_POS: u64 = 2;
const OBSERVE_EOF: u64 = 3;

/// Used when playback is disabled or mpv cannot be started. The feed still
/// works; nothing plays.
#[derive(Debug, Default)]
pub struct NullPlayer;

impl Player for NullPlayer {
    fn load(&mut self, location: &str, _native_loop: bool) -> Result<()> {
        debug_log(format!("null player: load {location}"));
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, _seconds: f64) -> Result<()> {
        Ok(())
    }

    fn set_muted(&mut self, _muted: bool) -> Result<()> {
        Ok(())
    }
}

pub struct MpvLaunchOptions<'a> {
    pub mpv_path: &'a str,
    pub title: &'a str,
    pub muted: bool,
}

/// A long-lived mpv window driven over its JSON IPC socket. Property changes
/// come back as [`PlayerEvent`]s on [`MpvPlayer::events`].
pub struct MpvPlayer {
    child: Option<Child>,
    #[cfg(unix)]
    writer: UnixStream,
    ipc_path: String,
    events: Receiver<PlayerEvent>,
    reader: Option<thread::JoinHandle<()>>,
}

impl MpvPlayer {
    #[cfg(unix)]
    pub fn spawn(opts: MpvLaunchOptions<'_>) -> Result<Self> {
        let ipc_path = unique_ipc_path();
        cleanup_ipc_path(&ipc_path);

        let mut args = vec![
            "--idle=yes".to_string(),
            "--force-window=yes".to_string(),
            "--keep-open=yes".to_string(),
            "--really-quiet".to_string(),
            "--terminal=no".to_string(),
            "--input-terminal=no".to_string(),
            "--no-config".to_string(),
            "--ytdl=no".to_string(),
            format!("--input-ipc-server={ipc_path}"),
        ];
        if opts.muted {
            args.push("--mute=yes".to_string());
        }
        if !opts.title.is_empty() {
            args.push(format!("--title={}", opts.title));
        }
        if debug_enabled() {
            debug_log(format!("mpv args: {:?}", args));
        }

        let mut child = Command::new(opts.mpv_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch {}", opts.mpv_path))?;

        let stream = match connect_ipc(&ipc_path) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                cleanup_ipc_path(&ipc_path);
                return Err(err);
            }
        };
        let read_half = stream.try_clone().context("clone mpv IPC socket")?;
        let (tx, events) = unbounded();
        let reader = thread::spawn(move || read_events(read_half, tx));

        let mut player = Self {
            child: Some(child),
            writer: stream,
            ipc_path,
            events,
            reader: Some(reader),
        };
        player.send(json!(["observe_property", OBSERVE_DURATION, "duration"]))?;
        player.send(json!(["observe_property", OBSERVE_TIME_POS, "time-pos"]))?;
        player.send(json!(["observe_property", OBSERVE_EOF, "eof-reached"]))?;
        Ok(player)
    }

    #[cfg(not(unix))]
    pub fn spawn(_opts: MpvLaunchOptions<'_>) -> Result<Self> {
        Err(anyhow!("mpv IPC playback is not supported on this platform"))
    }

    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events.clone()
    }

    #[cfg(unix)]
    fn send(&mut self, command: Value) -> Result<()> {
        let payload = json!({ "command": command });
        let serialized = serde_json::to_string(&payload).context("serialize mpv command")?;
        debug_log(format!("mpv <- {serialized}"));
        self.writer
            .write_all(serialized.as_bytes())
            .context("write mpv IPC command")?;
        self.writer
            .write_all(b"\n")
            .context("write mpv IPC command terminator")?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn send(&mut self, _command: Value) -> Result<()> {
        Err(anyhow!("mpv IPC playback is not supported on this platform"))
    }

    fn shutdown(&mut self) {
        let _ = self.send(json!(["quit"]));
        if let Some(mut child) = self.child.take() {
            for _ in 0..IPC_CONNECT_ATTEMPTS {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    break;
                }
                thread::sleep(IPC_CONNECT_DELAY);
            }
            let _ = child.kill();
            let _ = child.wait();
        }
        #[cfg(unix)]
        let _ = self.writer.shutdown(std::net::Shutdown::Both);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        cleanup_ipc_path(&self.ipc_path);
    }
}

impl Player for MpvPlayer {
    fn load(&mut self, location: &str, native_loop: bool) -> Result<()> {
        let looping = if native_loop { "inf" } else { "no" };
        self.send(json!(["set_property", "loop-file", looping]))?;
        self.send(json!(["loadfile", location, "replace"]))
    }

    fn play(&mut self) -> Result<()> {
        self.send(json!(["set_property", "pause", false]))
    }

    fn pause(&mut self) -> Result<()> {
        self.send(json!(["set_property", "pause", true]))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.send(json!(["seek", seconds, "absolute"]))
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.send(json!(["set_property", "mute", muted]))
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(unix)]
fn connect_ipc(path: &str) -> Result<UnixStream> {
    let mut last_err = None;
    for _ in 0..IPC_CONNECT_ATTEMPTS {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                last_err = Some(err);
                thread::sleep(IPC_CONNECT_DELAY);
            }
        }
    }
    match last_err {
        Some(err) => Err(anyhow!(err)).context(format!("connect to mpv IPC socket {path}")),
        None => Err(anyhow!("connect to mpv IPC socket {path}")),
    }
}

#[cfg(unix)]
fn read_events(stream: UnixStream, tx: Sender<PlayerEvent>) {
    let reader = BufReader::new(stream);
    for line in reader.lines().map_while(Result::ok) {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            debug_log(format!("mpv -> unparsable: {line}"));
            continue;
        };
        if let Some(event) = parse_event(&message) {
            if tx.send(event).is_err() {
                return;
            }
        }
    }
    let _ = tx.send(PlayerEvent::Exited);
}

/// Translates one mpv IPC message into a player event.
fn parse_event(message: &Value) -> Option<PlayerEvent> {
    match message.get("event")?.as_str()? {
        "property-change" => {
            let data = message.get("data")?;
            match message.get("name")?.as_str()? {
                "duration" => Some(PlayerEvent::MetadataLoaded {
                    duration: data.as_f64()?,
                }),
                "time-pos" => Some(PlayerEvent::TimeUpdate {
                    position: data.as_f64()?,
                }),
                "eof-reached" if data.as_bool()? => Some(PlayerEvent::Ended),
                _ => None,
            }
        }
        "shutdown" => Some(PlayerEvent::Exited),
        _ => None,
    }
}

/// Drains every queued player event without blocking.
pub fn drain_events(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    out
}

/// Plays a recorded reply on loop in its own mpv window until stopped.
pub struct PreviewSession {
    child: Child,
}

impl PreviewSession {
    pub fn spawn(mpv_path: &str, file: &Path) -> Result<Self> {
        let child = Command::new(mpv_path)
            .arg(file)
            .arg("--force-window=yes")
            .arg("--loop-file=inf")
            .arg("--really-quiet")
            .arg("--no-config")
            .arg("--title=Your 7s reply")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch mpv preview for {}", file.display()))?;
        Ok(Self { child })
    }

    pub fn stop(mut self) {
        self.kill();
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn unique_ipc_path() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("shorts-tui-mpv-{}-{suffix}.sock", std::process::id()));
    path.to_string_lossy().to_string()
}

fn cleanup_ipc_path(path: &str) {
    if path.is_empty() {
        return;
    }
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug_log(format!("failed to remove mpv ipc path {path}: {err}"));
        }
    }
}
