use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use tempfile::TempPath;

use crate::logging::debug_log;

pub const REPLY_DURATION: Duration = Duration::from_secs(7);

const CAPTURE_POLL: Duration = Duration::from_millis(50);
const ACCESS_PROBE: Duration = Duration::from_millis(400);
const FINISH_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            duration: REPLY_DURATION,
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0}")]
    AccessDenied(String),
    #[error("Capture device unavailable: {0}")]
    Unavailable(String),
    #[error("Recording failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A recorded reply on local disk. The file is deleted when this is dropped.
#[derive(Debug)]
pub struct ReplyArtifact {
    path: TempPath,
    mime: String,
    duration: Duration,
}

impl ReplyArtifact {
    pub fn new(path: TempPath, mime: impl Into<String>, duration: Duration) -> Self {
        Self {
            path,
            mime: mime.into(),
            duration,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Camera + microphone source.
pub trait CaptureDevice: Send + Sync {
    /// Acquires the device and starts recording.
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// A running recording that holds the device until finished or released.
pub trait CaptureSession: Send {
    /// True once the device stopped recording on its own.
    fn has_stopped(&mut self) -> bool;
    /// Stops recording, frees the device and returns what was captured.
    fn finish(self: Box<Self>) -> Result<ReplyArtifact, CaptureError>;
    /// Frees the device and discards anything captured.
    fn release(self: Box<Self>);
}

#[derive(Debug)]
pub enum CaptureEvent {
    Started,
    Failed(CaptureError),
    Finished(ReplyArtifact),
    Cancelled,
}

/// Runs one recording on a worker thread. Dropping the task cancels the
/// recording and waits for the device to be released.
pub struct CaptureTask {
    cancel_tx: Sender<()>,
    events: Receiver<CaptureEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureTask {
    pub fn spawn(device: Arc<dyn CaptureDevice>, request: CaptureRequest) -> Self {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let (event_tx, events) = unbounded();
        let handle = thread::spawn(move || run_capture(device, request, cancel_rx, event_tx));
        Self {
            cancel_tx,
            events,
            handle: Some(handle),
        }
    }

    pub fn try_event(&mut self) -> Option<CaptureEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                None
            }
        }
    }

    pub fn cancel(self) {
        drop(self);
    }

    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.cancel_tx.try_send(());
            self.finalize();
        }
    }
}

fn run_capture(
    device: Arc<dyn CaptureDevice>,
    request: CaptureRequest,
    cancel_rx: Receiver<()>,
    events: Sender<CaptureEvent>,
) {
    let cancelled = |rx: &Receiver<()>| !matches!(rx.try_recv(), Err(TryRecvError::Empty));

    if cancelled(&cancel_rx) {
        let _ = events.send(CaptureEvent::Cancelled);
        return;
    }

    let mut session = match device.open(&request) {
        Ok(session) => session,
        Err(err) => {
            debug_log(format!("capture: open failed: {err}"));
            let _ = events.send(CaptureEvent::Failed(err));
            return;
        }
    };

    if cancelled(&cancel_rx) {
        session.release();
        let _ = events.send(CaptureEvent::Cancelled);
        return;
    }

    debug_log(format!("capture: recording for {:?}", request.duration));
    let _ = events.send(CaptureEvent::Started);
    let deadline = Instant::now() + request.duration;

    loop {
        crossbeam_channel::select! {
            recv(cancel_rx) -> _ => {
                debug_log("capture: cancelled");
                session.release();
                let _ = events.send(CaptureEvent::Cancelled);
                return;
            }
            default(CAPTURE_POLL) => {}
        }
        if session.has_stopped() || Instant::now() >= deadline {
            break;
        }
    }

    let event = match session.finish() {
        Ok(artifact) => {
            debug_log(format!("capture: finished {}", artifact.path().display()));
            CaptureEvent::Finished(artifact)
        }
        Err(err) => CaptureEvent::Failed(err),
    };
    let _ = events.send(event);
}

/// Records camera and microphone through an ffmpeg command line.
#[derive(Debug, Clone)]
pub struct FfmpegCapture {
    pub ffmpeg_path: String,
    pub args: Vec<String>,
    pub mime: String,
    pub output_dir: Option<PathBuf>,
}

pub fn default_ffmpeg_args() -> Vec<String> {
    let input: &[&str] = if cfg!(target_os = "macos") {
        &["-f", "avfoundation", "-framerate", "30", "-i", "0:0"]
    } else {
        &[
            "-f",
            "v4l2",
            "-video_size",
            "%WIDTH%x%HEIGHT%",
            "-i",
            "/dev/video0",
            "-f",
            "alsa",
            "-i",
            "default",
        ]
    };
    // No -nostdin: the session stops ffmpeg by writing `q` to its stdin.
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(input.iter().map(|s| s.to_string()));
    args.extend(
        [
            "-t",
            "%DURATION%",
            "-c:v",
            "libvpx-vp9",
            "-b:v",
            "2500k",
            "-c:a",
            "libopus",
            "-y",
            "%OUTPUT%",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

impl Default for FfmpegCapture {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            args: default_ffmpeg_args(),
            mime: "video/webm".to_string(),
            output_dir: None,
        }
    }
}

impl FfmpegCapture {
    fn expand_args(&self, request: &CaptureRequest, output: &Path) -> Vec<String> {
        let duration = format!("{:.3}", request.duration.as_secs_f64());
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("%DURATION%", &duration)
                    .replace("%OUTPUT%", &output)
                    .replace("%WIDTH%", &request.width.to_string())
                    .replace("%HEIGHT%", &request.height.to_string())
            })
            .collect()
    }

    fn temp_output(&self) -> Result<TempPath, CaptureError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("shorts-reply-").suffix(".webm");
        let file = match &self.output_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.into_temp_path())
    }
}

impl CaptureDevice for FfmpegCapture {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let output = self.temp_output()?;
        let args = self.expand_args(request, &output);
        debug_log(format!("capture: {} {:?}", self.ffmpeg_path, args));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => {
                    CaptureError::Unavailable(format!("{} not found", self.ffmpeg_path))
                }
                ErrorKind::PermissionDenied => CaptureError::AccessDenied(err.to_string()),
                _ => CaptureError::Io(err),
            })?;

        // Device and permission problems make ffmpeg exit almost immediately.
        let probe_until = Instant::now() + ACCESS_PROBE;
        while Instant::now() < probe_until {
            if let Some(status) = child.try_wait()? {
                if !status.success() {
                    let reason = stderr_tail(&mut child)
                        .unwrap_or_else(|| format!("ffmpeg exited with {status}"));
                    return Err(CaptureError::AccessDenied(reason));
                }
                break;
            }
            thread::sleep(CAPTURE_POLL);
        }

        Ok(Box::new(FfmpegSession {
            child: Some(child),
            output: Some(output),
            mime: self.mime.clone(),
            duration: request.duration,
            started: Instant::now(),
        }))
    }
}

struct FfmpegSession {
    child: Option<Child>,
    output: Option<TempPath>,
    mime: String,
    duration: Duration,
    started: Instant,
}

impl FfmpegSession {
    fn stop_child(&mut self, graceful: bool) -> Option<std::process::ExitStatus> {
        let mut child = self.child.take()?;
        if graceful {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(b"q");
            }
            let grace_until = Instant::now() + FINISH_GRACE;
            while Instant::now() < grace_until {
                match child.try_wait() {
                    Ok(Some(status)) => return Some(status),
                    Ok(None) => thread::sleep(CAPTURE_POLL),
                    Err(_) => break,
                }
            }
        }
        let _ = child.kill();
        child.wait().ok()
    }
}

impl CaptureSession for FfmpegSession {
    fn has_stopped(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => true,
        }
    }

    fn finish(mut self: Box<Self>) -> Result<ReplyArtifact, CaptureError> {
        let status = self.stop_child(true);
        let output = self
            .output
            .take()
            .ok_or_else(|| CaptureError::Failed("output already released".into()))?;
        let written = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            let reason = status
                .map(|s| format!("ffmpeg exited with {s}"))
                .unwrap_or_else(|| "no data recorded".to_string());
            return Err(CaptureError::Failed(reason));
        }
        let recorded = self.started.elapsed().min(self.duration);
        Ok(ReplyArtifact::new(output, self.mime.clone(), recorded))
    }

    fn release(mut self: Box<Self>) {
        self.stop_child(false);
        self.output.take();
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.stop_child(false);
    }
}

fn stderr_tail(child: &mut Child) -> Option<String> {
    let mut stderr = child.stderr.take()?;
    let mut buf = String::new();
    stderr.read_to_string(&mut buf).ok()?;
    buf.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeDevice {
        fail: bool,
        opened: AtomicUsize,
        released: Arc<AtomicBool>,
    }

    struct FakeSession {
        released: Arc<AtomicBool>,
    }

    impl CaptureDevice for FakeDevice {
        fn open(&self, _request: &CaptureRequest) -> Result<Box<dyn CaptureSession>, CaptureError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CaptureError::AccessDenied("Permission denied".into()));
            }
            Ok(Box::new(FakeSession {
                released: self.released.clone(),
            }))
        }
    }

    impl CaptureSession for FakeSession {
        fn has_stopped(&mut self) -> bool {
            false
        }

        fn finish(self: Box<Self>) -> Result<ReplyArtifact, CaptureError> {
            self.released.store(true, Ordering::SeqCst);
            let file = tempfile::NamedTempFile::new()?;
            Ok(ReplyArtifact::new(
                file.into_temp_path(),
                "video/webm",
                Duration::from_millis(20),
            ))
        }

        fn release(self: Box<Self>) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn device(fail: bool) -> (Arc<FakeDevice>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let device = Arc::new(FakeDevice {
            fail,
            opened: AtomicUsize::new(0),
            released: released.clone(),
        });
        (device, released)
    }

    fn wait_event(task: &mut CaptureTask) -> CaptureEvent {
        let until = Instant::now() + Duration::from_secs(5);
        while Instant::now() < until {
            if let Some(event) = task.try_event() {
                return event;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("no capture event");
    }

    fn short_request() -> CaptureRequest {
        CaptureRequest {
            duration: Duration::from_millis(30),
            ..CaptureRequest::default()
        }
    }

    #[test]
    fn finishes_after_duration() {
        let (device, released) = device(false);
        let mut task = CaptureTask::spawn(device.clone(), short_request());
        assert!(matches!(wait_event(&mut task), CaptureEvent::Started));
        match wait_event(&mut task) {
            CaptureEvent::Finished(artifact) => {
                assert_eq!(artifact.mime(), "video/webm");
                assert!(artifact.path().exists());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(device.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn access_failure_is_reported() {
        let (device, _) = device(true);
        let mut task = CaptureTask::spawn(device, short_request());
        match wait_event(&mut task) {
            CaptureEvent::Failed(CaptureError::AccessDenied(msg)) => {
                assert_eq!(msg, "Permission denied")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn drop_releases_device() {
        let (device, released) = device(false);
        let mut task = CaptureTask::spawn(
            device,
            CaptureRequest {
                duration: Duration::from_secs(60),
                ..CaptureRequest::default()
            },
        );
        assert!(matches!(wait_event(&mut task), CaptureEvent::Started));
        task.cancel();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn artifact_file_removed_on_drop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let artifact = ReplyArtifact::new(file.into_temp_path(), "video/webm", REPLY_DURATION);
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn expands_placeholders() {
        let capture = FfmpegCapture {
            args: vec![
                "-video_size".into(),
                "%WIDTH%x%HEIGHT%".into(),
                "-t".into(),
                "%DURATION%".into(),
                "%OUTPUT%".into(),
            ],
            ..FfmpegCapture::default()
        };
        let args = capture.expand_args(&CaptureRequest::default(), Path::new("/tmp/out.webm"));
        assert_eq!(args, vec!["-video_size", "640x480", "-t", "7.000", "/tmp/out.webm"]);
    }

    #[test]
    fn missing_ffmpeg_is_unavailable() {
        let capture = FfmpegCapture {
            ffmpeg_path: "/nonexistent/shorts-tui-ffmpeg".into(),
            ..FfmpegCapture::default()
        };
        match capture.open(&CaptureRequest::default()) {
            Err(CaptureError::Unavailable(msg)) => assert!(msg.contains("not found")),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("ffmpeg should not start"),
        }
    }
}
