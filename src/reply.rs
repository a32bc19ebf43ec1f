use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{CaptureDevice, CaptureEvent, CaptureRequest, CaptureTask, ReplyArtifact};
use crate::logging::debug_log;
use crate::tier::{EntitlementStore, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStep {
    /// No credits left; the viewer has to pick a tier first.
    Upgrade,
    Record,
    Capturing,
    Success,
}

/// State of the "reply with a short" modal. At most one exists at a time;
/// closing or dropping it stops any recording in progress.
pub struct ReplyFlow {
    parent_id: String,
    step: ReplyStep,
    error: Option<String>,
    request: CaptureRequest,
    countdown_started: Option<Instant>,
    device_live: bool,
    task: Option<CaptureTask>,
}

impl ReplyFlow {
    pub fn open(parent_id: impl Into<String>, store: &EntitlementStore, request: CaptureRequest) -> Self {
        let step = if store.can_reply() {
            ReplyStep::Record
        } else {
            ReplyStep::Upgrade
        };
        let parent_id = parent_id.into();
        debug_log(format!("reply: open for {parent_id} at {step:?}"));
        Self {
            parent_id,
            step,
            error: None,
            request,
            countdown_started: None,
            device_live: false,
            task: None,
        }
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn step(&self) -> ReplyStep {
        self.step
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.step == ReplyStep::Capturing
    }

    /// True once the device granted access and frames are being recorded.
    pub fn device_live(&self) -> bool {
        self.device_live
    }

    /// Whole seconds left on the countdown while capturing.
    pub fn countdown(&self, now: Instant) -> Option<u64> {
        let started = self.countdown_started?;
        let left = self
            .request
            .duration
            .saturating_sub(now.saturating_duration_since(started));
        Some(ceil_secs(left))
    }

    pub fn select_tier(&mut self, tier: Tier, store: &mut EntitlementStore) -> bool {
        if self.step != ReplyStep::Upgrade {
            return false;
        }
        store.set_tier(tier);
        self.step = ReplyStep::Record;
        true
    }

    /// Starts a recording. Falls back to the upgrade screen without touching
    /// the device when no credits are left.
    pub fn start_recording(
        &mut self,
        store: &EntitlementStore,
        device: Arc<dyn CaptureDevice>,
        now: Instant,
    ) -> bool {
        if self.step != ReplyStep::Record {
            return false;
        }
        if !store.can_reply() {
            self.step = ReplyStep::Upgrade;
            return false;
        }
        self.error = None;
        self.step = ReplyStep::Capturing;
        self.countdown_started = Some(now);
        self.device_live = false;
        self.task = Some(CaptureTask::spawn(device, self.request.clone()));
        true
    }

    /// Drains capture events. Returns the recorded artifact once, when the
    /// recording completes and its credit has been spent.
    pub fn poll(&mut self, store: &mut EntitlementStore) -> Option<ReplyArtifact> {
        loop {
            let event = self.task.as_mut()?.try_event()?;
            match event {
                CaptureEvent::Started => {
                    self.device_live = true;
                }
                CaptureEvent::Failed(err) => {
                    debug_log(format!("reply: capture failed: {err}"));
                    self.error = Some(err.to_string());
                    self.stop_task();
                    self.step = ReplyStep::Record;
                    return None;
                }
                CaptureEvent::Cancelled => {
                    self.stop_task();
                    self.step = ReplyStep::Record;
                    return None;
                }
                CaptureEvent::Finished(artifact) => {
                    self.stop_task();
                    if !store.consume_credit() {
                        debug_log("reply: recorded without a credit to spend");
                    }
                    self.step = ReplyStep::Success;
                    return Some(artifact);
                }
            }
        }
    }

    pub fn close(&mut self) {
        if self.task.is_some() {
            debug_log(format!("reply: closing {} mid-recording", self.parent_id));
        }
        self.stop_task();
        if self.step == ReplyStep::Capturing {
            self.step = ReplyStep::Record;
        }
    }

    fn stop_task(&mut self) {
        self.countdown_started = None;
        self.device_live = false;
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }
}

impl Drop for ReplyFlow {
    fn drop(&mut self) {
        self.stop_task();
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CaptureSession};
    use crate::tier::{Credits, Viewer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct CountingDevice {
        opened: AtomicUsize,
        deny: bool,
    }

    struct InstantSession;

    impl CaptureSession for InstantSession {
        fn has_stopped(&mut self) -> bool {
            true
        }

        fn finish(self: Box<Self>) -> Result<ReplyArtifact, CaptureError> {
            let file = tempfile::NamedTempFile::new()?;
            Ok(ReplyArtifact::new(
                file.into_temp_path(),
                "video/webm",
                Duration::from_millis(1),
            ))
        }

        fn release(self: Box<Self>) {}
    }

    impl CaptureDevice for CountingDevice {
        fn open(&self, _request: &CaptureRequest) -> Result<Box<dyn CaptureSession>, CaptureError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.deny {
                return Err(CaptureError::AccessDenied("Permission denied".into()));
            }
            Ok(Box::new(InstantSession))
        }
    }

    fn request() -> CaptureRequest {
        CaptureRequest {
            duration: Duration::from_millis(20),
            ..CaptureRequest::default()
        }
    }

    fn poll_until_settled(flow: &mut ReplyFlow, store: &mut EntitlementStore) -> Option<ReplyArtifact> {
        let until = Instant::now() + Duration::from_secs(5);
        while Instant::now() < until {
            if let Some(artifact) = flow.poll(store) {
                return Some(artifact);
            }
            if !flow.is_recording() {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("capture did not settle");
    }

    #[test]
    fn opens_on_upgrade_without_credits() {
        let mut store = EntitlementStore::default();
        for _ in 0..3 {
            store.consume_credit();
        }
        let flow = ReplyFlow::open("s1", &store, request());
        assert_eq!(flow.step(), ReplyStep::Upgrade);
    }

    #[test]
    fn tier_choice_moves_to_record() {
        let mut store = EntitlementStore::new(Viewer {
            credits: Credits::Limited(0),
            ..Viewer::default()
        });
        let mut flow = ReplyFlow::open("s1", &store, request());
        assert!(flow.select_tier(Tier::Plus, &mut store));
        assert_eq!(flow.step(), ReplyStep::Record);
        assert_eq!(store.credits(), Credits::Limited(30));
        assert!(!flow.select_tier(Tier::Free, &mut store));
    }

    #[test]
    fn successful_recording_spends_one_credit() {
        let mut store = EntitlementStore::default();
        let device = Arc::new(CountingDevice::default());
        let mut flow = ReplyFlow::open("s1", &store, request());
        let now = Instant::now();
        assert!(flow.start_recording(&store, device.clone(), now));
        assert_eq!(flow.step(), ReplyStep::Capturing);
        assert_eq!(flow.countdown(now), Some(1));

        let artifact = poll_until_settled(&mut flow, &mut store).expect("artifact");
        assert!(artifact.path().exists());
        assert_eq!(flow.step(), ReplyStep::Success);
        assert_eq!(store.credits(), Credits::Limited(2));
        assert_eq!(flow.countdown(Instant::now()), None);
        assert_eq!(device.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_access_returns_to_record_with_error() {
        let mut store = EntitlementStore::default();
        let device = Arc::new(CountingDevice {
            deny: true,
            ..CountingDevice::default()
        });
        let mut flow = ReplyFlow::open("s1", &store, request());
        assert!(flow.start_recording(&store, device.clone(), Instant::now()));
        assert!(poll_until_settled(&mut flow, &mut store).is_none());
        assert_eq!(flow.step(), ReplyStep::Record);
        assert_eq!(flow.error(), Some("Permission denied"));
        assert_eq!(store.credits(), Credits::Limited(3));

        assert!(flow.start_recording(&store, device, Instant::now()));
        assert_eq!(flow.error(), None);
        assert!(flow.is_recording());
    }

    #[test]
    fn start_rechecks_entitlement() {
        let mut store = EntitlementStore::default();
        let device = Arc::new(CountingDevice::default());
        let mut flow = ReplyFlow::open("s1", &store, request());
        for _ in 0..3 {
            store.consume_credit();
        }
        assert!(!flow.start_recording(&store, device.clone(), Instant::now()));
        assert_eq!(flow.step(), ReplyStep::Upgrade);
        assert_eq!(device.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_mid_recording_stops_capture() {
        let store = EntitlementStore::default();
        let device = Arc::new(CountingDevice::default());
        let mut flow = ReplyFlow::open("s1", &store, request());
        flow.start_recording(&store, device, Instant::now());
        flow.close();
        assert_eq!(flow.step(), ReplyStep::Record);
        assert_eq!(flow.countdown(Instant::now()), None);
        assert!(!flow.is_recording());
    }

    #[test]
    fn countdown_rounds_up() {
        let store = EntitlementStore::default();
        let mut flow = ReplyFlow::open("s1", &store, CaptureRequest::default());
        let t0 = Instant::now();
        flow.countdown_started = Some(t0);
        assert_eq!(flow.countdown(t0), Some(7));
        assert_eq!(flow.countdown(t0 + Duration::from_millis(1500)), Some(6));
        assert_eq!(flow.countdown(t0 + Duration::from_secs(9)), Some(0));
    }
}
