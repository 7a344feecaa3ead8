use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::source::{DisplaySource, FrameStream};
use crate::capture::types::ScreenCapture;
use crate::errors::{PilotError, PilotResult};

/// Takes single-frame captures and holds the most recent one.
pub struct CaptureController {
    source: Arc<dyn DisplaySource>,
    current: Mutex<Option<Arc<ScreenCapture>>>,
    live: AtomicBool,
}

/// Stops the stream and releases the live slot however `capture` exits,
/// including when its future is dropped mid-await.
struct LiveStream<'a> {
    stream: Option<Box<dyn FrameStream>>,
    live: &'a AtomicBool,
}

impl Drop for LiveStream<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.stop();
            tracing::debug!(
                active_tracks = stream.active_tracks(),
                "capture stream stopped"
            );
        }
        self.live.store(false, Ordering::SeqCst);
    }
}

impl CaptureController {
    pub fn new(source: Arc<dyn DisplaySource>) -> Self {
        Self {
            source,
            current: Mutex::new(None),
            live: AtomicBool::new(false),
        }
    }

    /// Requests a share, rasterizes the first frame, and tears the stream
    /// down before returning. On success the new capture replaces the held one.
    pub async fn capture(&self) -> PilotResult<Arc<ScreenCapture>> {
        if self
            .live
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("capture requested while another stream is live");
            return Err(PilotError::CaptureBusy);
        }
        let mut guard = LiveStream {
            stream: None,
            live: &self.live,
        };

        tracing::info!("requesting screen share");
        let stream = self.source.request_share().await.map_err(as_permission_error)?;
        let stream = guard.stream.insert(stream);
        let monitor_index = stream.monitor_index();
        let frame = stream.next_frame().await.map_err(as_permission_error)?;
        drop(guard);

        let shot = Arc::new(
            ScreenCapture::rasterize(frame, monitor_index).map_err(as_permission_error)?,
        );
        tracing::info!(
            monitor = monitor_index,
            width = shot.meta().physical_width,
            height = shot.meta().physical_height,
            "screen captured"
        );
        *self.lock_current() = Some(shot.clone());
        Ok(shot)
    }

    /// The most recent successful capture, if any.
    pub fn current(&self) -> Option<Arc<ScreenCapture>> {
        self.lock_current().clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<Arc<ScreenCapture>>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Device failures during a share surface to the user as a permission problem.
fn as_permission_error(err: PilotError) -> PilotError {
    match err {
        PilotError::PermissionDenied(_) | PilotError::NoActiveDisplay => err,
        other => {
            tracing::warn!(error = %other, "screen share failed");
            PilotError::PermissionDenied(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::RawFrame;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;
    use tokio::sync::Notify;

    /// Shared track counter so tests can observe the stream after it is gone.
    #[derive(Default)]
    struct Tracks {
        active: AtomicUsize,
        opened: AtomicUsize,
    }

    enum Behaviour {
        Frame,
        Deny,
        FrameError,
        ShortFrame,
        Hang(Arc<Notify>),
    }

    struct FakeSource {
        tracks: Arc<Tracks>,
        behaviour: Behaviour,
    }

    struct FakeStream {
        tracks: Arc<Tracks>,
        running: bool,
        fail: bool,
        short: bool,
        hang: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl DisplaySource for FakeSource {
        async fn request_share(&self) -> PilotResult<Box<dyn FrameStream>> {
            let (fail, short, hang) = match &self.behaviour {
                Behaviour::Deny => {
                    return Err(PilotError::PermissionDenied("user dismissed picker".into()))
                }
                Behaviour::Frame => (false, false, None),
                Behaviour::FrameError => (true, false, None),
                Behaviour::ShortFrame => (false, true, None),
                Behaviour::Hang(n) => (false, false, Some(n.clone())),
            };
            self.tracks.active.fetch_add(1, Ordering::SeqCst);
            self.tracks.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                tracks: self.tracks.clone(),
                running: true,
                fail,
                short,
                hang,
            }))
        }
    }

    #[async_trait]
    impl FrameStream for FakeStream {
        async fn next_frame(&mut self) -> PilotResult<RawFrame> {
            if let Some(hang) = &self.hang {
                hang.notify_one();
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(PilotError::Io(std::io::Error::other("device lost")));
            }
            Ok(RawFrame {
                width: 2,
                height: 2,
                rgba: vec![128; if self.short { 3 } else { 16 }],
            })
        }

        fn active_tracks(&self) -> usize {
            usize::from(self.running)
        }

        fn stop(&mut self) {
            if self.running {
                self.running = false;
                self.tracks.active.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn controller(behaviour: Behaviour) -> (CaptureController, Arc<Tracks>) {
        let tracks = Arc::new(Tracks::default());
        let source = FakeSource {
            tracks: tracks.clone(),
            behaviour,
        };
        (CaptureController::new(Arc::new(source)), tracks)
    }

    #[tokio::test]
    async fn capture_stops_stream_after_one_frame() {
        let (ctrl, tracks) = controller(Behaviour::Frame);
        let shot = ctrl.capture().await.unwrap();
        assert_eq!(shot.meta().physical_width, 2);
        assert_eq!(tracks.active.load(Ordering::SeqCst), 0);
        assert!(!ctrl.is_capturing());
    }

    #[tokio::test]
    async fn frame_failure_stops_stream_and_reports_permission() {
        let (ctrl, tracks) = controller(Behaviour::FrameError);
        let err = ctrl.capture().await.unwrap_err();
        assert!(matches!(err, PilotError::PermissionDenied(_)));
        assert_eq!(tracks.opened.load(Ordering::SeqCst), 1);
        assert_eq!(tracks.active.load(Ordering::SeqCst), 0);
        assert!(ctrl.current().is_none());
    }

    #[tokio::test]
    async fn unrasterizable_frame_reports_permission() {
        let (ctrl, tracks) = controller(Behaviour::ShortFrame);
        let err = ctrl.capture().await.unwrap_err();
        assert!(matches!(err, PilotError::PermissionDenied(_)));
        assert_eq!(tracks.active.load(Ordering::SeqCst), 0);
        assert!(!ctrl.is_capturing());
        assert!(ctrl.current().is_none());
    }

    #[tokio::test]
    async fn denied_share_keeps_previous_capture() {
        let (ctrl, _) = controller(Behaviour::Deny);
        assert!(matches!(
            ctrl.capture().await,
            Err(PilotError::PermissionDenied(_))
        ));
        assert!(ctrl.current().is_none());
    }

    #[tokio::test]
    async fn aborted_capture_still_stops_stream() {
        let started = Arc::new(Notify::new());
        let (ctrl, tracks) = controller(Behaviour::Hang(started.clone()));
        let ctrl = Arc::new(ctrl);

        let task = tokio::spawn({
            let ctrl = ctrl.clone();
            async move { ctrl.capture().await }
        });
        started.notified().await;
        assert_eq!(tracks.active.load(Ordering::SeqCst), 1);
        assert!(matches!(ctrl.capture().await, Err(PilotError::CaptureBusy)));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(tracks.active.load(Ordering::SeqCst), 0);
        assert!(!ctrl.is_capturing());
    }

    #[tokio::test]
    async fn only_latest_capture_is_retained() {
        let (ctrl, _) = controller(Behaviour::Frame);
        let mut earlier: Vec<Weak<ScreenCapture>> = Vec::new();
        for _ in 0..3 {
            let shot = ctrl.capture().await.unwrap();
            earlier.push(Arc::downgrade(&shot));
        }
        let latest = ctrl.current().unwrap();
        let live: Vec<_> = earlier.iter().filter_map(Weak::upgrade).collect();
        assert_eq!(live.len(), 1);
        assert!(Arc::ptr_eq(&live[0], &latest));
    }
}
