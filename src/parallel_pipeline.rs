// THEORY:
// `parallel_pipeline` decouples frame acquisition from tracking without giving up
// frame-sequential state. A single worker task owns the `PupilTracker`; nobody else
// can touch its `TrackingState`.
//
// - Frames go in through a `watch` slot of depth one. If the worker is still busy
//   when new frames arrive, the older unprocessed frame is overwritten: the worker
//   always picks up the newest frame and never sees frames out of order. Stale
//   frames would only produce stale lock verdicts.
// - Calibration and settings requests travel as messages with a `oneshot` reply,
//   and are handled between frames, so they too are strictly ordered relative to
//   tracking.
// - Reports come back over a bounded `mpsc` channel, exposed as a `Stream`.
//
// The heavy per-frame work runs on the blocking pool; the tracker is moved into the
// blocking closure and handed back with the result.

use crate::core_modules::geometry::ZoomCenter;
use crate::error::{Result, TrackerError};
use crate::pipeline::{Frame, FrameReport, PupilTracker};
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const CONTROL_QUEUE_DEPTH: usize = 8;

/// A frame waiting in the submission slot.
#[derive(Debug)]
pub struct FrameTicket {
    pub frame_id: u64,
    pub frame: Frame,
    pub submitted_at: Instant,
}

/// One processed frame.
#[derive(Debug)]
pub struct TrackedFrame {
    pub frame_id: u64,
    pub report: Result<FrameReport>,
    /// Time from submission to the end of processing.
    pub latency: Duration,
}

pub type ReportStream = BoxStream<'static, TrackedFrame>;

enum Control {
    Lock(oneshot::Sender<Result<(f64, f64)>>),
    Unlock(oneshot::Sender<()>),
    InPosition(oneshot::Sender<bool>),
    SetLockTolerance(f64, oneshot::Sender<Result<()>>),
    SetZoom(f64, Option<ZoomCenter>, oneshot::Sender<Result<()>>),
}

pub struct TrackingWorker {
    tracker: PupilTracker,
    frames: watch::Receiver<Option<Arc<FrameTicket>>>,
    control: mpsc::Receiver<Control>,
    reports: mpsc::Sender<TrackedFrame>,
}

impl TrackingWorker {
    /// Spawns the worker on the current tokio runtime. `report_capacity` bounds
    /// the number of finished reports waiting to be read.
    pub fn spawn(tracker: PupilTracker, report_capacity: usize) -> (WorkerHandle, ReportStream) {
        let (frame_tx, frame_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let (report_tx, report_rx) = mpsc::channel(report_capacity.max(1));

        let worker = TrackingWorker {
            tracker,
            frames: frame_rx,
            control: control_rx,
            reports: report_tx,
        };
        let task = tokio::spawn(worker.run());

        let reports = stream::unfold(report_rx, |mut rx| async move {
            rx.recv().await.map(|report| (report, rx))
        })
        .boxed();

        let handle = WorkerHandle {
            frames: frame_tx,
            control: control_tx,
            next_frame_id: 0,
            task,
        };
        (handle, reports)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(message) = self.control.recv() => self.handle_control(message),
                changed = self.frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let ticket = self.frames.borrow_and_update().clone();
                    let Some(ticket) = ticket else { continue };
                    if !self.track(ticket).await {
                        break;
                    }
                }
                else => break,
            }
        }
        debug!("Tracking worker stopped");
    }

    fn handle_control(&mut self, message: Control) {
        // A dropped reply receiver only means the caller stopped waiting.
        match message {
            Control::Lock(reply) => {
                let _ = reply.send(self.tracker.lock_current_position());
            }
            Control::Unlock(reply) => {
                self.tracker.unlock();
                let _ = reply.send(());
            }
            Control::InPosition(reply) => {
                let _ = reply.send(self.tracker.is_eye_in_position());
            }
            Control::SetLockTolerance(radius, reply) => {
                let _ = reply.send(self.tracker.set_lock_tolerance(radius));
            }
            Control::SetZoom(factor, center, reply) => {
                let _ = reply.send(self.tracker.set_zoom(factor, center));
            }
        }
    }

    /// Processes one ticket. Returns `false` once nobody listens for reports.
    async fn track(&mut self, ticket: Arc<FrameTicket>) -> bool {
        // A default tracker stands in while the real one is on the blocking pool.
        let tracker = std::mem::take(&mut self.tracker);
        let job = Arc::clone(&ticket);
        let joined = tokio::task::spawn_blocking(move || {
            let mut tracker = tracker;
            let report = tracker.process_frame(&job.frame);
            (tracker, report)
        })
        .await;

        let (tracker, report) = match joined {
            Ok(done) => done,
            Err(err) => {
                warn!("Tracking job for frame {} failed: {err}", ticket.frame_id);
                return false;
            }
        };
        self.tracker = tracker;

        let tracked = TrackedFrame {
            frame_id: ticket.frame_id,
            report,
            latency: ticket.submitted_at.elapsed(),
        };
        self.reports.send(tracked).await.is_ok()
    }
}

/// Submission and control side of a running `TrackingWorker`.
pub struct WorkerHandle {
    frames: watch::Sender<Option<Arc<FrameTicket>>>,
    control: mpsc::Sender<Control>,
    next_frame_id: u64,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Puts `frame` in the submission slot, replacing any frame the worker has not
    /// picked up yet. Returns the id assigned to the frame.
    pub fn submit(&mut self, frame: Frame) -> Result<u64> {
        if self.frames.is_closed() {
            return Err(TrackerError::WorkerClosed);
        }
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        self.frames.send_replace(Some(Arc::new(FrameTicket {
            frame_id,
            frame,
            submitted_at: Instant::now(),
        })));
        Ok(frame_id)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Control) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(build(reply_tx))
            .await
            .map_err(|_| TrackerError::WorkerClosed)?;
        reply_rx.await.map_err(|_| TrackerError::WorkerClosed)
    }

    pub async fn lock_current_position(&self) -> Result<(f64, f64)> {
        self.request(Control::Lock).await?
    }

    pub async fn unlock(&self) -> Result<()> {
        self.request(Control::Unlock).await
    }

    pub async fn is_eye_in_position(&self) -> Result<bool> {
        self.request(Control::InPosition).await
    }

    pub async fn set_lock_tolerance(&self, radius: f64) -> Result<()> {
        self.request(|reply| Control::SetLockTolerance(radius, reply)).await?
    }

    pub async fn set_zoom(&self, factor: f64, center: Option<ZoomCenter>) -> Result<()> {
        self.request(|reply| Control::SetZoom(factor, center, reply)).await?
    }

    /// Closes both input channels and waits for the worker to finish its
    /// current frame.
    pub async fn shutdown(self) {
        let WorkerHandle {
            frames,
            control,
            task,
            ..
        } = self;
        drop(frames);
        drop(control);
        if let Err(err) = task.await {
            warn!("Tracking worker ended abnormally: {err}");
        }
    }
}
