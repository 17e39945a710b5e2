//! Capture/display boundary.
//!
//! A [`ProcessingWorker`] owns one named thread that runs captured frames
//! through a [`FramePipeline`] one at a time and hands results to a
//! [`FrameSink`]. Frames are handed over through a zero-capacity channel:
//! [`ProcessingWorker::offer`] succeeds only while the worker is idle and
//! drops the frame otherwise, so there is never a backlog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};

use crate::frame::Frame;
use crate::pipeline::FramePipeline;

/// A raw frame as delivered by a capture device.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub frame: Frame,
    /// Capture time relative to the start of the stream.
    pub timestamp: Duration,
}

impl CapturedFrame {
    pub fn new(frame: Frame, timestamp: Duration) -> Self {
        Self { frame, timestamp }
    }
}

/// Display collaborator. Receives every processed frame in capture order.
pub trait FrameSink: Send {
    fn present(&mut self, frame: Frame, timestamp: Duration);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame, Duration) + Send,
{
    fn present(&mut self, frame: Frame, timestamp: Duration) {
        self(frame, timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// The worker was busy or gone; the frame was discarded.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Frames that produced output.
    pub processed: u64,
    /// Zero-extent frames that produced nothing.
    pub skipped: u64,
    /// Frames offered while the worker was busy.
    pub dropped: u64,
}

pub struct ProcessingWorker {
    sender: Option<SyncSender<CapturedFrame>>,
    handle: Option<JoinHandle<WorkerStats>>,
    dropped: AtomicU64,
}

impl ProcessingWorker {
    pub fn spawn<S>(pipeline: Arc<FramePipeline>, sink: S) -> Result<Self>
    where
        S: FrameSink + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(0);
        let handle = thread::Builder::new()
            .name("frame-processing".to_owned())
            .spawn(move || run(&pipeline, receiver, sink))
            .context("failed to spawn frame-processing thread")?;
        info!("frame-processing worker started");
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            dropped: AtomicU64::new(0),
        })
    }

    /// Hand `frame` over if the worker is idle; otherwise drop it.
    pub fn offer(&self, frame: CapturedFrame) -> Delivery {
        let Some(sender) = &self.sender else {
            return self.drop_frame();
        };
        match sender.try_send(frame) {
            Ok(()) => Delivery::Accepted,
            Err(TrySendError::Full(frame)) => {
                debug!("worker busy; dropped frame at {:?}", frame.timestamp);
                self.drop_frame()
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("frame-processing worker is gone; dropping frame");
                self.drop_frame()
            }
        }
    }

    /// Block until the worker takes `frame`.
    pub fn submit(&self, frame: CapturedFrame) -> Result<()> {
        let Some(sender) = &self.sender else {
            bail!("frame-processing worker already shut down");
        };
        sender
            .send(frame)
            .map_err(|_| anyhow!("frame-processing worker exited"))
    }

    /// Finish the frame in flight, stop the thread and report totals.
    pub fn shutdown(mut self) -> Result<WorkerStats> {
        self.sender.take();
        let handle = self
            .handle
            .take()
            .context("frame-processing worker already joined")?;
        let mut stats = handle
            .join()
            .map_err(|_| anyhow!("frame-processing worker panicked"))?;
        stats.dropped = self.dropped.load(Ordering::Relaxed);
        info!(
            "frame-processing worker stopped: {} processed, {} skipped, {} dropped",
            stats.processed, stats.skipped, stats.dropped
        );
        Ok(stats)
    }

    fn drop_frame(&self) -> Delivery {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        Delivery::Dropped
    }
}

impl Drop for ProcessingWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<S: FrameSink>(
    pipeline: &FramePipeline,
    receiver: Receiver<CapturedFrame>,
    mut sink: S,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    for CapturedFrame { frame, timestamp } in receiver {
        match pipeline.handle_frame(&frame) {
            Some(output) => {
                stats.processed += 1;
                sink.present(output, timestamp);
            }
            None => stats.skipped += 1,
        }
    }
    stats
}
