use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use juliacam::capture::{CapturedFrame, Delivery, ProcessingWorker};
use juliacam::kernel::KernelLibrary;
use juliacam::{Frame, FrameParameters, FramePipeline};

fn pipeline() -> Arc<FramePipeline> {
    Arc::new(FramePipeline::new(&KernelLibrary::cpu(), FrameParameters::default()).expect("valid"))
}

fn captured(ms: u64) -> CapturedFrame {
    CapturedFrame::new(Frame::filled(16, 12, [200, 20, 20, 255]), Duration::from_millis(ms))
}

#[test]
fn submitted_frames_are_presented_in_order() {
    let (tx, rx) = mpsc::channel();
    let worker = ProcessingWorker::spawn(pipeline(), move |frame: Frame, timestamp: Duration| {
        let _ = tx.send((frame.extent(), timestamp));
    })
    .expect("worker should spawn");

    for ms in [0, 33, 66, 99] {
        worker.submit(captured(ms)).expect("worker alive");
    }
    let stats = worker.shutdown().expect("clean shutdown");

    let presented: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        presented,
        [0, 33, 66, 99]
            .map(|ms| ((16, 12), Duration::from_millis(ms)))
            .to_vec()
    );
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn empty_frames_are_skipped() {
    let (tx, rx) = mpsc::channel();
    let worker = ProcessingWorker::spawn(pipeline(), move |frame: Frame, _: Duration| {
        let _ = tx.send(frame);
    })
    .expect("worker should spawn");

    let empty = Frame::new(0, 0, Vec::new()).expect("zero-area buffer");
    worker
        .submit(CapturedFrame::new(empty, Duration::ZERO))
        .expect("worker alive");
    worker.submit(captured(33)).expect("worker alive");
    let stats = worker.shutdown().expect("clean shutdown");

    assert_eq!(rx.try_iter().count(), 1);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn offers_while_busy_are_dropped() {
    let (presented_tx, presented_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let worker = ProcessingWorker::spawn(pipeline(), move |_: Frame, timestamp: Duration| {
        let _ = presented_tx.send(timestamp);
        let _ = release_rx.recv();
    })
    .expect("worker should spawn");

    worker.submit(captured(0)).expect("worker alive");
    // The worker is now parked inside the sink.
    assert_eq!(
        presented_rx.recv().expect("first frame presented"),
        Duration::ZERO
    );
    assert_eq!(worker.offer(captured(33)), Delivery::Dropped);
    assert_eq!(worker.offer(captured(66)), Delivery::Dropped);

    release_tx.send(()).expect("sink waiting");
    drop(release_tx);
    let stats = worker.shutdown().expect("clean shutdown");
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.dropped, 2);
}

#[test]
fn offers_to_an_idle_worker_are_accepted() {
    let (tx, rx) = mpsc::channel();
    let worker = ProcessingWorker::spawn(pipeline(), move |_: Frame, timestamp: Duration| {
        let _ = tx.send(timestamp);
    })
    .expect("worker should spawn");

    // The worker thread may not be waiting yet right after spawn.
    let mut accepted = false;
    for _ in 0..2_000 {
        if worker.offer(captured(7)) == Delivery::Accepted {
            accepted = true;
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(accepted, "idle worker never took a frame");
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(10)).expect("presented"),
        Duration::from_millis(7)
    );
    worker.shutdown().expect("clean shutdown");
}
