use super::*;
use crate::encode::encoder::{EncoderConfig, EncoderFactory};
use crate::encode::memory::{InMemoryEncoderFactory, RECORD_LEN};
use crate::foundation::core::{Canvas, Fps};
use std::sync::mpsc;
use std::time::Duration;

fn frame() -> FrameRGBA {
    FrameRGBA::new(Canvas::new(4, 2)).unwrap()
}

fn pipeline(
    factory: &InMemoryEncoderFactory,
    capacity: usize,
) -> (EncoderPipeline, mpsc::Receiver<Artifact>) {
    let cfg = EncoderConfig::unconfigured(Canvas::new(4, 2), Fps::default());
    let encoder = factory.create(&cfg).unwrap();
    let (tx, rx) = mpsc::channel();
    let p = EncoderPipeline::spawn(
        encoder,
        capacity,
        Box::new(move |artifact| {
            let _ = tx.send(artifact);
        }),
    )
    .unwrap();
    (p, rx)
}

#[test]
fn finish_delivers_all_chunks_in_order() {
    let factory = InMemoryEncoderFactory::new();
    let (mut p, rx) = pipeline(&factory, 16);
    for i in 0..5 {
        assert_eq!(p.submit(FrameIndex(i), &frame()), SubmitOutcome::Queued);
    }
    p.finish();
    assert!(!p.is_open());

    let artifact = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(artifact.frames_encoded, 5);
    assert_eq!(artifact.chunk_count, 5);
    assert_eq!(artifact.len(), 5 * RECORD_LEN);
    assert_eq!(artifact.mime_type, "video/webm");
    assert!(artifact.error.is_none());

    let idxs: Vec<u64> = factory.frames().iter().map(|(i, _)| i.0).collect();
    assert_eq!(idxs, vec![0, 1, 2, 3, 4]);
}

#[test]
fn submit_after_finish_is_closed() {
    let factory = InMemoryEncoderFactory::new();
    let (mut p, rx) = pipeline(&factory, 4);
    p.finish();
    p.finish();
    assert_eq!(p.submit(FrameIndex(0), &frame()), SubmitOutcome::Closed);
    let artifact = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(artifact.is_empty());
    assert_eq!(artifact.chunk_count, 0);
}

#[test]
fn encoder_failure_finishes_without_explicit_close() {
    let factory = InMemoryEncoderFactory::new().failing_after(2);
    let (p, rx) = pipeline(&factory, 16);
    for i in 0..3 {
        p.submit(FrameIndex(i), &frame());
    }

    let artifact = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(artifact.frames_encoded, 2);
    assert!(artifact.error.as_deref().unwrap().contains("injected"));

    // The worker is gone; the input still looks open but refuses frames.
    assert!(p.is_open());
    assert_eq!(p.submit(FrameIndex(9), &frame()), SubmitOutcome::Closed);
}

#[test]
fn full_queue_drops_instead_of_blocking() {
    let factory = InMemoryEncoderFactory::new().with_encode_delay(Duration::from_millis(200));
    let (mut p, rx) = pipeline(&factory, 1);

    let outcomes: Vec<_> = (0..6).map(|i| p.submit(FrameIndex(i), &frame())).collect();
    assert!(outcomes.contains(&SubmitOutcome::Dropped));
    assert!(p.frames_dropped() >= 1);
    assert_eq!(p.frames_queued() + p.frames_dropped(), 6);
    p.finish();

    let artifact = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(artifact.frames_dropped, p.frames_dropped());
    assert_eq!(artifact.frames_encoded, p.frames_queued());
}

struct PanicsOnSecondFrame {
    seen: u32,
}

impl ChunkEncoder for PanicsOnSecondFrame {
    fn mime_type(&self) -> String {
        "video/webm".to_string()
    }

    fn encode(&mut self, _idx: FrameIndex, _frame: &FrameRGBA) -> StrataResult<Vec<u8>> {
        self.seen += 1;
        if self.seen == 2 {
            panic!("codec state corrupted");
        }
        Ok(vec![1, 2, 3])
    }

    fn finish(&mut self) -> StrataResult<Vec<u8>> {
        Ok(vec![9])
    }
}

#[test]
fn encoder_panic_still_delivers_artifact() {
    let (tx, rx) = mpsc::channel();
    let p = EncoderPipeline::spawn(
        Box::new(PanicsOnSecondFrame { seen: 0 }),
        8,
        Box::new(move |artifact| {
            let _ = tx.send(artifact);
        }),
    )
    .unwrap();
    for i in 0..3 {
        p.submit(FrameIndex(i), &frame());
    }

    let artifact = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(artifact.frames_encoded, 1);
    // Bytes encoded before the panic and the trailing chunk are kept.
    assert_eq!(artifact.data, vec![1, 2, 3, 9]);
    let err = artifact.error.unwrap();
    assert!(err.contains("encoder panicked"), "{err}");
    assert!(err.contains("codec state corrupted"), "{err}");
}
