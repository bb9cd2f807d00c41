use crate::encode::encoder::{Artifact, ChunkEncoder};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{StrataError, StrataResult, panic_message};
use crate::render::frame::FrameRGBA;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

/// Called once on the encoder thread with the finished artifact.
pub type FinishedCallback = Box<dyn FnOnce(Artifact) + Send>;

/// Result of handing a frame to the encoder thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The frame is queued for encoding.
    Queued,
    /// The queue was full; the frame was dropped.
    Dropped,
    /// The encoder has stopped accepting frames.
    Closed,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    queued: AtomicU64,
    dropped: AtomicU64,
}

/// Bounded hand-off from the composite loop to a dedicated encoder thread.
///
/// `submit` never blocks. Closing the input (via [`EncoderPipeline::finish`] or drop) lets the
/// worker drain the queue, finalize the encoder and deliver the [`Artifact`]. The worker also
/// finalizes on its own when the encoder fails, so completion is always delivered exactly once.
pub struct EncoderPipeline {
    tx: Option<SyncSender<(FrameIndex, FrameRGBA)>>,
    counters: Arc<PipelineCounters>,
}

impl EncoderPipeline {
    /// Start the worker thread.
    pub fn spawn(
        encoder: Box<dyn ChunkEncoder>,
        capacity: usize,
        on_finished: FinishedCallback,
    ) -> StrataResult<Self> {
        let (tx, rx) = sync_channel(capacity.max(1));
        let counters = Arc::new(PipelineCounters::default());
        let worker_counters = Arc::clone(&counters);
        std::thread::Builder::new()
            .name("strata-encoder".to_string())
            .spawn(move || {
                let artifact = drain_into_encoder(encoder, rx, &worker_counters);
                on_finished(artifact);
            })
            .map_err(|e| StrataError::encoder(format!("failed to spawn encoder thread: {e}")))?;
        Ok(Self {
            tx: Some(tx),
            counters,
        })
    }

    /// Queue a copy of `frame` without blocking.
    pub fn submit(&self, idx: FrameIndex, frame: &FrameRGBA) -> SubmitOutcome {
        let Some(tx) = self.tx.as_ref() else {
            return SubmitOutcome::Closed;
        };
        match tx.try_send((idx, frame.clone())) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(frame = idx.0, "encoder queue full, dropping frame");
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SubmitOutcome::Closed,
        }
    }

    /// Close the input. Idempotent.
    pub fn finish(&mut self) {
        self.tx.take();
    }

    /// Return `true` until [`EncoderPipeline::finish`] is called.
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Frames accepted into the queue so far.
    pub fn frames_queued(&self) -> u64 {
        self.counters.queued.load(Ordering::Relaxed)
    }

    /// Frames dropped because the queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

fn drain_into_encoder(
    mut encoder: Box<dyn ChunkEncoder>,
    rx: Receiver<(FrameIndex, FrameRGBA)>,
    counters: &PipelineCounters,
) -> Artifact {
    let mut artifact = Artifact {
        mime_type: encoder.mime_type(),
        ..Artifact::default()
    };

    for (idx, frame) in rx.iter() {
        match guarded(|| encoder.encode(idx, &frame)) {
            Ok(chunk) => {
                append_chunk(&mut artifact, chunk);
                artifact.frames_encoded += 1;
            }
            Err(err) => {
                tracing::error!(frame = idx.0, error = %err, "encoder failed, ending stream");
                artifact.error = Some(err.to_string());
                break;
            }
        }
    }
    // Disconnect before finalizing so late submits see `Closed`.
    drop(rx);

    match guarded(|| encoder.finish()) {
        Ok(chunk) => append_chunk(&mut artifact, chunk),
        Err(err) => {
            tracing::error!(error = %err, "encoder finalization failed");
            artifact.error.get_or_insert_with(|| err.to_string());
        }
    }
    artifact.frames_dropped = counters.dropped.load(Ordering::Relaxed);
    artifact
}

/// Run an encoder call, turning a panic into an encoder error so the artifact is still delivered.
fn guarded(f: impl FnOnce() -> StrataResult<Vec<u8>>) -> StrataResult<Vec<u8>> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(StrataError::encoder(format!(
            "encoder panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn append_chunk(artifact: &mut Artifact, chunk: Vec<u8>) {
    if chunk.is_empty() {
        return;
    }
    artifact.data.extend_from_slice(&chunk);
    artifact.chunk_count += 1;
}

#[cfg(test)]
#[path = "../../tests/unit/encode/pipeline.rs"]
mod tests;
