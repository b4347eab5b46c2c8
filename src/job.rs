//! One image, one variant: the decode → size → encode → store sequence.
//!
//! A [`Job`] walks a fixed state machine:
//!
//! ```text
//! Created → Decoding → Sizing → Encoding → Storing → Done
//!     └─────────┴─────────┴─────────┴──────────┴──→ Failed
//! ```
//!
//! There are no retries and no branches. The first error aborts the job and
//! is returned as-is (wrapped by stage in [`JobError`]).
//!
//! ## Resources
//!
//! The input stream is owned by the decoding stage and released when it
//! ends, whether decoding succeeded or not. The output sink is opened only
//! after encoding has produced the complete byte buffer, so an encoder
//! failure never leaves a sink open and is always reported as
//! [`EncodeError`](crate::imaging::EncodeError), never as a store failure.
//! A sink whose write fails is dropped unclosed (abandoned); a sink is only
//! closed after a complete write, so a close failure is reported only when
//! nothing failed before it.
//!
//! ## Cancellation and deadlines
//!
//! A [`JobControl`] is consulted at the five stage boundaries: before
//! entering Decoding, Sizing, Encoding and Storing, and once more between
//! writing the payload and closing the sink. A job stopped at that last
//! boundary abandons its sink, so nothing is committed. Stages themselves
//! are not interrupted.

use crate::digest::{ContentDigest, DigestReader};
use crate::imaging::{
    DecodeError, EncodeError, Format, ImageBackend, PixelBuffer, SizeConstraint, SizeError,
    encode_image, get_dimensions, size_image,
};
use crate::naming::OutputKey;
use crate::store::{Store, StoreError};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Decoding,
    Sizing,
    Encoding,
    Storing,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Decoding => "decoding",
            JobState::Sizing => "sizing",
            JobState::Encoding => "encoding",
            JobState::Storing => "storing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Size(#[from] SizeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job cancelled before {0}")]
    Cancelled(JobState),
    #[error("job timed out before {0}")]
    TimedOut(JobState),
    #[error("job input already consumed")]
    InputConsumed,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation and deadline checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn check(&self, next: JobState) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled(next));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(JobError::TimedOut(next));
        }
        Ok(())
    }
}

/// A decoded upload: pixels plus the digest of the original bytes.
#[derive(Debug)]
pub struct DecodedSource {
    pub image: PixelBuffer,
    pub digest: ContentDigest,
    /// Source format label reported by the decoder.
    pub format: String,
    pub bytes_read: u64,
}

impl DecodedSource {
    pub fn dimensions(&self) -> (u32, u32) {
        get_dimensions(&self.image)
    }
}

/// Decode `input` while hashing it, then drain and finalize the digest.
///
/// The input is dropped before this returns, on success and on failure.
pub fn decode_source<R: Read, B: ImageBackend>(
    input: R,
    backend: &B,
) -> Result<DecodedSource, DecodeError> {
    let mut reader = DigestReader::new(input);
    let decoded = backend.decode(&mut reader)?;
    let trailing = reader.drain()?;
    let bytes_read = reader.bytes_read();
    let (input, digest) = reader.finalize()?;
    drop(input);

    let (width, height) = get_dimensions(&decoded.image);
    tracing::debug!(
        format = %decoded.format,
        width,
        height,
        bytes_read,
        trailing,
        digest = %digest,
        "decoded source image"
    );

    Ok(DecodedSource {
        image: decoded.image,
        digest,
        format: decoded.format,
        bytes_read,
    })
}

/// What a successful job wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: OutputKey,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    /// False when the source already satisfied the constraint.
    pub resized: bool,
}

enum JobInput<R> {
    Stream(R),
    Decoded(Arc<DecodedSource>),
    Consumed,
}

/// A single (input, size, format, store) combination.
pub struct Job<'a, R, B> {
    input: JobInput<R>,
    size: SizeConstraint,
    format: Format,
    store: &'a dyn Store,
    backend: &'a B,
    control: JobControl,
    state: JobState,
}

impl<'a, R: Read, B: ImageBackend> Job<'a, R, B> {
    /// Job that decodes and hashes `input` itself.
    pub fn new(
        input: R,
        size: SizeConstraint,
        format: Format,
        store: &'a dyn Store,
        backend: &'a B,
    ) -> Self {
        Self {
            input: JobInput::Stream(input),
            size,
            format,
            store,
            backend,
            control: JobControl::default(),
            state: JobState::Created,
        }
    }

    pub fn with_control(mut self, control: JobControl) -> Self {
        self.control = control;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run every stage. Leaves the job in `Done` or `Failed`.
    pub fn process(&mut self) -> Result<StoredImage, JobError> {
        let result = self.run();
        match &result {
            Ok(stored) => {
                self.state = JobState::Done;
                tracing::info!(key = %stored.key, bytes = stored.bytes, "stored variant");
            }
            Err(e) => {
                tracing::warn!(stage = %self.state, size = %self.size, format = %self.format, error = %e, "job failed");
                self.state = JobState::Failed;
            }
        }
        result
    }

    fn advance(&mut self, next: JobState) -> Result<(), JobError> {
        self.control.check(next)?;
        tracing::trace!(from = %self.state, to = %next, "job stage");
        self.state = next;
        Ok(())
    }

    fn run(&mut self) -> Result<StoredImage, JobError> {
        self.advance(JobState::Decoding)?;
        let source = match std::mem::replace(&mut self.input, JobInput::Consumed) {
            JobInput::Stream(input) => Arc::new(decode_source(input, self.backend)?),
            JobInput::Decoded(source) => source,
            JobInput::Consumed => return Err(JobError::InputConsumed),
        };

        self.advance(JobState::Sizing)?;
        let sized = size_image(self.backend, &source.image, self.size)?;
        let (width, height) = get_dimensions(&sized.image);
        tracing::debug!(size = %self.size, width, height, "sized image");

        self.advance(JobState::Encoding)?;
        let encoded = encode_image(self.backend, &sized.image, self.format)?;
        let resized = !sized.plan.is_identity();
        drop(sized);

        self.advance(JobState::Storing)?;
        let key = OutputKey::new(self.size, &source.digest, self.format);
        self.write_object(&key.to_string(), &encoded)?;

        Ok(StoredImage {
            key,
            width,
            height,
            bytes: encoded.len(),
            resized,
        })
    }

    /// Put, write, close. A failed write or a stop before commit abandons
    /// the sink without closing it.
    fn write_object(&self, key: &str, bytes: &[u8]) -> Result<(), JobError> {
        let mut sink = self.store.put(key)?;
        sink.write_all(bytes)
            .and_then(|()| sink.flush())
            .map_err(|e| StoreError::write_failed(key, e))?;
        self.control.check(JobState::Done)?;
        sink.close()?;
        Ok(())
    }
}

impl<'a, B: ImageBackend> Job<'a, io::Empty, B> {
    /// Job over an already decoded upload. The Decoding stage is a no-op.
    pub fn from_decoded(
        source: Arc<DecodedSource>,
        size: SizeConstraint,
        format: Format,
        store: &'a dyn Store,
        backend: &'a B,
    ) -> Self {
        Self {
            input: JobInput::Decoded(source),
            size,
            format,
            store,
            backend,
            control: JobControl::default(),
            state: JobState::Created,
        }
    }
}
