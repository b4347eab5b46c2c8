//! Handler fan-out: one upload, every configured variant.
//!
//! The upload is decoded and hashed once. Each (size, format, store)
//! combination of the handler then runs as an independent [`Job`] over the
//! shared [`DecodedSource`] on a dedicated rayon pool.
//!
//! A failing combination is recorded in the [`DispatchReport`] and does not
//! stop its siblings. A source that cannot be decoded fails the whole
//! dispatch, since no combination could succeed.
//!
//! ## Progress
//!
//! Callers may pass an `mpsc::Sender<DispatchEvent>`; one `Decoded` event is
//! sent after the source is read, then one `JobFinished` per combination in
//! completion order. The report itself lists outcomes in handler order.

use crate::config::{Handler, JobSpec};
use crate::digest::ContentDigest;
use crate::imaging::{DecodeError, ImageBackend};
use crate::job::{CancelToken, DecodedSource, Job, JobControl, JobError, StoredImage, decode_source};
use crate::naming::OutputKey;
use crate::store::{Store, StoreDescriptor};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Read;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to decode source image: {0}")]
    Decode(#[from] DecodeError),
    #[error("dispatch cancelled")]
    Cancelled,
}

/// Worker pool and per-job limits.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Worker threads. `None` uses every core; larger values are capped.
    pub workers: Option<usize>,
    /// Deadline for each job, measured from when it starts running.
    pub job_timeout: Option<Duration>,
    pub cancel: CancelToken,
}

/// Resolve the worker count.
///
/// Caps at the number of available CPU cores: callers can constrain down,
/// not up.
pub fn effective_workers(requested: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Progress reported while a dispatch runs.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Decoded {
        handler: String,
        digest: ContentDigest,
        format: String,
        dimensions: (u32, u32),
        jobs: usize,
    },
    JobFinished {
        spec: JobSpec,
        result: Result<OutputKey, String>,
    },
}

/// Result of one combination.
#[derive(Debug)]
pub struct JobOutcome {
    pub spec: JobSpec,
    pub result: Result<StoredImage, JobError>,
}

#[derive(Debug)]
pub struct DispatchReport {
    pub handler: String,
    pub digest: ContentDigest,
    pub source_format: String,
    pub source_dimensions: (u32, u32),
    /// In handler order: sizes, then formats, then stores.
    pub outcomes: Vec<JobOutcome>,
}

impl DispatchReport {
    pub fn stored(&self) -> impl Iterator<Item = (&JobSpec, &StoredImage)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|s| (&o.spec, s)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&JobSpec, &JobError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.spec, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Runs handlers against uploads with a fixed backend and worker pool.
pub struct Dispatcher<B> {
    backend: B,
    pool: rayon::ThreadPool,
    options: DispatchOptions,
    stores: Mutex<HashMap<StoreDescriptor, Arc<dyn Store>>>,
}

impl<B: ImageBackend> Dispatcher<B> {
    pub fn new(backend: B, options: DispatchOptions) -> Result<Self, DispatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_workers(options.workers))
            .thread_name(|i| format!("imgpress-worker-{i}"))
            .build()?;
        Ok(Self {
            backend,
            pool,
            options,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Route `descriptor` to an already constructed store instead of
    /// opening it.
    pub fn with_store(self, descriptor: StoreDescriptor, store: Arc<dyn Store>) -> Self {
        self.lock_stores().insert(descriptor, store);
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Decode `input` once and run every combination of `handler`.
    pub fn dispatch<R: Read>(
        &self,
        handler: &Handler,
        input: R,
        events: Option<&Sender<DispatchEvent>>,
    ) -> Result<DispatchReport, DispatchError> {
        if self.options.cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let source = Arc::new(decode_source(input, &self.backend)?);
        let specs = handler.jobs();
        tracing::info!(
            handler = %handler.name,
            digest = %source.digest,
            jobs = specs.len(),
            "dispatching"
        );
        if let Some(tx) = events {
            let _ = tx.send(DispatchEvent::Decoded {
                handler: handler.name.clone(),
                digest: source.digest.clone(),
                format: source.format.clone(),
                dimensions: source.dimensions(),
                jobs: specs.len(),
            });
        }

        let outcomes: Vec<JobOutcome> = self.pool.install(|| {
            specs
                .into_par_iter()
                .map(|spec| self.run_one(&source, spec, events))
                .collect()
        });

        let report = DispatchReport {
            handler: handler.name.clone(),
            digest: source.digest.clone(),
            source_format: source.format.clone(),
            source_dimensions: source.dimensions(),
            outcomes,
        };
        tracing::info!(
            handler = %report.handler,
            stored = report.stored().count(),
            failed = report.failures().count(),
            "dispatch finished"
        );
        Ok(report)
    }

    fn run_one(
        &self,
        source: &Arc<DecodedSource>,
        spec: JobSpec,
        events: Option<&Sender<DispatchEvent>>,
    ) -> JobOutcome {
        let store = self.store_for(&spec.store);
        let mut job = Job::from_decoded(
            Arc::clone(source),
            spec.size,
            spec.format,
            store.as_ref(),
            &self.backend,
        )
        .with_control(self.job_control());
        let result = job.process();

        if let Some(tx) = events {
            let _ = tx.send(DispatchEvent::JobFinished {
                spec: spec.clone(),
                result: result
                    .as_ref()
                    .map(|stored| stored.key.clone())
                    .map_err(|e| e.to_string()),
            });
        }
        JobOutcome { spec, result }
    }

    fn job_control(&self) -> JobControl {
        let control = JobControl::new().with_cancel(self.options.cancel.clone());
        match self.options.job_timeout {
            Some(timeout) => control.with_timeout(timeout),
            None => control,
        }
    }

    fn store_for(&self, descriptor: &StoreDescriptor) -> Arc<dyn Store> {
        let mut stores = self.lock_stores();
        let store = stores
            .entry(descriptor.clone())
            .or_insert_with(|| descriptor.open());
        Arc::clone(store)
    }

    fn lock_stores(&self) -> MutexGuard<'_, HashMap<StoreDescriptor, Arc<dyn Store>>> {
        self.stores.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{Format, SizeConstraint};
    use crate::store::{MemoryStore, Sink, StoreError};
    use std::io;
    use std::path::PathBuf;
    use std::sync::mpsc;

    const INPUT: &[u8] = b"fake upload bytes";

    fn local(root: &str) -> StoreDescriptor {
        StoreDescriptor::Local {
            root: PathBuf::from(root),
        }
    }

    fn handler(stores: Vec<StoreDescriptor>) -> Handler {
        Handler {
            name: "avatars".into(),
            sizes: vec![SizeConstraint::square(80), SizeConstraint::max(40)],
            formats: vec![Format::Png, Format::WebP],
            stores,
        }
    }

    fn dispatcher(backend: MockBackend) -> Dispatcher<MockBackend> {
        let options = DispatchOptions {
            workers: Some(2),
            ..DispatchOptions::default()
        };
        Dispatcher::new(backend, options).unwrap()
    }

    /// Store whose backend is always down.
    struct DownStore;

    impl Store for DownStore {
        fn put(&self, key: &str) -> Result<Box<dyn Sink>, StoreError> {
            Err(StoreError::unavailable(
                key,
                io::Error::new(io::ErrorKind::ConnectionRefused, "down"),
            ))
        }
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    #[test]
    fn runs_every_combination_from_one_decode() {
        let memory = MemoryStore::new();
        let dispatcher = dispatcher(MockBackend::with_dimensions(200, 100))
            .with_store(local("/mem/a"), Arc::new(memory.clone()));
        let handler = handler(vec![local("/mem/a")]);

        let report = dispatcher.dispatch(&handler, INPUT, None).unwrap();

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(dispatcher.backend().decode_count(), 1);
        assert_eq!(memory.len(), 4);
        assert_eq!(report.digest, ContentDigest::of_bytes(INPUT));
        assert_eq!(report.source_dimensions, (200, 100));

        let specs: Vec<JobSpec> = report.outcomes.iter().map(|o| o.spec.clone()).collect();
        assert_eq!(specs, handler.jobs());
    }

    #[test]
    fn outcome_keys_match_stored_keys() {
        let memory = MemoryStore::new();
        let dispatcher = dispatcher(MockBackend::with_dimensions(200, 100))
            .with_store(local("/mem/a"), Arc::new(memory.clone()));

        let report = dispatcher
            .dispatch(&handler(vec![local("/mem/a")]), INPUT, None)
            .unwrap();

        let mut keys: Vec<String> = report.stored().map(|(_, s)| s.key.to_string()).collect();
        keys.sort();
        assert_eq!(keys, memory.keys());
        let square = format!("square-80-{}.png", ContentDigest::of_bytes(INPUT));
        assert_eq!(memory.get(&square), Some(b"png:80x80".to_vec()));
    }

    #[test]
    fn failing_store_does_not_abort_siblings() {
        let memory = MemoryStore::new();
        let dispatcher = dispatcher(MockBackend::with_dimensions(200, 100))
            .with_store(local("/mem/ok"), Arc::new(memory.clone()))
            .with_store(local("/mem/down"), Arc::new(DownStore));

        let report = dispatcher
            .dispatch(
                &handler(vec![local("/mem/ok"), local("/mem/down")]),
                INPUT,
                None,
            )
            .unwrap();

        assert_eq!(report.outcomes.len(), 8);
        assert_eq!(report.stored().count(), 4);
        assert_eq!(report.failures().count(), 4);
        assert!(!report.is_success());
        for (spec, err) in report.failures() {
            assert_eq!(spec.store, local("/mem/down"));
            assert!(matches!(
                err,
                JobError::Store(StoreError::BackendUnavailable { .. })
            ));
        }
        assert_eq!(memory.len(), 4);
    }

    #[test]
    fn undecodable_source_fails_whole_dispatch() {
        let memory = MemoryStore::new();
        let dispatcher = dispatcher(MockBackend::failing_decode())
            .with_store(local("/mem/a"), Arc::new(memory.clone()));

        let err = dispatcher
            .dispatch(&handler(vec![local("/mem/a")]), INPUT, None)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Decode(DecodeError::CorruptImage(_))));
        assert!(memory.is_empty());
    }

    // =========================================================================
    // Control
    // =========================================================================

    #[test]
    fn cancelled_dispatch_reads_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let options = DispatchOptions {
            workers: Some(1),
            cancel,
            ..DispatchOptions::default()
        };
        let dispatcher = Dispatcher::new(MockBackend::with_dimensions(10, 10), options).unwrap();

        let err = dispatcher
            .dispatch(&handler(vec![local("/mem/a")]), INPUT, None)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled));
        assert_eq!(dispatcher.backend().decode_count(), 0);
    }

    #[test]
    fn zero_timeout_times_out_every_job() {
        let memory = MemoryStore::new();
        let options = DispatchOptions {
            workers: Some(1),
            job_timeout: Some(Duration::ZERO),
            ..DispatchOptions::default()
        };
        let dispatcher = Dispatcher::new(MockBackend::with_dimensions(10, 10), options)
            .unwrap()
            .with_store(local("/mem/a"), Arc::new(memory.clone()));

        let report = dispatcher
            .dispatch(&handler(vec![local("/mem/a")]), INPUT, None)
            .unwrap();

        assert_eq!(report.failures().count(), 4);
        assert!(
            report
                .failures()
                .all(|(_, e)| matches!(e, JobError::TimedOut(_)))
        );
        assert!(memory.is_empty());
    }

    // =========================================================================
    // Events
    // =========================================================================

    #[test]
    fn emits_decoded_then_one_event_per_job() {
        let dispatcher = dispatcher(MockBackend::with_dimensions(64, 64))
            .with_store(local("/mem/a"), Arc::new(MemoryStore::new()));
        let (tx, rx) = mpsc::channel();

        dispatcher
            .dispatch(&handler(vec![local("/mem/a")]), INPUT, Some(&tx))
            .unwrap();
        drop(tx);

        let events: Vec<DispatchEvent> = rx.iter().collect();
        assert_eq!(events.len(), 5);
        assert!(matches!(
            &events[0],
            DispatchEvent::Decoded { jobs: 4, dimensions: (64, 64), .. }
        ));
        assert!(events[1..].iter().all(|e| matches!(
            e,
            DispatchEvent::JobFinished { result: Ok(_), .. }
        )));
    }

    // =========================================================================
    // Workers
    // =========================================================================

    #[test]
    fn effective_workers_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_workers(None), cores);
    }

    #[test]
    fn effective_workers_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_workers(Some(99999)), cores);
    }

    #[test]
    fn effective_workers_user_constrains_down() {
        assert_eq!(effective_workers(Some(1)), 1);
        assert_eq!(effective_workers(Some(0)), 1);
    }
}
