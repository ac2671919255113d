use crate::{
    core::{
        engine::{InferenceSession, OrtFactory, SessionFactory},
        tensor::{check_shape, TensorFrame},
    },
    error::{Result, StemError},
    io::{
        cache::{BlobCache, DiskCache},
        crypto::verify_sha256,
        net::{fetch_from_mirrors, http_client},
        progress::{Progress, ProgressObserver, Stage},
    },
    types::ModelSpec,
};

use log::{debug, info, warn};
use reqwest::blocking::Client;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

type SharedSession = Arc<Mutex<Box<dyn InferenceSession>>>;

enum LoadPhase {
    Empty,
    Loading,
    Ready(SharedSession),
}

struct LoadSlot {
    phase: LoadPhase,
    /// Bumped whenever a load attempt settles.
    generation: u64,
    /// Most recent failed attempt, replayed to the callers that joined it.
    last_error: Option<StemError>,
}

/// Owns the inference engine lifecycle: fetch or reuse cached weights, build
/// one session, and serve fixed-shape inference calls.
pub struct ModelGateway {
    spec: ModelSpec,
    cache: Box<dyn BlobCache>,
    factory: Box<dyn SessionFactory>,
    client: Client,
    slot: Mutex<LoadSlot>,
    settled: Condvar,
}

impl ModelGateway {
    pub fn new(
        spec: ModelSpec,
        cache: Box<dyn BlobCache>,
        factory: Box<dyn SessionFactory>,
    ) -> Result<Self> {
        Ok(Self {
            spec,
            cache,
            factory,
            client: http_client()?,
            slot: Mutex::new(LoadSlot {
                phase: LoadPhase::Empty,
                generation: 0,
                last_error: None,
            }),
            settled: Condvar::new(),
        })
    }

    /// Platform disk cache and ONNX Runtime.
    pub fn with_defaults(spec: ModelSpec) -> Result<Self> {
        Self::new(
            spec,
            Box::new(DiskCache::open_default()?),
            Box::new(OrtFactory),
        )
    }

    pub fn model_key(&self) -> &str {
        &self.spec.name
    }

    fn lock_slot(&self) -> MutexGuard<'_, LoadSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.lock_slot().phase, LoadPhase::Ready(_))
    }

    /// Idempotent. A caller arriving while another load is in flight blocks
    /// until that load settles and shares its outcome.
    pub fn load(&self, observer: &dyn ProgressObserver) -> Result<()> {
        let mut slot = self.lock_slot();
        if matches!(slot.phase, LoadPhase::Ready(_)) {
            return Ok(());
        }
        if matches!(slot.phase, LoadPhase::Loading) {
            let joined = slot.generation;
            debug!("model load already in flight, waiting");
            let slot = self
                .settled
                .wait_while(slot, |s| s.generation == joined)
                .unwrap_or_else(PoisonError::into_inner);
            // Ready is permanent, so anything else means the joined attempt failed.
            return match (&slot.phase, &slot.last_error) {
                (LoadPhase::Ready(_), _) => Ok(()),
                (_, Some(e)) => Err(e.replicate()),
                (_, None) => Err(StemError::ModelLoad("concurrent model load failed".into())),
            };
        }
        slot.phase = LoadPhase::Loading;
        drop(slot);

        let attempt = LoadAttempt {
            gateway: self,
            armed: true,
        };
        let result = self.load_session(observer);
        attempt.settle(result)
    }

    /// Publish the outcome of the in-flight attempt and wake its waiters.
    fn finish(&self, result: Result<Box<dyn InferenceSession>>) -> Result<()> {
        let mut slot = self.lock_slot();
        let outcome = match result {
            Ok(session) => {
                slot.phase = LoadPhase::Ready(Arc::new(Mutex::new(session)));
                slot.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("model load failed: {e}");
                slot.phase = LoadPhase::Empty;
                slot.last_error = Some(e.replicate());
                Err(e)
            }
        };
        slot.generation += 1;
        drop(slot);
        self.settled.notify_all();
        outcome
    }

    fn load_session(&self, observer: &dyn ProgressObserver) -> Result<Box<dyn InferenceSession>> {
        let emit = |percent: f32, message: String| {
            observer.on_progress(&Progress::new(Stage::Download, percent, message));
        };

        emit(0.0, "Preparing inference runtime".into());
        self.factory.prepare_runtime().map_err(into_model_load)?;

        let key = self.spec.name.as_str();
        let weights = match self.cached_weights(key) {
            Some(bytes) => {
                emit(95.0, "Model loaded from cache".into());
                bytes
            }
            None => {
                emit(5.0, "Downloading model".into());
                let bytes = self.download_weights(&emit)?;
                if let Err(e) = self.cache.put(key, &bytes) {
                    warn!("could not cache model `{key}`: {e}");
                }
                emit(95.0, "Model download complete".into());
                bytes
            }
        };

        emit(97.0, "Creating inference session".into());
        let session = self
            .factory
            .create_session(&weights)
            .map_err(into_model_load)?;

        info!("model `{key}` ready ({} bytes)", weights.len());
        emit(100.0, "Model ready".into());
        Ok(session)
    }

    fn cached_weights(&self, key: &str) -> Option<Vec<u8>> {
        let bytes = match self.cache.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("cache miss for `{key}`");
                return None;
            }
            Err(e) => {
                debug!("cache read for `{key}` failed, treating as miss: {e}");
                return None;
            }
        };

        match self.check_digest(&bytes) {
            Ok(()) => Some(bytes),
            Err(e) => {
                warn!("cached `{key}` rejected: {e}");
                None
            }
        }
    }

    fn check_digest(&self, bytes: &[u8]) -> Result<()> {
        match &self.spec.sha256 {
            Some(expected) if !verify_sha256(bytes, expected)? => Err(StemError::Checksum {
                key: self.spec.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn download_weights(&self, emit: &dyn Fn(f32, String)) -> Result<Vec<u8>> {
        let mut percent = 5.0f32;
        let mut on_progress = |received: u64, total: Option<u64>| match total {
            Some(total) => {
                let pct = (received as f64 / total as f64 * 100.0).min(100.0) as f32;
                percent = 5.0 + pct * 0.9;
                emit(percent, format!("Downloading model... {}%", pct.round()));
            }
            None => emit(
                percent,
                format!("Downloading model... {:.1} MB", received as f64 / 1_000_000.0),
            ),
        };

        fetch_from_mirrors(
            &self.client,
            &self.spec.mirrors,
            &|body: &[u8]| self.check_digest(body),
            &mut on_progress,
        )
    }

    /// One stateless request/response against the loaded session.
    pub fn run(&self, input: TensorFrame) -> Result<TensorFrame> {
        check_shape(&input)?;
        let session = match &self.lock_slot().phase {
            LoadPhase::Ready(session) => Arc::clone(session),
            _ => return Err(StemError::ModelNotLoaded),
        };

        let mut session = session
            .lock()
            .map_err(|_| StemError::Inference("session poisoned".into()))?;
        let output = session.run(input).map_err(|e| match e {
            StemError::Inference(_) => e,
            other => StemError::Inference(other.to_string()),
        })?;
        check_shape(&output)?;
        Ok(output)
    }
}

/// Settles the load slot even when the attempt unwinds, so waiters and later
/// callers never see a load stuck in flight.
struct LoadAttempt<'g> {
    gateway: &'g ModelGateway,
    armed: bool,
}

impl LoadAttempt<'_> {
    fn settle(mut self, result: Result<Box<dyn InferenceSession>>) -> Result<()> {
        self.armed = false;
        self.gateway.finish(result)
    }
}

impl Drop for LoadAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self
                .gateway
                .finish(Err(StemError::ModelLoad("model load aborted by a panic".into())));
        }
    }
}

fn into_model_load(e: StemError) -> StemError {
    match e {
        StemError::ModelLoad(_) => e,
        other => StemError::ModelLoad(other.to_string()),
    }
}
