#![allow(dead_code)]

use std::{
    collections::HashMap,
    f32::consts::PI,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use vocal_split_core::{
    BlobCache, InferenceSession, JobState, ModelGateway, ModelSpec, Progress, ProgressObserver,
    Result, SessionFactory, StemError, StereoSignal, TensorFrame, SAMPLE_RATE,
};

pub const MODEL_KEY: &str = "stub-model";

#[derive(Clone, Copy, Debug)]
pub enum StubMode {
    /// Every output tensor is zero.
    Zero,
    /// Output equals input.
    Echo,
    /// Every call fails.
    Fail,
}

#[derive(Clone, Default)]
pub struct Counters {
    pub runtimes: Arc<AtomicUsize>,
    pub sessions: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
}

impl Counters {
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

pub struct StubFactory {
    pub mode: StubMode,
    pub counters: Counters,
    /// Number of `create_session` calls that fail before one succeeds.
    pub failing_creates: AtomicUsize,
    /// Number of `create_session` calls that panic before one succeeds.
    pub panicking_creates: AtomicUsize,
    pub create_delay: Duration,
}

impl StubFactory {
    pub fn new(mode: StubMode) -> Self {
        Self {
            mode,
            counters: Counters::default(),
            failing_creates: AtomicUsize::new(0),
            panicking_creates: AtomicUsize::new(0),
            create_delay: Duration::ZERO,
        }
    }
}

impl SessionFactory for StubFactory {
    fn prepare_runtime(&self) -> Result<()> {
        self.counters.runtimes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_session(&self, weights: &[u8]) -> Result<Box<dyn InferenceSession>> {
        thread::sleep(self.create_delay);
        self.counters.sessions.fetch_add(1, Ordering::SeqCst);
        if weights.is_empty() {
            return Err(StemError::ModelLoad("empty weights".into()));
        }
        let panics = self.panicking_creates.load(Ordering::SeqCst);
        if panics > 0 {
            self.panicking_creates.store(panics - 1, Ordering::SeqCst);
            panic!("session constructor blew up");
        }
        let remaining = self.failing_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("corrupt graph").into());
        }
        Ok(Box::new(StubSession {
            mode: self.mode,
            runs: Arc::clone(&self.counters.runs),
        }))
    }
}

struct StubSession {
    mode: StubMode,
    runs: Arc<AtomicUsize>,
}

impl InferenceSession for StubSession {
    fn run(&mut self, input: TensorFrame) -> Result<TensorFrame> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            StubMode::Zero => Ok(TensorFrame::zeros(input.raw_dim())),
            StubMode::Echo => Ok(input),
            StubMode::Fail => Err(anyhow::anyhow!("device lost").into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryCache {
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub puts: AtomicUsize,
}

impl MemoryCache {
    pub fn seeded(key: &str, bytes: &[u8]) -> Self {
        let cache = Self::default();
        cache
            .blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        cache
    }
}

impl BlobCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Reads always miss, writes always fail.
pub struct BrokenCache;

impl BlobCache for BrokenCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(anyhow::anyhow!("storage unavailable").into())
    }

    fn put(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
        Err(anyhow::anyhow!("quota exceeded").into())
    }
}

pub fn spec_with_mirrors(mirrors: Vec<String>) -> ModelSpec {
    ModelSpec {
        name: MODEL_KEY.into(),
        mirrors,
        sha256: None,
    }
}

/// Gateway whose weights are already cached, so no network is touched.
pub fn cached_gateway(mode: StubMode) -> (Arc<ModelGateway>, Counters) {
    let factory = StubFactory::new(mode);
    let counters = factory.counters.clone();
    let gateway = ModelGateway::new(
        spec_with_mirrors(Vec::new()),
        Box::new(MemoryCache::seeded(MODEL_KEY, b"weights")),
        Box::new(factory),
    )
    .unwrap();
    (Arc::new(gateway), counters)
}

pub fn stereo_sine(seconds: f32, freq_l: f32, freq_r: f32) -> StereoSignal {
    let n = (seconds * SAMPLE_RATE as f32) as usize;
    let sr = SAMPLE_RATE as f32;
    let left = (0..n)
        .map(|i| (2.0 * PI * freq_l * i as f32 / sr).sin() * 0.4)
        .collect();
    let right = (0..n)
        .map(|i| (2.0 * PI * freq_r * i as f32 / sr).sin() * 0.3)
        .collect();
    StereoSignal::new(left, right)
}

/// Records every progress event and state transition.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<Progress>>,
    pub states: Mutex<Vec<JobState>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Progress> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<JobState> {
        self.states.lock().unwrap().clone()
    }
}

impl ProgressObserver for Recorder {
    fn on_progress(&self, progress: &Progress) {
        self.events.lock().unwrap().push(progress.clone());
    }

    fn on_state(&self, state: &JobState) {
        self.states.lock().unwrap().push(*state);
    }
}

pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
