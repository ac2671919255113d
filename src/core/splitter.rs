use crate::{
    core::{
        audio::{decode_to_stereo, encode_wav_stereo},
        chunk::{merge_chunks, split_into_chunks, Chunk},
        dsp::{istft, pad_center, stft, trim_center, ComplexSpectrogram, CENTER_PAD},
        tensor::{pack_segment, segment_count, unpack_segment, SEGMENT_FRAMES},
    },
    error::Result,
    io::progress::{CancelToken, JobState, Progress, ProgressObserver, Stage},
    model::{model_manager::ModelGateway, registry::resolve_model},
    types::{
        Outcome, SeparatedStems, SeparatorConfig, SplitOptions, SplitResult, StemWavs,
        StereoSignal,
    },
};

use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

const LOAD_SPAN: (f32, f32) = (0.0, 30.0);
const EXTRACT_SPAN: (f32, f32) = (30.0, 40.0);
const SEPARATE_SPAN: (f32, f32) = (40.0, 90.0);
const ENCODE_SPAN: (f32, f32) = (90.0, 100.0);

/// Sequences decode → chunk → per-chunk inference → merge → residual →
/// encode, publishing progress and honouring cancellation between units of
/// work.
pub struct Separator {
    gateway: Arc<ModelGateway>,
    config: SeparatorConfig,
}

/// Per-job bookkeeping: current state plus the progress high-water mark.
struct Job<'a> {
    observer: &'a dyn ProgressObserver,
    cancel: &'a CancelToken,
    state: JobState,
    percent: f32,
}

impl<'a> Job<'a> {
    fn new(observer: &'a dyn ProgressObserver, cancel: &'a CancelToken) -> Self {
        Self {
            observer,
            cancel,
            state: JobState::Idle,
            percent: 0.0,
        }
    }

    fn enter(&mut self, next: JobState) {
        debug!("job {:?} -> {:?}", self.state, next);
        self.state = next;
        self.observer.on_state(&next);
    }

    /// Move to `next` unless cancellation was requested, in which case the
    /// job ends as cancelled and `false` is returned.
    fn advance(&mut self, next: JobState) -> bool {
        if self.cancel.is_cancelled() {
            info!("separation cancelled before {:?}", next);
            self.enter(JobState::Cancelled);
            return false;
        }
        self.enter(next);
        true
    }

    fn emit(&mut self, stage: Stage, percent: f32, message: impl Into<String>) {
        self.percent = self.percent.max(percent.clamp(0.0, 100.0));
        self.observer
            .on_progress(&Progress::new(stage, self.percent, message));
    }

    fn fail<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.enter(JobState::Failed);
        }
        result
    }
}

/// Rescales stage-local load progress into the job's overall span.
struct LoadProgress<'j, 'a> {
    job: Mutex<&'j mut Job<'a>>,
}

impl ProgressObserver for LoadProgress<'_, '_> {
    fn on_progress(&self, progress: &Progress) {
        if let Ok(mut job) = self.job.lock() {
            let overall = lerp(LOAD_SPAN, progress.percent / 100.0);
            job.emit(progress.stage, overall, progress.message.clone());
        }
    }
}

fn lerp((from, to): (f32, f32), t: f32) -> f32 {
    from + (to - from) * t
}

impl Separator {
    pub fn new(gateway: Arc<ModelGateway>, config: SeparatorConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Separate an encoded audio blob into vocal and instrumental WAV blobs.
    pub fn separate(
        &self,
        audio: Vec<u8>,
        extension_hint: Option<&str>,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<Outcome<StemWavs>> {
        let mut job = Job::new(observer, cancel);

        if !self.load_model(&mut job)? {
            return Ok(Outcome::Cancelled);
        }

        if !job.advance(JobState::ExtractingAudio) {
            return Ok(Outcome::Cancelled);
        }
        job.emit(Stage::Extract, EXTRACT_SPAN.0, "Decoding audio");
        let signal = job.fail(decode_to_stereo(audio, extension_hint))?;
        job.emit(
            Stage::Extract,
            EXTRACT_SPAN.1,
            format!("Decoded {:.1} s of audio", signal.duration_secs()),
        );

        let stems = match self.run_separation(&mut job, &signal)? {
            Outcome::Done(stems) => stems,
            Outcome::Cancelled => return Ok(Outcome::Cancelled),
        };

        if !job.advance(JobState::Encoding) {
            return Ok(Outcome::Cancelled);
        }
        job.emit(Stage::Encode, ENCODE_SPAN.0, "Encoding WAV");
        let wavs = job.fail(encode_stems(&stems))?;
        job.emit(Stage::Encode, ENCODE_SPAN.1, "Encoding complete");
        job.enter(JobState::Done);

        Ok(Outcome::Done(wavs))
    }

    /// Separate already-decoded PCM. Skips the extraction and encoding stages.
    pub fn separate_signal(
        &self,
        signal: &StereoSignal,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<Outcome<SeparatedStems>> {
        let mut job = Job::new(observer, cancel);

        if !self.load_model(&mut job)? {
            return Ok(Outcome::Cancelled);
        }
        job.emit(Stage::Extract, EXTRACT_SPAN.1, "Audio ready");

        let outcome = self.run_separation(&mut job, signal)?;
        if let Outcome::Done(_) = outcome {
            job.emit(Stage::Encode, ENCODE_SPAN.1, "Separation complete");
            job.enter(JobState::Done);
        }
        Ok(outcome)
    }

    /// Returns `false` when the job was cancelled before loading.
    fn load_model(&self, job: &mut Job<'_>) -> Result<bool> {
        if !job.advance(JobState::LoadingModel) {
            return Ok(false);
        }
        job.emit(Stage::Download, LOAD_SPAN.0, "Preparing AI model");

        let result = {
            let sink = LoadProgress {
                job: Mutex::new(&mut *job),
            };
            self.gateway.load(&sink)
        };
        job.fail(result)?;
        job.emit(Stage::Download, LOAD_SPAN.1, "AI model ready");
        Ok(true)
    }

    fn run_separation(
        &self,
        job: &mut Job<'_>,
        signal: &StereoSignal,
    ) -> Result<Outcome<SeparatedStems>> {
        let chunk_cfg = &self.config.chunk;
        let left_chunks = split_into_chunks(&signal.left, chunk_cfg);
        let right_chunks = split_into_chunks(&signal.right, chunk_cfg);
        let total = left_chunks.len();
        info!(
            "separating {} samples in {} chunk(s)",
            signal.len(),
            total
        );

        let mut instr_left = Vec::with_capacity(total);
        let mut instr_right = Vec::with_capacity(total);

        for (c, (l, r)) in left_chunks.iter().zip(&right_chunks).enumerate() {
            if !job.advance(JobState::Separating { chunk: c, total }) {
                return Ok(Outcome::Cancelled);
            }
            job.emit(
                Stage::Separate,
                lerp(SEPARATE_SPAN, c as f32 / total as f32),
                format!("Separating... ({}/{})", c + 1, total),
            );

            let (il, ir) = job.fail(self.process_chunk(&l.samples, &r.samples))?;
            instr_left.push(Chunk {
                offset: l.offset,
                samples: il,
            });
            instr_right.push(Chunk {
                offset: r.offset,
                samples: ir,
            });
        }
        job.emit(Stage::Separate, SEPARATE_SPAN.1, "Separation complete");

        let overlap = chunk_cfg.overlap_samples;
        let instrumental = StereoSignal::new(
            merge_chunks(&instr_left, signal.len(), overlap),
            merge_chunks(&instr_right, signal.len(), overlap),
        );
        let vocals = residual(signal, &instrumental);

        Ok(Outcome::Done(SeparatedStems {
            vocals,
            instrumental,
        }))
    }

    /// Instrumental estimate for one stereo chunk: center-pad, STFT, model
    /// calls per 256-frame segment, iSTFT, trim.
    fn process_chunk(&self, left: &[f32], right: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
        let len = left.len();
        let padded_l = pad_center(left, CENTER_PAD);
        let padded_r = pad_center(right, CENTER_PAD);
        let padded_len = padded_l.len();

        let (spec_l, spec_r) = rayon::join(|| stft(&padded_l), || stft(&padded_r));
        let frames = spec_l.num_frames();
        let segments = segment_count(frames);
        debug!("chunk: {len} samples, {frames} frames, {segments} segment(s)");

        let mut out_l = ComplexSpectrogram::zeros(frames);
        let mut out_r = ComplexSpectrogram::zeros(frames);
        for s in 0..segments {
            let start = s * SEGMENT_FRAMES;
            let input = pack_segment(&spec_l, &spec_r, start);
            let output = self.gateway.run(input)?;
            unpack_segment(&output, &mut out_l, &mut out_r, start);
        }
        drop((spec_l, spec_r));

        let (full_l, full_r) = rayon::join(
            || istft(&out_l, padded_len),
            || istft(&out_r, padded_len),
        );
        Ok((
            trim_center(full_l, CENTER_PAD, len),
            trim_center(full_r, CENTER_PAD, len),
        ))
    }
}

/// `original − instrumental`, per channel, in the time domain.
pub fn residual(original: &StereoSignal, instrumental: &StereoSignal) -> StereoSignal {
    let sub = |a: &[f32], b: &[f32]| -> Vec<f32> { a.iter().zip(b).map(|(x, y)| x - y).collect() };
    StereoSignal::new(
        sub(&original.left, &instrumental.left),
        sub(&original.right, &instrumental.right),
    )
}

pub fn encode_stems(stems: &SeparatedStems) -> Result<StemWavs> {
    Ok(StemWavs {
        vocals: encode_wav_stereo(&stems.vocals.left, &stems.vocals.right)?,
        instrumental: encode_wav_stereo(&stems.instrumental.left, &stems.instrumental.right)?,
    })
}

/// Resolve the model, separate `input_path`, and write
/// `<stem>_vocals.wav` / `<stem>_instrumental.wav` into the output dir.
pub fn split_file(
    input_path: &str,
    opts: &SplitOptions,
    observer: &dyn ProgressObserver,
    cancel: &CancelToken,
) -> Result<Outcome<SplitResult>> {
    let spec = resolve_model(&opts.model_name)?;
    let gateway = Arc::new(ModelGateway::with_defaults(spec)?);
    let separator = Separator::new(gateway, opts.separator_config());

    let path = Path::new(input_path);
    let bytes = fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to open audio file {:?}: {e}", path))?;
    let ext = path.extension().and_then(|e| e.to_str());

    let wavs = match separator.separate(bytes, ext, observer, cancel)? {
        Outcome::Done(wavs) => wavs,
        Outcome::Cancelled => return Ok(Outcome::Cancelled),
    };

    fs::create_dir_all(&opts.output_dir)?;
    let file_stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let base = PathBuf::from(&opts.output_dir).join(file_stem);
    let vocals_path = format!("{}_vocals.wav", base.to_string_lossy());
    let instrumental_path = format!("{}_instrumental.wav", base.to_string_lossy());

    fs::write(&vocals_path, &wavs.vocals)?;
    fs::write(&instrumental_path, &wavs.instrumental)?;

    Ok(Outcome::Done(SplitResult {
        vocals_path,
        instrumental_path,
    }))
}
