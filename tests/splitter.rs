mod common;

use std::sync::Arc;

use tempfile::tempdir;
use vocal_split_core::{
    core::{chunk::ChunkConfig, splitter::residual},
    decode_to_stereo, encode_wav_stereo, write_wav, CancelToken, JobState, ModelGateway,
    Outcome, Progress, ProgressObserver, Separator, SeparatorConfig, Stage, StemError,
    StereoSignal,
};

use common::{
    cached_gateway, max_abs_diff, spec_with_mirrors, stereo_sine, MemoryCache, Recorder,
    StubFactory, StubMode,
};

fn short_chunks() -> SeparatorConfig {
    SeparatorConfig {
        chunk: ChunkConfig::from_seconds(1.0, 0.25),
    }
}

fn assert_progress_sane(events: &[Progress]) {
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(
            pair[0].percent <= pair[1].percent,
            "progress went backwards: {} -> {}",
            pair[0].percent,
            pair[1].percent
        );
    }
    assert!(events.iter().all(|p| (0.0..=100.0).contains(&p.percent)));
}

/// Requests cancellation as soon as the job reaches `Separating { chunk }`.
struct CancelAtChunk {
    chunk: usize,
    token: CancelToken,
    recorder: Recorder,
}

impl ProgressObserver for CancelAtChunk {
    fn on_progress(&self, progress: &Progress) {
        self.recorder.on_progress(progress);
    }

    fn on_state(&self, state: &JobState) {
        self.recorder.on_state(state);
        if let JobState::Separating { chunk, .. } = state {
            if *chunk == self.chunk {
                self.token.cancel();
            }
        }
    }
}

#[test]
fn silent_model_puts_everything_in_vocals() {
    let (gateway, counters) = cached_gateway(StubMode::Zero);
    let separator = Separator::new(gateway, SeparatorConfig::default());

    let input = stereo_sine(5.0, 220.0, 330.0);
    let wav = encode_wav_stereo(&input.left, &input.right).unwrap();
    let reference = decode_to_stereo(wav.clone(), Some("wav")).unwrap();

    let recorder = Recorder::default();
    let outcome = separator
        .separate(wav, Some("wav"), &recorder, &CancelToken::new())
        .unwrap();
    let stems = outcome.done().expect("job should complete");

    let vocals = decode_to_stereo(stems.vocals, Some("wav")).unwrap();
    let instrumental = decode_to_stereo(stems.instrumental, Some("wav")).unwrap();

    assert_eq!(vocals.len(), reference.len());
    assert_eq!(instrumental.len(), reference.len());
    assert!(instrumental.left.iter().all(|&s| s == 0.0));
    assert!(instrumental.right.iter().all(|&s| s == 0.0));
    assert!(max_abs_diff(&vocals.left, &reference.left) < 1e-4);
    assert!(max_abs_diff(&vocals.right, &reference.right) < 1e-4);
    assert_eq!(counters.sessions(), 1);

    let events = recorder.events();
    assert_progress_sane(&events);
    let last = events.last().unwrap();
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.stage, Stage::Encode);
    assert!(events.iter().any(|p| p.stage == Stage::Extract));
    assert!(events.iter().any(|p| p.stage == Stage::Separate));
    assert_eq!(recorder.states().last(), Some(&JobState::Done));
}

#[test]
fn identity_model_reconstructs_instrumental() {
    let (gateway, _) = cached_gateway(StubMode::Echo);
    let separator = Separator::new(gateway, SeparatorConfig::default());
    let input = stereo_sine(5.0, 440.0, 660.0);

    let stems = separator
        .separate_signal(&input, &Recorder::default(), &CancelToken::new())
        .unwrap()
        .done()
        .unwrap();

    assert_eq!(stems.instrumental.len(), input.len());
    assert!(max_abs_diff(&stems.instrumental.left, &input.left) < 1e-3);
    assert!(max_abs_diff(&stems.instrumental.right, &input.right) < 1e-3);
    assert!(stems.vocals.left.iter().all(|s| s.abs() < 1e-3));
    assert!(stems.vocals.right.iter().all(|s| s.abs() < 1e-3));
}

#[test]
fn chunked_identity_model_crossfades_seamlessly() {
    let (gateway, counters) = cached_gateway(StubMode::Echo);
    let separator = Separator::new(gateway, short_chunks());
    let input = stereo_sine(3.1, 300.0, 500.0);

    let recorder = Recorder::default();
    let stems = separator
        .separate_signal(&input, &recorder, &CancelToken::new())
        .unwrap()
        .done()
        .unwrap();

    assert!(max_abs_diff(&stems.instrumental.left, &input.left) < 1e-3);
    assert!(max_abs_diff(&stems.instrumental.right, &input.right) < 1e-3);
    // 3.1 s in 1 s chunks stepping 0.75 s, one segment each.
    assert_eq!(counters.runs(), 4);

    let separating: Vec<JobState> = recorder
        .states()
        .into_iter()
        .filter(|s| matches!(s, JobState::Separating { .. }))
        .collect();
    assert_eq!(separating.len(), 4);
    assert_eq!(separating[3], JobState::Separating { chunk: 3, total: 4 });
    assert_progress_sane(&recorder.events());
}

#[test]
fn cancelling_mid_job_stops_after_current_chunk() {
    let (gateway, counters) = cached_gateway(StubMode::Echo);
    let separator = Separator::new(gateway, short_chunks());
    let input = stereo_sine(3.0, 300.0, 500.0);

    let token = CancelToken::new();
    let observer = CancelAtChunk {
        chunk: 1,
        token: token.clone(),
        recorder: Recorder::default(),
    };
    let outcome = separator.separate_signal(&input, &observer, &token).unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(counters.runs(), 2);
    let states = observer.recorder.states();
    assert_eq!(states.last(), Some(&JobState::Cancelled));
    assert!(!states.contains(&JobState::Done));
    assert!(!states.contains(&JobState::Separating { chunk: 2, total: 4 }));
}

#[test]
fn cancel_before_start_does_no_work() {
    let (gateway, counters) = cached_gateway(StubMode::Echo);
    let separator = Separator::new(gateway, SeparatorConfig::default());
    let token = CancelToken::new();
    token.cancel();

    let recorder = Recorder::default();
    let wav = encode_wav_stereo(&[0.1; 100], &[0.1; 100]).unwrap();
    let outcome = separator.separate(wav, None, &recorder, &token).unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(counters.sessions(), 0);
    assert_eq!(recorder.states(), vec![JobState::Cancelled]);
    assert!(recorder.events().is_empty());
}

#[test]
fn inference_failure_fails_the_job() {
    let (gateway, _) = cached_gateway(StubMode::Fail);
    let separator = Separator::new(gateway, SeparatorConfig::default());

    let recorder = Recorder::default();
    let err = separator
        .separate_signal(&stereo_sine(0.5, 440.0, 440.0), &recorder, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, StemError::Inference(_)), "got {err:?}");
    let states = recorder.states();
    assert_eq!(states.last(), Some(&JobState::Failed));
    assert!(!states.contains(&JobState::Done));
}

#[test]
fn model_unavailable_fails_the_job() {
    let gateway = ModelGateway::new(
        spec_with_mirrors(Vec::new()),
        Box::new(MemoryCache::default()),
        Box::new(StubFactory::new(StubMode::Echo)),
    )
    .unwrap();
    let separator = Separator::new(Arc::new(gateway), SeparatorConfig::default());

    let recorder = Recorder::default();
    let wav = encode_wav_stereo(&[0.1; 100], &[0.1; 100]).unwrap();
    let err = separator
        .separate(wav, None, &recorder, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, StemError::Download { .. }), "got {err:?}");
    assert_eq!(recorder.states().last(), Some(&JobState::Failed));
}

#[test]
fn undecodable_input_fails_the_job() {
    let (gateway, counters) = cached_gateway(StubMode::Echo);
    let separator = Separator::new(gateway, SeparatorConfig::default());

    let recorder = Recorder::default();
    let err = separator
        .separate(b"not audio".to_vec(), None, &recorder, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, StemError::Decode(_)), "got {err:?}");
    assert_eq!(counters.runs(), 0);
    assert_eq!(recorder.states().last(), Some(&JobState::Failed));
}

#[test]
fn gateway_is_reused_across_jobs() {
    let (gateway, counters) = cached_gateway(StubMode::Zero);
    let separator = Separator::new(gateway, SeparatorConfig::default());
    let input = stereo_sine(0.5, 440.0, 440.0);

    for _ in 0..2 {
        separator
            .separate_signal(&input, &Recorder::default(), &CancelToken::new())
            .unwrap();
    }
    assert_eq!(counters.sessions(), 1);
    assert!(separator.gateway().is_loaded());
}

#[test]
fn residual_subtracts_per_channel() {
    let original = StereoSignal::new(vec![1.0, 0.5], vec![-1.0, 0.0]);
    let instrumental = StereoSignal::new(vec![0.25, 0.5], vec![-0.5, 0.75]);
    let vocals = residual(&original, &instrumental);

    assert_eq!(vocals.left, vec![0.75, 0.0]);
    assert_eq!(vocals.right, vec![-0.5, -0.75]);
}

#[test]
fn closures_observe_progress() {
    let (gateway, _) = cached_gateway(StubMode::Zero);
    let separator = Separator::new(gateway, SeparatorConfig::default());
    let seen = std::sync::Mutex::new(Vec::new());
    let observer = |p: &Progress| seen.lock().unwrap().push(p.percent);

    let dir = tempdir().unwrap();
    let path = dir.path().join("in.wav");
    write_wav(&path, &stereo_sine(0.5, 440.0, 440.0)).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let outcome = separator
        .separate(bytes, Some("wav"), &observer, &CancelToken::new())
        .unwrap();
    assert!(matches!(outcome, Outcome::Done(_)));
    assert_eq!(seen.lock().unwrap().last(), Some(&100.0));
}
