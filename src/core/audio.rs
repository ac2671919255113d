use std::{
    fs,
    io::Cursor,
    path::Path,
};

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info};
use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::{
    core::dsp::to_planar_stereo,
    error::{Result, StemError},
    types::{StereoSignal, SAMPLE_RATE},
};

const RESAMPLE_CHUNK: usize = 1024;
const RESAMPLE_SUB_CHUNKS: usize = 2;
const DELAY_SEARCH_BLOCKS: usize = 8;

fn decode_err(context: &str, e: impl std::fmt::Display) -> StemError {
    StemError::Decode(format!("{context}: {e}"))
}

/// Decode any supported container/codec into stereo float PCM at 44.1 kHz.
pub fn decode_to_stereo(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<StereoSignal> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err("unrecognised audio format", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| StemError::Decode("no default track found".into()))?;
    let track_id = track.id;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("unsupported codec", e))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(SAMPLE_RATE);
    let mut channels: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err("demux failed", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("skipping corrupt packet: {e}");
                continue;
            }
            Err(e) => return Err(decode_err("decode failed", e)),
        };
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buffer.samples());
    }

    let planar = to_planar_stereo(&interleaved, channels);
    if planar.is_empty() {
        return Err(StemError::Decode("decoded audio contains no samples".into()));
    }

    let left: Vec<f32> = planar.iter().map(|f| f[0]).collect();
    let right: Vec<f32> = planar.iter().map(|f| f[1]).collect();

    info!(
        "Decoded audio: sample_rate={}, channels={}, frames={}",
        sample_rate,
        channels,
        left.len()
    );

    if sample_rate == SAMPLE_RATE {
        return Ok(StereoSignal::new(left, right));
    }

    let (left, right) = resample_stereo(left, right, sample_rate, SAMPLE_RATE)?;
    Ok(StereoSignal::new(left, right))
}

fn make_resampler(sr_in: u32, sr_out: u32, channels: usize) -> Result<FftFixedIn<f32>> {
    FftFixedIn::<f32>::new(
        sr_in as usize,
        sr_out as usize,
        RESAMPLE_CHUNK,
        RESAMPLE_SUB_CHUNKS,
        channels,
    )
    .map_err(|e| decode_err("resampler setup failed", e))
}

/// Output frames by which the resampler lags its input, found by pushing a
/// unit impulse through a fresh instance and locating the response peak.
fn resampler_delay(sr_in: u32, sr_out: u32) -> Result<usize> {
    let mut resampler = make_resampler(sr_in, sr_out, 1)?;
    let mut response = Vec::new();
    for block in 0..DELAY_SEARCH_BLOCKS {
        let mut input = vec![vec![0.0f32; RESAMPLE_CHUNK]];
        if block == 0 {
            input[0][0] = 1.0;
        }
        let out = resampler
            .process(&input, None)
            .map_err(|e| decode_err("resampling failed", e))?;
        response.extend_from_slice(&out[0]);
    }

    let peak = response
        .iter()
        .enumerate()
        .fold((0, 0.0f32), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
    Ok(peak.0)
}

fn resample_stereo(
    left: Vec<f32>,
    right: Vec<f32>,
    sr_in: u32,
    sr_out: u32,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let delay = resampler_delay(sr_in, sr_out)?;
    debug!("Resampling {sr_in} Hz -> {sr_out} Hz (latency {delay} frames)");
    let mut resampler = make_resampler(sr_in, sr_out, 2)?;

    let expected_len = (left.len() as f64 * sr_out as f64 / sr_in as f64).ceil() as usize;
    let wanted = expected_len + delay;
    let mut out_l = Vec::with_capacity(wanted + RESAMPLE_CHUNK);
    let mut out_r = Vec::with_capacity(wanted + RESAMPLE_CHUNK);

    let mut pos = 0;
    // Keep feeding silence until the delay line has flushed every real sample.
    while out_l.len() < wanted {
        let mut block = vec![vec![0.0f32; RESAMPLE_CHUNK]; 2];
        if pos < left.len() {
            let end = (pos + RESAMPLE_CHUNK).min(left.len());
            block[0][..end - pos].copy_from_slice(&left[pos..end]);
            block[1][..end - pos].copy_from_slice(&right[pos..end]);
        }
        pos += RESAMPLE_CHUNK;

        let frames = resampler
            .process(&block, None)
            .map_err(|e| decode_err("resampling failed", e))?;
        out_l.extend_from_slice(&frames[0]);
        out_r.extend_from_slice(&frames[1]);
    }

    out_l.truncate(wanted);
    out_r.truncate(wanted);
    out_l.drain(..delay);
    out_r.drain(..delay);
    Ok((out_l, out_r))
}

/// Encode stereo float PCM as a canonical 44-byte-header, 16-bit, 44.1 kHz WAV.
///
/// Samples are clamped to [-1, 1], then scaled by 32768 when negative and
/// 32767 otherwise.
pub fn encode_wav_stereo(left: &[f32], right: &[f32]) -> Result<Vec<u8>> {
    let frames = left.len().min(right.len());
    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut bytes = Vec::with_capacity(44 + frames * 4);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)
            .map_err(|e| anyhow::anyhow!("wav header: {e}"))?;
        for i in 0..frames {
            writer
                .write_sample(float_to_pcm16(left[i]))
                .map_err(|e| anyhow::anyhow!("wav write: {e}"))?;
            writer
                .write_sample(float_to_pcm16(right[i]))
                .map_err(|e| anyhow::anyhow!("wav write: {e}"))?;
        }
        writer
            .finalize()
            .map_err(|e| anyhow::anyhow!("wav finalize: {e}"))?;
    }
    Ok(bytes)
}

pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<StereoSignal> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to open audio file {:?}: {e}", path))?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_to_stereo(bytes, ext)
}

pub fn write_wav<P: AsRef<Path>>(path: P, signal: &StereoSignal) -> Result<()> {
    let bytes = encode_wav_stereo(&signal.left, &signal.right)?;
    fs::write(path, bytes)?;
    Ok(())
}
