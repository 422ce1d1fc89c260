//! Native engine: symphonia decode + cpal output.
//!
//! One load owns two threads:
//! 1. the decoder opens the source, probes it and fills a sample queue
//! 2. the output thread keeps a cpal stream alive and drains the queue
//!
//! The decoder is the only reporter of Buffering/Ready/Ended; play and
//! pause report the playing flag. Seek is handled by the decoder between
//! packets.

use std::collections::VecDeque;
use std::fmt::Display;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::{CallbackSink, EngineError, EngineState, EngineTransitionReason, PlaybackEngine};
use crate::models::AudioItem;

/// Tuning for [`NativeEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Decoded audio held ahead of the device.
    pub ring_capacity_ms: u64,
    /// Audio decoded before Ready is reported.
    pub prebuffer_ms: u64,
    /// Output gain, 0.0 to 1.0.
    pub volume: f32,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            ring_capacity_ms: 4_000,
            prebuffer_ms: 250,
            volume: 0.8,
        }
    }
}

fn backend(e: impl Display) -> EngineError {
    EngineError::Backend(e.to_string())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct NativeEngine {
    config: NativeConfig,
    play_when_ready: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    current: Mutex<Option<Loaded>>,
    released: AtomicBool,
}

struct Loaded {
    item: Arc<AudioItem>,
    transport: Arc<Transport>,
    decoder: Option<JoinHandle<()>>,
}

impl Loaded {
    fn teardown(mut self) {
        self.transport.cancel.store(true, Ordering::SeqCst);
        self.transport.paused.store(true, Ordering::SeqCst);
        if let Some(handle) = self.decoder.take() {
            let _ = handle.join();
        }
    }
}

impl NativeEngine {
    pub fn new(config: NativeConfig) -> Self {
        let volume = (config.volume.clamp(0.0, 1.0) * 100.0) as u32;
        Self {
            config,
            play_when_ready: Arc::new(AtomicBool::new(true)),
            volume: Arc::new(AtomicU32::new(volume)),
            current: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        let v = (volume.clamp(0.0, 1.0) * 100.0) as u32;
        self.volume.store(v, Ordering::SeqCst);
    }

    /// Decoder position of the current item.
    pub fn position_ms(&self) -> u64 {
        self.transport()
            .map(|t| t.position_ms.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Container duration, 0 until probed or when unknown.
    pub fn duration_ms(&self) -> u64 {
        self.transport()
            .map(|t| t.duration_ms.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn transport(&self) -> Option<Arc<Transport>> {
        self.current.lock().as_ref().map(|l| Arc::clone(&l.transport))
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new(NativeConfig::default())
    }
}

impl PlaybackEngine for NativeEngine {
    fn load(&self, item: Arc<AudioItem>, sink: CallbackSink) -> Result<(), EngineError> {
        if self.is_released() {
            return Err(EngineError::Released);
        }
        let mut current = self.current.lock();
        if let Some(old) = current.take() {
            old.teardown();
        }
        let transport = Arc::new(Transport::new(sink, Arc::clone(&self.volume)));
        transport.sink.transition(EngineTransitionReason::PlaylistChanged);
        *current = Some(Loaded {
            item,
            transport,
            decoder: None,
        });
        Ok(())
    }

    fn set_play_when_ready(&self, play_when_ready: bool) {
        self.play_when_ready.store(play_when_ready, Ordering::SeqCst);
    }

    fn prepare(&self) {
        let mut current = self.current.lock();
        let Some(loaded) = current.as_mut() else {
            return;
        };
        if loaded.decoder.is_some() {
            return;
        }
        let item = Arc::clone(&loaded.item);
        let transport = Arc::clone(&loaded.transport);
        let pwr = Arc::clone(&self.play_when_ready);
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("sonata-decode".to_string())
            .spawn(move || run_decoder(&item, &transport, &pwr, &config));
        match spawned {
            Ok(handle) => loaded.decoder = Some(handle),
            Err(e) => {
                log::error!("sonata: failed to spawn decoder: {}", e);
                loaded.transport.sink.state(EngineState::Idle);
            }
        }
    }

    fn play(&self) {
        self.play_when_ready.store(true, Ordering::SeqCst);
        if let Some(t) = self.transport() {
            if t.ready.load(Ordering::SeqCst) && !t.ended.load(Ordering::SeqCst) {
                t.set_playing(true);
            }
        }
    }

    fn pause(&self) {
        self.play_when_ready.store(false, Ordering::SeqCst);
        if let Some(t) = self.transport() {
            t.set_playing(false);
        }
    }

    fn seek_to(&self, position_ms: u64) {
        if let Some(t) = self.transport() {
            *t.seek_to.lock() = Some(position_ms);
        }
    }

    fn release(&self) -> Result<(), EngineError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(loaded) = self.current.lock().take() {
            loaded.teardown();
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.transport()
            .map(|t| t.playing.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ---------------------------------------------------------------------------
// Per-load transport
// ---------------------------------------------------------------------------

struct Transport {
    sink: CallbackSink,
    cancel: AtomicBool,
    /// Output renders silence while set.
    paused: AtomicBool,
    playing: AtomicBool,
    ready: AtomicBool,
    ended: AtomicBool,
    seek_to: Mutex<Option<u64>>,
    position_ms: AtomicU64,
    duration_ms: AtomicU64,
    volume: Arc<AtomicU32>,
    queue: Mutex<SampleQueue>,
}

impl Transport {
    fn new(sink: CallbackSink, volume: Arc<AtomicU32>) -> Self {
        Self {
            sink,
            cancel: AtomicBool::new(false),
            paused: AtomicBool::new(true),
            playing: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            seek_to: Mutex::new(None),
            position_ms: AtomicU64::new(0),
            duration_ms: AtomicU64::new(0),
            volume,
            queue: Mutex::new(SampleQueue::with_capacity(0)),
        }
    }

    /// Start or silence output. Reports only actual changes.
    fn set_playing(&self, playing: bool) {
        self.paused.store(!playing, Ordering::SeqCst);
        if self.playing.swap(playing, Ordering::SeqCst) != playing {
            self.sink.playing(playing);
        }
    }

    fn mark_ready(&self, pwr: &AtomicBool) {
        self.sink.state(EngineState::Ready);
        self.ready.store(true, Ordering::SeqCst);
        if pwr.load(Ordering::SeqCst) {
            self.set_playing(true);
        }
    }

    fn seek_pending(&self) -> bool {
        self.seek_to.lock().is_some()
    }
}

// ---------------------------------------------------------------------------
// Decoder thread
// ---------------------------------------------------------------------------

fn run_decoder(item: &AudioItem, transport: &Arc<Transport>, pwr: &AtomicBool, config: &NativeConfig) {
    transport.sink.loading(true);
    if let Err(e) = decode(item, transport, pwr, config) {
        log::error!("sonata: playback of {} failed: {}", item.uri(), e);
        transport.set_playing(false);
        transport.sink.loading(false);
        transport.sink.state(EngineState::Idle);
    }
    transport.cancel.store(true, Ordering::SeqCst);
}

/// Where the output thread ended up rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputFormat {
    rate: u32,
    channels: u16,
}

fn open_source(item: &AudioItem) -> Result<(MediaSourceStream, Hint), EngineError> {
    let uri = item.uri();
    let mut hint = Hint::new();

    #[cfg(feature = "http")]
    {
        if super::http::is_remote(uri) {
            if let Some(ext) = super::http::extension_hint(uri) {
                hint.with_extension(&ext);
            }
            return Ok((super::http::open(item)?, hint));
        }
    }

    let local = uri.strip_prefix("file://").unwrap_or(uri);
    if local.contains("://") {
        return Err(EngineError::Backend(format!("unsupported source: {}", uri)));
    }
    let path = Path::new(local);
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let file = File::open(path).map_err(|e| backend(format!("{}: {}", path.display(), e)))?;
    Ok((MediaSourceStream::new(Box::new(file), Default::default()), hint))
}

fn decode(
    item: &AudioItem,
    transport: &Arc<Transport>,
    pwr: &AtomicBool,
    config: &NativeConfig,
) -> Result<(), EngineError> {
    let (mss, hint) = open_source(item)?;
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(backend)?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| backend("no default track"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let source_rate = params.sample_rate.unwrap_or(44_100);
    let source_channels = params.channels.map(|c| c.count() as u16).unwrap_or(2).max(1);
    if let Some(frames) = params.n_frames {
        transport
            .duration_ms
            .store(frames * 1000 / source_rate as u64, Ordering::SeqCst);
    }
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(backend)?;

    let (format_tx, format_rx) = mpsc::sync_channel(1);
    let output_transport = Arc::clone(transport);
    let output = thread::Builder::new()
        .name("sonata-output".to_string())
        .spawn(move || run_output(&output_transport, source_rate, source_channels, format_tx))
        .map_err(backend)?;
    let out = match format_rx.recv() {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            let _ = output.join();
            return Err(e);
        }
        Err(_) => {
            let _ = output.join();
            return Err(backend("output thread exited"));
        }
    };

    let samples_per_ms = (out.rate as u64 * out.channels as u64) / 1000;
    let capacity = (samples_per_ms * config.ring_capacity_ms.max(100)) as usize;
    *transport.queue.lock() = SampleQueue::with_capacity(capacity);
    // A prebuffer the queue cannot hold would never report Ready.
    let prebuffer = ((samples_per_ms * config.prebuffer_ms) as usize).min(capacity / 2);

    transport.sink.state(EngineState::Buffering);
    transport.sink.loading(false);

    let mut resampler = Resampler::new(source_rate, out.rate, source_channels as usize);
    if resampler.is_some() {
        log::info!("sonata: resampling {}Hz -> {}Hz", source_rate, out.rate);
    }
    let mut decoded_frames: u64 = 0;
    let mut eof = false;
    let mut scratch = Vec::new();
    let mut mixed = Vec::new();

    while !transport.cancel.load(Ordering::SeqCst) {
        let seek = transport.seek_to.lock().take();
        if let Some(ms) = seek {
            let time = Time::new(ms / 1000, (ms % 1000) as f64 / 1000.0);
            let to = SeekTo::Time {
                time,
                track_id: Some(track_id),
            };
            match format.seek(SeekMode::Accurate, to) {
                Ok(_) => {
                    decoder.reset();
                    transport.queue.lock().clear();
                    if let Some(r) = resampler.as_mut() {
                        r.reset();
                    }
                    decoded_frames = ms * source_rate as u64 / 1000;
                    transport.position_ms.store(ms, Ordering::SeqCst);
                    eof = false;
                    transport.ended.store(false, Ordering::SeqCst);
                    if transport.ready.swap(false, Ordering::SeqCst) {
                        transport.sink.state(EngineState::Buffering);
                        transport.set_playing(false);
                    }
                }
                Err(e) => log::warn!("sonata: seek to {}ms failed: {}", ms, e),
            }
        }

        if eof {
            if !transport.ready.load(Ordering::SeqCst) {
                transport.mark_ready(pwr);
            }
            let drained = transport.queue.lock().is_empty();
            if drained && !transport.ended.swap(true, Ordering::SeqCst) {
                transport.sink.state(EngineState::Ended);
                transport.set_playing(false);
            }
            thread::sleep(Duration::from_millis(10));
            continue;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                eof = true;
                continue;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(backend(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("sonata: skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(backend(e)),
        };
        let frames = decoded.frames();
        let mut buf = SampleBuffer::<f32>::new(frames as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);

        let resampled: &[f32] = match resampler.as_mut() {
            Some(r) => {
                scratch.clear();
                r.process(buf.samples(), &mut scratch);
                &scratch
            }
            None => buf.samples(),
        };
        mixed.clear();
        remix(resampled, source_channels as usize, &mut mixed, out.channels as usize);

        decoded_frames += frames as u64;
        transport
            .position_ms
            .store(decoded_frames * 1000 / source_rate as u64, Ordering::SeqCst);

        let mut pending: &[f32] = &mixed;
        while !pending.is_empty() {
            if transport.cancel.load(Ordering::SeqCst) || transport.seek_pending() {
                break;
            }
            let accepted = transport.queue.lock().push(pending);
            pending = &pending[accepted..];
            if !transport.ready.load(Ordering::SeqCst) && transport.queue.lock().len() >= prebuffer {
                transport.mark_ready(pwr);
            }
            if !pending.is_empty() {
                thread::sleep(Duration::from_millis(5));
            }
        }
        if !transport.ready.load(Ordering::SeqCst) && transport.queue.lock().len() >= prebuffer {
            transport.mark_ready(pwr);
        }
    }

    transport.cancel.store(true, Ordering::SeqCst);
    let _ = output.join();
    Ok(())
}

// ---------------------------------------------------------------------------
// Output thread
// ---------------------------------------------------------------------------

fn run_output(
    transport: &Arc<Transport>,
    source_rate: u32,
    source_channels: u16,
    format_tx: SyncSender<Result<OutputFormat, EngineError>>,
) {
    let stream = match open_stream(transport, source_rate, source_channels) {
        Ok((stream, format)) => {
            let _ = format_tx.send(Ok(format));
            stream
        }
        Err(e) => {
            let _ = format_tx.send(Err(e));
            return;
        }
    };
    while !transport.cancel.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(25));
    }
    drop(stream);
}

/// Open the default device, at the track's rate when the device allows it.
fn open_stream(
    transport: &Arc<Transport>,
    source_rate: u32,
    source_channels: u16,
) -> Result<(cpal::Stream, OutputFormat), EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| backend("no output device"))?;

    let native_fit = device
        .supported_output_configs()
        .map(|mut ranges| {
            ranges.any(|r| {
                r.sample_format() == cpal::SampleFormat::F32
                    && r.channels() >= source_channels
                    && r.min_sample_rate().0 <= source_rate
                    && r.max_sample_rate().0 >= source_rate
            })
        })
        .unwrap_or(false);

    let config = if native_fit {
        cpal::StreamConfig {
            channels: source_channels,
            sample_rate: cpal::SampleRate(source_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    } else {
        let fallback = device.default_output_config().map_err(backend)?;
        if fallback.sample_format() != cpal::SampleFormat::F32 {
            return Err(EngineError::Backend(format!(
                "device needs {:?} samples, only f32 is supported",
                fallback.sample_format()
            )));
        }
        fallback.config()
    };
    let format = OutputFormat {
        rate: config.sample_rate.0,
        channels: config.channels.max(1),
    };

    let cb = Arc::clone(transport);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cb.paused.load(Ordering::SeqCst) {
                    data.fill(0.0);
                    return;
                }
                cb.queue.lock().pull(data);
                let gain = cb.volume.load(Ordering::SeqCst) as f32 / 100.0;
                data.iter_mut().for_each(|s| *s *= gain);
            },
            |err| log::error!("sonata: output stream error: {}", err),
            None,
        )
        .map_err(backend)?;
    stream.play().map_err(backend)?;
    Ok((stream, format))
}

// ---------------------------------------------------------------------------
// Sample plumbing
// ---------------------------------------------------------------------------

/// Bounded FIFO of interleaved samples.
struct SampleQueue {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleQueue {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append what fits; returns how many samples were taken.
    fn push(&mut self, input: &[f32]) -> usize {
        let n = input.len().min(self.capacity - self.samples.len());
        self.samples.extend(&input[..n]);
        n
    }

    /// Fill `out`, padding with silence. Returns real samples written.
    fn pull(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.samples.len());
        for (slot, sample) in out.iter_mut().zip(self.samples.drain(..n)) {
            *slot = sample;
        }
        out[n..].fill(0.0);
        n
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Linear-interpolating rate converter that carries the last frame across
/// chunks, so chunk boundaries do not click.
struct Resampler {
    /// Source frames advanced per output frame.
    step: f64,
    /// Read position in the current chunk; -1.0 addresses `last`.
    cursor: f64,
    channels: usize,
    last: Vec<f32>,
}

impl Resampler {
    /// `None` when no conversion is needed.
    fn new(from: u32, to: u32, channels: usize) -> Option<Self> {
        if from == to || from == 0 || to == 0 {
            return None;
        }
        Some(Self {
            step: from as f64 / to as f64,
            cursor: 0.0,
            channels: channels.max(1),
            last: Vec::new(),
        })
    }

    fn reset(&mut self) {
        self.cursor = 0.0;
        self.last.clear();
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return;
        }
        loop {
            let base = self.cursor.floor();
            let i = base as isize;
            if i + 1 >= frames as isize {
                break;
            }
            let frac = (self.cursor - base) as f32;
            let next = (i + 1) as usize * ch;
            for c in 0..ch {
                let a = if i < 0 { self.last[c] } else { input[i as usize * ch + c] };
                let b = input[next + c];
                out.push(a + (b - a) * frac);
            }
            self.cursor += self.step;
        }
        self.cursor -= frames as f64;
        self.last.clear();
        self.last.extend_from_slice(&input[(frames - 1) * ch..frames * ch]);
    }
}

/// Convert interleaved frames between channel layouts.
///
/// Mono fans out to every channel, anything folds down to mono by
/// averaging, other layouts copy shared channels and zero the rest.
fn remix(input: &[f32], from: usize, out: &mut Vec<f32>, to: usize) {
    if from == to {
        out.extend_from_slice(input);
        return;
    }
    for frame in input.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            let shared = from.min(to);
            out.extend_from_slice(&frame[..shared]);
            out.extend(std::iter::repeat(0.0).take(to - shared));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSignal, Inbound};

    #[test]
    fn queue_takes_only_what_fits() {
        let mut q = SampleQueue::with_capacity(4);
        assert_eq!(q.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(q.push(&[4.0, 5.0]), 1);
        let mut out = [9.0f32; 6];
        assert_eq!(q.pull(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
        assert!(q.is_empty());
    }

    #[test]
    fn queue_interleaves_push_and_pull() {
        let mut q = SampleQueue::with_capacity(4);
        q.push(&[1.0, 2.0, 3.0]);
        let mut out = [0.0f32; 2];
        q.pull(&mut out);
        q.push(&[4.0, 5.0, 6.0]);
        assert_eq!(q.len(), 4);
        let mut rest = [0.0f32; 4];
        q.pull(&mut rest);
        assert_eq!(rest, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn same_rate_needs_no_resampler() {
        assert!(Resampler::new(48_000, 48_000, 2).is_none());
    }

    #[test]
    fn upsampling_is_continuous_across_chunks() {
        let mut r = Resampler::new(22_050, 44_100, 1).unwrap();
        let mut out = Vec::new();
        r.process(&[0.0, 1.0, 2.0, 3.0], &mut out);
        r.process(&[4.0, 5.0], &mut out);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5]);
    }

    #[test]
    fn downsampling_halves_frames() {
        let mut r = Resampler::new(96_000, 48_000, 2).unwrap();
        let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let mut out = Vec::new();
        r.process(&input, &mut out);
        // Frames 0, 2, 4, 6 of 8 stereo frames.
        assert_eq!(out, vec![0.0, 1.0, 4.0, 5.0, 8.0, 9.0, 12.0, 13.0]);
    }

    #[test]
    fn remix_layouts() {
        let mut out = Vec::new();
        remix(&[1.0, 2.0], 1, &mut out, 2);
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0]);

        out.clear();
        remix(&[1.0, 3.0, 2.0, 4.0], 2, &mut out, 1);
        assert_eq!(out, vec![2.0, 3.0]);

        out.clear();
        remix(&[1.0, 2.0, 3.0], 3, &mut out, 2);
        assert_eq!(out, vec![1.0, 2.0]);

        out.clear();
        remix(&[1.0, 2.0], 2, &mut out, 4);
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn config_defaults_and_partial_json() {
        let config: NativeConfig = serde_json::from_str(r#"{"prebuffer_ms": 50}"#).unwrap();
        assert_eq!(config.prebuffer_ms, 50);
        assert_eq!(config.ring_capacity_ms, NativeConfig::default().ring_capacity_ms);
    }

    #[test]
    fn unsupported_scheme_is_a_backend_error() {
        let item = AudioItem::builder("rtsp://camera/stream").build().unwrap();
        assert!(matches!(open_source(&item), Err(EngineError::Backend(_))));
    }

    #[test]
    fn missing_file_reports_loading_then_idle() {
        let engine = NativeEngine::default();
        let (tx, rx) = mpsc::channel();
        let item = Arc::new(AudioItem::builder("/no/such/file.flac").build().unwrap());
        engine.load(item, CallbackSink::new(3, tx)).unwrap();
        engine.prepare();

        let mut signals = Vec::new();
        while signals.last() != Some(&EngineSignal::PlaybackStateChanged(EngineState::Idle)) {
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(Inbound::Signal { signal, .. }) => signals.push(signal),
                other => panic!("unexpected {:?} after {:?}", other, signals),
            }
        }
        assert_eq!(
            signals,
            vec![
                EngineSignal::ItemTransition(EngineTransitionReason::PlaylistChanged),
                EngineSignal::IsLoadingChanged(true),
                EngineSignal::IsLoadingChanged(false),
                EngineSignal::PlaybackStateChanged(EngineState::Idle),
            ]
        );
        assert!(!engine.is_playing());
        engine.release().unwrap();
        engine.release().unwrap();
    }
}
