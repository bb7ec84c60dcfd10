//! CPAL output sink.
//!
//! `cpal::Stream` can't always move between threads, so each sink runs a small
//! worker thread that builds the stream, starts it on request and drops it on
//! teardown. The device data callback converts queued little-endian PCM into the
//! device sample type. When the last whole frame of a buffer has been written,
//! the buffer is popped and handed back through the completion handle, which
//! refills the queue on this same thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::device;
use crate::error::{Result, StreamError};
use crate::format::AudioFormat;
use crate::pool::PcmBuffer;
use crate::registry::CompletionHandle;
use crate::sink::{OutputBackend, OutputSink, SubmitRejected};

/// Creates [`CpalSink`]s on the default host.
#[derive(Clone, Debug)]
pub struct CpalBackend {
    /// Substring of the output device name; `None` for the default device.
    pub device: Option<String>,
    /// Preferred device callback period.
    pub period_ms: u32,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self {
            device: None,
            period_ms: 10,
        }
    }
}

impl OutputBackend for CpalBackend {
    fn create_output(
        &self,
        format: AudioFormat,
        queue_depth: usize,
    ) -> Result<Box<dyn OutputSink>> {
        let sink = CpalSink::open(self.device.clone(), self.period_ms, format, queue_depth)?;
        Ok(Box::new(sink))
    }
}

/// Buffers queued at the device plus the read offset into the front one.
struct QueueState {
    queue: VecDeque<PcmBuffer>,
    read_pos: usize,
}

impl QueueState {
    /// Write whole frames from the front buffer into `out`.
    ///
    /// Returns `(samples written, frames written)`.
    fn render_into<T>(&mut self, out: &mut [T], format: AudioFormat) -> (usize, u64)
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let Some(front) = self.queue.front() else {
            return (0, 0);
        };
        let bytes = front.as_bytes();
        let channels = usize::from(format.channels());
        let sample_bytes = format.bytes_per_sample();
        let frame_bytes = format.frame_bytes();
        let bits = format.bits_per_sample();

        let mut written = 0usize;
        let mut frames = 0u64;
        while written + channels <= out.len() && self.read_pos + frame_bytes <= bytes.len() {
            for ch in 0..channels {
                let at = self.read_pos + ch * sample_bytes;
                let sample = decode_sample(&bytes[at..at + sample_bytes], bits);
                out[written + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
            }
            written += channels;
            self.read_pos += frame_bytes;
            frames += 1;
        }
        (written, frames)
    }

    /// Pop the front buffer once no whole frame is left in it.
    fn pop_finished(&mut self, frame_bytes: usize) -> Option<PcmBuffer> {
        let front = self.queue.front()?;
        if self.read_pos + frame_bytes > front.len() {
            self.read_pos = 0;
            self.queue.pop_front()
        } else {
            None
        }
    }
}

/// State shared by the sink handle, its worker thread and the data callback.
struct Shared {
    format: AudioFormat,
    queue: Mutex<QueueState>,
    playing: AtomicBool,
    completion: OnceLock<CompletionHandle>,
    played_frames: AtomicU64,
    underrun_events: AtomicU64,
}

enum StreamCommand {
    Play(Sender<Result<()>>),
    Shutdown,
}

/// Output path on one CPAL device.
pub struct CpalSink {
    shared: Arc<Shared>,
    queue_depth: usize,
    cmd_tx: Sender<StreamCommand>,
    worker: Option<JoinHandle<()>>,
    device_name: String,
}

impl CpalSink {
    fn open(
        device: Option<String>,
        period_ms: u32,
        format: AudioFormat,
        queue_depth: usize,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            format,
            queue: Mutex::new(QueueState {
                queue: VecDeque::with_capacity(queue_depth),
                read_pos: 0,
            }),
            playing: AtomicBool::new(false),
            completion: OnceLock::new(),
            played_frames: AtomicU64::new(0),
            underrun_events: AtomicU64::new(0),
        });

        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("pcm-output".to_string())
            .spawn(move || stream_worker(device, period_ms, worker_shared, ready_tx, cmd_rx))
            .map_err(|e| StreamError::backend_init("engine", e))?;

        match ready_rx.recv() {
            Ok(Ok(device_name)) => {
                tracing::info!(device = %device_name, format = %format, "output device");
                Ok(Self {
                    shared,
                    queue_depth,
                    cmd_tx,
                    worker: Some(worker),
                    device_name,
                })
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(StreamError::backend_init(
                    "engine",
                    "output thread exited during setup",
                ))
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Device callbacks that ran out of queued audio.
    pub fn underrun_events(&self) -> u64 {
        self.shared.underrun_events.load(Ordering::Relaxed)
    }
}

impl OutputSink for CpalSink {
    fn register_completion(&mut self, handle: CompletionHandle) -> Result<()> {
        self.shared.completion.set(handle).map_err(|_| {
            StreamError::backend_init("register callback", "completion callback already registered")
        })
    }

    fn submit(&mut self, buffer: PcmBuffer) -> Result<(), SubmitRejected> {
        let Ok(mut q) = self.shared.queue.lock() else {
            return Err(SubmitRejected {
                buffer,
                reason: "output queue poisoned".to_string(),
            });
        };
        if q.queue.len() >= self.queue_depth {
            return Err(SubmitRejected {
                buffer,
                reason: format!("output queue full ({} buffers)", self.queue_depth),
            });
        }
        q.queue.push_back(buffer);
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) -> Result<()> {
        if !playing {
            // The data callback outputs silence and stops draining the queue.
            self.shared.playing.store(false, Ordering::Release);
            return Ok(());
        }
        let gone = || StreamError::Backend("output thread is gone".to_string());
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(StreamCommand::Play(ack_tx))
            .map_err(|_| gone())?;
        ack_rx.recv().map_err(|_| gone())??;
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn position_ms(&self) -> Option<u64> {
        let frames = self.shared.played_frames.load(Ordering::Relaxed);
        Some(frames.saturating_mul(1000) / u64::from(self.shared.format.sample_rate()))
    }

    fn destroy(&mut self) -> Vec<PcmBuffer> {
        self.shared.playing.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = self.cmd_tx.send(StreamCommand::Shutdown);
            if worker.join().is_err() {
                tracing::warn!("output thread panicked");
            }
            tracing::debug!(
                underruns = self.underrun_events(),
                "output stream closed"
            );
        }
        let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        q.read_pos = 0;
        q.queue.drain(..).collect()
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.destroy();
        }
    }
}

/// Worker thread body: own the stream until shutdown.
fn stream_worker(
    device: Option<String>,
    period_ms: u32,
    shared: Arc<Shared>,
    ready_tx: Sender<Result<String>>,
    cmd_rx: Receiver<StreamCommand>,
) {
    let (stream, device_name) = match build_stream(device.as_deref(), period_ms, &shared) {
        Ok(built) => built,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    let _ = ready_tx.send(Ok(device_name));

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            StreamCommand::Play(ack) => {
                let result = stream
                    .play()
                    .map_err(|e| StreamError::Backend(format!("start stream: {e}")));
                let _ = ack.send(result);
            }
            StreamCommand::Shutdown => break,
        }
    }
    // Dropping the stream stops the data callback before the join in `destroy` returns.
    drop(stream);
}

fn build_stream(
    needle: Option<&str>,
    period_ms: u32,
    shared: &Arc<Shared>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, needle)
        .map_err(|e| StreamError::backend_init("output device", format!("{e:#}")))?;
    let device_name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let format = shared.format;
    let supported = device::pick_output_config(&device, format.channels(), format.sample_rate())
        .map_err(|e| StreamError::backend_init("output config", format!("{e:#}")))?;
    let mut config: cpal::StreamConfig = supported.config();
    let period_frames = (u64::from(format.sample_rate()) * u64::from(period_ms) / 1000).max(1);
    if let Some(size) = device::pick_buffer_size(&supported, period_frames as u32) {
        config.buffer_size = size;
    }
    tracing::info!(
        device = %device_name,
        sample_format = ?supported.sample_format(),
        buffer_size = ?config.buffer_size,
        "output stream config"
    );

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, shared),
        cpal::SampleFormat::I32 => build_typed::<i32>(&device, &config, shared),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, shared),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, shared),
        other => Err(StreamError::backend_init(
            "player",
            format!("unsupported sample format: {other:?}"),
        )),
    }?;
    Ok((stream, device_name))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: &Arc<Shared>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let shared = shared.clone();
    let err_fn = |err| tracing::warn!("stream error: {err}");
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| render(&shared, data),
            err_fn,
            None,
        )
        .map_err(|e| StreamError::backend_init("player", e))
}

/// Device data callback.
///
/// Holds the queue lock only while copying; completions run with it released
/// because they queue the refilled buffer.
fn render<T>(shared: &Shared, data: &mut [T])
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    if !shared.playing.load(Ordering::Acquire) {
        data.fill(silence);
        return;
    }

    let format = shared.format;
    let mut written = 0usize;
    let mut frames = 0u64;
    loop {
        let finished = {
            let Ok(mut q) = shared.queue.lock() else {
                break;
            };
            let (w, f) = q.render_into(&mut data[written..], format);
            written += w;
            frames += f;
            q.pop_finished(format.frame_bytes())
        };
        match finished {
            Some(buffer) => match shared.completion.get() {
                Some(handle) => handle.complete(buffer),
                None => drop(buffer),
            },
            None => break,
        }
    }

    if frames > 0 {
        shared.played_frames.fetch_add(frames, Ordering::Relaxed);
    }
    if written < data.len() {
        data[written..].fill(silence);
        shared.underrun_events.fetch_add(1, Ordering::Relaxed);
    }
}

/// One little-endian PCM sample as `f32` in `[-1.0, 1.0)`. 8-bit is unsigned.
fn decode_sample(bytes: &[u8], bits: u16) -> f32 {
    match bits {
        8 => (f32::from(bytes[0]) - 128.0) / 128.0,
        16 => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32_768.0,
        24 => {
            let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}
