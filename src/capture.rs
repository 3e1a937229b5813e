//! Audio capture via CPAL
//!
//! Acquires an input device (the default microphone, or a loopback
//! "monitor" device standing in for shared system audio), negotiates a
//! sample format from an ordered preference list, and feeds mono PCM16
//! frames over an mpsc bridge into the transcription stream.
//!
//! CPAL streams are not `Send`, so the stream is built and owned by a
//! dedicated thread that parks until stop. The audio callback runs on the
//! device's own thread and uses `try_send` into the async side; a full
//! bridge drops the frame rather than block the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Sample formats we can feed to the transcription provider, most
/// preferred first. Devices offering none of these fall back to their
/// default config.
const FORMAT_PREFERENCE: [SampleFormat; 3] =
    [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

/// Which audio source to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Default input device
    Microphone,
    /// A loopback/monitor input carrying the system's playback audio
    SystemAudio,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSource::Microphone => "microphone",
            CaptureSource::SystemAudio => "system audio",
        }
    }
}

/// Errors that abort a capture start. None of these are retried; the user
/// re-initiates after fixing the device situation.
#[derive(Debug, Clone)]
pub enum CaptureError {
    NoInputDevice,
    /// No loopback/monitor source exposes the system audio
    NoAudioTrack,
    NoSupportedFormat,
    StreamCreationFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoInputDevice => write!(f, "No audio input device found"),
            CaptureError::NoAudioTrack => write!(
                f,
                "No system audio track available. Check that a monitor/loopback source is enabled."
            ),
            CaptureError::NoSupportedFormat => write!(f, "No supported audio sample format"),
            CaptureError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Handle to an active capture. Stopping releases the stream and its
/// thread; dropping the handle stops the stream without joining.
pub struct CaptureHandle {
    stop_tx: std::sync::mpsc::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
    sample_rate: u32,
}

impl CaptureHandle {
    /// Sample rate of the frames flowing over the bridge, needed to
    /// configure the transcription stream.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop capturing. Blocks until the stream thread has released the
    /// device; run under `spawn_blocking` from async contexts.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Capture thread panicked during shutdown");
            }
        }
        log::info!("Capture stopped");
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        // Unblock the stream thread if stop() was never called
        let _ = self.stop_tx.send(());
    }
}

/// Start capturing from `source`, sending mono PCM16 frames to `frames`.
/// Blocks until the device is acquired or acquisition fails; run under
/// `spawn_blocking` from async contexts.
pub fn start_capture(
    source: CaptureSource,
    frames: mpsc::Sender<Vec<i16>>,
) -> Result<CaptureHandle, CaptureError> {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    let thread = std::thread::spawn(move || {
        let built = (|| -> Result<(Stream, u32), CaptureError> {
            let host = cpal::default_host();
            let device = select_device(&host, source)?;
            let (config, sample_format) = negotiate_config(&device)?;
            let sample_rate = config.sample_rate.0;

            log::info!(
                "Capture config: {} Hz, {} channels, {:?}",
                sample_rate,
                config.channels,
                sample_format
            );

            let stream = build_stream(&device, &config, sample_format, frames)?;
            stream
                .play()
                .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;
            Ok((stream, sample_rate))
        })();

        match built {
            Ok((stream, sample_rate)) => {
                let _ = ready_tx.send(Ok(sample_rate));
                // The stream must not leave this thread; park until stop
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("Capture thread exiting");
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
    });

    match ready_rx.recv() {
        Ok(Ok(sample_rate)) => {
            log::info!("Capture started from {}", source.as_str());
            Ok(CaptureHandle {
                stop_tx,
                thread: Some(thread),
                sample_rate,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(CaptureError::StreamCreationFailed(
            "Capture thread exited before reporting readiness".to_string(),
        )),
    }
}

fn select_device(host: &cpal::Host, source: CaptureSource) -> Result<Device, CaptureError> {
    match source {
        CaptureSource::Microphone => {
            let device = host
                .default_input_device()
                .ok_or(CaptureError::NoInputDevice)?;
            log::info!("Using audio input device: {:?}", device.name());
            Ok(device)
        }
        CaptureSource::SystemAudio => {
            let devices = host
                .input_devices()
                .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;
            for device in devices {
                if let Ok(name) = device.name() {
                    if is_loopback_name(&name) {
                        log::info!("Using system audio device: {}", name);
                        return Ok(device);
                    }
                }
            }
            Err(CaptureError::NoAudioTrack)
        }
    }
}

/// Monitor sources (PulseAudio/PipeWire) and loopback endpoints expose the
/// system's playback audio as an input device.
fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("monitor") || lower.contains("loopback")
}

/// Pick a stream config: first supported range whose format appears in the
/// preference list, at its maximum sample rate; the device default when
/// none match.
fn negotiate_config(device: &Device) -> Result<(StreamConfig, SampleFormat), CaptureError> {
    let ranges: Vec<_> = device
        .supported_input_configs()
        .map(|it| it.collect())
        .unwrap_or_default();
    let available: Vec<SampleFormat> = ranges.iter().map(|r| r.sample_format()).collect();

    if let Some(format) = select_preferred_format(&available) {
        if let Some(range) = ranges.into_iter().find(|r| r.sample_format() == format) {
            let supported = range.with_max_sample_rate();
            return Ok((supported.config(), format));
        }
    }

    log::warn!("No preferred sample format available, falling back to device default");
    let default = device
        .default_input_config()
        .map_err(|_| CaptureError::NoSupportedFormat)?;
    let format = default.sample_format();
    Ok((default.into(), format))
}

/// First format from the preference list that the device offers.
fn select_preferred_format(available: &[SampleFormat]) -> Option<SampleFormat> {
    FORMAT_PREFERENCE
        .iter()
        .copied()
        .find(|format| available.contains(format))
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    frames: mpsc::Sender<Vec<i16>>,
) -> Result<Stream, CaptureError> {
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, frames, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, frames, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, frames, err_fn),
        _ => Err(CaptureError::NoSupportedFormat),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    frames: mpsc::Sender<Vec<i16>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
{
    let channels = config.channels as usize;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                match frames.try_send(mono) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::debug!("Audio frame dropped (bridge full)");
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Convert an interleaved buffer to mono PCM16 by averaging channels.
fn downmix_to_mono<T: cpal::Sample>(data: &[T], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.iter().map(|&s| sample_to_i16(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| sample_to_i16(s) as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Convert any sample type to i16 PCM.
fn sample_to_i16<T: cpal::Sample>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample().to_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
