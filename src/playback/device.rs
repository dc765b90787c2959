//! Real audio output through cpal.
//!
//! cpal streams are not `Send` on every host, so a dedicated thread builds
//! the stream and keeps it alive. The audio callback mixes the active voices
//! and fires each voice's "ended" notification when it runs dry.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot;
use tracing::{error, info};

use super::sink::{AudioSink, EndedSignal};
use crate::dsp::AudioBuffer;
use crate::error::AudioError;

struct Voice {
    /// Interleaved stereo.
    samples: Vec<f32>,
    position: usize,
    ended: Option<oneshot::Sender<()>>,
}

struct DeviceMixer {
    voices: Vec<Voice>,
    /// Master gain applied before clipping.
    gain: f32,
}

impl DeviceMixer {
    fn new(gain: f32) -> Self {
        DeviceMixer {
            voices: Vec::new(),
            gain,
        }
    }

    fn process<T>(&mut self, output: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        for frame in output.chunks_mut(channels) {
            let (mut left, mut right) = (0.0f32, 0.0f32);
            for voice in &mut self.voices {
                if let Some(pair) = voice.samples.get(voice.position..voice.position + 2) {
                    left += pair[0];
                    right += pair[1];
                    voice.position += 2;
                }
            }
            let left = (left * self.gain).clamp(-1.0, 1.0);
            let right = (right * self.gain).clamp(-1.0, 1.0);
            match frame {
                [mono] => *mono = T::from_sample(0.5 * (left + right)),
                [l, r, rest @ ..] => {
                    *l = T::from_sample(left);
                    *r = T::from_sample(right);
                    for extra in rest {
                        *extra = T::from_sample(0.0);
                    }
                }
                [] => {}
            }
        }

        self.voices.retain_mut(|voice| {
            if voice.position + 2 <= voice.samples.len() {
                return true;
            }
            if let Some(ended) = voice.ended.take() {
                let _ = ended.send(());
            }
            false
        });
    }
}

/// Default output device of the default cpal host.
pub struct DeviceSink {
    sample_rate: u32,
    mixer: Arc<Mutex<DeviceMixer>>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceSink {
    /// Open the default output device and start its stream. Everything
    /// played is scaled by `master_gain`.
    pub fn open(master_gain: f64) -> Result<Self, AudioError> {
        let mixer = Arc::new(Mutex::new(DeviceMixer::new(master_gain as f32)));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, AudioError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let shared = Arc::clone(&mixer);
        let thread = std::thread::Builder::new()
            .name("eartrainer-audio".into())
            .spawn(move || {
                let stream = match build_stream(shared) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Hold the stream until the sink goes away.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Device(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| AudioError::Device("audio thread exited during startup".into()))??;

        Ok(DeviceSink {
            sample_rate,
            mixer,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DeviceMixer> {
        lock_mixer(&self.mixer)
    }
}

fn lock_mixer(mixer: &Mutex<DeviceMixer>) -> MutexGuard<'_, DeviceMixer> {
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn build_stream(mixer: Arc<Mutex<DeviceMixer>>) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();
    info!("Audio host: {:?}", host.id());

    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::Unavailable("no output device found".into()))?;
    if let Ok(name) = device.name() {
        info!("Audio device: {name}");
    }

    let config = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => open_stream::<f32>(&device, &config.into(), mixer, channels),
        cpal::SampleFormat::I16 => open_stream::<i16>(&device, &config.into(), mixer, channels),
        cpal::SampleFormat::U16 => open_stream::<u16>(&device, &config.into(), mixer, channels),
        other => Err(AudioError::Device(format!("unsupported sample format {other:?}"))),
    }?;
    stream
        .play()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    info!("Audio stream started at {sample_rate} Hz");
    Ok((stream, sample_rate))
}

fn open_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<DeviceMixer>>,
    channels: usize,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                lock_mixer(&mixer).process(data, channels);
            },
            |err| error!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::Device(e.to_string()))
}

impl AudioSink for DeviceSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, buffer: AudioBuffer) -> Result<EndedSignal, AudioError> {
        if buffer.sample_rate != self.sample_rate {
            return Err(AudioError::InvalidSignal(format!(
                "buffer is {} Hz, device runs at {} Hz",
                buffer.sample_rate, self.sample_rate
            )));
        }
        let (tx, rx) = oneshot::channel();
        self.lock().voices.push(Voice {
            samples: buffer.samples,
            position: 0,
            ended: Some(tx),
        });
        Ok(rx)
    }

    fn stop_all(&self) {
        self.lock().voices.clear();
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.stop_all();
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(frames: usize) -> (Voice, EndedSignal) {
        let (tx, rx) = oneshot::channel();
        let voice = Voice {
            samples: vec![0.25; frames * 2],
            position: 0,
            ended: Some(tx),
        };
        (voice, rx)
    }

    #[test]
    fn callback_mixes_voices_and_reports_drained_ones() {
        let mut mixer = DeviceMixer::new(1.0);
        let (short, mut short_ended) = voice(2);
        let (long, mut long_ended) = voice(100);
        mixer.voices.push(short);
        mixer.voices.push(long);

        let mut out = vec![0.0f32; 8];
        mixer.process(&mut out, 2);

        assert_eq!(&out[..4], &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(&out[4..], &[0.25, 0.25, 0.25, 0.25]);
        assert!(short_ended.try_recv().is_ok());
        assert!(long_ended.try_recv().is_err());
        assert_eq!(mixer.voices.len(), 1);
    }

    #[test]
    fn mono_device_gets_the_channel_average() {
        let mut mixer = DeviceMixer::new(0.5);
        let (tx, _rx) = oneshot::channel();
        mixer.voices.push(Voice {
            samples: vec![1.0, 0.0],
            position: 0,
            ended: Some(tx),
        });
        let mut out = vec![0.0f32; 1];
        mixer.process(&mut out, 1);
        assert_eq!(out, vec![0.25]);
    }
}
