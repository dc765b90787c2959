//! Audio sinks, where rendered tones go.
//!
//! A sink starts a voice for a rendered buffer and hands back an
//! [`EndedSignal`] that resolves when the voice stops on its own. The
//! playback session never relies on that signal alone; it always races it
//! against a timer.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use crate::dsp::AudioBuffer;
use crate::error::AudioError;

/// Resolves once when a voice ends naturally. A dropped sender means the
/// voice was torn down.
pub type EndedSignal = oneshot::Receiver<()>;

/// Audio output used by a [`PlaybackSession`](super::PlaybackSession).
pub trait AudioSink: Send + Sync {
    /// Rate buffers should be rendered at.
    fn sample_rate(&self) -> u32;

    /// Whether sound can be produced at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Start playing `buffer` as a new voice.
    fn start(&self, buffer: AudioBuffer) -> Result<EndedSignal, AudioError>;

    /// Silence every voice started so far. Must not block on the voices.
    fn stop_all(&self);
}

impl<T: AudioSink + ?Sized> AudioSink for Arc<T> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn start(&self, buffer: AudioBuffer) -> Result<EndedSignal, AudioError> {
        (**self).start(buffer)
    }

    fn stop_all(&self) {
        (**self).stop_all()
    }
}

// ── Silent ─────────────────────────────────────────────────────────────

/// No audio output. Every playback resolves immediately without sound.
#[derive(Debug, Clone, Copy)]
pub struct SilentSink {
    sample_rate: u32,
}

impl SilentSink {
    pub fn new(sample_rate: u32) -> Self {
        SilentSink { sample_rate }
    }
}

impl Default for SilentSink {
    fn default() -> Self {
        SilentSink::new(44100)
    }
}

impl AudioSink for SilentSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_available(&self) -> bool {
        false
    }

    fn start(&self, _buffer: AudioBuffer) -> Result<EndedSignal, AudioError> {
        Err(AudioError::Unavailable("no audio output".into()))
    }

    fn stop_all(&self) {}
}

// ── Capture ────────────────────────────────────────────────────────────

/// When a captured voice reports its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndBehavior {
    /// After the buffer's duration, like a real device.
    #[default]
    AfterBuffer,
    /// Never; exercises the session's fallback timer.
    Never,
}

/// One voice recorded by a [`CaptureSink`].
#[derive(Debug, Clone)]
pub struct CapturedVoice {
    pub buffer: AudioBuffer,
    pub started_at: Instant,
    pub ended: bool,
    pub stopped: bool,
}

impl CapturedVoice {
    /// Still sounding: neither ended nor stopped.
    pub fn is_audible(&self) -> bool {
        !self.ended && !self.stopped
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    voices: Vec<CapturedVoice>,
    timers: Vec<JoinHandle<()>>,
    /// Senders held back by [`EndBehavior::Never`].
    withheld: Vec<oneshot::Sender<()>>,
}

/// Records every voice instead of playing it. Voices "end" on the tokio
/// clock, so paused-time tests see real durations without waiting.
///
/// `start` spawns a timer task and so must be called inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    sample_rate: u32,
    end_behavior: EndBehavior,
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureSink {
    pub fn new(sample_rate: u32) -> Self {
        CaptureSink {
            sample_rate,
            end_behavior: EndBehavior::AfterBuffer,
            state: Arc::default(),
        }
    }

    pub fn with_end_behavior(mut self, end_behavior: EndBehavior) -> Self {
        self.end_behavior = end_behavior;
        self
    }

    /// Snapshot of every voice started so far.
    pub fn voices(&self) -> Vec<CapturedVoice> {
        lock(&self.state).voices.clone()
    }

    /// Number of voices still sounding.
    pub fn audible_count(&self) -> usize {
        lock(&self.state)
            .voices
            .iter()
            .filter(|v| v.is_audible())
            .count()
    }
}

fn lock(state: &Mutex<CaptureState>) -> MutexGuard<'_, CaptureState> {
    // A panicked timer task leaves the voice list intact.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioSink for CaptureSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, buffer: AudioBuffer) -> Result<EndedSignal, AudioError> {
        let (tx, rx) = oneshot::channel();
        let length = buffer.duration();

        let mut state = lock(&self.state);
        let index = state.voices.len();
        state.voices.push(CapturedVoice {
            buffer,
            started_at: Instant::now(),
            ended: false,
            stopped: false,
        });

        let shared = Arc::clone(&self.state);
        let end_behavior = self.end_behavior;
        let timer = tokio::spawn(async move {
            sleep(length).await;
            let mut state = lock(&shared);
            let voice = &mut state.voices[index];
            if voice.stopped {
                return;
            }
            voice.ended = true;
            match end_behavior {
                EndBehavior::AfterBuffer => {
                    let _ = tx.send(());
                }
                EndBehavior::Never => state.withheld.push(tx),
            }
        });
        state.timers.push(timer);
        Ok(rx)
    }

    fn stop_all(&self) {
        let mut state = lock(&self.state);
        for voice in state.voices.iter_mut().filter(|v| !v.ended) {
            voice.stopped = true;
        }
        for timer in state.timers.drain(..) {
            timer.abort();
        }
        state.withheld.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn half_second() -> AudioBuffer {
        AudioBuffer::silence(8000, 4000)
    }

    #[tokio::test(start_paused = true)]
    async fn voice_ends_after_its_buffer() {
        let sink = CaptureSink::new(8000);
        let ended = sink.start(half_second()).unwrap();
        assert_eq!(sink.audible_count(), 1);

        let started = Instant::now();
        ended.await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(502));
        assert_eq!(sink.audible_count(), 0);
        assert!(sink.voices()[0].ended);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_silences_and_drops_the_signal() {
        let sink = CaptureSink::new(8000);
        let ended = sink.start(half_second()).unwrap();
        sink.stop_all();
        assert_eq!(sink.audible_count(), 0);
        assert!(sink.voices()[0].stopped);
        assert!(ended.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn never_behavior_keeps_signal_pending() {
        let sink = CaptureSink::new(8000).with_end_behavior(EndBehavior::Never);
        let ended = sink.start(half_second()).unwrap();
        let waited = tokio::time::timeout(Duration::from_secs(5), ended).await;
        assert!(waited.is_err());
        assert!(sink.voices()[0].ended);
    }

    #[test]
    fn silent_sink_refuses_voices() {
        let sink = SilentSink::default();
        assert!(!sink.is_available());
        assert!(matches!(
            sink.start(half_second()),
            Err(AudioError::Unavailable(_))
        ));
    }
}
