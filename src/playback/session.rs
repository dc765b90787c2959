//! One exercise's view of the audio output.
//!
//! At most one playback runs at a time. A request made while one is in
//! flight is ignored, not queued. `stop_all` is synchronous: it silences the
//! sink right away and cancels the in-flight future, which then resolves
//! [`PlaybackOutcome::Stopped`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::sink::{AudioSink, EndedSignal};
use super::{
    END_FALLBACK_MARGIN, KEY_PREVIEW_SECS, Phase, PlaybackOutcome, PlaybackPlan, PlaybackStatus,
};
use crate::dsp::{AudioBuffer, ToneSpec, render_tone};
use crate::error::AudioError;

#[derive(Debug, Default)]
struct RunState {
    cancel: Option<CancellationToken>,
    /// Bumped by every start and every stop so a stale run cannot
    /// overwrite a newer status.
    generation: u64,
}

/// How one awaited voice finished.
enum VoiceEnd {
    Ended,
    Fallback,
    Cancelled,
}

pub struct PlaybackSession {
    sink: Arc<dyn AudioSink>,
    run: Mutex<RunState>,
    status: watch::Sender<PlaybackStatus>,
    warned_unavailable: AtomicBool,
}

impl PlaybackSession {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        let (status, _) = watch::channel(PlaybackStatus::Ready);
        PlaybackSession {
            sink,
            run: Mutex::default(),
            status,
            warned_unavailable: AtomicBool::new(false),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sink.sample_rate()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    /// Follow status changes, e.g. to refresh status text.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    pub fn is_playing(&self) -> bool {
        !self.status.borrow().is_idle()
    }

    // ── Operations ─────────────────────────────────────────────────────

    /// Play one tone.
    pub async fn play_chain(
        &self,
        label: &str,
        tone: &ToneSpec,
    ) -> Result<PlaybackOutcome, AudioError> {
        self.play(&PlaybackPlan::single(Phase::tone(label, tone.clone())))
            .await
    }

    /// Play phases in order with `gap` of silence between them.
    pub async fn play_sequence(
        &self,
        phases: Vec<Phase>,
        gap: Duration,
    ) -> Result<PlaybackOutcome, AudioError> {
        self.play(&PlaybackPlan::new(phases, gap)).await
    }

    /// Start every tone together; resolves when the longest one ends.
    pub async fn play_chord_or_set(
        &self,
        label: &str,
        tones: Vec<ToneSpec>,
    ) -> Result<PlaybackOutcome, AudioError> {
        self.play(&PlaybackPlan::single(Phase::chord(label, tones)))
            .await
    }

    /// Short tone for a tapped piano key. It bypasses the one-playback rule
    /// and does not touch the status, but `stop_all` still silences it.
    pub fn preview_key(&self, frequency: f64) -> Result<PlaybackOutcome, AudioError> {
        if !self.sink_available() {
            return Ok(PlaybackOutcome::Unavailable);
        }
        let buffer = render_tone(&ToneSpec::sine(frequency, KEY_PREVIEW_SECS), self.sample_rate())?;
        // Fire and forget; nobody waits for a key preview.
        let _ended = self.sink.start(buffer)?;
        Ok(PlaybackOutcome::Completed)
    }

    /// Run a whole plan.
    pub async fn play(&self, plan: &PlaybackPlan) -> Result<PlaybackOutcome, AudioError> {
        if !self.sink_available() {
            return Ok(PlaybackOutcome::Unavailable);
        }
        let Some((token, generation)) = self.begin(plan) else {
            debug!("playback already in progress, request ignored");
            return Ok(PlaybackOutcome::Ignored);
        };

        let result = self.run_plan(plan, &token, generation).await;
        let outcome = match &result {
            Ok(PlaybackOutcome::Completed) => PlaybackStatus::Finished,
            _ => PlaybackStatus::Ready,
        };
        self.settle(generation, outcome);
        result
    }

    /// Silence everything and cancel the in-flight playback. Status returns
    /// to `Ready`.
    pub fn stop_all(&self) {
        self.sink.stop_all();
        let mut run = self.lock_run();
        if let Some(token) = run.cancel.take() {
            token.cancel();
        }
        run.generation += 1;
        self.status.send_replace(PlaybackStatus::Ready);
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn lock_run(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sink_available(&self) -> bool {
        if self.sink.is_available() {
            return true;
        }
        if !self.warned_unavailable.swap(true, Ordering::Relaxed) {
            warn!("audio output unavailable, playback will be silent");
        }
        false
    }

    /// Claim the session for a new playback, unless one is running.
    fn begin(&self, plan: &PlaybackPlan) -> Option<(CancellationToken, u64)> {
        let mut run = self.lock_run();
        if !self.status.borrow().is_idle() {
            return None;
        }
        let token = CancellationToken::new();
        run.cancel = Some(token.clone());
        run.generation += 1;
        self.status.send_replace(running_status(plan, 0));
        Some((token, run.generation))
    }

    /// Publish `status` if this run is still the current one.
    fn settle(&self, generation: u64, status: PlaybackStatus) {
        let mut run = self.lock_run();
        if run.generation != generation {
            return;
        }
        run.cancel = None;
        self.status.send_replace(status);
    }

    fn publish(&self, generation: u64, status: PlaybackStatus) {
        let run = self.lock_run();
        if run.generation == generation {
            self.status.send_replace(status);
        }
    }

    async fn run_plan(
        &self,
        plan: &PlaybackPlan,
        token: &CancellationToken,
        generation: u64,
    ) -> Result<PlaybackOutcome, AudioError> {
        let sample_rate = self.sample_rate();
        for (i, phase) in plan.phases.iter().enumerate() {
            if i > 0 && !plan.gap.is_zero() {
                self.publish(generation, PlaybackStatus::PausedBetween { next: i });
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(PlaybackOutcome::Stopped),
                    _ = sleep(plan.gap) => {}
                }
            }
            self.publish(generation, running_status(plan, i));

            let buffer = phase.render(sample_rate)?;
            if token.is_cancelled() {
                return Ok(PlaybackOutcome::Stopped);
            }
            if let VoiceEnd::Cancelled = self.play_buffer(buffer, phase.length(), token).await? {
                return Ok(PlaybackOutcome::Stopped);
            }
        }
        Ok(PlaybackOutcome::Completed)
    }

    /// Start `buffer` and wait for it to end.
    ///
    /// The sink's "ended" notification and a timer of `length` plus
    /// [`END_FALLBACK_MARGIN`] race; whichever fires first wins. The timer
    /// is the safety net for sinks that never report the end of a voice.
    async fn play_buffer(
        &self,
        buffer: AudioBuffer,
        length: Duration,
        token: &CancellationToken,
    ) -> Result<VoiceEnd, AudioError> {
        let ended: EndedSignal = self.sink.start(buffer)?;
        let end = tokio::select! {
            biased;
            _ = token.cancelled() => VoiceEnd::Cancelled,
            // A dropped sender (voice torn down by the sink) counts as ended.
            _ = ended => VoiceEnd::Ended,
            _ = sleep(length + END_FALLBACK_MARGIN) => {
                debug!(?length, "no ended notification, fallback timer fired");
                VoiceEnd::Fallback
            }
        };
        Ok(end)
    }
}

fn running_status(plan: &PlaybackPlan, phase: usize) -> PlaybackStatus {
    PlaybackStatus::Running {
        phase,
        of: plan.phases.len(),
        label: plan
            .phases
            .get(phase)
            .map(|p| p.label().to_string())
            .unwrap_or_default(),
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("sample_rate", &self.sample_rate())
            .field("status", &*self.status.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::playback::sink::{CaptureSink, EndBehavior, SilentSink};
    use crate::playback::{PAIR_GAP, SEQUENCE_GAP};

    const SR: u32 = 8000;

    fn session(sink: &CaptureSink) -> PlaybackSession {
        PlaybackSession::new(Arc::new(sink.clone()))
    }

    fn three_notes() -> Vec<Phase> {
        [261.63, 329.63, 392.0]
            .iter()
            .enumerate()
            .map(|(i, &f)| Phase::tone(format!("Playing note {} of 3", i + 1), ToneSpec::sine(f, 0.5)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn single_tone_completes_after_its_duration() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);
        let started = Instant::now();

        let outcome = session.play_chain("Playing", &ToneSpec::sine(440.0, 1.5)).await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert!(started.elapsed() < Duration::from_millis(1600));
        assert_eq!(session.status(), PlaybackStatus::Finished);
        assert_eq!(sink.voices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_plays_in_order_with_gaps() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);

        let outcome = session.play_sequence(three_notes(), SEQUENCE_GAP).await.unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);

        let voices = sink.voices();
        assert_eq!(voices.len(), 3);
        for pair in voices.windows(2) {
            let spacing = pair[1].started_at - pair[0].started_at;
            // 0.5 s tone + 0.5 s gap, never overlapping.
            assert!(spacing >= Duration::from_millis(1000), "spacing {spacing:?}");
            assert!(spacing < Duration::from_millis(1010), "spacing {spacing:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_while_running_is_ignored() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);

        let (first, second) = tokio::join!(
            session.play_sequence(three_notes(), SEQUENCE_GAP),
            session.play_sequence(three_notes(), SEQUENCE_GAP),
        );

        assert_eq!(first.unwrap(), PlaybackOutcome::Completed);
        assert_eq!(second.unwrap(), PlaybackOutcome::Ignored);
        assert_eq!(sink.voices().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_session_accepts_a_new_playback() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);
        let tone = ToneSpec::sine(440.0, 0.5);
        session.play_chain("first", &tone).await.unwrap();
        let again = session.play_chain("again", &tone).await.unwrap();
        assert_eq!(again, PlaybackOutcome::Completed);
        assert_eq!(sink.voices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_mid_phase_silences_and_resets() {
        let sink = CaptureSink::new(SR);
        let session = Arc::new(session(&sink));

        let playing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let phases = vec![
                    Phase::tone("Playing first note", ToneSpec::sine(440.0, 1.0)),
                    Phase::tone("Playing second note", ToneSpec::sine(440.0, 1.0)),
                ];
                session.play_sequence(phases, PAIR_GAP).await
            })
        };

        sleep(Duration::from_millis(400)).await;
        assert!(session.is_playing());
        assert_eq!(sink.audible_count(), 1);

        session.stop_all();
        assert_eq!(sink.audible_count(), 0);
        assert_eq!(session.status(), PlaybackStatus::Ready);

        let outcome = playing.await.unwrap().unwrap();
        assert_eq!(outcome, PlaybackOutcome::Stopped);
        assert_eq!(session.status(), PlaybackStatus::Ready);

        // The second phase never started.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.voices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_during_gap_prevents_next_phase() {
        let sink = CaptureSink::new(SR);
        let session = Arc::new(session(&sink));

        let playing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.play_sequence(three_notes(), PAIR_GAP).await })
        };

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(session.status(), PlaybackStatus::PausedBetween { next: 1 });
        session.stop_all();

        assert_eq!(playing.await.unwrap().unwrap(), PlaybackOutcome::Stopped);
        assert_eq!(sink.voices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_timer_settles_when_ended_never_fires() {
        let sink = CaptureSink::new(SR).with_end_behavior(EndBehavior::Never);
        let session = session(&sink);
        let started = Instant::now();

        let outcome = session.play_chain("Playing", &ToneSpec::sine(440.0, 1.0)).await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1100), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1150), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn chord_starts_once_and_waits_for_longest() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);
        let started = Instant::now();

        let tones = vec![ToneSpec::sine(261.63, 2.0), ToneSpec::sine(329.63, 1.0)];
        let outcome = session.play_chord_or_set("Playing chord", tones).await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_secs(2));
        let voices = sink.voices();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].buffer.frames(), 2 * SR as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sink_resolves_immediately() {
        let session = PlaybackSession::new(Arc::new(SilentSink::new(SR)));
        let started = Instant::now();
        for _ in 0..3 {
            let outcome = session.play_sequence(three_notes(), PAIR_GAP).await.unwrap();
            assert_eq!(outcome, PlaybackOutcome::Unavailable);
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(session.status(), PlaybackStatus::Ready);
        assert_eq!(session.preview_key(440.0).unwrap(), PlaybackOutcome::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn preview_key_plays_short_tone_alongside_playback() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);
        assert_eq!(session.preview_key(440.0).unwrap(), PlaybackOutcome::Completed);
        let voices = sink.voices();
        assert_eq!(voices[0].buffer.frames(), (KEY_PREVIEW_SECS * SR as f64).round() as usize);
        assert_eq!(session.status(), PlaybackStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_tone_is_an_error_and_frees_the_session() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);
        let err = session.play_chain("bad", &ToneSpec::sine(-1.0, 1.0)).await;
        assert!(matches!(err, Err(AudioError::InvalidSignal(_))));
        assert_eq!(session.status(), PlaybackStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_stops_sound() {
        let sink = CaptureSink::new(SR);
        let session = session(&sink);
        session.preview_key(440.0).unwrap();
        assert_eq!(sink.audible_count(), 1);
        drop(session);
        assert_eq!(sink.audible_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_updates_are_observable() {
        let sink = CaptureSink::new(SR);
        let session = Arc::new(session(&sink));
        let mut rx = session.subscribe();

        let playing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.play_sequence(three_notes(), SEQUENCE_GAP).await })
        };

        rx.changed().await.unwrap();
        match rx.borrow_and_update().clone() {
            PlaybackStatus::Running { phase, of, label } => {
                assert_eq!((phase, of), (0, 3));
                assert_eq!(label, "Playing note 1 of 3");
            }
            other => panic!("unexpected status {other:?}"),
        }
        playing.await.unwrap().unwrap();
        assert_eq!(session.status(), PlaybackStatus::Finished);
    }
}
