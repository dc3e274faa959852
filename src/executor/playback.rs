// Timed playback on top of the executor

use super::engine::Executor;
use super::sink::{EffectSink, RunStatus};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
    Finished,
    Cancelled,
}

/// Advances an executor one step per `delay` while playing
#[derive(Debug, Clone)]
pub struct Playback {
    state: PlaybackState,
    delay: Duration,
    last_step: Option<Instant>,
}

impl Playback {
    pub fn new(delay: Duration) -> Self {
        Playback {
            state: PlaybackState::Paused,
            delay,
            last_step: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Start playing; the first step is taken on the next tick
    pub fn play<S: EffectSink>(&mut self, now: Instant, executor: &mut Executor<S>) {
        if executor.is_finished() {
            self.state = PlaybackState::Finished;
            return;
        }
        self.state = PlaybackState::Playing;
        self.last_step = now.checked_sub(self.delay);
        executor.set_status(RunStatus::Playing);
    }

    pub fn pause<S: EffectSink>(&mut self, executor: &mut Executor<S>) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            executor.set_status(RunStatus::Paused);
        }
    }

    pub fn toggle<S: EffectSink>(&mut self, now: Instant, executor: &mut Executor<S>) {
        match self.state {
            PlaybackState::Playing => self.pause(executor),
            _ => self.play(now, executor),
        }
    }

    /// Stop without undoing anything already applied
    pub fn cancel<S: EffectSink>(&mut self, executor: &mut Executor<S>) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Cancelled;
            executor.set_status(RunStatus::Cancelled);
        }
    }

    /// Forget a finished or cancelled run, e.g. after stepping backward
    pub fn rearm(&mut self) {
        if matches!(self.state, PlaybackState::Finished | PlaybackState::Cancelled) {
            self.state = PlaybackState::Paused;
        }
    }

    /// Take at most one step if playing and the delay has elapsed. Returns
    /// whether a step was applied.
    pub fn tick<S: EffectSink>(&mut self, now: Instant, executor: &mut Executor<S>) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        if let Some(last) = self.last_step {
            if now.saturating_duration_since(last) < self.delay {
                return false;
            }
        }
        self.last_step = Some(now);
        if executor.step_forward() {
            true
        } else {
            debug!("playback reached the end of the trace");
            self.state = PlaybackState::Finished;
            false
        }
    }
}

/// Play to the end, sleeping `delay` between steps. `should_cancel` is
/// polled before every step.
pub fn run_with_delay<S: EffectSink>(
    executor: &mut Executor<S>,
    delay: Duration,
    mut should_cancel: impl FnMut() -> bool,
) -> PlaybackState {
    executor.set_status(RunStatus::Playing);
    loop {
        if should_cancel() {
            executor.set_status(RunStatus::Cancelled);
            return PlaybackState::Cancelled;
        }
        if !executor.step_forward() {
            return PlaybackState::Finished;
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::sink::RecordingSink;
    use crate::parser::parse;
    use crate::unroller::unroll;

    fn executor() -> Executor<RecordingSink> {
        let root = parse("int main() {\n    int a = 1;\n    a = 2;\n    return a;\n}\n").unwrap();
        Executor::new(unroll(&root), RecordingSink::new())
    }

    #[test]
    fn test_tick_respects_delay() {
        let mut executor = executor();
        let mut playback = Playback::new(Duration::from_millis(100));
        let start = Instant::now();
        playback.play(start, &mut executor);
        assert!(playback.tick(start, &mut executor));
        assert!(!playback.tick(start + Duration::from_millis(50), &mut executor));
        assert!(playback.tick(start + Duration::from_millis(100), &mut executor));
        assert_eq!(executor.applied().len(), 2);
    }

    #[test]
    fn test_paused_playback_does_not_step() {
        let mut executor = executor();
        let mut playback = Playback::new(Duration::ZERO);
        assert!(!playback.tick(Instant::now(), &mut executor));
        assert_eq!(executor.position(), 0);
    }

    #[test]
    fn test_playback_finishes() {
        let mut executor = executor();
        let mut playback = Playback::new(Duration::ZERO);
        let now = Instant::now();
        playback.play(now, &mut executor);
        while playback.tick(now, &mut executor) {}
        assert_eq!(playback.state(), PlaybackState::Finished);
        assert_eq!(executor.status(), RunStatus::Finished);
    }

    #[test]
    fn test_cancel_keeps_applied_steps() {
        let mut executor = executor();
        let mut polls = 0;
        let state = run_with_delay(&mut executor, Duration::ZERO, || {
            polls += 1;
            polls > 2
        });
        assert_eq!(state, PlaybackState::Cancelled);
        assert_eq!(executor.applied().len(), 2);
        assert_eq!(executor.status(), RunStatus::Cancelled);
    }
}
