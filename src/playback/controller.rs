use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{PlaybackFrame, Player};
use crate::error::{Error, Result};
use crate::recorder::Recording;

const FRAME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Floor on the wait between two auto-play steps.
    pub min_step_delay: Duration,
    pub speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_step_delay: Duration::from_millis(50),
            speed: 1.0,
        }
    }
}

struct ControllerState {
    player: Player,
    speed: f64,
    min_step_delay: Duration,
    /// Token of the running auto-play loop, if any.
    run: Option<CancellationToken>,
}

impl ControllerState {
    fn cancel_run(&mut self) {
        if let Some(token) = self.run.take() {
            token.cancel();
        }
    }
}

/// Timed auto-play and scrubbing over a recording.
///
/// All state lives behind one lock. The auto-play loop re-checks its
/// cancellation token under that lock before advancing, so once `pause`,
/// `scrub`, `step_*` or `reset` return, a step scheduled earlier cannot
/// fire.
#[derive(Clone)]
pub struct PlaybackController {
    state: Arc<Mutex<ControllerState>>,
    frames: broadcast::Sender<PlaybackFrame>,
}

impl PlaybackController {
    pub fn new(recording: Arc<Recording>, config: PlaybackConfig) -> Result<Self> {
        validate_speed(config.speed)?;
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Ok(Self {
            state: Arc::new(Mutex::new(ControllerState {
                player: Player::new(recording),
                speed: config.speed,
                min_step_delay: config.min_step_delay,
                run: None,
            })),
            frames,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackFrame> {
        self.frames.subscribe()
    }

    pub fn index(&self) -> isize {
        self.state.lock().player.index()
    }

    pub fn current_frame(&self) -> PlaybackFrame {
        self.state.lock().player.frame()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().run.is_some()
    }

    pub fn speed(&self) -> f64 {
        self.state.lock().speed
    }

    /// Takes effect from the next scheduled step.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        validate_speed(speed)?;
        self.state.lock().speed = speed;
        Ok(())
    }

    /// Starts auto-play from the current index. Returns `false` when already
    /// playing or already at the last entry. Must be called within a tokio
    /// runtime.
    pub fn play(&self) -> bool {
        let token = {
            let mut state = self.state.lock();
            if state.run.is_some() || state.player.is_at_end() {
                return false;
            }
            let token = CancellationToken::new();
            state.run = Some(token.clone());
            token
        };
        tracing::debug!(speed = self.speed(), "auto-play started");
        tokio::spawn(autoplay(self.state.clone(), self.frames.clone(), token));
        true
    }

    pub fn pause(&self) {
        self.state.lock().cancel_run();
    }

    /// Cancels any pending auto-play step, then moves to `index` and emits
    /// the frame.
    pub fn scrub(&self, index: isize) -> Result<PlaybackFrame> {
        let mut state = self.state.lock();
        state.cancel_run();
        state.player.seek(index)?;
        let frame = state.player.frame();
        let _ = self.frames.send(frame.clone());
        Ok(frame)
    }

    pub fn step_forward(&self) -> Result<PlaybackFrame> {
        let index = self.index();
        self.scrub(index + 1)
    }

    pub fn step_back(&self) -> Result<PlaybackFrame> {
        let index = self.index();
        self.scrub(index - 1)
    }

    /// Back to the initial snapshot.
    pub fn reset(&self) -> Result<PlaybackFrame> {
        self.scrub(-1)
    }
}

fn validate_speed(speed: f64) -> Result<()> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidSpeed(speed))
    }
}

async fn autoplay(
    state: Arc<Mutex<ControllerState>>,
    frames: broadcast::Sender<PlaybackFrame>,
    token: CancellationToken,
) {
    loop {
        let delay = {
            let mut guard = state.lock();
            if token.is_cancelled() {
                return;
            }
            match guard.player.next_delay(guard.min_step_delay, guard.speed) {
                Some(delay) => delay,
                None => {
                    guard.run = None;
                    return;
                }
            }
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let mut guard = state.lock();
        // A scrub may have taken the lock between the timer firing and here.
        if token.is_cancelled() {
            return;
        }
        let next = guard.player.index() + 1;
        if let Err(err) = guard.player.seek(next) {
            tracing::warn!(error = %err, "auto-play stopped");
            guard.run = None;
            return;
        }
        let finished = guard.player.is_at_end();
        if finished {
            guard.run = None;
        }
        let _ = frames.send(guard.player.frame());
        if finished {
            tracing::debug!(index = next, "auto-play reached the last entry");
            return;
        }
    }
}
