//! Tick scheduler: independent UPS (update) and FPS (render) real-time
//! loops, pause, tick cap, and rate adaptation (C11, §4.11).
//!
//! `clock.rs` is the discrete-event queue the fixed-cadence loop here rides
//! on top of (a recurring `Tick`/`Render` event pair); this module is the
//! wall-clock-driven pacing layer rather than a variable-timestep "pop next
//! event, process it immediately" loop. `Environment` (C13) owns one of
//! these and calls `RateController::record_window` once per sampling window
//! while driving its own event loop.

use std::collections::VecDeque;

/// Consecutive under-rate windows tolerated before the target is lowered
/// (§4.11: "< 95% of target for >3 consecutive sample windows").
const UNDER_RATE_WINDOW_TOLERANCE: u32 = 3;
const UNDER_RATE_THRESHOLD: f64 = 0.95;

/// Tracks measured update/render rate against a target and lowers the
/// target when the loop can't keep up (§4.11).
#[derive(Debug, Clone)]
pub struct RateController {
    target: f64,
    consecutive_under_rate: u32,
    history: VecDeque<f64>,
}

impl RateController {
    pub fn new(target: f64) -> Self {
        Self {
            target,
            consecutive_under_rate: 0,
            history: VecDeque::with_capacity(8),
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Feeds one sampling window's measured rate. Returns `Some(new_target)`
    /// the moment the target is lowered (the caller is expected to surface
    /// this via a callback, per §4.11: "expose the new target via a
    /// callback").
    pub fn record_window(&mut self, measured: f64) -> Option<f64> {
        if self.history.len() == 8 {
            self.history.pop_front();
        }
        self.history.push_back(measured);

        if measured < self.target * UNDER_RATE_THRESHOLD {
            self.consecutive_under_rate += 1;
        } else {
            self.consecutive_under_rate = 0;
        }

        if self.consecutive_under_rate > UNDER_RATE_WINDOW_TOLERANCE {
            self.target = measured;
            self.consecutive_under_rate = 0;
            Some(self.target)
        } else {
            None
        }
    }
}

/// Cooperative scheduler state: pause is checked once per loop iteration
/// rather than preempting mid-tick (§4.11, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Halted,
}

/// Drives the UPS/render cadence and the tick cap independently of the
/// discrete-event payload the ticks carry; `Environment` wires its own
/// per-tick work behind `on_tick`/`on_render` closures.
#[derive(Debug)]
pub struct TickScheduler {
    pub ups_rate: RateController,
    pub fps_rate: RateController,
    pub state: RunState,
    pub update_ticks: u64,
    pub tick_cap: u64,
}

impl TickScheduler {
    pub fn new(target_ups: f64, target_fps: f64, tick_cap: u64) -> Self {
        Self {
            ups_rate: RateController::new(target_ups),
            fps_rate: RateController::new(target_fps),
            state: RunState::Running,
            update_ticks: 0,
            tick_cap,
        }
    }

    pub fn pause(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.state = RunState::Running;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state == RunState::Paused
    }

    /// `Halt` quiesces the update loop: further `should_tick` calls return
    /// `false` until `reset` is called (§4.11).
    pub fn halt(&mut self) {
        self.state = RunState::Halted;
    }

    pub fn reset(&mut self, tick_cap: u64) {
        self.state = RunState::Running;
        self.update_ticks = 0;
        self.tick_cap = tick_cap;
    }

    /// Whether an update tick should run logic this iteration. Always
    /// `false` once halted or once `tick_cap` is reached, even if resumed
    /// (the cap is a hard stop, not a pause).
    pub fn should_tick(&self) -> bool {
        self.state == RunState::Running && self.update_ticks < self.tick_cap
    }

    /// Bumps the monotone tick counter. Returns `true` if this was the tick
    /// that reached `tick_cap` (caller should halt immediately after).
    pub fn advance_tick(&mut self) -> bool {
        self.update_ticks += 1;
        self.update_ticks >= self.tick_cap
    }
}
