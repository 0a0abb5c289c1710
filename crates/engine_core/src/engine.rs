//! Engine run state and the per-tick OnUpdate event.

use std::cell::Cell;
use std::rc::Rc;

use crate::event::{Connection, Event};
use crate::time::FrameClock;

/// Shared start/stop switch for an [`Engine`].
///
/// Cloned into every [`Tick`], so a subscriber can stop the engine from
/// inside its own callback.
#[derive(Debug, Clone, Default)]
pub struct EngineControl {
    running: Rc<Cell<bool>>,
}

impl EngineControl {
    /// Stop the engine. No tick starts after this returns.
    pub fn stop(&self) {
        if self.running.replace(false) {
            log::info!("Engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    fn start(&self) -> bool {
        !self.running.replace(true)
    }
}

/// Arguments passed to OnUpdate subscribers.
#[derive(Debug, Clone)]
pub struct Tick {
    /// Clamped frame delta in seconds.
    pub delta: f32,
    /// Simulated seconds since start.
    pub elapsed: f32,
    pub frame: u64,
    pub control: EngineControl,
}

/// Owns the simulation state and drives it one tick at a time.
pub struct Engine<S> {
    state: S,
    clock: FrameClock,
    control: EngineControl,
    on_update: Event<S, Tick>,
}

impl<S: 'static> Engine<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            clock: FrameClock::new(),
            control: EngineControl::default(),
            on_update: Event::new(),
        }
    }

    /// Subscribe to the per-tick update event.
    pub fn on_update<F>(&self, callback: F) -> Connection
    where
        F: FnMut(&mut S, &Tick) + 'static,
    {
        self.on_update.connect(callback)
    }

    /// Start ticking. Calling this while already running does nothing.
    pub fn start(&mut self) {
        if self.control.start() {
            self.clock.reset();
            log::info!("Engine started");
        }
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn control(&self) -> EngineControl {
        self.control.clone()
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Run one tick against the wall clock. Returns false when stopped.
    pub fn tick(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.clock.tick();
        self.dispatch()
    }

    /// Run one tick with an explicit delta (still clamped to the max step).
    pub fn tick_with(&mut self, delta: f32) -> bool {
        if !self.is_running() {
            return false;
        }
        self.clock.advance(delta);
        self.dispatch()
    }

    fn dispatch(&mut self) -> bool {
        let tick = Tick {
            delta: self.clock.delta_seconds(),
            elapsed: self.clock.elapsed_seconds(),
            frame: self.clock.frame_count(),
            control: self.control.clone(),
        };
        self.on_update.fire(&mut self.state, &tick);
        true
    }
}
