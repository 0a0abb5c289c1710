//! Keyboard input state fed from window events.

use std::collections::HashSet;

/// Read-only keyboard query used by gameplay code.
///
/// `is_key_down` reports the held state, not a one-frame edge.
pub trait KeyInput {
    fn is_key_down(&self, key: KeyCode) -> bool;
}

/// Manages keyboard state for the current frame.
#[derive(Debug, Default)]
pub struct InputState {
    /// Keys currently held down.
    keys_held: HashSet<KeyCode>,
    /// Keys pressed this frame.
    keys_pressed: HashSet<KeyCode>,
    /// Keys released this frame.
    keys_released: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call at the start of each frame.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
    }

    /// Process a keyboard event.
    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if !self.keys_held.contains(&key) {
                    self.keys_pressed.insert(key);
                }
                self.keys_held.insert(key);
            }
            ElementState::Released => {
                self.keys_held.remove(&key);
                self.keys_released.insert(key);
            }
        }
    }

    /// Drop every held key, e.g. when the window loses focus and release
    /// events will never arrive.
    pub fn release_all(&mut self) {
        if !self.keys_held.is_empty() {
            log::debug!("Releasing {} held keys", self.keys_held.len());
        }
        self.keys_released.extend(self.keys_held.drain());
    }

    /// Check if a key is currently held.
    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    /// Check if a key was pressed this frame.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Check if a key was released this frame.
    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }
}

impl KeyInput for InputState {
    fn is_key_down(&self, key: KeyCode) -> bool {
        self.is_key_held(key)
    }
}

impl KeyInput for HashSet<KeyCode> {
    fn is_key_down(&self, key: KeyCode) -> bool {
        self.contains(&key)
    }
}

// Re-export for convenience
pub use winit::event::ElementState;
pub use winit::keyboard::KeyCode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_an_edge_and_held_is_a_level() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::Space, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_down(KeyCode::Space));

        input.begin_frame();
        assert!(!input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_down(KeyCode::Space));
    }

    #[test]
    fn key_repeat_does_not_produce_a_second_press() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::ArrowLeft, ElementState::Pressed);
        input.begin_frame();
        input.process_keyboard(KeyCode::ArrowLeft, ElementState::Pressed);
        assert!(!input.is_key_pressed(KeyCode::ArrowLeft));
    }

    #[test]
    fn release_clears_held_state() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::ArrowRight, ElementState::Pressed);
        input.process_keyboard(KeyCode::ArrowRight, ElementState::Released);
        assert!(!input.is_key_down(KeyCode::ArrowRight));
        assert!(input.is_key_released(KeyCode::ArrowRight));
    }

    #[test]
    fn release_all_drops_held_keys() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::ArrowLeft, ElementState::Pressed);
        input.process_keyboard(KeyCode::Space, ElementState::Pressed);
        input.release_all();
        assert!(!input.is_key_down(KeyCode::ArrowLeft));
        assert!(input.is_key_released(KeyCode::Space));
    }
}
