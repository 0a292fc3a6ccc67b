use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pointer travel in pixels beyond which a press counts as a drag, not a click.
pub const CLICK_SLOP: f32 = 4.0;

/// Pixels of trackpad scroll per wheel line.
const PIXELS_PER_LINE: f32 = 120.0;

/// Keyboard and pointer state, reset once per frame.
#[derive(Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    buttons_down: HashSet<MouseButton>,
    pointer: Vec2,
    pointer_delta: Vec2,
    scroll: f32,
    /// Where the primary button went down and how far it has travelled since.
    press: Option<(Vec2, f32)>,
    click: Option<Vec2>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call after the frame has consumed it.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.pointer_delta = Vec2::ZERO;
        self.scroll = 0.0;
        self.click = None;
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if self.keys_down.insert(key) {
                                self.keys_pressed.insert(key);
                            }
                        }
                        ElementState::Released => {
                            self.keys_down.remove(&key);
                        }
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    self.buttons_down.insert(*button);
                    if *button == MouseButton::Left {
                        self.press = Some((self.pointer, 0.0));
                    }
                }
                ElementState::Released => {
                    self.buttons_down.remove(button);
                    if *button == MouseButton::Left {
                        if let Some((at, travelled)) = self.press.take() {
                            if is_click(travelled) {
                                self.click = Some(at);
                            }
                        }
                    }
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                let pointer = Vec2::new(position.x as f32, position.y as f32);
                let delta = pointer - self.pointer;
                self.pointer_delta += delta;
                self.pointer = pointer;
                if let Some((_, travelled)) = &mut self.press {
                    *travelled += delta.length();
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
            }
            WindowEvent::Focused(false) => {
                self.keys_down.clear();
                self.buttons_down.clear();
                self.press = None;
            }
            _ => {}
        }
    }

    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// True on the frame the key went down.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn mouse_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }

    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    /// Pointer movement while the primary button is held, once it has
    /// travelled far enough to be a drag.
    pub fn drag(&self) -> Option<Vec2> {
        match self.press {
            Some((_, travelled)) if !is_click(travelled) && self.pointer_delta != Vec2::ZERO => {
                Some(self.pointer_delta)
            }
            _ => None,
        }
    }

    /// Wheel lines scrolled this frame, positive away from the user.
    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    /// Where a press-and-release without dragging happened this frame.
    pub fn click(&self) -> Option<Vec2> {
        self.click
    }
}

fn is_click(travelled: f32) -> bool {
    travelled <= CLICK_SLOP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_travel_is_a_click() {
        assert!(is_click(0.0));
        assert!(is_click(CLICK_SLOP));
        assert!(!is_click(CLICK_SLOP + 0.5));
    }

    #[test]
    fn fresh_input_is_idle() {
        let mut input = Input::new();
        assert_eq!(input.drag(), None);
        assert_eq!(input.click(), None);
        input.begin_frame();
        assert_eq!(input.scroll(), 0.0);
        assert!(!input.key_down(KeyCode::KeyB));
    }
}
