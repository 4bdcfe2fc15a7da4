//! Maps crossterm's terminal events onto server events.
//!
//! Terminals report mouse buttons one at a time, so the translator tracks
//! which buttons are held to fill in `MouseEvent::buttons`. Keys are
//! normalized the way terminal apps expect: Shift+Tab becomes BackTab and
//! key releases are dropped (most terminals never send them, and the ones
//! that do would otherwise double every keystroke).

use crossterm::event::{
    Event as TermEvent, KeyCode, KeyEvent as TermKeyEvent, KeyEventKind, KeyModifiers,
    MouseButton, MouseEvent as TermMouseEvent, MouseEventKind as TermMouseKind,
};

use crate::events::{Event, KeyEvent, MouseButtons, MouseEvent, MouseEventKind};
use crate::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalInput {
    Event(Event),
    Resize { width: u16, height: u16 },
}

#[derive(Debug, Default)]
pub struct TerminalTranslator {
    held: MouseButtons,
}

fn button_flag(button: MouseButton) -> MouseButtons {
    match button {
        MouseButton::Left => MouseButtons::LEFT,
        MouseButton::Middle => MouseButtons::MIDDLE,
        MouseButton::Right => MouseButtons::RIGHT,
    }
}

impl TerminalTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held_buttons(&self) -> MouseButtons {
        self.held
    }

    pub fn translate(&mut self, event: TermEvent) -> Option<TerminalInput> {
        match event {
            TermEvent::Key(key) => self.key(key).map(|k| TerminalInput::Event(Event::Key(k))),
            TermEvent::Mouse(mouse) => Some(TerminalInput::Event(Event::Mouse(self.mouse(mouse)))),
            TermEvent::Resize(width, height) => Some(TerminalInput::Resize { width, height }),
            _ => None,
        }
    }

    fn key(&mut self, mut key: TermKeyEvent) -> Option<KeyEvent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        if key.code == KeyCode::Tab && key.modifiers.contains(KeyModifiers::SHIFT) {
            key.code = KeyCode::BackTab;
            key.modifiers.remove(KeyModifiers::SHIFT);
        }
        Some(KeyEvent::press(key.code, key.modifiers))
    }

    fn mouse(&mut self, mouse: TermMouseEvent) -> MouseEvent {
        let location = Point::new(i32::from(mouse.column), i32::from(mouse.row));
        match mouse.kind {
            TermMouseKind::Down(button) => {
                let flag = button_flag(button);
                self.held |= flag;
                MouseEvent {
                    kind: MouseEventKind::Pressed,
                    location,
                    buttons: self.held,
                    changed: flag,
                }
            }
            TermMouseKind::Up(button) => {
                let flag = button_flag(button);
                let event = MouseEvent {
                    kind: MouseEventKind::Released,
                    location,
                    buttons: self.held | flag,
                    changed: flag,
                };
                self.held -= flag;
                event
            }
            TermMouseKind::Drag(button) => {
                // A drag can arrive without its press if the terminal lost it.
                self.held |= button_flag(button);
                MouseEvent::drag(location, self.held)
            }
            TermMouseKind::Moved => MouseEvent::moved(location),
            TermMouseKind::ScrollDown => wheel(location, 0, 1),
            TermMouseKind::ScrollUp => wheel(location, 0, -1),
            TermMouseKind::ScrollRight => wheel(location, 1, 0),
            TermMouseKind::ScrollLeft => wheel(location, -1, 0),
        }
    }
}

fn wheel(location: Point, delta_x: i32, delta_y: i32) -> MouseEvent {
    MouseEvent::new(MouseEventKind::Wheel { delta_x, delta_y }, location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term_mouse(kind: TermMouseKind, column: u16, row: u16) -> TermEvent {
        TermEvent::Mouse(TermMouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn mouse_of(input: Option<TerminalInput>) -> MouseEvent {
        match input {
            Some(TerminalInput::Event(Event::Mouse(m))) => m,
            other => panic!("expected mouse event, got {other:?}"),
        }
    }

    #[test]
    fn tab_with_shift_becomes_backtab() {
        let mut translator = TerminalTranslator::new();
        let out = translator.translate(TermEvent::Key(TermKeyEvent::new(
            KeyCode::Tab,
            KeyModifiers::SHIFT,
        )));
        match out {
            Some(TerminalInput::Event(Event::Key(k))) => {
                assert_eq!(k.code, KeyCode::BackTab);
                assert!(!k.modifiers.contains(KeyModifiers::SHIFT));
                assert!(k.pressed);
            }
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn key_releases_are_dropped() {
        let mut translator = TerminalTranslator::new();
        let mut key = TermKeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(translator.translate(TermEvent::Key(key)), None);
    }

    #[test]
    fn press_drag_release_tracks_held_buttons() {
        let mut t = TerminalTranslator::new();
        let press = mouse_of(t.translate(term_mouse(TermMouseKind::Down(MouseButton::Left), 3, 4)));
        assert_eq!(press.kind, MouseEventKind::Pressed);
        assert_eq!(press.location, Point::new(3, 4));
        assert_eq!(press.buttons, MouseButtons::LEFT);

        let drag = mouse_of(t.translate(term_mouse(TermMouseKind::Drag(MouseButton::Left), 5, 4)));
        assert_eq!(drag.kind, MouseEventKind::Dragged);
        assert_eq!(drag.buttons, MouseButtons::LEFT);

        let release = mouse_of(t.translate(term_mouse(TermMouseKind::Up(MouseButton::Left), 5, 4)));
        assert_eq!(release.kind, MouseEventKind::Released);
        assert_eq!(release.buttons, MouseButtons::LEFT);
        assert_eq!(release.changed, MouseButtons::LEFT);
        assert!(t.held_buttons().is_empty());
    }

    #[test]
    fn scroll_maps_to_wheel_deltas() {
        let mut t = TerminalTranslator::new();
        let up = mouse_of(t.translate(term_mouse(TermMouseKind::ScrollUp, 0, 0)));
        assert_eq!(up.kind, MouseEventKind::Wheel { delta_x: 0, delta_y: -1 });
    }

    #[test]
    fn resize_passes_through() {
        let mut t = TerminalTranslator::new();
        assert_eq!(
            t.translate(TermEvent::Resize(80, 24)),
            Some(TerminalInput::Resize {
                width: 80,
                height: 24
            })
        );
        assert_eq!(t.translate(TermEvent::FocusGained), None);
    }
}
