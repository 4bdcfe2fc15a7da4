//! Input event vocabulary routed by the server.
//!
//! Keys reuse crossterm's key codes and modifiers so the terminal driver can
//! hand them through untouched; pointer events carry their location in the
//! coordinate space of whatever window they are currently expressed against.

use crossterm::event::{KeyCode, KeyModifiers};

use crate::constants::MOUSE_POINTER_ID;
use crate::geometry::Point;

pub type PointerId = i32;

bitflags::bitflags! {
    /// Mouse buttons held down.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct MouseButtons: u8 {
        const LEFT = 1;
        const MIDDLE = 1 << 1;
        const RIGHT = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Pressed,
    Dragged,
    Released,
    Moved,
    Entered,
    Exited,
    Wheel { delta_x: i32, delta_y: i32 },
    CaptureChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub location: Point,
    /// Buttons down while the event is generated. For a release this still
    /// includes the button being released.
    pub buttons: MouseButtons,
    /// Buttons whose state changed with this event.
    pub changed: MouseButtons,
}

impl MouseEvent {
    pub fn new(kind: MouseEventKind, location: Point) -> Self {
        Self {
            kind,
            location,
            buttons: MouseButtons::empty(),
            changed: MouseButtons::empty(),
        }
    }

    pub fn press(location: Point, button: MouseButtons) -> Self {
        Self {
            kind: MouseEventKind::Pressed,
            location,
            buttons: button,
            changed: button,
        }
    }

    pub fn drag(location: Point, buttons: MouseButtons) -> Self {
        Self {
            kind: MouseEventKind::Dragged,
            location,
            buttons,
            changed: MouseButtons::empty(),
        }
    }

    pub fn release(location: Point, button: MouseButtons) -> Self {
        Self {
            kind: MouseEventKind::Released,
            location,
            buttons: button,
            changed: button,
        }
    }

    pub fn moved(location: Point) -> Self {
        Self::new(MouseEventKind::Moved, location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEventKind {
    Pressed,
    Moved,
    Released,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub kind: TouchEventKind,
    pub location: Point,
    pub pointer_id: PointerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self {
            code,
            modifiers,
            pressed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Tap,
    ScrollBegin,
    ScrollUpdate,
    ScrollEnd,
    PinchBegin,
    PinchUpdate,
    PinchEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub location: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Mouse(MouseEvent),
    Touch(TouchEvent),
    Key(KeyEvent),
    Gesture(GestureEvent),
}

impl Event {
    pub fn location(&self) -> Option<Point> {
        match self {
            Event::Mouse(m) => Some(m.location),
            Event::Touch(t) => Some(t.location),
            Event::Gesture(g) => Some(g.location),
            Event::Key(_) => None,
        }
    }

    /// Returns a copy expressed at `location`; key events are unchanged.
    pub fn with_location(&self, location: Point) -> Event {
        let mut event = *self;
        match &mut event {
            Event::Mouse(m) => m.location = location,
            Event::Touch(t) => t.location = location,
            Event::Gesture(g) => g.location = location,
            Event::Key(_) => {}
        }
        event
    }

    pub fn is_located(&self) -> bool {
        self.location().is_some()
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Event::Key(_))
    }

    pub fn is_gesture(&self) -> bool {
        matches!(self, Event::Gesture(_))
    }

    /// Mouse or touch.
    pub fn is_pointer(&self) -> bool {
        matches!(self, Event::Mouse(_) | Event::Touch(_))
    }

    pub fn pointer_id(&self) -> Option<PointerId> {
        match self {
            Event::Mouse(_) => Some(MOUSE_POINTER_ID),
            Event::Touch(t) => Some(t.pointer_id),
            _ => None,
        }
    }

    pub fn is_pointer_press(&self) -> bool {
        match self {
            Event::Mouse(m) => m.kind == MouseEventKind::Pressed,
            Event::Touch(t) => t.kind == TouchEventKind::Pressed,
            _ => false,
        }
    }

    /// True for the release that ends a press gesture: the last mouse button
    /// going up, or a touch point lifting or being cancelled.
    pub fn is_pointer_release(&self) -> bool {
        match self {
            Event::Mouse(m) => m.kind == MouseEventKind::Released && m.buttons == m.changed,
            Event::Touch(t) => matches!(t.kind, TouchEventKind::Released | TouchEventKind::Cancelled),
            _ => false,
        }
    }

    /// Plain pointer movement with nothing pressed.
    pub fn is_pointer_move(&self) -> bool {
        matches!(
            self,
            Event::Mouse(MouseEvent {
                kind: MouseEventKind::Moved,
                ..
            })
        )
    }

    /// Events synthesized locally that clients derive themselves and never
    /// receive over the wire.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            Event::Mouse(MouseEvent {
                kind: MouseEventKind::Entered | MouseEventKind::CaptureChanged,
                ..
            })
        )
    }

    /// Short textual form used in transcripts, e.g. `MOUSE_PRESSED 5,6`.
    pub fn describe(&self) -> String {
        let name = match self {
            Event::Mouse(m) => match m.kind {
                MouseEventKind::Pressed => "MOUSE_PRESSED",
                MouseEventKind::Dragged => "MOUSE_DRAGGED",
                MouseEventKind::Released => "MOUSE_RELEASED",
                MouseEventKind::Moved => "MOUSE_MOVED",
                MouseEventKind::Entered => "MOUSE_ENTERED",
                MouseEventKind::Exited => "MOUSE_EXITED",
                MouseEventKind::Wheel { .. } => "MOUSEWHEEL",
                MouseEventKind::CaptureChanged => "MOUSE_CAPTURE_CHANGED",
            },
            Event::Touch(t) => match t.kind {
                TouchEventKind::Pressed => "TOUCH_PRESSED",
                TouchEventKind::Moved => "TOUCH_MOVED",
                TouchEventKind::Released => "TOUCH_RELEASED",
                TouchEventKind::Cancelled => "TOUCH_CANCELLED",
            },
            Event::Key(k) => {
                if k.pressed {
                    "KEY_PRESSED"
                } else {
                    "KEY_RELEASED"
                }
            }
            Event::Gesture(_) => "GESTURE",
        };
        match self.location() {
            Some(p) => format!("{name} {},{}", p.x, p.y),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_of_last_button_ends_gesture() {
        let last = Event::Mouse(MouseEvent::release(Point::new(1, 1), MouseButtons::LEFT));
        assert!(last.is_pointer_release());

        let partial = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Released,
            location: Point::new(1, 1),
            buttons: MouseButtons::LEFT | MouseButtons::RIGHT,
            changed: MouseButtons::RIGHT,
        });
        assert!(!partial.is_pointer_release());
    }

    #[test]
    fn touch_cancel_counts_as_release() {
        let cancel = Event::Touch(TouchEvent {
            kind: TouchEventKind::Cancelled,
            location: Point::new(0, 0),
            pointer_id: 3,
        });
        assert!(cancel.is_pointer_release());
        assert_eq!(cancel.pointer_id(), Some(3));
    }

    #[test]
    fn with_location_leaves_keys_alone() {
        let key = Event::Key(KeyEvent::press(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(key.with_location(Point::new(4, 4)), key);
        let moved = Event::Mouse(MouseEvent::moved(Point::new(1, 2)));
        assert_eq!(
            moved.with_location(Point::new(-3, 9)).describe(),
            "MOUSE_MOVED -3,9"
        );
    }
}
