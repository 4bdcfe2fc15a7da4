//! Terminal input plumbing for the demo host.
//!
//! An [`InputDriver`] yields raw crossterm events; the [`translate`] module
//! turns them into the server's [`Event`](crate::events::Event) vocabulary.

pub mod console;
pub mod translate;

use ::crossterm::event::Event;
use std::io;
use std::time::Duration;

/// Source of raw terminal events.
pub trait InputDriver {
    /// True if [`read`](Self::read) would return without blocking.
    fn poll(&mut self, timeout: Duration) -> io::Result<bool>;
    fn read(&mut self) -> io::Result<Event>;
    fn set_mouse_capture(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }
}

impl<T: InputDriver + ?Sized> InputDriver for &mut T {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll(timeout)
    }

    fn read(&mut self) -> io::Result<Event> {
        (**self).read()
    }

    fn set_mouse_capture(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_mouse_capture(enabled)
    }
}

impl<T: InputDriver + ?Sized> InputDriver for Box<T> {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll(timeout)
    }

    fn read(&mut self) -> io::Result<Event> {
        (**self).read()
    }

    fn set_mouse_capture(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_mouse_capture(enabled)
    }
}

/// Replays a fixed script of events, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedInputDriver {
    events: std::collections::VecDeque<Event>,
}

impl ScriptedInputDriver {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl InputDriver for ScriptedInputDriver {
    fn poll(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(!self.events.is_empty())
    }

    fn read(&mut self) -> io::Result<Event> {
        self.events
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }
}
