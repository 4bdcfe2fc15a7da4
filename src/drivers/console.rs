use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute, terminal};

use super::InputDriver;

/// Reads events from the controlling terminal.
///
/// Events pushed with [`push_event`](Self::push_event) are served before the
/// terminal is consulted.
#[derive(Debug, Default)]
pub struct ConsoleInputDriver {
    event_queue: VecDeque<Event>,
}

impl ConsoleInputDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: Event) {
        self.event_queue.push_back(event);
    }
}

impl InputDriver for ConsoleInputDriver {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.event_queue.is_empty() {
            return Ok(true);
        }
        crossterm::event::poll(timeout)
    }

    fn read(&mut self) -> io::Result<Event> {
        if let Some(evt) = self.event_queue.pop_front() {
            return Ok(evt);
        }
        crossterm::event::read()
    }

    fn set_mouse_capture(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            execute!(io::stdout(), EnableMouseCapture)
        } else {
            execute!(io::stdout(), DisableMouseCapture)
        }
    }
}

/// Raw mode plus the alternate screen, restored on drop.
pub struct TerminalSession<W: Write> {
    out: W,
    entered: bool,
}

impl TerminalSession<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSession<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            entered: false,
        }
    }

    pub fn out(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn enter(&mut self) -> io::Result<()> {
        if self.entered {
            return Ok(());
        }
        execute!(self.out, EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;
        terminal::enable_raw_mode()?;
        self.entered = true;
        Ok(())
    }

    pub fn exit(&mut self) -> io::Result<()> {
        if !self.entered {
            return Ok(());
        }
        terminal::disable_raw_mode()?;
        execute!(self.out, DisableMouseCapture, LeaveAlternateScreen, cursor::Show)?;
        self.entered = false;
        Ok(())
    }
}

impl<W: Write> Drop for TerminalSession<W> {
    fn drop(&mut self) {
        let _ = self.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn queued_events_are_served_first() {
        let mut d = ConsoleInputDriver::new();
        d.push_event(Event::Key(KeyEvent::new(
            KeyCode::Char('z'),
            KeyModifiers::NONE,
        )));
        assert!(d.poll(Duration::from_millis(0)).unwrap());
        let ev = d.read().unwrap();
        if let Event::Key(k) = ev {
            assert_eq!(k.code, KeyCode::Char('z'));
        } else {
            panic!("expected key");
        }
    }

    #[test]
    fn session_exit_without_enter_is_a_no_op() {
        let mut session = TerminalSession::new(Vec::<u8>::new());
        session.exit().unwrap();
        assert!(session.out().is_empty());
    }
}
