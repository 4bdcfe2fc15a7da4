use std::io;
use std::time::Duration;

use crate::drivers::InputDriver;
use crate::drivers::translate::{TerminalInput, TerminalTranslator};

pub enum ControlFlow {
    Continue,
    Quit,
}

/// The host's message pump.
///
/// Owns the input driver, translates what it reads into server input and
/// hands each item to a handler. The handler is also called with `None`
/// whenever a poll interval passes quietly, which is where the host redraws.
pub struct EventLoop<D> {
    driver: D,
    translator: TerminalTranslator,
    poll_interval: Duration,
}

impl<D: InputDriver> EventLoop<D> {
    pub fn new(driver: D, poll_interval: Duration) -> Self {
        Self {
            driver,
            translator: TerminalTranslator::new(),
            poll_interval,
        }
    }

    /// Next translated input, if one arrives within the poll interval.
    /// Terminal events with no server counterpart are skipped.
    pub fn poll(&mut self) -> io::Result<Option<TerminalInput>> {
        let mut timeout = self.poll_interval;
        while self.driver.poll(timeout)? {
            let raw = self.driver.read()?;
            if let Some(input) = self.translator.translate(raw) {
                return Ok(Some(input));
            }
            timeout = Duration::ZERO;
        }
        Ok(None)
    }

    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Runs until the handler returns [`ControlFlow::Quit`] or the driver
    /// fails.
    pub fn run<F>(&mut self, mut handler: F) -> io::Result<()>
    where
        F: FnMut(&mut D, Option<TerminalInput>) -> io::Result<ControlFlow>,
    {
        loop {
            if let ControlFlow::Quit = handler(&mut self.driver, None)? {
                break;
            }

            if self.driver.poll(self.poll_interval)? {
                // Drain bursts (drags, wheel) before the next idle tick.
                loop {
                    let raw = self.driver.read()?;
                    if let Some(input) = self.translator.translate(raw)
                        && let ControlFlow::Quit = handler(&mut self.driver, Some(input))?
                    {
                        return Ok(());
                    }
                    if !self.driver.poll(Duration::ZERO)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ScriptedInputDriver;
    use crate::events::Event;
    use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

    fn key(c: char) -> TermEvent {
        TermEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    #[test]
    fn poll_skips_untranslatable_events() {
        let mut release = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        let driver = ScriptedInputDriver::new([TermEvent::Key(release), key('a')]);
        let mut event_loop = EventLoop::new(driver, Duration::ZERO);
        match event_loop.poll().unwrap() {
            Some(TerminalInput::Event(Event::Key(k))) => assert_eq!(k.code, KeyCode::Char('a')),
            other => panic!("unexpected {other:?}"),
        }
        assert!(event_loop.poll().unwrap().is_none());
    }

    #[test]
    fn run_stops_on_quit() {
        let driver = ScriptedInputDriver::new([key('a'), key('q'), key('b')]);
        let mut event_loop = EventLoop::new(driver, Duration::ZERO);
        let mut seen = Vec::new();
        event_loop
            .run(|_, input| {
                if let Some(TerminalInput::Event(Event::Key(k))) = input {
                    seen.push(k.code);
                    if k.code == KeyCode::Char('q') {
                        return Ok(ControlFlow::Quit);
                    }
                }
                Ok(ControlFlow::Continue)
            })
            .unwrap();
        assert_eq!(seen, vec![KeyCode::Char('a'), KeyCode::Char('q')]);
        assert_eq!(event_loop.driver().remaining(), 1);
    }
}
