use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::Level;

/// Writes either to a shared log file or to stderr.
///
/// The terminal demo owns the screen, so it logs to a file; everything else
/// logs to stderr.
pub struct DelegatingWriter {
    inner: DelegatingInner,
}

enum DelegatingInner {
    File(Arc<Mutex<File>>),
    Stderr(io::Stderr),
}

impl Write for DelegatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            DelegatingInner::File(file) => file
                .lock()
                .map_err(|_| io::Error::other("log file lock poisoned"))?
                .write(buf),
            DelegatingInner::Stderr(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            DelegatingInner::File(file) => file
                .lock()
                .map_err(|_| io::Error::other("log file lock poisoned"))?
                .flush(),
            DelegatingInner::Stderr(s) => s.flush(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SubscriberMakeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl SubscriberMakeWriter {
    pub fn to_file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }

    pub fn to_stderr() -> Self {
        Self::default()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SubscriberMakeWriter {
    type Writer = DelegatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let inner = match &self.file {
            Some(file) => DelegatingInner::File(Arc::clone(file)),
            None => DelegatingInner::Stderr(io::stderr()),
        };
        DelegatingWriter { inner }
    }
}

/// Installs the global subscriber, appending to `log_file` when given and
/// writing to stderr otherwise. Later calls are no-ops.
pub fn init(log_file: Option<&Path>, level: Level) -> io::Result<()> {
    let writer = match log_file {
        Some(path) => SubscriberMakeWriter::to_file(path)?,
        None => SubscriberMakeWriter::to_stderr(),
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_target(false)
        .with_thread_names(false)
        .with_ansi(log_file.is_none())
        .try_init();
    Ok(())
}

/// Stderr logging at DEBUG, for tests and tools.
pub fn init_default() -> io::Result<()> {
    init(None, Level::DEBUG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn repeated_init_is_a_no_op() {
        init_default().unwrap();
        init_default().unwrap();
        tracing::debug!("still logging after a second init");
    }

    #[test]
    fn file_writer_appends() {
        let path = std::env::temp_dir().join(format!("wts-log-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let make = SubscriberMakeWriter::to_file(&path).unwrap();
        make.make_writer().write_all(b"first\n").unwrap();
        let mut second = make.make_writer();
        second.write_all(b"second\n").unwrap();
        second.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "first\nsecond\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = std::env::temp_dir();
        assert!(init(Some(&dir), Level::INFO).is_err());
    }
}
