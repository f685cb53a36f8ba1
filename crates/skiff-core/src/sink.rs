//! Per-task output sink.
//!
//! Every task owns one [`Sink`]; all standard-stream output produced on
//! behalf of that task funnels through it, which is what preserves
//! per-task frame ordering on the channel.

use std::sync::Arc;

/// Which standard stream a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

type EmitFn = dyn Fn(StreamKind, &str) + Send + Sync;

/// A cloneable handle that forwards output chunks to the task's owner.
#[derive(Clone)]
pub struct Sink {
    emit: Arc<EmitFn>,
}

impl Sink {
    /// Wrap an emit closure.
    pub fn new(emit: impl Fn(StreamKind, &str) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// A sink that discards everything. Handy in tests.
    #[must_use]
    pub fn null() -> Self {
        Self::new(|_, _| {})
    }

    /// Write a chunk to stdout.
    pub fn out(&self, data: &str) {
        (self.emit)(StreamKind::Stdout, data);
    }

    /// Write a chunk to stderr.
    pub fn err(&self, data: &str) {
        (self.emit)(StreamKind::Stderr, data);
    }

    /// Write a line (newline appended) to stdout.
    pub fn out_line(&self, line: &str) {
        self.out(&format!("{line}\n"));
    }

    /// Write a line (newline appended) to stderr.
    pub fn err_line(&self, line: &str) {
        self.err(&format!("{line}\n"));
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Sink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A sink that records everything written to it.
    pub fn capture() -> (Sink, Arc<Mutex<Vec<(StreamKind, String)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = log.clone();
        let sink = Sink::new(move |kind, data| {
            inner.lock().unwrap().push((kind, data.to_string()));
        });
        (sink, log)
    }

    #[test]
    fn test_out_line_appends_newline() {
        let (sink, log) = capture();
        sink.out_line("hello");
        sink.err("raw");
        let log = log.lock().unwrap();
        assert_eq!(log[0], (StreamKind::Stdout, "hello\n".to_string()));
        assert_eq!(log[1], (StreamKind::Stderr, "raw".to_string()));
    }
}
