//! Run-level messages.
//!
//! Check tasks run in parallel and all speak through one [`Reporter`].
//! Lines are formatted into a local buffer first and written under a short
//! critical section, so a message always reaches the output as one chunk
//! and lines from different tasks never interleave.

use std::io::{self, Write};
use std::sync::Mutex;

pub struct Reporter {
    quiet: bool,
    verbosity: u8,
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
}

impl Reporter {
    pub fn stdio(quiet: bool, verbosity: u8) -> Self {
        Self::with_sinks(
            quiet,
            verbosity,
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    pub fn with_sinks(
        quiet: bool,
        verbosity: u8,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            quiet,
            verbosity,
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    pub fn is_verbose(&self) -> bool {
        !self.quiet && self.verbosity > 0
    }

    /// Report a result line.
    pub fn msg(&self, line: impl AsRef<str>) {
        if !self.quiet {
            Self::emit(&self.out, line.as_ref());
        }
    }

    /// Report a progress detail; only shown at `-v`.
    pub fn verbose(&self, line: impl AsRef<str>) {
        if self.is_verbose() {
            Self::emit(&self.out, line.as_ref());
        }
    }

    /// Report a problem worth seeing even under `-q`.
    pub fn warn(&self, line: impl AsRef<str>) {
        Self::emit(&self.err, &format!("WARNING: {}", line.as_ref()));
    }

    fn emit(sink: &Mutex<Box<dyn Write + Send>>, line: &str) {
        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        buffer.push('\n');
        let mut sink = sink.lock().expect("reporter sink poisoned");
        let _ = sink.write_all(buffer.as_bytes());
        let _ = sink.flush();
    }
}
