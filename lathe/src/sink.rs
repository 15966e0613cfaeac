//! Where human-facing benchmark output goes.

use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

/// Shared, thread-safe text sink for progress lines, result blocks and summary
/// tables.
///
/// Write failures are logged and otherwise ignored: losing a line of output is
/// never a reason to abandon a benchmark.
#[derive(Clone)]
pub struct OutputSink(Arc<Mutex<Box<dyn Write + Send>>>);

impl OutputSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn line(&self, text: impl AsRef<str>) {
        self.write_str(&format!("{}\n", text.as_ref()));
    }

    pub fn write_str(&self, text: &str) {
        let mut writer = self.0.lock();
        if let Err(e) = writer.write_all(text.as_bytes()).and_then(|_| writer.flush()) {
            tracing::warn!("Failed to write benchmark output: {e}");
        }
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink")
    }
}

/// An in-memory writer whose contents stay readable after it has been handed to
/// a harness.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
