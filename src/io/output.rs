//! Boolean output drivers for the actuator
//!
//! The render tick drives exactly one of these per tick. `FileOutput`
//! writes "1"/"0" to a path, which covers sysfs GPIO value files on the
//! target hardware; `LogOutput` is for bench runs without a wired output.

use std::path::PathBuf;
use tracing::{info, warn};

/// Physical boolean output, set once per render tick
pub trait OutputDriver: Send {
    fn set(&mut self, on: bool);
}

/// Logs output transitions instead of driving hardware
#[derive(Debug, Default)]
pub struct LogOutput {
    last: Option<bool>,
}

impl LogOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputDriver for LogOutput {
    fn set(&mut self, on: bool) {
        if self.last != Some(on) {
            info!(on = on, "output_set");
            self.last = Some(on);
        }
    }
}

/// Writes "1"/"0" to a file, e.g. /sys/class/gpio/gpioN/value
#[derive(Debug)]
pub struct FileOutput {
    path: PathBuf,
    last: Option<bool>,
}

impl FileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), last: None }
    }
}

impl OutputDriver for FileOutput {
    fn set(&mut self, on: bool) {
        if self.last == Some(on) {
            return;
        }
        let value = if on { "1" } else { "0" };
        match std::fs::write(&self.path, value) {
            Ok(()) => {
                self.last = Some(on);
            }
            Err(e) => {
                // Keep rendering; the next tick retries the write
                warn!(path = %self.path.display(), error = %e, "output_write_failed");
                self.last = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_file_output_writes_levels() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut output = FileOutput::new(file.path());

        output.set(true);
        let mut contents = String::new();
        std::fs::File::open(file.path()).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "1");

        output.set(false);
        contents.clear();
        std::fs::File::open(file.path()).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "0");
    }
}
