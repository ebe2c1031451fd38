//! Merge driver that shells out to an RCS merge(1) compatible tool.
//!
//! The three texts are written to scoped files inside a fresh temporary
//! directory, which is removed on every exit path including tool failure
//! and timeout. The tool merges in place into the `ours` file; exit
//! status 0 means clean, 1 means conflicts were marked, anything else is
//! an error.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::debug;

use crate::merge::{MergeDriver, MergeError, MergeOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct ExternalMergeDriver {
    tool: PathBuf,
    timeout: Duration,
}

impl ExternalMergeDriver {
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }
}

impl MergeDriver for ExternalMergeDriver {
    fn merge(&self, base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome, MergeError> {
        let dir = TempDir::new()?;
        let ours_path = dir.path().join("ours");
        let base_path = dir.path().join("base");
        let theirs_path = dir.path().join("theirs");
        fs::write(&ours_path, ours)?;
        fs::write(&base_path, base)?;
        fs::write(&theirs_path, theirs)?;

        // -A emits markers that include the base text, -L labels the
        // three sections the same way the built-in driver does
        let mut child = Command::new(&self.tool)
            .arg("-A")
            .args(["-L", "ours", "-L", "base", "-L", "theirs"])
            .arg(&ours_path)
            .arg(&base_path)
            .arg(&theirs_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MergeError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let clean = match status.code() {
            Some(0) => true,
            Some(1) => false,
            Some(code) => {
                return Err(MergeError::Tool(format!(
                    "{} exited with status {code}",
                    self.tool.display()
                )))
            }
            None => {
                return Err(MergeError::Tool(format!(
                    "{} was killed by a signal",
                    self.tool.display()
                )))
            }
        };

        let text = String::from_utf8(fs::read(&ours_path)?)?;
        debug!(tool = %self.tool.display(), clean, "external merge finished");
        Ok(MergeOutcome { text, clean })
    }
}
