use std::time::Duration;

/// Result of a process that ran to completion.
///
/// Timeouts and cancellation are reported as [`RunnerError`](crate::RunnerError)
/// rather than as a `ProcessOutput`.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Captured tail of stdout
    pub stdout: Vec<u8>,
    /// Captured tail of stderr
    pub stderr: Vec<u8>,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether either stream exceeded the capture limit
    pub truncated: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            truncated: false,
            duration,
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Last `max_chars` characters of stderr, trimmed, for error reports.
    #[must_use]
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        let stderr = self.stderr_string();
        let trimmed = stderr.trim();
        let count = trimmed.chars().count();
        if count <= max_chars {
            return trimmed.to_string();
        }
        trimmed.chars().skip(count - max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_exit() {
        let ok = ProcessOutput::new(vec![], vec![], Some(0), Duration::ZERO);
        assert!(ok.success());
        let failed = ProcessOutput::new(vec![], vec![], Some(1), Duration::ZERO);
        assert!(!failed.success());
        let signalled = ProcessOutput::new(vec![], vec![], None, Duration::ZERO);
        assert!(!signalled.success());
    }

    #[test]
    fn test_stderr_tail_keeps_last_chars() {
        let output = ProcessOutput::new(vec![], b"  first line\nlast line\n".to_vec(), Some(1), Duration::ZERO);
        assert_eq!(output.stderr_tail(9), "last line");
        assert_eq!(output.stderr_tail(200), "first line\nlast line");
    }

    #[test]
    fn test_lossy_strings() {
        let output = ProcessOutput::new(b"out".to_vec(), vec![0xFF], Some(0), Duration::ZERO);
        assert_eq!(output.stdout_string(), "out");
        assert!(!output.stderr_string().is_empty());
    }
}
