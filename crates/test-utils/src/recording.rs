use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use remote_bridge::orchestrator::{JobListener, JobResult, LogOrigin, LogSink};
use remote_bridge::types::RemoteLogLevel;

/// One line captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedLine {
    /// `None` for job-wide lines.
    pub operation: Option<String>,
    pub level: RemoteLogLevel,
    pub message: String,
}

/// `LogSink` that keeps every line for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<LoggedLine>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<LoggedLine> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.message.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn log(&self, origin: LogOrigin<'_>, level: RemoteLogLevel, message: &str) {
        let operation = match origin {
            LogOrigin::Job(_) => None,
            LogOrigin::Operation(id) => Some(id.to_string()),
        };
        self.lines.lock().unwrap().push(LoggedLine {
            operation,
            level,
            message: message.to_string(),
        });
    }
}

/// `JobListener` that counts callbacks and optionally fails `finished`.
#[derive(Debug, Default)]
pub struct CountingListener {
    pub started: AtomicUsize,
    pub active: AtomicUsize,
    pub finished: AtomicUsize,
    pub fail_finished: bool,
}

impl CountingListener {
    pub fn failing() -> Self {
        Self {
            fail_finished: true,
            ..Self::default()
        }
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl JobListener for CountingListener {
    fn started(&self, _job: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn active(&self, _job: &str) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, _job: &str, _result: &JobResult) -> anyhow::Result<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail_finished {
            anyhow::bail!("listener refused to finish");
        }
        Ok(())
    }
}
