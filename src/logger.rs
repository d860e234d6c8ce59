use std::sync::Arc;

/// Logging capability passed to the runner and its helpers.
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

pub type SharedLogger = Arc<dyn Logger>;

/// Discards everything. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Forwards to `tracing` under the `nginx_testing` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str) {
        tracing::debug!(target: "nginx_testing", "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!(target: "nginx_testing", "{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(target: "nginx_testing", "{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!(target: "nginx_testing", "{msg}");
    }
}

pub fn noop() -> SharedLogger {
    Arc::new(NoopLogger)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records messages as `"<level>: <msg>"`.
    #[derive(Debug, Default)]
    pub struct RecordingLogger {
        pub messages: Mutex<Vec<String>>,
    }

    impl RecordingLogger {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }

        fn record(&self, level: &str, msg: &str) {
            self.messages.lock().unwrap().push(format!("{level}: {msg}"));
        }
    }

    impl Logger for RecordingLogger {
        fn debug(&self, msg: &str) {
            self.record("debug", msg);
        }
        fn info(&self, msg: &str) {
            self.record("info", msg);
        }
        fn warn(&self, msg: &str) {
            self.record("warn", msg);
        }
        fn error(&self, msg: &str) {
            self.record("error", msg);
        }
    }
}
