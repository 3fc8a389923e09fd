use std::time::Instant;

/// Report a single client-side measurement.
///
/// Measurements go to the `tracing` pipeline at debug level under the
/// `cyborgdb::metrics` target; the client keeps no metric state of its own.
pub fn track_metric(name: &str, value: f64) {
    tracing::debug!(target: "cyborgdb::metrics", metric = name, value, "Metric {}: {}", name, value);
}

/// Drop guard that reports `<name>_duration_ms` when it goes out of scope.
#[derive(Debug)]
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        track_metric(&format!("{}_duration_ms", self.name), self.elapsed_ms());
    }
}

/// Time the enclosing scope: `let _timer = measure_operation!("index.query");`
#[macro_export]
macro_rules! measure_operation {
    ($operation_name:expr) => {
        $crate::metrics::OperationTimer::start($operation_name)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_timer_measures_elapsed_time() {
        let timer = crate::measure_operation!("test.op");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(timer.name(), "test.op");
        assert!(timer.elapsed_ms() >= 5.0);
    }
}
