use std::time::Duration;

/// Execution settings for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// Upper bound on a single request or step run. `None` waits forever.
  pub request_timeout: Option<Duration>,
  /// Walk the provider graph before running anything, so cycles and
  /// missing providers are reported before any work starts.
  pub detect_cycles: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      request_timeout: None,
      detect_cycles: true,
    }
  }
}

impl PipelineConfig {
  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = Some(timeout);
    self
  }

  pub fn with_detect_cycles(mut self, detect_cycles: bool) -> Self {
    self.detect_cycles = detect_cycles;
    self
  }
}
