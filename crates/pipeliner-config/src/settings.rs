use serde::{Deserialize, Serialize};

/// Execution settings stored with a pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  /// Upper bound on a single request, in milliseconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_timeout_ms: Option<u64>,
  #[serde(default = "default_detect_cycles")]
  pub detect_cycles: bool,
}

fn default_detect_cycles() -> bool {
  true
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      request_timeout_ms: None,
      detect_cycles: default_detect_cycles(),
    }
  }
}
