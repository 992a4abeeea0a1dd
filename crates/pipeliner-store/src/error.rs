//! Store error types.

use std::sync::Arc;

/// An error shared between every awaiter of a failed resource.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
  /// The resource already holds a different value.
  #[error("resource '{name}' is already resolved with a different value")]
  AlreadyResolved { name: String },

  /// The producer of the resource failed.
  #[error("producer of resource '{name}' failed: {source}")]
  Failed {
    name: String,
    #[source]
    source: SharedError,
  },

  /// The claimant went away without publishing or failing the resource.
  #[error("resource '{name}' was abandoned by '{claimant}' before it resolved")]
  Abandoned { name: String, claimant: String },

  /// The resource was dropped by a reset while still unresolved.
  #[error("resource '{name}' was reset before it resolved")]
  Reset { name: String },
}
