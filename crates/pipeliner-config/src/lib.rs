//! Pipeliner Config
//!
//! Serializable pipeline definitions. A definition names the steps of a
//! pipeline, the resources each one consumes and produces, the built-in
//! operation it performs, and any resources supplied up front.
//!
//! Definitions are loaded from JSON files by the CLI and turned into
//! registered steps by the binary crate.
//!
//! ```json
//! {
//!   "name": "division",
//!   "resources": { "divisor": 3 },
//!   "steps": [
//!     { "name": "base_provider", "outputs": ["base"],
//!       "operation": { "type": "const", "value": 23 } },
//!     { "name": "divide", "inputs": ["base", "divisor"],
//!       "outputs": ["result", "modulus"], "operation": { "type": "div_mod" } }
//!   ]
//! }
//! ```

mod definition;
mod error;
mod operation;
mod settings;
mod step;

pub use definition::PipelineDef;
pub use error::DefinitionError;
pub use operation::Operation;
pub use settings::Settings;
pub use step::{InputDef, StepDef};
