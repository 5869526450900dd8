//! # modelvault-registry
//!
//! A local model registry for training pipelines. Each run saves its model
//! and metrics into a version folder named by its [`RunId`]; the registry
//! keeps exactly one promoted "best" model and replaces it only when a new
//! candidate scores strictly higher on the chosen metric.
//!
//! ```no_run
//! use modelvault_registry::{Metrics, ModelRegistry, RegistryLayout, RunId};
//!
//! # fn main() -> modelvault_registry::Result<()> {
//! let registry = ModelRegistry::open(RegistryLayout::under(".".as_ref()), RunId::now())?;
//! let metrics: Metrics = [("accuracy", 0.93)].into_iter().collect();
//! let promoted = registry.compare_and_update_best(
//!     &vec![0.1_f32, 0.2, 0.3],
//!     &metrics,
//!     "accuracy",
//!     "model",
//!     "metrics",
//! )?;
//! let best: Option<Vec<f32>> = registry.load_best_model()?;
//! # let _ = (promoted, best);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod metrics;
mod promote;
pub mod registry;
pub mod run;

pub use error::{RegistryError, Result};
pub use metrics::Metrics;
pub use registry::{ModelRegistry, ModelVersion, RegistryLayout, METRICS_EXTENSION, MODEL_EXTENSION};
pub use run::RunId;
