//! TOML-backed receiver and scan configuration for the Heterodyne
//! receiver, with construction-time validation (§7: configuration errors
//! are raised before any stage runs, distinct from runtime `EngineError`).

mod error;
mod receiver;
mod scan;

pub use error::{ConfigError, ConfigResult};
pub use receiver::{DeemphasisRegion, ReceiverConfig};
pub use scan::ScanConfig;
