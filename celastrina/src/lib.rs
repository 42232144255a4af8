//! celastrina — a request-processing framework for serverless compute
//! functions.
//!
//! This facade crate re-exports the celastrina sub-crates through a single
//! dependency with feature flags. Import everything you need with:
//!
//! ```ignore
//! use celastrina::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature     | Default | Crate                  |
//! |-------------|---------|------------------------|
//! | `appconfig` | **yes** | `celastrina-appconfig` |

pub use celastrina_core;

// Re-export everything from celastrina-core at the top level for
// convenience.
pub use celastrina_core::*;

#[cfg(feature = "appconfig")]
pub use celastrina_appconfig;

/// Unified prelude — import everything with `use celastrina::prelude::*`.
pub mod prelude {
    pub use celastrina_core::prelude::*;

    #[cfg(feature = "appconfig")]
    pub use celastrina_appconfig::{AppConfigPropertyManager, AppConfigSettings};
}
