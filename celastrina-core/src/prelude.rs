//! celastrina prelude — import the common surface with a single `use`.
//!
//! ```ignore
//! use celastrina_core::prelude::*;
//!
//! struct Orders;
//!
//! impl Function for Orders {
//!     fn process<'a>(
//!         &'a self,
//!         context: &'a mut Context,
//!     ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
//!         Box::pin(async move {
//!             context.set_result(serde_json::json!({"ok": true}));
//!             Ok(())
//!         })
//!     }
//! }
//! ```

pub use crate::addons::{AddOn, LifecycleEvent};
pub use crate::asserter::Asserter;
pub use crate::configuration::{BootstrapConfig, Configuration};
pub use crate::context::Context;
pub use crate::envelope::{Completion, Envelope, LocalEnvelope, LogLevel};
pub use crate::error::CelastrinaError;
pub use crate::lifecycle::{Function, LifecycleRunner, LifecycleState};
pub use crate::permission::{Permission, ValueMatch};
pub use crate::properties::PropertyManager;
pub use crate::resources::{ResourceAuthorization, ResourceManager};
pub use crate::sentry::{Authenticator, OpenAuthenticator, RoleFactory};
pub use crate::subject::Subject;
