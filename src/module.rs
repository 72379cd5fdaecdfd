//! Route bundles.
//!
//! The node API ships as [`crate::api::NodeModule`]; hosts can mount their own
//! modules next to it on the same [`Router`].
//!
//! ```ignore
//! use canopy::{Router, api::NodeModule, module};
//!
//! let mut router = Router::new();
//! module::register(&mut router, &[&NodeModule]);
//! let handle = router.into_handle();
//! ```

use crate::router::Router;

/// A named set of routes.
///
/// State a module needs beyond the request [`Context`](crate::router::Context)
/// is captured in its route closures.
pub trait Module: Send + Sync {
    /// Used in logs.
    fn name(&self) -> &'static str;

    fn routes(&self, router: &mut Router);
}

/// Add every module's routes to `router`.
pub fn register(router: &mut Router, modules: &[&dyn Module]) {
    for module in modules {
        tracing::debug!(module = module.name(), "registering routes");
        module.routes(router);
    }
}
