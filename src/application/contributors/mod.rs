//! Contributors shipped with the engine.

mod caching_routes;
mod declared;
mod emoji;
mod precaching_routes;
mod runtime_config;

use std::sync::Arc;

pub use caching_routes::{CACHING_ROUTES_HANDLE, CachingRoutesContributor};
pub use declared::DeclaredContributor;
pub use emoji::EmojiDetectionContributor;
pub use precaching_routes::{PRECACHING_ROUTES_HANDLE, PrecachingRoutesContributor};
pub use runtime_config::{RUNTIME_CONFIG_HANDLE, RuntimeConfigContributor};

use crate::{
    application::contributor::ContributorSet,
    config::{Declarations, WorkerSettings},
};

/// The standard contributor set for a deployment. Callers may register more.
pub fn builtin(worker: Arc<WorkerSettings>, declarations: Arc<Declarations>) -> ContributorSet {
    let emoji = worker.emoji_script.clone();
    ContributorSet::new()
        .with(RuntimeConfigContributor::new(worker))
        .with(DeclaredContributor::new(declarations))
        .with(EmojiDetectionContributor::new(emoji))
        .with(PrecachingRoutesContributor)
        .with(CachingRoutesContributor)
}
