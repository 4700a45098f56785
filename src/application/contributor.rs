//! Pluggable registration logic.

use std::sync::Arc;

use tracing::debug;

use crate::{application::context::Registries, domain::scope::Scope};

pub const DEFAULT_PRIORITY: i32 = 10;

/// A unit of registration logic. Contributors run in ascending priority order,
/// each declaring routes, precache entries and modules into the registries.
pub trait Contributor: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs earlier.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn applies_to(&self, _scope: Scope) -> bool {
        true
    }

    fn serve(&self, registries: &mut Registries);
}

/// Open list of contributors.
#[derive(Clone, Default)]
pub struct ContributorSet {
    contributors: Vec<Arc<dyn Contributor>>,
}

impl ContributorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, contributor: Arc<dyn Contributor>) {
        self.contributors.push(contributor);
    }

    pub fn with(mut self, contributor: impl Contributor + 'static) -> Self {
        self.register(Arc::new(contributor));
        self
    }

    /// Contributors applicable to `scope`, by ascending priority. Ties keep
    /// registration order.
    pub fn ordered_for(&self, scope: Scope) -> Vec<Arc<dyn Contributor>> {
        let mut ordered: Vec<_> = self
            .contributors
            .iter()
            .filter(|contributor| contributor.applies_to(scope))
            .cloned()
            .collect();
        ordered.sort_by_key(|contributor| contributor.priority());
        ordered
    }

    /// Run the registration phase for the registries' scope.
    pub fn serve_all(&self, registries: &mut Registries) {
        for contributor in self.ordered_for(registries.scope()) {
            debug!(
                target = "swbundle::registration",
                contributor = contributor.name(),
                priority = contributor.priority(),
                "serving contributor",
            );
            contributor.serve(registries);
        }
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }
}
