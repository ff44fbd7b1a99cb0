//! Integrations: named extensions registered on the client options.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::options::ClientOptions;

/// A reporting integration.
///
/// Integrations are registered once on [`ClientOptions`]; their presence is
/// what hooks check (through `Hub::get_integration`) before doing any work.
pub trait Integration: Send + Sync + 'static {
    /// Stable identifier, also used as mechanism type and scope name.
    fn name(&self) -> &'static str;

    /// Called once when the client is created.
    fn setup(&self, _options: &mut ClientOptions) {}
}

/// A registered integration, kept both as trait object and as `Any` so it
/// can be looked up by concrete type.
#[derive(Clone)]
pub(crate) struct IntegrationEntry {
    pub(crate) type_id: TypeId,
    pub(crate) integration: Arc<dyn Integration>,
    handle: Arc<dyn Any + Send + Sync>,
}

impl IntegrationEntry {
    pub(crate) fn new<I: Integration>(integration: I) -> Self {
        let integration = Arc::new(integration);
        Self {
            type_id: TypeId::of::<I>(),
            integration: integration.clone(),
            handle: integration,
        }
    }

    pub(crate) fn downcast<I: Integration>(&self) -> Option<Arc<I>> {
        self.handle.clone().downcast::<I>().ok()
    }
}

impl fmt::Debug for IntegrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.integration.name())
    }
}
