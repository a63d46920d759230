//! Handler descriptors: the rows of the dispatch table.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::pipeline::filters::HandlerFilter;

/// A pipeline event handler for the context type `C`.
#[async_trait]
pub trait EventHandler<C: Send>: Send + Sync {
    async fn handle(&self, context: &mut C) -> Result<()>;
}

/// Whether a handler instance is shared or created per dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerLifetime {
    Singleton,
    Scoped,
}

enum HandlerInstance<C> {
    Singleton(Arc<dyn EventHandler<C>>),
    Scoped(Arc<dyn Fn() -> Box<dyn EventHandler<C>> + Send + Sync>),
}

/// Declares a handler: its context type (via `C`), invocation order,
/// lifetime, activation filters and whether it may be removed from the
/// default table.
///
/// Built-in handlers use order values spaced by 1000 to leave room for
/// host insertions between any two of them.
pub struct HandlerDescriptor<C> {
    name: &'static str,
    order: i64,
    lifetime: HandlerLifetime,
    filters: Vec<Arc<dyn HandlerFilter<C>>>,
    instance: HandlerInstance<C>,
    required: bool,
}

impl<C: Send + 'static> HandlerDescriptor<C> {
    /// Declare a shared handler instance.
    pub fn singleton(
        name: &'static str,
        order: i64,
        handler: impl EventHandler<C> + 'static,
    ) -> Self {
        Self {
            name,
            order,
            lifetime: HandlerLifetime::Singleton,
            filters: Vec::new(),
            instance: HandlerInstance::Singleton(Arc::new(handler)),
            required: false,
        }
    }

    /// Declare a handler created anew for every dispatch.
    pub fn scoped(
        name: &'static str,
        order: i64,
        factory: impl Fn() -> Box<dyn EventHandler<C>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            order,
            lifetime: HandlerLifetime::Scoped,
            filters: Vec::new(),
            instance: HandlerInstance::Scoped(Arc::new(factory)),
            required: false,
        }
    }

    /// Gate the handler behind an activation filter. Filters compose: every
    /// one of them must pass for the handler to run.
    pub fn with_filter(mut self, filter: impl HandlerFilter<C> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Mark the handler as irremovable from the default table.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn lifetime(&self) -> HandlerLifetime {
        self.lifetime
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn is_active(&self, context: &C) -> bool {
        self.filters.iter().all(|filter| filter.is_active(context))
    }

    pub(crate) async fn invoke(&self, context: &mut C) -> Result<()> {
        match &self.instance {
            HandlerInstance::Singleton(handler) => handler.handle(context).await,
            HandlerInstance::Scoped(factory) => factory().handle(context).await,
        }
    }
}
