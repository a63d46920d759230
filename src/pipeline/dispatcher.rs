//! Sequential, order-respecting dispatch over a descriptor table.

use crate::errors::{Result, ServerError};
use crate::pipeline::descriptor::HandlerDescriptor;
use crate::pipeline::{EventContext, Resolution};

/// The sorted descriptor table for one context type.
pub struct EventRegistry<C> {
    descriptors: Vec<HandlerDescriptor<C>>,
}

impl<C> Default for EventRegistry<C> {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }
}

impl<C: EventContext + 'static> EventRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, keeping the table sorted by ascending order.
    /// Descriptors sharing an order value run in registration order.
    pub fn register(&mut self, descriptor: HandlerDescriptor<C>) {
        let position = self
            .descriptors
            .partition_point(|existing| existing.order() <= descriptor.order());
        self.descriptors.insert(position, descriptor);
    }

    /// Remove a descriptor from the table. Required descriptors cannot be
    /// removed.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let Some(position) = self
            .descriptors
            .iter()
            .position(|descriptor| descriptor.name() == name)
        else {
            return Err(ServerError::config(format!(
                "no handler named '{name}' is registered"
            )));
        };
        if self.descriptors[position].is_required() {
            return Err(ServerError::config(format!(
                "handler '{name}' is required and cannot be removed"
            )));
        }
        self.descriptors.remove(position);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Invoke the active descriptors in ascending order until the context
    /// reports handled/skipped/rejected, cancellation fires, or the table
    /// is exhausted. A failing handler fails the whole dispatch.
    pub async fn dispatch(&self, context: &mut C) -> Result<()> {
        for descriptor in &self.descriptors {
            if context.transaction().cancellation.is_cancelled() {
                return Err(ServerError::Cancelled);
            }
            if !descriptor.is_active(context) {
                tracing::trace!(handler = descriptor.name(), "handler filtered out");
                continue;
            }

            tracing::trace!(handler = descriptor.name(), "invoking handler");
            descriptor.invoke(context).await?;

            match context.resolution() {
                Resolution::Continue => {}
                resolution => {
                    tracing::debug!(
                        handler = descriptor.name(),
                        ?resolution,
                        "pipeline short-circuited"
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ServerOptions;
    use crate::pipeline::descriptor::EventHandler;
    use crate::pipeline::{RequestState, RequireClientIdParameter};
    use crate::transaction::Transaction;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct TestContext {
        transaction: Transaction,
        state: RequestState,
        trail: Vec<&'static str>,
    }

    impl TestContext {
        fn new() -> Self {
            Self {
                transaction: Transaction::new(Arc::new(ServerOptions::default())),
                state: RequestState::default(),
                trail: Vec::new(),
            }
        }
    }

    impl EventContext for TestContext {
        fn transaction(&self) -> &Transaction {
            &self.transaction
        }

        fn transaction_mut(&mut self) -> &mut Transaction {
            &mut self.transaction
        }

        fn resolution(&self) -> Resolution {
            self.state.resolution()
        }
    }

    struct Recorder {
        label: &'static str,
        handle_request: bool,
    }

    #[async_trait]
    impl EventHandler<TestContext> for Recorder {
        async fn handle(&self, context: &mut TestContext) -> Result<()> {
            context.trail.push(self.label);
            if self.handle_request {
                context.state.handle_request();
            }
            Ok(())
        }
    }

    fn recorder(label: &'static str) -> Recorder {
        Recorder {
            label,
            handle_request: false,
        }
    }

    #[tokio::test]
    async fn handlers_run_in_ascending_order() {
        let mut registry = EventRegistry::new();
        registry.register(HandlerDescriptor::singleton("third", 3000, recorder("third")));
        registry.register(HandlerDescriptor::singleton("first", 1000, recorder("first")));
        registry.register(HandlerDescriptor::singleton("second", 2000, recorder("second")));

        let mut context = TestContext::new();
        registry.dispatch(&mut context).await.unwrap();
        assert_eq!(context.trail, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn handled_flag_short_circuits() {
        let mut registry = EventRegistry::new();
        registry.register(HandlerDescriptor::singleton(
            "terminal",
            1000,
            Recorder {
                label: "terminal",
                handle_request: true,
            },
        ));
        registry.register(HandlerDescriptor::singleton("after", 2000, recorder("after")));

        let mut context = TestContext::new();
        registry.dispatch(&mut context).await.unwrap();
        assert_eq!(context.trail, vec!["terminal"]);
    }

    #[tokio::test]
    async fn filters_gate_handlers() {
        let mut registry = EventRegistry::new();
        registry.register(
            HandlerDescriptor::singleton("gated", 1000, recorder("gated"))
                .with_filter(RequireClientIdParameter),
        );
        registry.register(HandlerDescriptor::singleton("always", 2000, recorder("always")));

        let mut context = TestContext::new();
        registry.dispatch(&mut context).await.unwrap();
        assert_eq!(context.trail, vec!["always"]);

        let mut context = TestContext::new();
        context
            .transaction
            .request
            .set_client_id(Some("c1"));
        registry.dispatch(&mut context).await.unwrap();
        assert_eq!(context.trail, vec!["gated", "always"]);
    }

    #[tokio::test]
    async fn required_handlers_cannot_be_removed() {
        let mut registry = EventRegistry::new();
        registry.register(
            HandlerDescriptor::singleton("core", 1000, recorder("core")).required(),
        );
        registry.register(HandlerDescriptor::singleton("extra", 2000, recorder("extra")));

        assert!(registry.remove("extra").is_ok());
        assert!(registry.remove("core").is_err());
        assert!(registry.remove("missing").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let mut registry = EventRegistry::new();
        registry.register(HandlerDescriptor::singleton("never", 1000, recorder("never")));

        let mut context = TestContext::new();
        context.transaction.cancellation.cancel();
        let error = registry.dispatch(&mut context).await.unwrap_err();
        assert!(matches!(error, ServerError::Cancelled));
        assert!(context.trail.is_empty());
    }
}
