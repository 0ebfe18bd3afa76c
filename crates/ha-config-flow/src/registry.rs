//! Config flow handler registry
//!
//! Maps integration domains to the factories that build their flow
//! handlers. Populated while integrations load, read by the manager.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{FlowError, FlowResult};
use crate::handler::ConfigFlowHandler;

/// Factory producing a fresh handler for each new flow
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn ConfigFlowHandler> + Send + Sync + 'static>;

/// Registry of config flow handlers by domain
///
/// A domain can only be registered once; a second registration is rejected
/// and the original factory stays in place.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler factory for a domain
    pub fn register<F>(&self, domain: impl Into<String>, factory: F) -> FlowResult<()>
    where
        F: Fn() -> Box<dyn ConfigFlowHandler> + Send + Sync + 'static,
    {
        match self.handlers.entry(domain.into()) {
            Entry::Occupied(entry) => Err(FlowError::HandlerAlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(domain = %entry.key(), "Registered config flow handler");
                entry.insert(Arc::new(factory));
                Ok(())
            }
        }
    }

    /// Register a handler type built with `Default`
    pub fn register_default<H>(&self, domain: impl Into<String>) -> FlowResult<()>
    where
        H: ConfigFlowHandler + Default + 'static,
    {
        self.register(domain, || Box::new(H::default()) as Box<dyn ConfigFlowHandler>)
    }

    /// Look up the factory for a domain
    pub fn lookup(&self, domain: &str) -> FlowResult<HandlerFactory> {
        self.handlers
            .get(domain)
            .map(|factory| factory.value().clone())
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))
    }

    /// Check if a domain has a handler
    pub fn contains(&self, domain: &str) -> bool {
        self.handlers.contains_key(domain)
    }

    /// All registered domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self.handlers.iter().map(|r| r.key().clone()).collect();
        domains.sort();
        domains
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::UserInput;
    use crate::result::StepResult;
    use async_trait::async_trait;

    #[derive(Default)]
    struct AbortFlow;

    #[async_trait]
    impl ConfigFlowHandler for AbortFlow {
        fn step_ids(&self) -> &[&'static str] {
            &["init"]
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            _user_input: Option<UserInput>,
        ) -> FlowResult<StepResult> {
            Ok(StepResult::abort("not_supported"))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry.register_default::<AbortFlow>("test").unwrap();

        assert!(registry.contains("test"));
        let mut handler = registry.lookup("test").unwrap()();
        assert!(handler.has_step("init"));
        assert!(!handler.has_step("discovery"));

        let result = tokio_test::block_on(handler.async_step("init", None)).unwrap();
        assert_eq!(result, StepResult::abort("not_supported"));
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = HandlerRegistry::new();

        assert!(matches!(
            registry.lookup("nonexistent"),
            Err(FlowError::UnknownHandler(domain)) if domain == "nonexistent"
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = HandlerRegistry::new();
        registry.register_default::<AbortFlow>("test").unwrap();

        let result = registry.register_default::<AbortFlow>("test");

        assert_eq!(
            result,
            Err(FlowError::HandlerAlreadyRegistered("test".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_domains_sorted() {
        let registry = HandlerRegistry::new();
        registry.register_default::<AbortFlow>("nest").unwrap();
        registry.register_default::<AbortFlow>("hue").unwrap();

        assert_eq!(registry.domains(), vec!["hue", "nest"]);
    }
}
