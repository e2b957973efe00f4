use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BackendDescriptor;
use crate::backend::watson::WatsonDescriptor;
use crate::frontend::FrontendDescriptor;
use crate::frontend::telegram::TelegramDescriptor;

/// Binds configured labels to the descriptors that know how to build them.
///
/// Built once at startup and handed to both managers. Labels are matched
/// case-insensitively.
#[derive(Default)]
pub struct ProviderRegistry {
    frontends: HashMap<String, Arc<dyn FrontendDescriptor>>,
    backends: HashMap<String, Arc<dyn BackendDescriptor>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in binding.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_frontend(Arc::new(TelegramDescriptor));
        registry.register_backend(Arc::new(WatsonDescriptor));
        registry
    }

    /// Register a front-end descriptor, replacing any with the same label.
    pub fn register_frontend(&mut self, descriptor: Arc<dyn FrontendDescriptor>) {
        self.frontends
            .insert(descriptor.label().to_lowercase(), descriptor);
    }

    /// Register a back-end descriptor, replacing any with the same label.
    pub fn register_backend(&mut self, descriptor: Arc<dyn BackendDescriptor>) {
        self.backends
            .insert(descriptor.label().to_lowercase(), descriptor);
    }

    pub fn frontend(&self, label: &str) -> Option<Arc<dyn FrontendDescriptor>> {
        self.frontends.get(&label.to_lowercase()).cloned()
    }

    pub fn backend(&self, label: &str) -> Option<Arc<dyn BackendDescriptor>> {
        self.backends.get(&label.to_lowercase()).cloned()
    }

    /// Registered front-end labels, sorted.
    pub fn frontend_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.frontends.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    /// Registered back-end labels, sorted.
    pub fn backend_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }
}
