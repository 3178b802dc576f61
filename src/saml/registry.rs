use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::provider::SamlProvider;
use crate::error::Error;

/// Compiled providers by name.
pub trait ProviderRegistry: Debug + Send + Sync {
    /// Adds or atomically replaces the provider of the same name.
    fn register(&self, provider: Arc<SamlProvider>);
    fn get(&self, name: &str) -> Result<Arc<SamlProvider>, Error>;
    fn list(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    providers: RwLock<BTreeMap<String, Arc<SamlProvider>>>,
}

impl ProviderRegistry for InMemoryRegistry {
    fn register(&self, provider: Arc<SamlProvider>) {
        let name = provider.name().to_string();
        self.providers.write().insert(name, provider);
    }

    fn get(&self, name: &str) -> Result<Arc<SamlProvider>, Error> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
    }

    fn list(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }
}
