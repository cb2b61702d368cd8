//! Data providers: external services that hand the renderer a variable map.
//!
//! `Unavailable` is a first-class outcome, not a failure: nothing playing,
//! empty departures, a city that will not geocode. Callers skip the render
//! entirely instead of admitting blank content.

pub mod retry;
pub mod transit;
pub mod weather;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use flap_board::VariableMap;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider has no current data to display. Recoverable: the caller
    /// skips this render and tries again next trigger.
    #[error("no data currently available: {0}")]
    Unavailable(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("missing or invalid provider config: {0}")]
    Config(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A source of template variables, resolved synchronously at render time.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn variables(&self) -> Result<VariableMap, ProviderError>;
}

/// Name → provider, resolved once at configuration load. A template naming
/// a provider that is absent here is disabled, not fatal.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
