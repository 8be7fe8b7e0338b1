use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::ProducerError;

/// Source of candidate outputs (a model, a service, a cache).
///
/// `cancel` fires when the attempt's deadline passes or the executor shuts
/// down; producers should stop work promptly when it does. A result produced
/// after cancellation is discarded.
#[async_trait]
pub trait Producer: Send + Sync {
    fn name(&self) -> &str;
    async fn produce(&self, cancel: CancellationToken) -> std::result::Result<String, ProducerError>;
}

/// Closure-backed producer (see [`producer_fn`]).
pub struct FnProducer<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Producer for FnProducer<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<String, ProducerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, cancel: CancellationToken) -> std::result::Result<String, ProducerError> {
        (self.f)(cancel).await
    }
}

/// Adapt an async closure into a shareable producer.
///
/// ```ignore
/// let p = producer_fn("echo", |_cancel| async { Ok("hello".to_string()) });
/// ```
pub fn producer_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Producer>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<String, ProducerError>> + Send + 'static,
{
    Arc::new(FnProducer {
        name: name.into(),
        f,
    })
}

/// Named producers. Re-registering a name replaces the previous producer.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: DashMap<String, Arc<dyn Producer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self {
            producers: DashMap::new(),
        }
    }

    pub fn register(&self, producer: Arc<dyn Producer>) {
        self.producers.insert(producer.name().to_string(), producer);
    }

    pub fn deregister(&self, name: &str) -> bool {
        self.producers.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Producer>> {
        self.producers
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| ArbiterError::UnknownProducer(name.to_string()))
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.producers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_resolves_by_name() {
        let reg = ProducerRegistry::new();
        reg.register(producer_fn("a", |_c| async { Ok("A".to_string()) }));
        reg.register(producer_fn("b", |_c| async { Err(ProducerError::permanent("no")) }));

        assert_eq!(reg.registered_names(), vec!["a".to_string(), "b".to_string()]);
        let a = reg.get("a").unwrap();
        assert_eq!(a.produce(CancellationToken::new()).await.unwrap(), "A");
        assert!(matches!(reg.get("zzz"), Err(ArbiterError::UnknownProducer(n)) if n == "zzz"));
        assert!(reg.deregister("b"));
        assert!(reg.get("b").is_err());
    }
}
