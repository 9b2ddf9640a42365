//! Source registry
//!
//! Owns the set of registered sources keyed by their unique id.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use crate::error::{Error, Result};
use crate::scrapers::{RateSource, SourceKind};

/// A way of naming a registered source: by id, by type, or by instance.
#[derive(Clone)]
pub enum SourceRef {
    Id(String),
    Instance(Arc<dyn RateSource>),
}

impl SourceRef {
    /// Refer to a source by its type.
    pub fn of<T: SourceKind>() -> Self {
        SourceRef::Id(T::SOURCE_ID.to_string())
    }

    pub fn id(&self) -> &str {
        match self {
            SourceRef::Id(id) => id,
            SourceRef::Instance(source) => source.source_id(),
        }
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Id(id) => write!(f, "SourceRef::Id({})", id),
            SourceRef::Instance(source) => write!(f, "SourceRef::Instance({})", source.source_id()),
        }
    }
}

impl From<&str> for SourceRef {
    fn from(id: &str) -> Self {
        SourceRef::Id(id.to_string())
    }
}

impl From<String> for SourceRef {
    fn from(id: String) -> Self {
        SourceRef::Id(id)
    }
}

impl From<Arc<dyn RateSource>> for SourceRef {
    fn from(source: Arc<dyn RateSource>) -> Self {
        SourceRef::Instance(source)
    }
}

pub struct SourceRegistry {
    sources: RwLock<BTreeMap<String, Arc<dyn RateSource>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        SourceRegistry {
            sources: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add sources keyed by id. Nothing is inserted if any id is taken,
    /// including duplicates within `sources` itself.
    pub async fn register(&self, sources: Vec<Arc<dyn RateSource>>) -> Result<()> {
        let mut registered = self.sources.write().await;

        let mut incoming = std::collections::HashSet::new();
        for source in &sources {
            let id = source.source_id();
            if id.is_empty() {
                return Err(Error::EmptySourceId);
            }
            if registered.contains_key(id) || !incoming.insert(id.to_string()) {
                return Err(Error::NameConflict(id.to_string()));
            }
        }

        for source in sources {
            info!("Registering source: {}", source.source_id());
            registered.insert(source.source_id().to_string(), source);
        }
        Ok(())
    }

    /// Remove sources. Nothing is removed if any reference is unknown.
    pub async fn unregister(&self, refs: &[SourceRef]) -> Result<Vec<Arc<dyn RateSource>>> {
        let mut registered = self.sources.write().await;

        if let Some(missing) = refs.iter().find(|r| !registered.contains_key(r.id())) {
            return Err(Error::UnknownSource(missing.id().to_string()));
        }

        let removed = refs.iter()
            .filter_map(|r| registered.remove(r.id()))
            .collect::<Vec<_>>();
        for source in &removed {
            info!("Unregistered source: {}", source.source_id());
        }
        Ok(removed)
    }

    pub async fn resolve(&self, source: &SourceRef) -> Result<Arc<dyn RateSource>> {
        self.sources
            .read()
            .await
            .get(source.id())
            .cloned()
            .ok_or_else(|| Error::UnknownSource(source.id().to_string()))
    }

    pub async fn contains(&self, source_id: &str) -> bool {
        self.sources.read().await.contains_key(source_id)
    }

    /// Registered ids in sorted order.
    pub async fn source_ids(&self) -> Vec<String> {
        self.sources.read().await.keys().cloned().collect()
    }

    pub async fn sources(&self) -> Vec<Arc<dyn RateSource>> {
        self.sources.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::scrapers::ListenerState;
    use crate::types::{Pair, RateRecord};

    struct NamedSource {
        id: &'static str,
        state: ListenerState,
    }

    impl SourceKind for NamedSource {
        const SOURCE_ID: &'static str = "named";
    }

    #[async_trait]
    impl RateSource for NamedSource {
        fn source_id(&self) -> &str {
            self.id
        }

        fn listener_state(&self) -> &ListenerState {
            &self.state
        }

        async fn fetch(&self, _pair: Option<&Pair>) -> Result<Vec<RateRecord>> {
            Ok(Vec::new())
        }
    }

    fn source(id: &'static str) -> Arc<dyn RateSource> {
        Arc::new(NamedSource { id, state: ListenerState::new() })
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate() {
        let registry = SourceRegistry::new();
        registry.register(vec![source("binance")]).await.unwrap();

        let err = registry.register(vec![source("binance")]).await.unwrap_err();
        assert!(matches!(err, Error::NameConflict(id) if id == "binance"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_is_all_or_nothing() {
        let registry = SourceRegistry::new();
        let err = registry
            .register(vec![source("a"), source("b"), source("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NameConflict(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_id() {
        let registry = SourceRegistry::new();
        let result = registry.register(vec![source("a"), source("")]).await;
        assert!(matches!(result, Err(Error::EmptySourceId)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_resolve_by_id_type_and_instance() {
        let registry = SourceRegistry::new();
        let instance = source("named");
        registry.register(vec![instance.clone(), source("other")]).await.unwrap();

        let by_id = registry.resolve(&"named".into()).await.unwrap();
        let by_type = registry.resolve(&SourceRef::of::<NamedSource>()).await.unwrap();
        let by_instance = registry.resolve(&instance.clone().into()).await.unwrap();
        assert!(Arc::ptr_eq(&by_id, &instance));
        assert!(Arc::ptr_eq(&by_type, &instance));
        assert!(Arc::ptr_eq(&by_instance, &instance));

        let missing = registry.resolve(&"missing".into()).await;
        assert!(matches!(missing, Err(Error::UnknownSource(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = SourceRegistry::new();
        registry.register(vec![source("a"), source("b")]).await.unwrap();

        let partial = registry.unregister(&["a".into(), "zzz".into()]).await;
        assert!(matches!(partial, Err(Error::UnknownSource(id)) if id == "zzz"));
        assert_eq!(registry.len().await, 2);

        let removed = registry.unregister(&["a".into()]).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(registry.source_ids().await, vec!["b".to_string()]);
        assert!(!registry.contains("a").await);
    }
}
