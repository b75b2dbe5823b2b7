//! Component factory: explicit registry from component class identifiers to
//! constructors.
//!
//! The registry is populated at process start and consulted at instantiate
//! time; an unregistered identifier fails closed with
//! [`UnknownComponentError`], never a silent no-op. Capability tags are
//! attached at registration so callers query them instead of inspecting
//! types at use time.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::instrument;

use crate::component::{Component, FnComponent, Payload};
use crate::context::ExecutionContext;
use crate::errors::{CompileError, InvokeError, UnknownComponentError};

/// Constructor producing a live component from a node's config.
pub type ComponentCtor = Arc<
    dyn Fn(&FxHashMap<String, Value>, &ExecutionContext) -> Result<Arc<dyn Component>, CompileError>
        + Send
        + Sync,
>;

/// What a registered component class can do.
///
/// Tags replace runtime type inspection: they are declared once at
/// registration, not inferred at use time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Runnable,
    Tool,
    VectorStore,
    Loader,
    /// Usable as a state machine's conditional unit.
    Conditional,
}

struct RegistryEntry {
    ctor: ComponentCtor,
    capabilities: Vec<Capability>,
}

/// Per-class configuration overlay injected into the factory at
/// construction. Node config wins over overlay defaults; there is no
/// process-wide mutable extension dict.
#[derive(Clone, Debug, Default)]
pub struct ConfigRegistry {
    defaults: FxHashMap<String, FxHashMap<String, Value>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(
        &mut self,
        class: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> &mut Self {
        self.defaults
            .entry(class.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_default(
        mut self,
        class: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.set_default(class, key, value);
        self
    }

    /// Overlay defaults under the node's own config.
    fn apply(&self, class: &str, config: &FxHashMap<String, Value>) -> FxHashMap<String, Value> {
        let mut merged = self.defaults.get(class).cloned().unwrap_or_default();
        for (k, v) in config {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Registry keyed by stable string identifiers.
pub struct ComponentRegistry {
    entries: FxHashMap<String, RegistryEntry>,
    config: ConfigRegistry,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::with_config(ConfigRegistry::default())
    }

    pub fn with_config(config: ConfigRegistry) -> Self {
        Self {
            entries: FxHashMap::default(),
            config,
        }
    }

    /// Registers a constructor for a component class.
    pub fn register(&mut self, class: impl Into<String>, ctor: ComponentCtor) -> &mut Self {
        self.register_with_capabilities(class, [Capability::Runnable], ctor)
    }

    /// Registers a constructor together with its capability tags.
    pub fn register_with_capabilities(
        &mut self,
        class: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        ctor: ComponentCtor,
    ) -> &mut Self {
        self.entries.insert(
            class.into(),
            RegistryEntry {
                ctor,
                capabilities: capabilities.into_iter().collect(),
            },
        );
        self
    }

    /// Registers a plain function as a config-insensitive leaf.
    pub fn register_fn<F>(&mut self, class: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Payload) -> Result<Payload, InvokeError> + Clone + Send + Sync + 'static,
    {
        self.register(
            class,
            Arc::new(move |_config, _ctx| Ok(Arc::new(FnComponent::new(f.clone())) as Arc<dyn Component>)),
        )
    }

    pub fn contains(&self, class: &str) -> bool {
        self.entries.contains_key(class)
    }

    /// Capability tags of a registered class, if any.
    pub fn capabilities_of(&self, class: &str) -> Option<&[Capability]> {
        self.entries.get(class).map(|e| e.capabilities.as_slice())
    }

    pub fn has_capability(&self, class: &str, capability: Capability) -> bool {
        self.capabilities_of(class)
            .is_some_and(|caps| caps.contains(&capability))
    }

    /// Produces a live component for a node.
    ///
    /// The node's config is merged over the injected per-class defaults
    /// before the constructor runs.
    #[instrument(skip(self, config, ctx), err)]
    pub fn instantiate(
        &self,
        class: &str,
        config: &FxHashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn Component>, CompileError> {
        let entry = self
            .entries
            .get(class)
            .ok_or_else(|| UnknownComponentError {
                class: class.to_string(),
            })?;
        let merged = self.config.apply(class, config);
        (entry.ctor)(&merged, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::NullListener;
    use crate::utils::new_payload;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Arc::new(NullListener))
    }

    #[test]
    fn unknown_class_fails_closed() {
        let registry = ComponentRegistry::new();
        let err = registry
            .instantiate("missing", &new_payload(), &ctx())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnknownComponent(UnknownComponentError { ref class }) if class == "missing"
        ));
    }

    #[test]
    fn capability_tags_are_declared_not_inferred() {
        let mut registry = ComponentRegistry::new();
        registry.register_with_capabilities(
            "searcher",
            [Capability::Tool, Capability::Runnable],
            Arc::new(|_c, _ctx| Ok(Arc::new(FnComponent::new(Ok)) as Arc<dyn Component>)),
        );
        assert!(registry.has_capability("searcher", Capability::Tool));
        assert!(!registry.has_capability("searcher", Capability::VectorStore));
        assert!(registry.capabilities_of("absent").is_none());
    }

    #[tokio::test]
    async fn config_overlay_defaults_lose_to_node_config() {
        let config = ConfigRegistry::new()
            .with_default("greeter", "greeting", json!("hello"))
            .with_default("greeter", "punctuation", json!("!"));
        let mut registry = ComponentRegistry::with_config(config);
        registry.register(
            "greeter",
            Arc::new(|config, _ctx| {
                let greeting = config["greeting"].clone();
                let punctuation = config["punctuation"].clone();
                Ok(Arc::new(FnComponent::new(move |mut input: Payload| {
                    input.insert("greeting".into(), greeting.clone());
                    input.insert("punctuation".into(), punctuation.clone());
                    Ok(input)
                })) as Arc<dyn Component>)
            }),
        );

        let mut node_config = new_payload();
        node_config.insert("greeting".into(), json!("hi"));
        let component = registry
            .instantiate("greeter", &node_config, &ctx())
            .unwrap();
        let out = component.ainvoke(new_payload()).await.unwrap();
        assert_eq!(out["greeting"], json!("hi"));
        assert_eq!(out["punctuation"], json!("!"));
    }
}
