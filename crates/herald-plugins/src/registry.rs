use crate::Plugin;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Central registry for dispatch plugins, keyed by lowercase name.
///
/// Aliases let one plugin answer to several channel names (e.g. the demo
/// plugin handling both `demo` and `whatsapp`).
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin under its own name.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_lowercase();
        info!(plugin = %name, "Registered dispatch plugin");
        self.plugins.insert(name, plugin);
    }

    /// Registers an additional lookup name for a plugin.
    pub fn register_alias(&mut self, alias: &str, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(alias.to_lowercase(), plugin);
    }

    /// Looks a plugin up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(&name.to_lowercase()).cloned()
    }

    /// All registered lookup names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered lookup names (aliases included).
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Builds a registry with the demo plugin and its common aliases, the
    /// default wiring for development and tests.
    pub fn with_demo_plugin() -> Self {
        let mut registry = Self::new();
        let demo: Arc<dyn Plugin> = Arc::new(crate::DemoMessagingPlugin::new());
        registry.register(demo.clone());
        registry.register_alias("demo", demo.clone());
        registry.register_alias("whatsapp", demo);
        registry
    }
}
