use anyhow::Context;
use std::sync::Arc;

use crate::module::{InitCtx, Module};

/// Core modules are brought up in this order and torn down in reverse.
const CORE_MODULE_ORDER: &[&str] = &[
    "db", // Document store must be ready before any domain module
];

/// Module registry owning the lifecycle of core and custom modules
pub struct ModuleRegistry {
    core_modules: Vec<Arc<dyn Module>>,
    custom_modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            core_modules: Vec::new(),
            custom_modules: Vec::new(),
        }
    }

    /// Register a core module. Only names listed in the core order take part in
    /// the lifecycle.
    pub fn register_core(&mut self, module: Arc<dyn Module>) {
        if !CORE_MODULE_ORDER.contains(&module.name()) {
            tracing::warn!(
                module = module.name(),
                "core module is not part of the startup order and will not be initialized"
            );
        }
        self.core_modules.push(module);
    }

    /// Register a custom (domain) module
    pub fn register_custom(&mut self, module: Arc<dyn Module>) {
        self.custom_modules.push(module);
    }

    /// All registered modules, core first
    pub fn modules(&self) -> Vec<&Arc<dyn Module>> {
        self.core_modules
            .iter()
            .chain(self.custom_modules.iter())
            .collect()
    }

    /// Get a module by name
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules().into_iter().find(|module| module.name() == name)
    }

    fn ordered_core_modules(&self) -> Vec<&Arc<dyn Module>> {
        CORE_MODULE_ORDER
            .iter()
            .filter_map(|&name| self.core_modules.iter().find(|m| m.name() == name))
            .collect()
    }

    /// Initialize core modules in order, then custom modules
    pub async fn init_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        for module in self.ordered_core_modules() {
            tracing::info!(module = module.name(), "initializing core module");
            module.init(ctx).await.with_context(|| {
                format!("failed to initialize core module '{}'", module.name())
            })?;
        }

        tracing::info!("initializing {} custom modules", self.custom_modules.len());
        for module in &self.custom_modules {
            tracing::info!(module = module.name(), "initializing custom module");
            module.init(ctx).await.with_context(|| {
                format!("failed to initialize custom module '{}'", module.name())
            })?;
        }

        Ok(())
    }

    /// Start core modules in order, then custom modules
    pub async fn start_all(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        for module in self.ordered_core_modules() {
            tracing::info!(module = module.name(), "starting core module");
            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start core module '{}'", module.name()))?;
        }

        for module in &self.custom_modules {
            tracing::info!(module = module.name(), "starting custom module");
            module
                .start(ctx)
                .await
                .with_context(|| format!("failed to start custom module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Stop custom modules (reverse registration order), then core modules in
    /// reverse startup order. Every module gets a stop call even if an earlier
    /// one fails; the first failure is returned.
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        let mut first_error: Option<anyhow::Error> = None;

        let custom = self.custom_modules.iter().rev();
        let core = self.ordered_core_modules().into_iter().rev();

        for module in custom.chain(core) {
            tracing::info!(module = module.name(), "stopping module");
            if let Err(err) = module.stop().await {
                tracing::error!(module = module.name(), error = %err, "module failed to stop");
                if first_error.is_none() {
                    first_error =
                        Some(err.context(format!("failed to stop module '{}'", module.name())));
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
