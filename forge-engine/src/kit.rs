//! Unopinionated wiring handle for assembling runnable systems.

use forge_core::error::BuildError;
use forge_core::foundry::Foundry;
use forge_core::logger::{ForgeLogger, NoopLogger};
use forge_core::options::ForgeOptions;
use forge_core::WorkflowBuilder;
use std::any::Any;
use std::sync::Arc;

use crate::smith::Smith;

/// Factory surface with sensible defaults.
///
/// This is intentionally small: it holds a logger, options, and an
/// optional service handle, and hands out builders, foundries, and
/// smiths wired with them. Callers can always bypass this and construct
/// the pieces directly.
///
/// # Example
///
/// ```ignore
/// let forge = Forge::new().with_options(options);
/// let workflow = Arc::new(forge.workflow("checkout").operation(step).build()?);
/// let smith = forge.smith()?;
/// let output = smith.execute(&workflow, &cancel).await?;
/// ```
#[derive(Clone)]
pub struct Forge {
    logger: Arc<dyn ForgeLogger>,
    options: ForgeOptions,
    services: Option<Arc<dyn Any + Send + Sync>>,
}

impl Forge {
    /// Create a factory with a no-op logger and default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logger: Arc::new(NoopLogger),
            options: ForgeOptions::default(),
            services: None,
        }
    }

    /// Replace the logger handed to everything this factory creates.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ForgeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the default options.
    #[must_use]
    pub fn with_options(mut self, options: ForgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a service handle for user code to resolve dependencies
    /// from. The engine never reads it.
    #[must_use]
    pub fn with_services<T: Send + Sync + 'static>(mut self, services: Arc<T>) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = services;
        self.services = Some(erased);
        self
    }

    /// Start a workflow builder.
    #[must_use]
    pub fn workflow(&self, name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    /// Create a foundry wired with this factory's logger, options, and
    /// services.
    ///
    /// # Errors
    ///
    /// [`BuildError::InvalidOptions`] when the options fail validation.
    pub fn foundry(&self) -> Result<Foundry, BuildError> {
        self.options.validate()?;
        let mut foundry = Foundry::new()
            .with_logger(Arc::clone(&self.logger))
            .with_options(self.options.clone());
        if let Some(services) = &self.services {
            foundry = foundry.with_service_handle(Arc::clone(services));
        }
        Ok(foundry)
    }

    /// Create a smith wired with this factory's logger, options, and
    /// services.
    ///
    /// # Errors
    ///
    /// [`BuildError::InvalidOptions`] when the options fail validation.
    pub fn smith(&self) -> Result<Smith, BuildError> {
        self.options.validate()?;
        let mut smith = Smith::new()
            .with_logger(Arc::clone(&self.logger))
            .with_options(self.options.clone());
        if let Some(services) = &self.services {
            smith = smith.with_service_handle(Arc::clone(services));
        }
        Ok(smith)
    }
}

impl Default for Forge {
    fn default() -> Self {
        Self::new()
    }
}
