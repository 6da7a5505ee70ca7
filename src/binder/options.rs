// src/binder/options.rs
//
// Binder configuration

use crate::binder::module::RepositoryModule;
use crate::context::{DataContext, SqliteContext};
use crate::registry::ServiceCollection;
use crate::unit_of_work::register_unit_of_work;

/// The data context the unit of work is bound to.
#[derive(Clone, Copy)]
pub(crate) struct ContextBinding {
    pub(crate) type_name: &'static str,
    pub(crate) register_unit_of_work: fn(&mut ServiceCollection),
}

impl ContextBinding {
    fn of<C: DataContext>() -> Self {
        Self {
            type_name: std::any::type_name::<C>(),
            register_unit_of_work: register_unit_of_work::<C>,
        }
    }
}

/// Options recognized by `add_generic_repositories`.
///
/// Defaults: no modules, `SqliteContext` as the data context.
#[derive(Clone)]
pub struct RepositoryOptions {
    pub(crate) modules: Vec<RepositoryModule>,
    pub(crate) context: ContextBinding,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            context: ContextBinding::of::<SqliteContext>(),
        }
    }
}

impl RepositoryOptions {
    pub fn register_module(&mut self, module: RepositoryModule) -> &mut Self {
        self.modules.push(module);
        self
    }

    pub fn register_modules(&mut self, modules: impl IntoIterator<Item = RepositoryModule>) -> &mut Self {
        self.modules.extend(modules);
        self
    }

    /// Bind the unit of work to data context `C`.
    pub fn use_data_context<C: DataContext>(&mut self) -> &mut Self {
        self.context = ContextBinding::of::<C>();
        self
    }

    pub fn modules(&self) -> &[RepositoryModule] {
        &self.modules
    }

    pub fn data_context_name(&self) -> &'static str {
        self.context.type_name
    }
}

impl std::fmt::Debug for RepositoryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryOptions")
            .field("modules", &self.modules)
            .field("data_context", &self.context.type_name)
            .finish()
    }
}
