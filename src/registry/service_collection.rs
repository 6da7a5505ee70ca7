// src/registry/service_collection.rs
//
// Service registrations, keyed by the TypeId of the service type.
//
// Service types may be unsized (`dyn WidgetRepository`): every instance is
// stored as an `Arc<S>` inside a type-erased box and downcast back on
// resolution.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RepoResult;
use crate::registry::service_provider::{ServiceProvider, ServiceScope};

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the whole provider.
    Singleton,
    /// One instance per scope.
    Scoped,
}

pub(crate) type Erased = Box<dyn Any + Send + Sync>;

pub(crate) type Factory = Arc<dyn Fn(&ServiceScope) -> RepoResult<Erased> + Send + Sync>;

pub(crate) enum Entry {
    Singleton(Erased),
    Scoped(Factory),
}

pub(crate) struct ServiceDescriptor {
    pub(crate) type_name: &'static str,
    pub(crate) entry: Entry,
}

impl ServiceDescriptor {
    pub(crate) fn lifetime(&self) -> Lifetime {
        match self.entry {
            Entry::Singleton(_) => Lifetime::Singleton,
            Entry::Scoped(_) => Lifetime::Scoped,
        }
    }
}

/// Registrations collected at startup. A later registration of the same
/// service type replaces the earlier one.
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_singleton<S>(&mut self, service: Arc<S>)
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.insert::<S>(Entry::Singleton(Box::new(service)));
    }

    /// Register a factory invoked once per scope, on first resolution.
    ///
    /// ```ignore
    /// services.add_scoped::<dyn UnitOfWork, _>(|scope| {
    ///     let context = scope.resolve::<SqliteContext>()?;
    ///     Ok(Arc::new(ContextUnitOfWork::new(context)) as Arc<dyn UnitOfWork>)
    /// });
    /// ```
    pub fn add_scoped<S, F>(&mut self, factory: F)
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> RepoResult<Arc<S>> + Send + Sync + 'static,
    {
        let erased: Factory = Arc::new(move |scope: &ServiceScope| {
            let service = factory(scope)?;
            Ok(Box::new(service) as Erased)
        });
        self.insert::<S>(Entry::Scoped(erased));
    }

    pub fn contains<S: ?Sized + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }

    pub fn lifetime_of<S: ?Sized + 'static>(&self) -> Option<Lifetime> {
        self.services
            .get(&TypeId::of::<S>())
            .map(ServiceDescriptor::lifetime)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Freeze the registrations into a provider.
    pub fn build(self) -> ServiceProvider {
        ServiceProvider::new(self.services)
    }

    fn insert<S: ?Sized + 'static>(&mut self, entry: Entry) {
        let type_name = std::any::type_name::<S>();
        let previous = self
            .services
            .insert(TypeId::of::<S>(), ServiceDescriptor { type_name, entry });

        if previous.is_some() {
            log::debug!("Replaced registration for {}", type_name);
        }
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<(&str, Lifetime)> = self
            .services
            .values()
            .map(|d| (d.type_name, d.lifetime()))
            .collect();
        names.sort_unstable_by_key(|(name, _)| *name);
        f.debug_struct("ServiceCollection").field("services", &names).finish()
    }
}
