// src/registry/service_provider.rs
//
// Resolution of registered services
//
// CRITICAL RULES:
// - Scoped services are created at most once per scope
// - No lock is held while a factory runs (factories resolve their own
//   dependencies from the same scope)
// - Dependency cycles are reported, not recursed into

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{RepoResult, RepositoryError};
use crate::registry::service_collection::{Entry, Erased, ServiceDescriptor};

type Services = Arc<HashMap<TypeId, ServiceDescriptor>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_registered<S: ?Sized>() -> RepositoryError {
    RepositoryError::Configuration(format!(
        "no service registered for {}",
        std::any::type_name::<S>()
    ))
}

fn downcast<S>(erased: &(dyn Any + Send + Sync)) -> RepoResult<Arc<S>>
where
    S: ?Sized + Send + Sync + 'static,
{
    erased.downcast_ref::<Arc<S>>().cloned().ok_or_else(|| {
        RepositoryError::Configuration(format!(
            "registration for {} holds an instance of another type",
            std::any::type_name::<S>()
        ))
    })
}

/// The frozen registry. Cheap to clone.
#[derive(Clone)]
pub struct ServiceProvider {
    services: Services,
}

impl ServiceProvider {
    pub(crate) fn new(services: HashMap<TypeId, ServiceDescriptor>) -> Self {
        Self {
            services: Arc::new(services),
        }
    }

    /// Open a scope: one logical request, one set of scoped instances.
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            services: Arc::clone(&self.services),
            instances: Mutex::new(HashMap::new()),
            resolving: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a singleton without opening a scope.
    pub fn get_singleton<S>(&self) -> RepoResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let descriptor = self
            .services
            .get(&TypeId::of::<S>())
            .ok_or_else(not_registered::<S>)?;

        match &descriptor.entry {
            Entry::Singleton(instance) => downcast::<S>(instance.as_ref()),
            Entry::Scoped(_) => Err(RepositoryError::Configuration(format!(
                "{} is scoped; resolve it from a scope",
                descriptor.type_name
            ))),
        }
    }
}

/// Per-request resolution scope. Dropping it releases every scoped instance
/// it created.
pub struct ServiceScope {
    services: Services,
    instances: Mutex<HashMap<TypeId, Erased>>,
    resolving: Mutex<Vec<TypeId>>,
}

impl ServiceScope {
    pub fn resolve<S>(&self) -> RepoResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<S>();
        let descriptor = self.services.get(&type_id).ok_or_else(not_registered::<S>)?;

        let factory = match &descriptor.entry {
            Entry::Singleton(instance) => return downcast::<S>(instance.as_ref()),
            Entry::Scoped(factory) => Arc::clone(factory),
        };

        if let Some(existing) = lock(&self.instances).get(&type_id) {
            return downcast::<S>(existing.as_ref());
        }

        {
            let mut resolving = lock(&self.resolving);
            if resolving.contains(&type_id) {
                return Err(RepositoryError::Configuration(format!(
                    "circular dependency while resolving {}",
                    descriptor.type_name
                )));
            }
            resolving.push(type_id);
        }

        let created = factory(self);
        lock(&self.resolving).retain(|id| *id != type_id);
        let created = created?;

        let mut instances = lock(&self.instances);
        let instance = instances.entry(type_id).or_insert(created);
        downcast::<S>(instance.as_ref())
    }

    pub fn is_registered<S: ?Sized + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<S>())
    }
}
