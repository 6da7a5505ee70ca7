// src/binder/module.rs
//
// Repository modules: explicit declarations of repository interfaces and
// the implementations that provide them.
//
// Every capability is a trait bound checked at compile time:
// - an interface must extend `Repository<E>` and carry a `RepositoryContract`
// - an implementation must be built on `GenericRepository` (`RepositoryBase`)
// - an implementation may only provide interfaces over its own entity type

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::domain::Entity;
use crate::registry::ServiceCollection;
use crate::repositories::{Repository, RepositoryBase};

/// Marks a trait-object type as a bindable repository interface.
///
/// Implement it through [`repository_contract!`](crate::repository_contract).
pub trait RepositoryContract: Send + Sync + 'static {
    type Entity: Entity;
}

/// Declare `dyn Trait` as a repository interface over `Entity`.
///
/// ```ignore
/// pub trait WidgetRepository: Repository<Widget> {}
/// repository_contract!(WidgetRepository => Widget);
/// ```
#[macro_export]
macro_rules! repository_contract {
    ($iface:path => $entity:ty) => {
        impl $crate::binder::RepositoryContract for dyn $iface {
            type Entity = $entity;
        }
    };
}

type Register = Arc<dyn Fn(&mut ServiceCollection) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct InterfaceDecl {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

#[derive(Clone)]
pub(crate) struct Provision {
    pub(crate) interface: TypeId,
    pub(crate) register: Register,
}

#[derive(Clone)]
pub(crate) struct ImplementationDecl {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) provisions: Vec<Provision>,
}

impl ImplementationDecl {
    pub(crate) fn provision_for(&self, interface: TypeId) -> Option<&Provision> {
        self.provisions.iter().find(|p| p.interface == interface)
    }
}

/// An implementation declaration under construction.
pub struct Implementation<R> {
    provisions: Vec<Provision>,
    _repository: PhantomData<fn() -> R>,
}

impl<R: RepositoryBase> Implementation<R> {
    pub fn of() -> Self {
        Self {
            provisions: Vec::new(),
            _repository: PhantomData,
        }
    }

    /// Declare that `R` implements interface `I`. `cast` is the unsizing
    /// coercion, e.g. `|repo| repo as Arc<dyn WidgetRepository>`.
    pub fn provides<I>(mut self, cast: fn(Arc<R>) -> Arc<I>) -> Self
    where
        I: RepositoryContract<Entity = R::Entity> + ?Sized,
    {
        let register: Register = Arc::new(move |services: &mut ServiceCollection| {
            services.add_scoped::<I, _>(move |scope| {
                let context = scope.resolve::<R::Context>()?;
                Ok(cast(Arc::new(R::from_context(context))))
            });
        });

        self.provisions.push(Provision {
            interface: TypeId::of::<I>(),
            register,
        });
        self
    }
}

/// A named group of repository declarations, usually one per domain area.
#[derive(Clone)]
pub struct RepositoryModule {
    name: String,
    pub(crate) interfaces: Vec<InterfaceDecl>,
    pub(crate) implementations: Vec<ImplementationDecl>,
}

impl RepositoryModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interfaces: Vec::new(),
            implementations: Vec::new(),
        }
    }

    /// Declare a repository interface that must be bound.
    pub fn interface<I>(mut self) -> Self
    where
        I: RepositoryContract + Repository<<I as RepositoryContract>::Entity> + ?Sized,
    {
        self.interfaces.push(InterfaceDecl {
            type_id: TypeId::of::<I>(),
            name: std::any::type_name::<I>(),
        });
        self
    }

    pub fn implementation<R: RepositoryBase>(mut self, implementation: Implementation<R>) -> Self {
        self.implementations.push(ImplementationDecl {
            type_id: TypeId::of::<R>(),
            name: std::any::type_name::<R>(),
            provisions: implementation.provisions,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn implementation_count(&self) -> usize {
        self.implementations.len()
    }
}

impl fmt::Debug for RepositoryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryModule")
            .field("name", &self.name)
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name).collect::<Vec<_>>(),
            )
            .field(
                "implementations",
                &self.implementations.iter().map(|i| i.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
