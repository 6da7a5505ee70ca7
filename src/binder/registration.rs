// src/binder/registration.rs
//
// Startup binding of repository interfaces to implementations
//
// PRINCIPLES:
// - Runs once, before the provider is built
// - Matching completes for EVERY interface before anything is registered:
//   a configuration error leaves the service collection untouched
// - Exactly one implementation per interface; zero or many is an error
// - Every binding is scoped, so repositories share the scope's data context

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use crate::binder::module::{ImplementationDecl, InterfaceDecl, Provision, RepositoryModule};
use crate::binder::options::RepositoryOptions;
use crate::error::{RepoResult, RepositoryError};
use crate::registry::ServiceCollection;

/// One interface → implementation pair, by type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryBinding {
    pub interface: &'static str,
    pub implementation: &'static str,
}

/// Summary of what the binder registered. Registered as a singleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryBindings {
    pub data_context: &'static str,
    pub bindings: Vec<RepositoryBinding>,
}

impl RepositoryBindings {
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Implementation bound to the interface with this short name.
    pub fn implementation_of(&self, interface: &str) -> Option<&'static str> {
        self.bindings
            .iter()
            .find(|b| short_type_name(b.interface) == interface)
            .map(|b| b.implementation)
    }
}

struct MatchedBinding {
    summary: RepositoryBinding,
    provision: Provision,
}

/// Bind every declared repository interface and the unit of work.
///
/// ```ignore
/// let mut services = ServiceCollection::new();
/// SqliteContext::register(&mut services, pool);
/// add_generic_repositories(&mut services, |options| {
///     options.register_module(catalog_module());
/// })?;
/// let provider = services.build();
/// ```
pub fn add_generic_repositories<F>(services: &mut ServiceCollection, configure: F) -> RepoResult<()>
where
    F: FnOnce(&mut RepositoryOptions),
{
    let mut options = RepositoryOptions::default();
    configure(&mut options);

    if options.modules.is_empty() {
        log::warn!("No repository modules configured; registering the unit of work only");
    }

    let matched = match_bindings(&options.modules)?;

    for binding in &matched {
        (binding.provision.register)(services);
        log::info!(
            "Registered {} -> {}",
            short_type_name(binding.summary.interface),
            short_type_name(binding.summary.implementation)
        );
    }

    (options.context.register_unit_of_work)(services);
    log::info!(
        "Registered unit of work over {}",
        short_type_name(options.context.type_name)
    );

    services.add_singleton(Arc::new(RepositoryBindings {
        data_context: options.context.type_name,
        bindings: matched.into_iter().map(|b| b.summary).collect(),
    }));

    Ok(())
}

fn match_bindings(modules: &[RepositoryModule]) -> RepoResult<Vec<MatchedBinding>> {
    let interfaces: Vec<&InterfaceDecl> = distinct(
        modules.iter().flat_map(|m| m.interfaces.iter()),
        |decl: &InterfaceDecl| decl.type_id,
    );
    let implementations: Vec<&ImplementationDecl> = distinct(
        modules.iter().flat_map(|m| m.implementations.iter()),
        |decl: &ImplementationDecl| decl.type_id,
    );

    let mut matched = Vec::with_capacity(interfaces.len());
    for interface in interfaces {
        let candidates: Vec<(&ImplementationDecl, &Provision)> = implementations
            .iter()
            .filter_map(|&imp| imp.provision_for(interface.type_id).map(|p| (imp, p)))
            .collect();

        match candidates.as_slice() {
            [] => {
                return Err(RepositoryError::Configuration(format!(
                    "There is no implementation for {}",
                    short_type_name(interface.name)
                )));
            }
            [(implementation, provision)] => matched.push(MatchedBinding {
                summary: RepositoryBinding {
                    interface: interface.name,
                    implementation: implementation.name,
                },
                provision: (*provision).clone(),
            }),
            many => {
                let names: Vec<&str> = many.iter().map(|(imp, _)| short_type_name(imp.name)).collect();
                return Err(RepositoryError::Configuration(format!(
                    "Multiple implementations for {}: {}",
                    short_type_name(interface.name),
                    names.join(", ")
                )));
            }
        }
    }

    Ok(matched)
}

/// First occurrence of each key, in declaration order.
fn distinct<'a, T, I>(items: I, key: impl Fn(&T) -> TypeId) -> Vec<&'a T>
where
    I: Iterator<Item = &'a T>,
{
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(key(*item))).collect()
}

/// `dyn my_app::catalog::WidgetRepository` → `WidgetRepository`.
/// Generic arguments are kept as written.
pub(crate) fn short_type_name(name: &str) -> &str {
    let name = name.strip_prefix("dyn ").unwrap_or(name);
    let path_end = name.find('<').unwrap_or(name.len());
    let start = name[..path_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &name[start..]
}
