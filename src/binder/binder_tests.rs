// src/binder/binder_tests.rs
//
// Binder tests
//
// PURPOSE:
// - Prove one interface + one implementation binds and resolves to a
//   repository over the scope's data context
// - Prove zero / multiple implementations fail before anything is registered
// - Prove the unit of work is always registered, even without modules

#[cfg(test)]
mod fixtures {
    use std::sync::Arc;

    use crate::binder::{Implementation, RepositoryModule};
    use crate::context::SqliteContext;
    use crate::repositories::{GenericRepository, Repository, RepositoryBase};
    use crate::test_support::{Category, Widget};

    pub trait WidgetRepository: Repository<Widget> {}
    crate::repository_contract!(WidgetRepository => Widget);

    pub trait CategoryRepository: Repository<Category> {}
    crate::repository_contract!(CategoryRepository => Category);

    pub struct SqliteWidgetRepository(GenericRepository<Widget, SqliteContext>);

    impl RepositoryBase for SqliteWidgetRepository {
        type Entity = Widget;
        type Context = SqliteContext;

        fn from_context(context: Arc<SqliteContext>) -> Self {
            Self(GenericRepository::new(context))
        }

        fn base(&self) -> &GenericRepository<Widget, SqliteContext> {
            &self.0
        }
    }

    impl WidgetRepository for SqliteWidgetRepository {}

    /// A second widget implementation, for ambiguity tests.
    pub struct ArchiveWidgetRepository(GenericRepository<Widget, SqliteContext>);

    impl RepositoryBase for ArchiveWidgetRepository {
        type Entity = Widget;
        type Context = SqliteContext;

        fn from_context(context: Arc<SqliteContext>) -> Self {
            Self(GenericRepository::new(context))
        }

        fn base(&self) -> &GenericRepository<Widget, SqliteContext> {
            &self.0
        }
    }

    impl WidgetRepository for ArchiveWidgetRepository {}

    // The plain generic repository can provide an interface directly.
    impl CategoryRepository for GenericRepository<Category, SqliteContext> {}

    pub fn widget_module() -> RepositoryModule {
        RepositoryModule::new("widgets")
            .interface::<dyn WidgetRepository>()
            .implementation(
                Implementation::<SqliteWidgetRepository>::of()
                    .provides::<dyn WidgetRepository>(|repo| repo as Arc<dyn WidgetRepository>),
            )
    }

    pub fn category_module() -> RepositoryModule {
        RepositoryModule::new("categories")
            .interface::<dyn CategoryRepository>()
            .implementation(
                Implementation::<GenericRepository<Category, SqliteContext>>::of()
                    .provides::<dyn CategoryRepository>(|repo| repo as Arc<dyn CategoryRepository>),
            )
    }

    pub fn archive_module() -> RepositoryModule {
        RepositoryModule::new("archive").implementation(
            Implementation::<ArchiveWidgetRepository>::of()
                .provides::<dyn WidgetRepository>(|repo| repo as Arc<dyn WidgetRepository>),
        )
    }
}

#[cfg(test)]
mod binding_tests {
    use tokio_util::sync::CancellationToken;

    use super::fixtures::{
        archive_module, category_module, widget_module, CategoryRepository, WidgetRepository,
    };
    use crate::binder::{add_generic_repositories, RepositoryBindings, RepositoryModule};
    use crate::context::SqliteContext;
    use crate::error::RepositoryError;
    use crate::query::{Filter, Tracking};
    use crate::registry::{Lifetime, ServiceCollection};
    use crate::test_support::{category, test_db, widget, TestDb, Widget};
    use crate::unit_of_work::UnitOfWork;

    fn services_for(db: &TestDb) -> ServiceCollection {
        let mut services = ServiceCollection::new();
        SqliteContext::register(&mut services, db.pool.clone());
        services
    }

    fn configuration_message(result: Result<(), RepositoryError>) -> String {
        match result {
            Err(RepositoryError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_single_implementation_is_bound_scoped() {
        let db = test_db();
        let mut services = services_for(&db);

        add_generic_repositories(&mut services, |options| {
            options.register_modules([widget_module(), category_module()]);
        })
        .unwrap();

        assert_eq!(services.lifetime_of::<dyn WidgetRepository>(), Some(Lifetime::Scoped));
        assert_eq!(services.lifetime_of::<dyn CategoryRepository>(), Some(Lifetime::Scoped));
        assert_eq!(services.lifetime_of::<dyn UnitOfWork>(), Some(Lifetime::Scoped));

        let provider = services.build();
        let bindings = provider.get_singleton::<RepositoryBindings>().unwrap();
        assert_eq!(bindings.len(), 2);
        assert!(bindings
            .implementation_of("WidgetRepository")
            .unwrap()
            .ends_with("SqliteWidgetRepository"));
        assert!(bindings.data_context.ends_with("SqliteContext"));
    }

    #[tokio::test]
    async fn test_resolved_repositories_share_the_scope_context() {
        let db = test_db();
        let mut services = services_for(&db);
        add_generic_repositories(&mut services, |options| {
            options
                .register_module(widget_module())
                .register_module(category_module())
                .use_data_context::<SqliteContext>();
        })
        .unwrap();
        let provider = services.build();
        let cancel = CancellationToken::new();

        {
            let scope = provider.create_scope();
            let widgets = scope.resolve::<dyn WidgetRepository>().unwrap();
            let categories = scope.resolve::<dyn CategoryRepository>().unwrap();
            let uow = scope.resolve::<dyn UnitOfWork>().unwrap();

            uow.begin_transaction(&cancel).await.unwrap();
            widgets.add(widget("gear", 10)).unwrap();
            categories.add(category("tools")).unwrap();
            uow.commit(&cancel).await.unwrap();
        }

        let scope = provider.create_scope();
        let widgets = scope.resolve::<dyn WidgetRepository>().unwrap();
        let categories = scope.resolve::<dyn CategoryRepository>().unwrap();
        assert!(widgets.any(Filter::new(|w: &Widget| w.name == "gear")).unwrap());
        assert_eq!(categories.count_by(Filter::all()).unwrap().matched, 1);
        assert_eq!(
            widgets
                .get_all_async(Tracking::Disabled, &cancel)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_scopes_get_distinct_repositories() {
        let db = test_db();
        let mut services = services_for(&db);
        add_generic_repositories(&mut services, |options| {
            options.register_module(widget_module());
        })
        .unwrap();
        let provider = services.build();

        let first = provider.create_scope();
        let second = provider.create_scope();
        let a = first.resolve::<dyn WidgetRepository>().unwrap();
        let b = first.resolve::<dyn WidgetRepository>().unwrap();
        let c = second.resolve::<dyn WidgetRepository>().unwrap();

        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert!(!std::sync::Arc::ptr_eq(&a, &c));

        // Staged in one scope, invisible from another until saved.
        a.add(widget("gear", 10)).unwrap();
        assert!(!c.any(Filter::all()).unwrap());
    }

    #[test]
    fn test_missing_implementation_names_the_interface() {
        let db = test_db();
        let mut services = services_for(&db);
        let before = services.len();

        let orphan = RepositoryModule::new("orphan").interface::<dyn WidgetRepository>();
        let message = configuration_message(add_generic_repositories(&mut services, |options| {
            options.register_modules([category_module(), orphan]);
        }));

        assert_eq!(message, "There is no implementation for WidgetRepository");
        assert_eq!(services.len(), before);
        assert!(!services.contains::<dyn CategoryRepository>());
        assert!(!services.contains::<dyn UnitOfWork>());
    }

    #[test]
    fn test_multiple_implementations_are_rejected() {
        let db = test_db();
        let mut services = services_for(&db);
        let before = services.len();

        let message = configuration_message(add_generic_repositories(&mut services, |options| {
            options.register_modules([widget_module(), archive_module()]);
        }));

        assert!(message.starts_with("Multiple implementations for WidgetRepository"));
        assert!(message.contains("SqliteWidgetRepository"));
        assert!(message.contains("ArchiveWidgetRepository"));
        assert_eq!(services.len(), before);
    }

    #[test]
    fn test_duplicate_modules_collapse() {
        let db = test_db();
        let mut services = services_for(&db);

        add_generic_repositories(&mut services, |options| {
            options.register_modules([widget_module(), widget_module()]);
        })
        .unwrap();

        let bindings = services
            .build()
            .get_singleton::<RepositoryBindings>()
            .unwrap();
        assert_eq!(bindings.len(), 1);
    }

    #[tokio::test]
    async fn test_no_modules_registers_unit_of_work_only() {
        let db = test_db();
        let mut services = services_for(&db);

        add_generic_repositories(&mut services, |_| {}).unwrap();

        assert!(!services.contains::<dyn WidgetRepository>());
        let provider = services.build();
        assert!(provider.get_singleton::<RepositoryBindings>().unwrap().is_empty());

        let scope = provider.create_scope();
        let uow = scope.resolve::<dyn UnitOfWork>().unwrap();
        let cancel = CancellationToken::new();
        uow.begin_transaction(&cancel).await.unwrap();
        assert!(uow.has_active_transaction());
        uow.rollback(&cancel).await.unwrap();
    }

    #[test]
    fn test_unregistered_context_fails_at_resolution() {
        let mut services = ServiceCollection::new();
        add_generic_repositories(&mut services, |options| {
            options.register_module(widget_module());
        })
        .unwrap();

        let scope = services.build().create_scope();
        assert!(matches!(
            scope.resolve::<dyn WidgetRepository>(),
            Err(RepositoryError::Configuration(msg)) if msg.contains("SqliteContext")
        ));
    }
}
