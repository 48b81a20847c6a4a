use keel_core::{Container, Error, Injectable};
use std::sync::Arc;

#[derive(Clone)]
struct TestService {
    name: String,
}

struct Repository {
    service: Arc<TestService>,
}

impl Injectable for Repository {
    fn inject(scope: &Container) -> Result<Self, Error> {
        Ok(Self {
            service: scope.resolve::<TestService>()?,
        })
    }
}

#[test]
fn test_register_and_resolve() {
    let container = Container::new();

    container.register(TestService {
        name: "test".to_string(),
    });

    let resolved = container.resolve::<TestService>().unwrap();
    assert_eq!(resolved.name, "test");
}

#[test]
fn test_resolve_nonexistent() {
    let container = Container::new();
    let result = container.resolve::<TestService>();
    assert!(matches!(result, Err(Error::ProviderNotFound(_))));
}

#[test]
fn test_has_provider() {
    let container = Container::new();

    assert!(!container.has::<TestService>());

    container.register(TestService {
        name: "test".to_string(),
    });

    assert!(container.has::<TestService>());
}

#[test]
fn test_singleton_behavior() {
    let container = Container::new();

    container.register(TestService {
        name: "original".to_string(),
    });

    let resolved1 = container.resolve::<TestService>().unwrap();
    let resolved2 = container.resolve::<TestService>().unwrap();

    assert!(Arc::ptr_eq(&resolved1, &resolved2));
}

#[test]
fn test_construct_uses_constructor_dependencies() {
    let root = Container::new();
    root.register(TestService {
        name: "root".to_string(),
    });
    let child = root.create_child();
    child.register(TestService {
        name: "child".to_string(),
    });

    assert_eq!(root.construct::<Repository>().unwrap().service.name, "root");
    assert_eq!(child.construct::<Repository>().unwrap().service.name, "child");
}

#[test]
fn test_construct_prefers_registered_instance() {
    let container = Container::new();
    container.register(Repository {
        service: Arc::new(TestService {
            name: "prebuilt".to_string(),
        }),
    });

    // No TestService is registered, so only the registered instance can satisfy this.
    let repository = container.construct::<Repository>().unwrap();
    assert_eq!(repository.service.name, "prebuilt");
}

#[test]
fn test_construct_missing_dependency() {
    let container = Container::new();
    let err = container.construct::<Repository>().err().unwrap();
    assert!(err.to_string().contains("TestService"));
}

#[test]
fn test_register_factory_is_evaluated_once() {
    let container = Container::new();
    container.register_factory(|| TestService {
        name: "factory".to_string(),
    });

    let first = container.resolve::<TestService>().unwrap();
    let second = container.resolve::<TestService>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_deep_scope_chain() {
    let root = Container::new();
    root.register(TestService {
        name: "root".to_string(),
    });

    let mut scope = root.clone();
    for _ in 0..5 {
        scope = scope.create_child();
    }

    assert_eq!(scope.depth(), 5);
    assert_eq!(scope.resolve::<TestService>().unwrap().name, "root");
}
