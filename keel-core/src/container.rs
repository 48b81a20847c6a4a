// Dependency injection scopes

use crate::logging::{debug, trace};
use crate::{Error, Injectable, Provider};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Instance = Arc<dyn Any + Send + Sync>;
type FactoryFn = Arc<dyn Fn(&Container) -> Result<Instance, Error> + Send + Sync>;

#[derive(Clone)]
enum Entry {
    Instance(Instance),
    /// Invoked on every resolution with the scope that asked.
    Factory(FactoryFn),
}

struct Scope {
    parent: Option<Container>,
    /// Scope of a nested server, consulted before `parent`.
    mounted: Option<Container>,
    depth: usize,
    providers: RwLock<HashMap<TypeId, Entry>>,
    tokens: RwLock<HashMap<String, Instance>>,
}

/// An injection scope.
///
/// Cloning is cheap and yields a handle to the same scope. A child created
/// with [`Container::create_child`] sees every registration of its ancestors
/// and can override any of them without affecting the parent or siblings.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Scope>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self::with_parent(None, None)
    }

    fn with_parent(parent: Option<Container>, mounted: Option<Container>) -> Self {
        let depth = parent.as_ref().map_or(0, |p| p.depth() + 1);
        Self {
            inner: Arc::new(Scope {
                parent,
                mounted,
                depth,
                providers: RwLock::new(HashMap::new()),
                tokens: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a child scope that inherits this scope's registrations
    pub fn create_child(&self) -> Container {
        let child = Self::with_parent(Some(self.clone()), None);
        trace!(depth = child.depth(), "Created child scope");
        child
    }

    /// Create a child scope for a request entering a nested server.
    ///
    /// Lookups check the child itself, then `mounted` and its ancestors,
    /// then this scope's chain. Providers registered on the nested server's
    /// own scope therefore win over the ones visible to the request so far.
    pub fn create_mounted_child(&self, mounted: &Container) -> Container {
        let child = Self::with_parent(Some(self.clone()), Some(mounted.clone()));
        trace!(depth = child.depth(), "Created child scope for nested server");
        child
    }

    /// The scope this one was derived from, if any
    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// Number of ancestors; the root scope has depth 0
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Whether both handles point at the same scope
    pub fn same_scope(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a provider instance
    pub fn register<T: Provider>(&self, instance: T) {
        self.register_arc(Arc::new(instance));
    }

    /// Register an already shared provider instance
    pub fn register_arc<T: Provider>(&self, instance: Arc<T>) {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Acquiring write lock for registration");
        self.inner
            .providers
            .write()
            .insert(TypeId::of::<T>(), Entry::Instance(instance));
        debug!(provider = type_name, depth = self.depth(), "Provider registered in DI container");
    }

    /// Register a provider using a factory function, evaluated immediately
    pub fn register_factory<T: Provider, F>(&self, factory: F)
    where
        F: FnOnce() -> T,
    {
        debug!(provider = std::any::type_name::<T>(), "Creating provider from factory");
        self.register(factory());
    }

    /// Register a factory that builds a fresh instance on every resolution.
    ///
    /// The factory receives the resolving scope, so a transient provider
    /// registered on the root still picks up overrides made in a child.
    pub fn register_transient<T: Provider, F>(&self, factory: F)
    where
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let factory: FactoryFn =
            Arc::new(move |scope: &Container| factory(scope).map(|t| Arc::new(t) as Instance));
        self.inner
            .providers
            .write()
            .insert(TypeId::of::<T>(), Entry::Factory(factory));
        debug!(provider = type_name, depth = self.depth(), "Transient provider registered");
    }

    /// Register a value under a string token
    pub fn register_named<T: Provider>(&self, token: impl Into<String>, instance: T) {
        let token = token.into();
        self.inner
            .tokens
            .write()
            .insert(token.clone(), Arc::new(instance));
        debug!(token = %token, depth = self.depth(), "Named provider registered");
    }

    /// Resolve a provider by type, walking up through parent scopes
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Attempting to resolve provider");

        let entry = self.lookup(&TypeId::of::<T>()).ok_or_else(|| {
            debug!(provider = type_name, "Provider not found in container");
            Error::ProviderNotFound(type_name.to_string())
        })?;

        // Factories run outside the lock so they can resolve their own dependencies.
        let instance = match entry {
            Entry::Instance(instance) => instance,
            Entry::Factory(factory) => factory(self)?,
        };

        instance.downcast::<T>().map_err(|_| {
            Error::Internal(format!("Provider registered under wrong type: {}", type_name))
        })
    }

    /// Resolve a registered provider, or build one through its constructor
    pub fn construct<T: Injectable>(&self) -> Result<Arc<T>, Error> {
        if self.has::<T>() {
            return self.resolve::<T>();
        }
        trace!(provider = std::any::type_name::<T>(), "Constructing injectable");
        T::inject(self).map(Arc::new)
    }

    /// Resolve a value registered under a string token
    pub fn resolve_named<T: Provider>(&self, token: &str) -> Result<Arc<T>, Error> {
        let instance = self
            .lookup_token(token)
            .ok_or_else(|| Error::ProviderNotFound(format!("token {}", token)))?;
        instance.downcast::<T>().map_err(|_| {
            Error::Internal(format!(
                "Token {} does not hold a {}",
                token,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Check if a provider is registered here or in any ancestor
    pub fn has<T: Provider>(&self) -> bool {
        let exists = self.lookup(&TypeId::of::<T>()).is_some();
        trace!(provider = std::any::type_name::<T>(), exists = exists, "Checked provider existence");
        exists
    }

    /// Check if a provider is registered on this exact scope
    pub fn has_local<T: Provider>(&self) -> bool {
        self.inner.providers.read().contains_key(&TypeId::of::<T>())
    }

    /// Check if a token is registered here or in any ancestor
    pub fn has_named(&self, token: &str) -> bool {
        self.lookup_token(token).is_some()
    }

    /// Clear all providers registered on this scope; ancestors are untouched
    pub fn clear(&self) {
        let count = {
            let mut providers = self.inner.providers.write();
            let count = providers.len();
            providers.clear();
            count
        };
        self.inner.tokens.write().clear();
        debug!(provider_count = count, "Cleared all providers from container");
    }

    // Own registrations, then the mounted server's chain, then the parent's.
    fn lookup(&self, type_id: &TypeId) -> Option<Entry> {
        let local = self.inner.providers.read().get(type_id).cloned();
        local
            .or_else(|| self.inner.mounted.as_ref().and_then(|m| m.lookup(type_id)))
            .or_else(|| self.parent().and_then(|p| p.lookup(type_id)))
    }

    fn lookup_token(&self, token: &str) -> Option<Instance> {
        let local = self.inner.tokens.read().get(token).cloned();
        local
            .or_else(|| self.inner.mounted.as_ref().and_then(|m| m.lookup_token(token)))
            .or_else(|| self.parent().and_then(|p| p.lookup_token(token)))
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("depth", &self.depth())
            .field("providers", &self.inner.providers.read().len())
            .field("tokens", &self.inner.tokens.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Greeting(&'static str);

    #[test]
    fn test_child_inherits_parent() {
        let root = Container::new();
        root.register(Greeting("root"));

        let child = root.create_child();
        assert_eq!(child.resolve::<Greeting>().unwrap().0, "root");
        assert!(!child.has_local::<Greeting>());
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn test_child_override_is_isolated() {
        let root = Container::new();
        root.register(Greeting("root"));

        let child = root.create_child();
        let sibling = root.create_child();
        child.register(Greeting("child"));

        assert_eq!(child.resolve::<Greeting>().unwrap().0, "child");
        assert_eq!(sibling.resolve::<Greeting>().unwrap().0, "root");
        assert_eq!(root.resolve::<Greeting>().unwrap().0, "root");
    }

    #[test]
    fn test_transient_factory_runs_per_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let root = Container::new();
        let counter = calls.clone();
        root.register_transient(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Greeting("fresh"))
        });

        root.resolve::<Greeting>().unwrap();
        root.resolve::<Greeting>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_factory_sees_child_overrides() {
        struct Prefix(&'static str);
        struct Message(String);

        let root = Container::new();
        root.register(Prefix("root"));
        root.register_transient(|scope| {
            let prefix = scope.resolve::<Prefix>()?;
            Ok(Message(format!("{}-message", prefix.0)))
        });

        let child = root.create_child();
        child.register(Prefix("child"));

        assert_eq!(child.resolve::<Message>().unwrap().0, "child-message");
        assert_eq!(root.resolve::<Message>().unwrap().0, "root-message");
    }

    #[test]
    fn test_named_tokens() {
        let root = Container::new();
        root.register_named("greeting", Greeting("named"));
        let child = root.create_child();

        assert!(child.has_named("greeting"));
        assert_eq!(child.resolve_named::<Greeting>("greeting").unwrap().0, "named");
        assert!(child.resolve_named::<Greeting>("missing").is_err());
        assert!(root.resolve_named::<String>("greeting").is_err());
    }

    #[test]
    fn test_missing_provider() {
        let root = Container::new();
        let err = root.resolve::<Greeting>().err().unwrap();
        assert!(matches!(err, Error::ProviderNotFound(_)));
    }

    #[test]
    fn test_clear_only_touches_local_scope() {
        let root = Container::new();
        root.register(Greeting("root"));
        let child = root.create_child();
        child.register(Greeting("child"));

        child.clear();
        assert_eq!(child.resolve::<Greeting>().unwrap().0, "root");
    }

    #[test]
    fn test_same_scope() {
        let root = Container::new();
        let handle = root.clone();
        assert!(root.same_scope(&handle));
        assert!(!root.same_scope(&root.create_child()));
    }

    #[test]
    fn test_mounted_child_prefers_mounted_scope() {
        struct Origin(&'static str);

        let request = Container::new();
        request.register(Greeting("request"));
        request.register(Origin("request"));
        let mounted = Container::new();
        mounted.register(Greeting("mounted"));
        mounted.register_named("token", Greeting("mounted token"));

        let child = request.create_mounted_child(&mounted);
        assert_eq!(child.resolve::<Greeting>().unwrap().0, "mounted");
        assert_eq!(child.resolve::<Origin>().unwrap().0, "request");
        assert_eq!(child.resolve_named::<Greeting>("token").unwrap().0, "mounted token");
        assert_eq!(child.depth(), 1);
        assert!(child.parent().unwrap().same_scope(&request));

        child.register(Greeting("child"));
        assert_eq!(child.resolve::<Greeting>().unwrap().0, "child");
        assert_eq!(mounted.resolve::<Greeting>().unwrap().0, "mounted");
    }
}
