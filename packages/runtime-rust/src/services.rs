//! Service resolution for injected parameters and factory registration.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

/// A resolved service instance.
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// ServiceProvider
// ---------------------------------------------------------------------------

/// Resolves injected parameters by their normalized declared type text
/// (for example `Arc<dyn Repo>`).
///
/// Implementations must be safe to call from many tasks at once.
pub trait ServiceProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when nothing is registered for `ty`.
    fn resolve(&self, ty: &str) -> anyhow::Result<ServiceHandle>;
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Services resolved for one call, keyed by parameter name.
#[derive(Clone, Default)]
pub struct Services {
    by_param: HashMap<String, ServiceHandle>,
}

impl Services {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: impl Into<String>, service: ServiceHandle) {
        self.by_param.insert(param.into(), service);
    }

    /// Returns the service bound to `param`, downcast to `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, param: &str) -> Option<Arc<T>> {
        self.by_param
            .get(param)
            .and_then(|service| service.clone().downcast::<T>().ok())
    }

    #[must_use]
    pub fn contains(&self, param: &str) -> bool {
        self.by_param.contains_key(param)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_param.is_empty()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.by_param.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry of shared services and factories.
///
/// Provides two lookup mechanisms:
/// - **By name** (`get_by_name`, [`ServiceProvider::resolve`]): the key given
///   at registration, normally the declared type text of the parameter that
///   consumes it, or `<Type>Factory` for factories
/// - **By type** (`get::<T>`): uses `TypeId` of the registered value
pub struct ServiceRegistry {
    /// Name-based lookup: registration key -> service.
    by_name: DashMap<String, ServiceHandle>,
    /// Type-based lookup: `TypeId` -> service.
    by_type: DashMap<TypeId, ServiceHandle>,
    /// Registration order, for listing.
    order: RwLock<Vec<String>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a service under `name` and under its concrete type.
    pub fn register<T: Any + Send + Sync>(&self, name: impl Into<String>, service: T) {
        self.register_arc(name, Arc::new(service));
    }

    /// Registers an already shared service.
    pub fn register_arc<T: Any + Send + Sync>(&self, name: impl Into<String>, service: Arc<T>) {
        let name = name.into();
        self.by_type.insert(TypeId::of::<T>(), service.clone());
        if self.by_name.insert(name.clone(), service).is_none() {
            self.order.write().push(name.clone());
        }
        tracing::debug!(service = %name, "registered service");
    }

    /// Retrieve a service by its concrete type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieve a service by its registration key.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<ServiceHandle> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Registration keys in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceProvider for ServiceRegistry {
    fn resolve(&self, ty: &str) -> anyhow::Result<ServiceHandle> {
        self.get_by_name(ty)
            .ok_or_else(|| anyhow::anyhow!("no service registered for `{ty}`"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
