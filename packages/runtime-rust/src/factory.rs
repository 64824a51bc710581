//! Runtime factory built from a [`FactoryPlan`].
//!
//! Every public method is bound to one [`OperationPath`] when the factory is
//! built. The local construction runs everything in process; the remote
//! construction swaps the path of each cross-process method (and probe) for
//! a [`RemotePath`]. Saves hold no path of their own: they route on the
//! target's save state to one of the write methods and run its path.

use std::collections::HashMap;
use std::sync::Arc;

use opfactory_core::{
    Construction, Entity, FactoryPlan, MethodBody, MethodRole, PlannedMethod, SaveBranch, Value,
};

use crate::authorize::AuthorizationGate;
use crate::dispatch::{DispatchTable, RemoteDispatcher};
use crate::error::FactoryError;
use crate::handlers::{AuthorizationCheck, Authorized, FactoryHooks, MethodHandler, NoHooks};
use crate::path::{LocalPath, OperationPath, Output, PathCall, ProbePath, RemotePath, Reply};
use crate::services::{ServiceProvider, ServiceRegistry};

/// Result of the non-throwing save variant.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveAttempt {
    /// The routed write ran, or the target needed no write.
    Completed(Option<Output>),
    /// A check bound to the routed write denied it.
    Denied(Authorized),
}

// ---------------------------------------------------------------------------
// FactoryBuilder
// ---------------------------------------------------------------------------

/// Collects the code a plan needs and builds a [`Factory`].
///
/// Handlers are keyed by `DeclaringType::method` (with a `/<arity>` suffix
/// for methods the declaring type overloads), checks by `PolicyType::method`.
pub struct FactoryBuilder {
    plan: FactoryPlan,
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    checks: HashMap<String, Arc<dyn AuthorizationCheck>>,
    provider: Arc<dyn ServiceProvider>,
    hooks: Arc<dyn FactoryHooks>,
    dispatcher: Option<Arc<dyn RemoteDispatcher>>,
}

impl FactoryBuilder {
    #[must_use]
    pub fn new(plan: FactoryPlan) -> Self {
        Self {
            plan,
            handlers: HashMap::new(),
            checks: HashMap::new(),
            provider: Arc::new(ServiceRegistry::new()),
            hooks: Arc::new(NoHooks),
            dispatcher: None,
        }
    }

    #[must_use]
    pub fn handler(mut self, key: impl Into<String>, handler: impl MethodHandler + 'static) -> Self {
        self.handlers.insert(key.into(), Arc::new(handler));
        self
    }

    #[must_use]
    pub fn check(mut self, key: impl Into<String>, check: impl AuthorizationCheck + 'static) -> Self {
        self.checks.insert(key.into(), Arc::new(check));
        self
    }

    /// Provider for injected parameters. Defaults to an empty registry.
    #[must_use]
    pub fn services(mut self, provider: Arc<dyn ServiceProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: impl FactoryHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Dispatcher used by [`FactoryBuilder::build_remote`].
    #[must_use]
    pub fn remote(mut self, dispatcher: Arc<dyn RemoteDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Builds the local construction: every path runs in process.
    ///
    /// # Errors
    ///
    /// Returns `MissingHandler` or `MissingCheck` when the plan names code
    /// that was not registered.
    pub fn build(self) -> Result<Factory, FactoryError> {
        self.assemble(Construction::Local)
    }

    /// Builds the remote construction: cross-process methods and probes go
    /// through the dispatcher and need no local handler or check.
    ///
    /// # Errors
    ///
    /// Returns `NoDispatcher` when the plan has cross-process methods and no
    /// dispatcher was given, and the errors of [`FactoryBuilder::build`].
    pub fn build_remote(self) -> Result<Factory, FactoryError> {
        self.assemble(Construction::Remote)
    }

    fn assemble(self, construction: Construction) -> Result<Factory, FactoryError> {
        let dispatcher = match (construction, &self.dispatcher) {
            (Construction::Local, _) => None,
            (Construction::Remote, Some(dispatcher)) => Some(dispatcher.clone()),
            (Construction::Remote, None) if self.plan.supports(Construction::Remote) => {
                return Err(FactoryError::NoDispatcher {
                    type_name: self.plan.type_name.clone(),
                });
            }
            (Construction::Remote, None) => None,
        };

        let mut local: HashMap<String, Arc<dyn OperationPath>> = HashMap::new();
        let mut public: HashMap<String, Arc<dyn OperationPath>> = HashMap::new();

        for method in &self.plan.methods {
            if method.role == MethodRole::Save {
                continue;
            }
            if let (Some(dispatcher), true) = (&dispatcher, method.is_remote()) {
                let path = RemotePath::new(self.plan.operation_id(&method.name), dispatcher.clone());
                public.insert(method.name.clone(), Arc::new(path));
                continue;
            }
            let path = self.local_path(method)?;
            local.insert(method.name.clone(), path.clone());
            public.insert(method.name.clone(), path);
        }

        tracing::debug!(
            factory = %self.plan.factory_name,
            construction = ?construction,
            local = local.len(),
            remote = public.len() - local.len(),
            "factory built"
        );

        Ok(Factory {
            plan: self.plan,
            construction,
            public,
            local,
        })
    }

    fn local_path(&self, method: &PlannedMethod) -> Result<Arc<dyn OperationPath>, FactoryError> {
        match &method.body {
            MethodBody::Operation {
                operation,
                bindings,
            } => {
                let key = operation.handler_key();
                let handler = self.handlers.get(key).cloned().ok_or_else(|| {
                    FactoryError::MissingHandler {
                        key: key.to_string(),
                    }
                })?;
                let gate = AuthorizationGate::build(
                    operation,
                    bindings,
                    &self.plan.authorizations,
                    &self.checks,
                )?;
                Ok(Arc::new(LocalPath::new(
                    &self.plan.type_name,
                    operation.clone(),
                    handler,
                    gate,
                    self.provider.clone(),
                    self.hooks.clone(),
                    self.plan.save_state,
                )))
            }
            MethodBody::Probe {
                operation,
                bindings,
                ..
            } => {
                let gate = AuthorizationGate::build(
                    operation,
                    bindings,
                    &self.plan.authorizations,
                    &self.checks,
                )?;
                Ok(Arc::new(ProbePath::new(
                    operation.clone(),
                    gate,
                    self.provider.clone(),
                )))
            }
            MethodBody::Save { .. } => Err(FactoryError::WrongKind {
                method: method.name.clone(),
                expected: "operation",
                actual: role_name(method.role),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// A working factory for one type.
///
/// `Send + Sync`; share it through `Arc`. Paths are fixed at construction.
pub struct Factory {
    plan: FactoryPlan,
    construction: Construction,
    /// Path behind each public method and probe.
    public: HashMap<String, Arc<dyn OperationPath>>,
    /// In-process paths; the receiving side of dispatch.
    local: HashMap<String, Arc<dyn OperationPath>>,
}

impl Factory {
    #[must_use]
    pub fn plan(&self) -> &FactoryPlan {
        &self.plan
    }

    #[must_use]
    pub fn construction(&self) -> Construction {
        self.construction
    }

    /// Runs a Create, Fetch or Execute method.
    ///
    /// A denial reads as `Ok(None)`, the same as "not found".
    ///
    /// # Errors
    ///
    /// Contract violations, and anything the handler, a check or the
    /// dispatcher raises.
    pub async fn read(&self, method: &str, args: Vec<Value>) -> Result<Option<Output>, FactoryError> {
        let planned = self.lookup(method, MethodRole::Read, args.len())?;
        match self.run(planned, PathCall { target: None, args }).await? {
            Reply::Completed(output) => Ok(output),
            Reply::Denied(_) => Ok(None),
            Reply::Probed(_) => Err(shape_mismatch(method)),
        }
    }

    /// Runs an Insert, Update or Delete method on `target`.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` on denial, plus the errors of [`Factory::read`].
    pub async fn write(
        &self,
        method: &str,
        target: Entity,
        args: Vec<Value>,
    ) -> Result<Option<Output>, FactoryError> {
        let planned = self.lookup(method, MethodRole::Write, args.len())?;
        let call = PathCall {
            target: Some(target),
            args,
        };
        match self.run(planned, call).await? {
            Reply::Completed(output) => Ok(output),
            Reply::Denied(verdict) => Err(not_authorized(method, verdict)),
            Reply::Probed(_) => Err(shape_mismatch(method)),
        }
    }

    /// Routes `target` to insert, update or delete by its save state.
    ///
    /// A target that is both new and deleted needs no write and yields
    /// `Ok(None)` without running anything.
    ///
    /// # Errors
    ///
    /// `NotImplemented` when the routed branch is not declared,
    /// `NotAuthorized` on denial, plus the errors of [`Factory::write`].
    pub async fn save(
        &self,
        method: &str,
        target: Entity,
        args: Vec<Value>,
    ) -> Result<Option<Output>, FactoryError> {
        match self.try_save(method, target, args).await? {
            SaveAttempt::Completed(output) => Ok(output),
            SaveAttempt::Denied(verdict) => Err(not_authorized(method, verdict)),
        }
    }

    /// Like [`Factory::save`], but a denial is returned as
    /// [`SaveAttempt::Denied`].
    ///
    /// # Errors
    ///
    /// The errors of [`Factory::save`] other than `NotAuthorized`.
    pub async fn try_save(
        &self,
        method: &str,
        target: Entity,
        args: Vec<Value>,
    ) -> Result<SaveAttempt, FactoryError> {
        let planned = self.lookup(method, MethodRole::Save, args.len())?;
        let MethodBody::Save {
            insert,
            update,
            delete,
            ..
        } = &planned.body
        else {
            return Err(shape_mismatch(method));
        };

        let Some(branch) = SaveBranch::route(target.state) else {
            tracing::debug!(method, "save skipped: new and deleted");
            return Ok(SaveAttempt::Completed(None));
        };
        let routed = match branch {
            SaveBranch::Insert => insert,
            SaveBranch::Update => update,
            SaveBranch::Delete => delete,
        };
        let Some(routed) = routed else {
            return Err(FactoryError::NotImplemented {
                operation: method.to_string(),
                branch,
            });
        };
        tracing::debug!(method, branch = branch.as_str(), routed = %routed, "save routed");

        let write = self.lookup(routed, MethodRole::Write, args.len())?;
        let call = PathCall {
            target: Some(target),
            args,
        };
        match self.run(write, call).await? {
            Reply::Completed(output) => Ok(SaveAttempt::Completed(output)),
            Reply::Denied(verdict) => Ok(SaveAttempt::Denied(verdict)),
            Reply::Probed(_) => Err(shape_mismatch(routed)),
        }
    }

    /// Evaluates a probe without running the operation body.
    ///
    /// # Errors
    ///
    /// Contract violations, and anything a check or the dispatcher raises.
    pub async fn can(&self, method: &str, args: Vec<Value>) -> Result<Authorized, FactoryError> {
        let planned = self.lookup(method, MethodRole::Probe, args.len())?;
        match self.run(planned, PathCall { target: None, args }).await? {
            Reply::Probed(verdict) => Ok(verdict),
            Reply::Completed(_) | Reply::Denied(_) => Err(shape_mismatch(method)),
        }
    }

    /// Receiving-side table over the in-process paths of every dispatch
    /// entry this factory can serve.
    #[must_use]
    pub fn dispatch_table(&self) -> DispatchTable {
        let mut table = DispatchTable::new();
        for entry in &self.plan.dispatch {
            if let Some(path) = self.local.get(&entry.method) {
                table.insert(entry.id.clone(), path.clone());
            }
        }
        table
    }

    /// Stores this factory in `registry` under its factory name.
    pub fn register(self: &Arc<Self>, registry: &ServiceRegistry) {
        registry.register_arc(self.plan.factory_name.clone(), self.clone());
    }

    fn lookup(
        &self,
        method: &str,
        role: MethodRole,
        supplied: usize,
    ) -> Result<&PlannedMethod, FactoryError> {
        let planned = self
            .plan
            .method(method)
            .ok_or_else(|| FactoryError::UnknownMethod {
                type_name: self.plan.type_name.clone(),
                method: method.to_string(),
            })?;
        if planned.role != role {
            return Err(FactoryError::WrongKind {
                method: method.to_string(),
                expected: role_name(role),
                actual: role_name(planned.role),
            });
        }
        if planned.params.len() != supplied {
            return Err(FactoryError::Arity {
                method: method.to_string(),
                expected: planned.params.len(),
                actual: supplied,
            });
        }
        Ok(planned)
    }

    async fn run(&self, method: &PlannedMethod, call: PathCall) -> Result<Reply, FactoryError> {
        let path = self
            .public
            .get(&method.name)
            .ok_or_else(|| FactoryError::UnknownMethod {
                type_name: self.plan.type_name.clone(),
                method: method.name.clone(),
            })?;
        path.run(call).await
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("type_name", &self.plan.type_name)
            .field("construction", &self.construction)
            .field("methods", &self.plan.methods.len())
            .finish_non_exhaustive()
    }
}

fn role_name(role: MethodRole) -> &'static str {
    match role {
        MethodRole::Read => "read",
        MethodRole::Write => "write",
        MethodRole::Save => "save",
        MethodRole::Probe => "probe",
    }
}

fn not_authorized(method: &str, verdict: Authorized) -> FactoryError {
    FactoryError::NotAuthorized {
        operation: method.to_string(),
        message: verdict.message,
    }
}

fn shape_mismatch(method: &str) -> FactoryError {
    FactoryError::ShapeMismatch {
        method: method.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use opfactory_core::{Catalog, Generator, SaveState, TypeSurface};
    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::dispatch::{
        build_dispatch_pipeline, LoopbackDispatcher, RemoteRequest, RemoteResponse,
    };
    use crate::handlers::{AuthorizationCall, Completion, Invocation};

    trait Repo: Send + Sync {
        fn label(&self) -> String;
    }

    struct MemoryRepo;

    impl Repo for MemoryRepo {
        fn label(&self) -> String {
            "memory".to_string()
        }
    }

    fn plan_for(person: TypeSurface, extra: Vec<TypeSurface>) -> FactoryPlan {
        let mut catalog = Catalog::new().with(person);
        for surface in extra {
            catalog.insert(surface);
        }
        Generator::default()
            .generate(&catalog, "Person")
            .into_plan()
            .unwrap()
    }

    fn person() -> TypeSurface {
        TypeSurface::new("Person").factory().tracks_save_state()
    }

    fn policy(methods: &[&str]) -> TypeSurface {
        methods
            .iter()
            .fold(TypeSurface::new("PersonAuth"), |surface, m| surface.method(*m))
    }

    fn stamp(label: &'static str) -> impl MethodHandler {
        move |inv: Invocation| async move {
            let target = inv.target.map(|t| t.with("by", label));
            Ok::<_, anyhow::Error>(Completion::done(target))
        }
    }

    fn by(output: Option<Output>) -> Option<Value> {
        output?.into_instance()?.get("by").cloned()
    }

    fn existing() -> Entity {
        let mut entity = Entity::new("Person");
        entity.mark_old();
        entity
    }

    #[tokio::test]
    async fn denied_read_is_not_found() {
        let plan = plan_for(
            person()
                .authorized_by("PersonAuth")
                .method("#[factory(fetch)] fn fetch(&mut self, id: i64) -> bool"),
            vec![policy(&["#[authorize(fetch)] fn can_fetch(&self, id: i64) -> bool"])],
        );
        let factory = FactoryBuilder::new(plan)
            .handler("Person::fetch", |inv: Invocation| async move {
                let found = inv.arg(0).as_int() != Some(0);
                Ok::<_, anyhow::Error>(Completion::success(inv.target, found))
            })
            .check("PersonAuth::can_fetch", |call: AuthorizationCall| async move {
                Ok::<_, anyhow::Error>(Authorized::from(call.args[0].as_int() != Some(13)))
            })
            .build()
            .unwrap();

        let found = factory.read("fetch", vec![Value::Int(1)]).await.unwrap();
        assert!(!found.unwrap().into_instance().unwrap().state.is_new);
        let missing = factory.read("fetch", vec![Value::Int(0)]).await.unwrap();
        let denied = factory.read("fetch", vec![Value::Int(13)]).await.unwrap();
        assert_eq!(missing, None);
        assert_eq!(denied, missing);
    }

    #[tokio::test]
    async fn save_and_try_save_report_denial_differently() {
        let plan = plan_for(
            person()
                .authorized_by("PersonAuth")
                .method("#[factory(insert)] fn insert(&mut self)")
                .method("#[factory(update)] fn update(&mut self)"),
            vec![policy(&["#[authorize(write)] fn can_write(&self) -> bool"])],
        );
        let factory = FactoryBuilder::new(plan)
            .handler("Person::insert", stamp("insert"))
            .handler("Person::update", stamp("update"))
            .check("PersonAuth::can_write", |_call: AuthorizationCall| async move {
                Ok::<_, anyhow::Error>(Authorized::deny("read only"))
            })
            .build()
            .unwrap();

        let err = factory
            .save("save", Entity::new("Person"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FactoryError::NotAuthorized { ref operation, message: Some(ref m) }
                if operation == "save" && m == "read only"
        ));

        let attempt = factory
            .try_save("save", Entity::new("Person"), vec![])
            .await
            .unwrap();
        assert_eq!(attempt, SaveAttempt::Denied(Authorized::deny("read only")));

        let err = factory
            .write("update", existing(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::NotAuthorized { .. }));
    }

    #[tokio::test]
    async fn probe_stops_at_first_false() {
        let plan = plan_for(
            person()
                .authorized_by("PersonAuth")
                .method("#[factory(create)] fn create(&mut self)"),
            vec![policy(&[
                "#[authorize(read)] fn first(&self) -> bool",
                "#[authorize(create)] fn second(&self) -> bool",
                "#[authorize(read)] fn third(&self) -> bool",
            ])],
        );
        let third_calls = Arc::new(AtomicUsize::new(0));
        let factory = FactoryBuilder::new(plan)
            .handler("Person::create", stamp("create"))
            .check("PersonAuth::first", |_c: AuthorizationCall| async move {
                Ok::<_, anyhow::Error>(Authorized::allow())
            })
            .check("PersonAuth::second", |_c: AuthorizationCall| async move {
                Ok::<_, anyhow::Error>(Authorized::from(false))
            })
            .check("PersonAuth::third", {
                let third_calls = third_calls.clone();
                move |_c: AuthorizationCall| {
                    let third_calls = third_calls.clone();
                    async move {
                        third_calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(Authorized::allow())
                    }
                }
            })
            .build()
            .unwrap();

        let verdict = factory.can("can_create", vec![]).await.unwrap();
        assert!(!verdict.allowed);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn colliding_creates_reach_their_own_handler() {
        let plan = plan_for(
            person()
                .extends("PersonBase")
                .method("#[factory(create)] fn create(&mut self, name: String, age: i32)"),
            vec![TypeSurface::new("PersonBase")
                .method("#[factory(create)] fn create(&mut self, name: String)")],
        );
        let factory = FactoryBuilder::new(plan)
            .handler("Person::create", stamp("two"))
            .handler("PersonBase::create", stamp("one"))
            .build()
            .unwrap();

        let one = factory.read("create", vec![Value::from("Ada")]).await.unwrap();
        let two = factory
            .read("create1", vec![Value::from("Ada"), Value::Int(36)])
            .await
            .unwrap();
        assert_eq!(by(one), Some(Value::from("one")));
        assert_eq!(by(two), Some(Value::from("two")));

        let err = factory.read("create", vec![]).await.unwrap_err();
        assert!(matches!(err, FactoryError::Arity { expected: 1, actual: 0, .. }));
    }

    #[tokio::test]
    async fn same_type_overloads_reach_their_own_handler() {
        let plan = plan_for(
            person()
                .method("#[factory(create)] fn create(&mut self, name: String, age: i32)")
                .method("#[factory(create)] fn create(&mut self, name: String)"),
            vec![],
        );
        assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
        let factory = FactoryBuilder::new(plan.clone())
            .handler("Person::create/2", stamp("two"))
            .handler("Person::create/1", stamp("one"))
            .build()
            .unwrap();

        let one = factory.read("create", vec![Value::from("Ada")]).await.unwrap();
        let two = factory
            .read("create1", vec![Value::from("Ada"), Value::Int(3)])
            .await
            .unwrap();
        assert_eq!(by(one), Some(Value::from("one")));
        assert_eq!(by(two), Some(Value::from("two")));

        let err = FactoryBuilder::new(plan)
            .handler("Person::create", stamp("shared"))
            .build()
            .unwrap_err();
        assert!(matches!(err, FactoryError::MissingHandler { key } if key.starts_with("Person::create/")));
    }

    #[tokio::test]
    async fn missing_branch_and_noop_save() {
        let inserts = Arc::new(AtomicUsize::new(0));
        let plan = plan_for(
            person()
                .method("#[factory(insert)] fn insert(&mut self)")
                .method("#[factory(update)] fn update(&mut self)"),
            vec![],
        );
        let factory = FactoryBuilder::new(plan)
            .handler("Person::insert", {
                let inserts = inserts.clone();
                move |inv: Invocation| {
                    let inserts = inserts.clone();
                    async move {
                        inserts.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(Completion::done(inv.target))
                    }
                }
            })
            .handler("Person::update", stamp("update"))
            .build()
            .unwrap();

        let mut doomed = existing();
        doomed.mark_deleted();
        let err = factory.save("save", doomed, vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            FactoryError::NotImplemented { branch: SaveBranch::Delete, .. }
        ));

        let mut fresh_deleted = Entity::new("Person");
        fresh_deleted.mark_deleted();
        assert_eq!(factory.save("save", fresh_deleted, vec![]).await.unwrap(), None);
        assert_eq!(inserts.load(Ordering::SeqCst), 0);

        let saved = factory.save("save", Entity::new("Person"), vec![]).await.unwrap();
        assert_eq!(inserts.load(Ordering::SeqCst), 1);
        assert!(!saved.unwrap().into_instance().unwrap().state.is_new);
    }

    #[tokio::test]
    async fn contract_violations_are_reported() {
        let plan = plan_for(
            person()
                .method("#[factory(create)] fn create(&mut self)")
                .method("#[factory(update)] fn update(&mut self)"),
            vec![],
        );
        let missing = FactoryBuilder::new(plan.clone())
            .handler("Person::create", stamp("create"))
            .build()
            .unwrap_err();
        assert!(matches!(missing, FactoryError::MissingHandler { key } if key == "Person::update"));

        let factory = FactoryBuilder::new(plan)
            .handler("Person::create", stamp("create"))
            .handler("Person::update", stamp("update"))
            .build()
            .unwrap();
        let wrong = factory.read("update", vec![]).await.unwrap_err();
        assert!(matches!(
            wrong,
            FactoryError::WrongKind { expected: "read", actual: "write", .. }
        ));
        let unknown = factory.read("destroy", vec![]).await.unwrap_err();
        assert!(matches!(unknown, FactoryError::UnknownMethod { .. }));
    }

    /// Records every request before handing it to the wrapped dispatcher.
    struct Recording {
        inner: LoopbackDispatcher,
        seen: Mutex<Vec<RemoteRequest>>,
    }

    #[async_trait]
    impl RemoteDispatcher for Recording {
        async fn dispatch(&self, request: RemoteRequest) -> anyhow::Result<RemoteResponse> {
            self.seen.lock().push(request.clone());
            self.inner.dispatch(request).await
        }
    }

    fn remote_plan() -> FactoryPlan {
        plan_for(
            person()
                .authorized_by("PersonAuth")
                .method(
                    "#[factory(fetch, remote)] async fn fetch(&mut self, id: i64, #[service] repo: Arc<dyn Repo>) -> bool",
                )
                .method(
                    "#[factory(update, remote)] async fn update(&mut self, note: String, #[service] repo: Arc<dyn Repo>)",
                ),
            vec![policy(&["#[authorize(fetch)] fn can_fetch(&self, id: i64) -> bool"])],
        )
    }

    fn serving_side(plan: FactoryPlan) -> Factory {
        let registry = ServiceRegistry::new();
        let repo: Arc<dyn Repo> = Arc::new(MemoryRepo);
        registry.register("Arc<dyn Repo>", repo);
        FactoryBuilder::new(plan)
            .services(Arc::new(registry))
            .handler("Person::fetch", |inv: Invocation| async move {
                let repo = inv
                    .services
                    .get::<Arc<dyn Repo>>("repo")
                    .ok_or_else(|| anyhow::anyhow!("repo not injected"))?;
                let id = inv.arg(0).clone();
                let found = id.as_int() != Some(0);
                let target = inv.target.map(|t| t.with("id", id).with("repo", repo.label()));
                Ok::<_, anyhow::Error>(Completion::success(target, found))
            })
            .handler("Person::update", |inv: Invocation| async move {
                let note = inv.arg(0).clone();
                let target = inv.target.map(|t| t.with("note", note));
                Ok::<_, anyhow::Error>(Completion::done(target))
            })
            .check("PersonAuth::can_fetch", |call: AuthorizationCall| async move {
                Ok::<_, anyhow::Error>(Authorized::from(call.args[0].as_int() != Some(13)))
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn remote_calls_match_local_calls() {
        let local = serving_side(remote_plan());
        let pipeline = build_dispatch_pipeline(local.dispatch_table(), &RuntimeConfig::default());
        let recording = Arc::new(Recording {
            inner: LoopbackDispatcher::new(pipeline),
            seen: Mutex::new(Vec::new()),
        });
        let remote = FactoryBuilder::new(remote_plan())
            .remote(recording.clone())
            .build_remote()
            .unwrap();
        assert_eq!(remote.construction(), Construction::Remote);

        for id in [1_i64, 0, 13] {
            let via_local = local.read("fetch", vec![Value::Int(id)]).await.unwrap();
            let via_remote = remote.read("fetch", vec![Value::Int(id)]).await.unwrap();
            assert_eq!(via_local, via_remote, "fetch({id})");
        }
        for verdict_id in [1_i64, 13] {
            assert_eq!(
                local.can("can_fetch", vec![Value::Int(verdict_id)]).await.unwrap(),
                remote.can("can_fetch", vec![Value::Int(verdict_id)]).await.unwrap(),
            );
        }

        let target = existing().with("name", "Ada");
        let via_local = local
            .write("update", target.clone(), vec![Value::from("hi")])
            .await
            .unwrap();
        let via_remote = remote
            .save("save", target, vec![Value::from("hi")])
            .await
            .unwrap();
        assert_eq!(via_local, via_remote);

        let seen = recording.seen.lock();
        assert!(!seen.is_empty());
        for request in seen.iter() {
            assert!(request.args.len() <= 1, "injected value leaked: {request:?}");
            assert!(!request.args.iter().any(|v| v == &Value::from("memory")));
        }
        let update = seen
            .iter()
            .find(|r| r.operation.as_str() == "Person::update")
            .unwrap();
        assert_eq!(update.args, vec![Value::from("hi")]);
        assert!(update.target.is_some());
    }

    #[test]
    fn remote_construction_requires_a_dispatcher() {
        let err = FactoryBuilder::new(remote_plan()).build_remote().unwrap_err();
        assert!(matches!(err, FactoryError::NoDispatcher { type_name } if type_name == "Person"));
    }

    #[test]
    fn register_stores_factory_under_its_name() {
        let factory = Arc::new(serving_side(remote_plan()));
        let registry = ServiceRegistry::new();
        factory.register(&registry);
        let stored = registry.get::<Factory>().unwrap();
        assert!(Arc::ptr_eq(&stored, &factory));
        assert!(registry.get_by_name("PersonFactory").is_some());
    }

    fn routing_factory() -> Factory {
        let plan = plan_for(
            person()
                .method("#[factory(insert)] fn insert(&mut self)")
                .method("#[factory(update)] fn update(&mut self)")
                .method("#[factory(delete)] fn delete(&mut self)"),
            vec![],
        );
        FactoryBuilder::new(plan)
            .handler("Person::insert", stamp("insert"))
            .handler("Person::update", stamp("update"))
            .handler("Person::delete", stamp("delete"))
            .build()
            .unwrap()
    }

    proptest! {
        #[test]
        fn save_follows_the_routing_table(is_new in any::<bool>(), is_deleted in any::<bool>()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let factory = routing_factory();
            let mut target = Entity::new("Person");
            target.state = SaveState { is_new, is_deleted };

            let saved = runtime
                .block_on(factory.save("save", target, vec![]))
                .unwrap();
            let expected = match (is_new, is_deleted) {
                (true, true) => None,
                (true, false) => Some(Value::from("insert")),
                (false, true) => Some(Value::from("delete")),
                (false, false) => Some(Value::from("update")),
            };
            prop_assert_eq!(by(saved), expected);
        }
    }
}
