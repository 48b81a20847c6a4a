// Handler references: what a registration resolves through the scope

use crate::adapter::{CallbackHandler, Next, from_fn};
use crate::{Container, Error, Handler, HttpRequest, HttpResponse, Injectable, Server};
use futures_util::future::{self, BoxFuture};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The unit a handler reference resolves to
#[derive(Clone)]
pub enum Resolved {
    /// Leaf handler or middleware
    Handler(Arc<dyn Handler>),
    /// Nested mount point; requests are forwarded into its route table
    Mount(Arc<Server>),
}

impl Resolved {
    pub fn kind(&self) -> &'static str {
        match self {
            Resolved::Handler(_) => "handler",
            Resolved::Mount(_) => "mount",
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolved").field(&self.kind()).finish()
    }
}

/// An injectable type that carries its own nested [`Server`]
pub trait MountPoint: Send + Sync + 'static {
    fn server(&self) -> Arc<Server>;
}

type ResolverFn = Arc<dyn Fn(Container) -> BoxFuture<'static, Result<Resolved, Error>> + Send + Sync>;

/// A named, lazily evaluated reference to a handler or nested mount point.
///
/// Nothing is instantiated until the reference is resolved against a scope,
/// either at bind time (eager routes) or on the first matching request.
#[derive(Clone)]
pub struct HandlerRef {
    name: Cow<'static, str>,
    resolver: ResolverFn,
}

impl HandlerRef {
    /// Reference an injectable handler type, constructed from the scope
    pub fn of<T: Injectable + Handler>() -> Self {
        Self::from_sync(std::any::type_name::<T>(), |scope| {
            let handler: Arc<dyn Handler> = scope.construct::<T>()?;
            Ok(Resolved::Handler(handler))
        })
    }

    /// Reference an injectable type that exposes a nested server
    pub fn mount_point<T: Injectable + MountPoint>() -> Self {
        Self::from_sync(std::any::type_name::<T>(), |scope| {
            Ok(Resolved::Mount(scope.construct::<T>()?.server()))
        })
    }

    /// Reference an already built nested server
    pub fn server(server: Arc<Server>) -> Self {
        Self::from_sync("nested server", move |_| Ok(Resolved::Mount(server.clone())))
    }

    /// Reference an already built handler value
    pub fn handler<H: Handler>(handler: H) -> Self {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        Self::from_sync(std::any::type_name::<H>(), move |_| {
            Ok(Resolved::Handler(handler.clone()))
        })
    }

    /// Reference a `(req, res, next)` callback through the adapter
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&mut HttpRequest, &mut HttpResponse, Next) -> Result<(), Error> + Send + Sync + 'static,
    {
        let mut reference = Self::handler::<CallbackHandler<F>>(from_fn(callback));
        reference.name = Cow::Borrowed("callback");
        reference
    }

    /// Reference a [`Resolved`] unit registered in the scope under `token`
    pub fn named(token: impl Into<String>) -> Self {
        let token = token.into();
        Self::from_sync(format!("token {}", token), move |scope| {
            scope
                .resolve_named::<Resolved>(&token)
                .map(|resolved| (*resolved).clone())
        })
    }

    /// Reference resolved by a custom, possibly asynchronous, resolver
    pub fn resolve_with<F, Fut>(name: impl Into<Cow<'static, str>>, resolver: F) -> Self
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolved, Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            resolver: Arc::new(move |scope: Container| -> BoxFuture<'static, Result<Resolved, Error>> {
                Box::pin(resolver(scope))
            }),
        }
    }

    fn from_sync<F>(name: impl Into<Cow<'static, str>>, resolver: F) -> Self
    where
        F: Fn(&Container) -> Result<Resolved, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            resolver: Arc::new(move |scope: Container| -> BoxFuture<'static, Result<Resolved, Error>> {
                Box::pin(future::ready(resolver(&scope)))
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve through `scope`; any failure is reported as [`Error::Resolution`]
    pub fn resolve(&self, scope: &Container) -> BoxFuture<'static, Result<Resolved, Error>> {
        let name = self.name.clone();
        let pending = (self.resolver)(scope.clone());
        Box::pin(async move {
            pending.await.map_err(|err| match err {
                Error::Resolution(msg) => Error::Resolution(msg),
                other => Error::Resolution(format!("cannot resolve {}: {}", name, other)),
            })
        })
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef").field("name", &self.name).finish()
    }
}
