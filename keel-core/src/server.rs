// Mount point and HTTP transport

use crate::dispatch::{DispatchWrapper, GENERIC_FAILURE_BODY};
use crate::logging::{debug, error, info, warn};
use crate::routing::{MatchMode, PathConfig, Registration, RouteTable};
use crate::{Container, Error, HandlerRef, HttpMethod, HttpRequest, HttpResponse, Outcome};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use http::StatusCode;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Token under which the bound [`TransportHandle`] is published in the scope
pub const TRANSPORT_TOKEN: &str = "keel.transport";

/// A mount point: an injection scope plus an ordered route table.
///
/// Routes are registered through `&mut Server`. Once the server is shared
/// behind an `Arc`, for nesting or for [`Server::listen`], its route table
/// is frozen.
///
/// ```
/// use keel_core::{Container, HandlerRef, Server};
///
/// let mut server = Server::new(Container::new());
/// server
///     .get("/", [HandlerRef::from_fn(|_req, res, _next| {
///         res.text("hello");
///         Ok(())
///     })])
///     .unwrap();
/// assert_eq!(server.route_count(), 1);
/// ```
pub struct Server {
    scope: Container,
    routes: RouteTable,
    listening: AtomicBool,
}

impl Server {
    pub fn new(scope: Container) -> Self {
        Self {
            scope,
            routes: RouteTable::new(),
            listening: AtomicBool::new(false),
        }
    }

    /// The injection scope requests entering through this server start in
    pub fn scope(&self) -> &Container {
        &self.scope
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Bind handler references to a method and path.
    ///
    /// With an eager [`PathConfig`] every reference is resolved against this
    /// server's scope right away, and a failure is returned here instead of
    /// on the first request.
    pub fn register<I>(
        &mut self,
        method: HttpMethod,
        path: impl Into<PathConfig>,
        handlers: I,
    ) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.bind(Some(method), path.into(), MatchMode::Exact, handlers)
    }

    pub fn get<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::GET, path, handlers)
    }

    pub fn post<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::POST, path, handlers)
    }

    pub fn put<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::PUT, path, handlers)
    }

    pub fn delete<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::DELETE, path, handlers)
    }

    pub fn patch<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::PATCH, path, handlers)
    }

    pub fn head<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::HEAD, path, handlers)
    }

    pub fn options<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.register(HttpMethod::OPTIONS, path, handlers)
    }

    /// Bind to a path for every method
    pub fn all<I>(&mut self, path: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.bind(None, path.into(), MatchMode::Exact, handlers)
    }

    /// Bind under a path prefix for every method.
    ///
    /// While the callbacks run, `req.path` holds the part of the path after
    /// the prefix; `req.original_path` keeps the full path.
    pub fn mount<I>(&mut self, prefix: impl Into<PathConfig>, handlers: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        self.bind(None, prefix.into(), MatchMode::Prefix, handlers)
    }

    fn bind<I>(
        &mut self,
        method: Option<HttpMethod>,
        config: PathConfig,
        mode: MatchMode,
        handlers: I,
    ) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = HandlerRef>,
    {
        let callbacks = handlers
            .into_iter()
            .map(|reference| {
                if config.eager {
                    DispatchWrapper::eager(reference, &self.scope)
                } else {
                    Ok(DispatchWrapper::lazy(reference))
                }
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.routes
            .add(Registration::new(method, config.path, mode, callbacks));
        Ok(self)
    }

    /// Run the route table for a request already carrying its scope.
    ///
    /// Nested servers are entered through here, so the request keeps the
    /// child scope it was given by the forwarding wrapper.
    pub fn dispatch<'a>(
        &'a self,
        req: &'a mut HttpRequest,
        res: &'a mut HttpResponse,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(self.routes.handle(req, res))
    }

    /// Handle a request as the root server, without a transport.
    ///
    /// The request gets its own child of the server scope, so anything a
    /// handler registers through `req.scope()` stays with that request.
    pub async fn handle(&self, mut req: HttpRequest) -> HttpResponse {
        req.set_scope(self.scope.create_child());
        let mut res = HttpResponse::ok();

        let outcome = self.dispatch(&mut req, &mut res).await;
        if !res.is_finalized() {
            match outcome {
                Outcome::Continue => {
                    debug!(method = %req.method, path = %req.original_path, "No route finalized the response");
                    res.status(404)
                        .text(format!("Cannot {} {}", req.method, req.original_path));
                }
                Outcome::Stop => res.end(),
            }
        }
        res
    }

    /// Bind the HTTP transport and start accepting connections
    pub async fn listen(self: &Arc<Self>, addr: impl Into<BindAddr>) -> Result<ServerHandle, Error> {
        self.listen_with(&ServerSettings::new(addr)).await
    }

    /// Bind the HTTP transport using explicit settings
    pub async fn listen_with(self: &Arc<Self>, settings: &ServerSettings) -> Result<ServerHandle, Error> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyListening);
        }

        let started = self.start(settings).await;
        if started.is_err() {
            self.listening.store(false, Ordering::SeqCst);
        }
        started
    }

    async fn start(self: &Arc<Self>, settings: &ServerSettings) -> Result<ServerHandle, Error> {
        let target = settings.addr.target()?;
        let listener = TcpListener::bind(target.as_str())
            .await
            .map_err(|source| Error::Bind {
                addr: target.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let transport = TransportHandle {
            local_addr,
            shutdown: Arc::new(shutdown_tx),
        };
        self.scope.register(transport.clone());
        self.scope.register_named(TRANSPORT_TOKEN, transport.clone());

        info!(addr = %local_addr, "Server listening");

        let task = tokio::spawn(accept_loop(
            Arc::clone(self),
            listener,
            shutdown_rx,
            settings.request_timeout,
        ));

        Ok(ServerHandle { transport, task })
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("scope", &self.scope)
            .field("routes", &self.routes.len())
            .field("listening", &self.is_listening())
            .finish()
    }
}

async fn accept_loop(
    server: Arc<Server>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    timeout: Option<Duration>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "Failed to accept connection");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let server = server.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<IncomingBody>| {
                        let server = server.clone();
                        async move { serve(server, req, timeout).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!(peer = %peer, error = %err, "Error serving connection");
                    }
                });
            }
        }
    }
    info!("Server stopped accepting connections");
}

/// Convert a hyper request, run it through the server, convert back
async fn serve(
    server: Arc<Server>,
    req: Request<IncomingBody>,
    timeout: Option<Duration>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let target = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());
    let mut keel_req = HttpRequest::new(req.method().as_str(), target);

    // Repeated headers are folded into one comma-separated value.
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            keel_req
                .headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }
    let request_id = keel_req
        .headers
        .entry("x-request-id".to_string())
        .or_insert_with(|| uuid::Uuid::new_v4().to_string())
        .clone();

    keel_req.body = req.collect().await?.to_bytes().to_vec();

    let span = tracing::info_span!(
        "request",
        id = %request_id,
        method = %keel_req.method,
        path = %keel_req.path
    );
    let response = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, server.handle(keel_req)).await {
                Ok(response) => response,
                Err(_) => {
                    let err = Error::Timeout(format!("no response within {:?}", limit));
                    warn!(error = %err, "Request timed out");
                    let mut response = HttpResponse::new(err.status_code());
                    response.text("Service Unavailable");
                    response
                }
            },
            None => server.handle(keel_req).await,
        }
    }
    .instrument(span)
    .await;

    Ok(into_hyper(response, &request_id))
}

fn into_hyper(response: HttpResponse, request_id: &str) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(response.status)
        .header("x-request-id", request_id);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    match builder.body(Full::new(Bytes::from(response.body))) {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Failed to build response");
            let mut fallback = Response::new(Full::new(Bytes::from_static(
                GENERIC_FAILURE_BODY.as_bytes(),
            )));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

/// Address to bind the transport to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddr {
    /// Port on all interfaces
    Port(u16),
    Socket(SocketAddr),
    /// Either a port number or `host:port`
    Raw(String),
}

impl BindAddr {
    /// The `host:port` string handed to the listener
    pub fn target(&self) -> Result<String, Error> {
        match self {
            BindAddr::Port(port) => Ok(format!("0.0.0.0:{}", port)),
            BindAddr::Socket(addr) => Ok(addr.to_string()),
            BindAddr::Raw(raw) => {
                let raw = raw.trim();
                if let Ok(port) = raw.parse::<u16>() {
                    return Ok(format!("0.0.0.0:{}", port));
                }
                match raw.rsplit_once(':') {
                    Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                        Ok(raw.to_string())
                    }
                    _ => Err(Error::InvalidAddress(raw.to_string())),
                }
            }
        }
    }
}

impl From<u16> for BindAddr {
    fn from(port: u16) -> Self {
        BindAddr::Port(port)
    }
}

impl From<SocketAddr> for BindAddr {
    fn from(addr: SocketAddr) -> Self {
        BindAddr::Socket(addr)
    }
}

impl From<&str> for BindAddr {
    fn from(raw: &str) -> Self {
        BindAddr::Raw(raw.to_string())
    }
}

impl From<String> for BindAddr {
    fn from(raw: String) -> Self {
        BindAddr::Raw(raw)
    }
}

/// Transport settings for [`Server::listen_with`]
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: BindAddr,
    /// Whole-request limit; exceeded requests are answered with 503
    pub request_timeout: Option<Duration>,
}

impl ServerSettings {
    pub fn new(addr: impl Into<BindAddr>) -> Self {
        Self {
            addr: addr.into(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// The bound transport, injectable by type or via [`TRANSPORT_TOKEN`]
#[derive(Debug, Clone)]
pub struct TransportHandle {
    local_addr: SocketAddr,
    shutdown: Arc<watch::Sender<bool>>,
}

impl TransportHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Returned by [`Server::listen`] once the listener is accepting
#[derive(Debug)]
pub struct ServerHandle {
    transport: TransportHandle,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Wait until the accept loop ends
    pub async fn wait(self) -> Result<(), Error> {
        self.task
            .await
            .map_err(|err| Error::Internal(format!("accept loop failed: {}", err)))
    }

    /// Stop accepting connections and wait for the accept loop to end
    pub async fn shutdown(self) -> Result<(), Error> {
        self.transport.shutdown();
        self.wait().await
    }
}
