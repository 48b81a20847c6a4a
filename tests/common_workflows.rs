//! Integration tests for common Keel workflows.
//!
//! These exercise the facade crate the way an application would: derived
//! injectable handlers, nested mount points, configuration and the test client.

use keel::prelude::*;
use keel_config::{ConfigManager, FileFormat, ServerConfig};
use keel_testing::{Probe, TestClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Providers
// =============================================================================

struct Database {
    users: Vec<&'static str>,
}

#[derive(Clone)]
struct Settings {
    banner: String,
}

#[derive(Default)]
struct RequestCounter(AtomicUsize);

// =============================================================================
// Derived handlers
// =============================================================================

#[derive(Injectable)]
struct ListUsers {
    db: Arc<Database>,
    settings: Settings,
    #[inject(default)]
    served: RequestCounter,
}

#[async_trait]
impl Handler for ListUsers {
    async fn handle(&self, _req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult {
        self.served.0.fetch_add(1, Ordering::SeqCst);
        res.json(&serde_json::json!({
            "banner": self.settings.banner,
            "users": self.db.users,
        }))?;
        Ok(Flow::Auto)
    }
}

#[derive(Injectable)]
struct RequireToken;

#[async_trait]
impl Handler for RequireToken {
    async fn handle(&self, req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult {
        if req.header("authorization").is_none() {
            res.status(401).text("missing token");
        }
        Ok(Flow::Auto)
    }
}

#[derive(Injectable)]
struct Ping(#[inject(default)] String);

#[async_trait]
impl Handler for Ping {
    async fn handle(&self, _req: &mut HttpRequest, res: &mut HttpResponse) -> HandlerResult {
        res.text(format!("pong{}", self.0));
        Ok(Flow::Auto)
    }
}

struct UsersModule {
    server: Arc<Server>,
}

impl Injectable for UsersModule {
    fn inject(_scope: &Container) -> Result<Self, Error> {
        // Root providers stay visible through the request's scope chain.
        let mut server = Server::new(Container::new());
        server.get(
            "/",
            [HandlerRef::of::<RequireToken>(), HandlerRef::of::<ListUsers>()],
        )?;
        Ok(Self {
            server: Arc::new(server),
        })
    }
}

impl MountPoint for UsersModule {
    fn server(&self) -> Arc<Server> {
        self.server.clone()
    }
}

fn app() -> Server {
    let scope = Container::new();
    scope.register(Database {
        users: vec!["ada", "grace"],
    });
    scope.register(Settings {
        banner: "keel".to_string(),
    });

    let mut server = Server::new(scope);
    server
        .get(PathConfig::eager("/ping"), [HandlerRef::of::<Ping>()])
        .unwrap()
        .mount("/users", [HandlerRef::mount_point::<UsersModule>()])
        .unwrap();
    server
}

// =============================================================================
// Workflows
// =============================================================================

#[tokio::test]
async fn test_derived_handler_with_injected_dependencies() {
    let client = TestClient::new(app());

    let res = client
        .send(
            keel_testing::TestRequestBuilder::new(HttpMethod::GET, "/users")
                .header("Authorization", "Bearer token"),
        )
        .await;
    res.assert_status(200).assert_json(&serde_json::json!({
        "banner": "keel",
        "users": ["ada", "grace"],
    }));
}

#[tokio::test]
async fn test_guard_middleware_stops_chain() {
    let client = TestClient::new(app());

    client
        .get("/users")
        .await
        .assert_status(401)
        .assert_body("missing token");
}

#[tokio::test]
async fn test_eager_derived_handler() {
    let client = TestClient::new(app());
    client.get("/ping").await.assert_status(200).assert_body("pong");
    client.get("/pong").await.assert_status(404);
}

#[tokio::test]
async fn test_derived_handler_missing_dependency() {
    let mut server = Server::new(Container::new());
    server.get("/", [HandlerRef::of::<ListUsers>()]).unwrap();

    TestClient::new(server)
        .get("/")
        .await
        .assert_status(500)
        .assert_body_contains("Database");
}

#[tokio::test]
async fn test_handler_reads_configuration() {
    let config = ConfigManager::with_prefix("KEEL");
    config
        .load_str("greeting = \"from file\"", FileFormat::Toml)
        .unwrap();
    config.load_env_from([("KEEL_GREETING", "from env")]);

    let scope = Container::new();
    scope.register(config);

    let mut server = Server::new(scope);
    server
        .get(
            "/",
            [HandlerRef::from_fn(|req, res, _next| {
                let config = req.scope().resolve::<ConfigManager>()?;
                res.text(config.get_string("greeting")?);
                Ok(())
            })],
        )
        .unwrap();

    TestClient::new(server).get("/").await.assert_body("from env");
}

#[tokio::test]
async fn test_listen_with_server_config() {
    let manager = ConfigManager::new();
    manager.set("host", "127.0.0.1").unwrap();
    manager.set("port", 0).unwrap();
    manager.set("request_timeout_ms", 2000).unwrap();
    let config = ServerConfig::from_manager(&manager).unwrap();

    let server = Arc::new(app());
    let handle = server.listen_with(&config.to_settings()).await.unwrap();
    assert!(handle.local_addr().ip().is_loopback());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_probe_across_nested_servers() {
    let probe = Probe::new();

    let mut inner = Server::new(Container::new());
    inner
        .get("/leaf", [probe.labeled("inner"), probe.sending("leaf")])
        .unwrap();

    let mut outer = Server::new(Container::new());
    outer
        .mount("/", [probe.labeled("outer")])
        .unwrap()
        .mount("/nested", [HandlerRef::server(Arc::new(inner))])
        .unwrap()
        .all("/nested/leaf", [probe.labeled("unreached")])
        .unwrap();

    TestClient::new(outer).get("/nested/leaf").await.assert_body("leaf");
    assert_eq!(probe.calls(), vec!["outer", "inner", "send leaf"]);
}
