use keel_core::{Container, Error, HandlerRef, HttpMethod, Server};
use keel_testing::{Probe, TestClient, TestRequestBuilder};
use std::sync::Arc;

fn api() -> Server {
    let mut api = Server::new(Container::new());
    api.get(
        "/users/:id",
        [HandlerRef::from_fn(|req, res, _next| {
            let id = req.param("id").cloned().unwrap_or_default();
            res.json(&serde_json::json!({ "id": id }))
        })],
    )
    .unwrap()
    .post(
        "/echo",
        [HandlerRef::from_fn(|req, res, _next| {
            let value: serde_json::Value = req.json()?;
            res.json(&value)
        })],
    )
    .unwrap();
    api
}

#[tokio::test]
async fn test_client_reaches_nested_routes() {
    let mut root = Server::new(Container::new());
    root.mount("/api", [HandlerRef::server(Arc::new(api()))])
        .unwrap();
    let client = TestClient::new(root);

    client
        .get("/api/users/9")
        .await
        .assert_status(200)
        .assert_header("content-type", "application/json")
        .assert_json(&serde_json::json!({"id": "9"}));

    client
        .get("/users/9")
        .await
        .assert_status(404)
        .assert_body("Cannot GET /users/9");
}

#[tokio::test]
async fn test_client_sends_json_bodies() {
    let client = TestClient::new(api());
    let request = TestRequestBuilder::new(HttpMethod::POST, "/echo")
        .json(&serde_json::json!({"n": 1}))
        .unwrap();

    client
        .send(request)
        .await
        .assert_status(200)
        .assert_json(&serde_json::json!({"n": 1}));
}

#[tokio::test]
async fn test_invalid_json_is_contained() {
    let client = TestClient::new(api());
    client.post("/echo", "not json").await.assert_contained_failure();
}

#[tokio::test]
async fn test_probe_sees_stop_after_failure() {
    let probe = Probe::new();
    let mut server = Server::new(Container::new());
    server
        .get(
            "/",
            [
                probe.labeled("before"),
                HandlerRef::from_fn(|_req, _res, _next| Err(Error::Internal("boom".into()))),
                probe.labeled("after"),
            ],
        )
        .unwrap();

    TestClient::new(server).get("/").await.assert_contained_failure();
    assert_eq!(probe.calls(), vec!["before"]);
}
