//! Integration tests for rpcwire.
//!
//! These tests drive the full axum router: path matching, body decoding,
//! dispatch, envelopes and instrumentation together.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use http_body_util::BodyExt;
use rpcwire::codec::MsgPackCodec;
use rpcwire::events::{CallStatus, ScopedEvent};
use rpcwire::{
    BodyParserOptions, BodyType, ChannelSink, RequestContext, ResponseError, RouteTags, RpcConfig,
    RpcEvent, RpcPlugin, RpcServer, ServerConfig,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

#[derive(Deserialize)]
struct Greet {
    name: String,
}

fn plugin_with(config: RpcConfig) -> (RpcPlugin, UnboundedReceiver<ScopedEvent>) {
    let (sink, rx) = ChannelSink::new();
    let plugin = RpcServer::builder()
        .config(config)
        .event_sink(sink)
        .handle("getUser", |_: Value, _ctx| async move { Ok(json!({"id": 1})) })
        .handle("greet", |args: Greet, _ctx| async move {
            Ok(format!("hello {}", args.name))
        })
        .handle("echo", |args: Value, _ctx| async move { Ok(args) })
        .handle("forbidden", |_: Value, _ctx| async move {
            Err::<Value, _>(
                ResponseError::new("you shall not pass")
                    .with_code("E_FORBIDDEN")
                    .with_meta(json!({"role": "guest"}))
                    .into(),
            )
        })
        .handle("explode", |_: Value, _ctx| async move {
            Err::<Value, _>(anyhow::anyhow!("connection string leaked"))
        })
        .handle("whoami", |_: Value, ctx: RequestContext| async move {
            Ok(json!({
                "requestId": ctx.request_id(),
                "agent": ctx.header("user-agent"),
                "path": ctx.path(),
            }))
        })
        .handle("greetUser", |_: Value, ctx: RequestContext| async move {
            let user: Value = ctx.rpc()?.request("getUser", &json!({})).await?;
            let greeting: String = ctx
                .rpc()?
                .request("greet", &json!({"name": format!("user {}", user["id"])}))
                .await?;
            Ok(greeting)
        })
        .handle("upload", |args: Value, ctx: RequestContext| async move {
            let contents = ctx
                .file("doc")
                .map(|f| String::from_utf8_lossy(&f.data).into_owned());
            Ok(json!({"args": args, "contents": contents}))
        })
        .build()
        .unwrap();
    (plugin, rx)
}

fn plugin() -> (RpcPlugin, UnboundedReceiver<ScopedEvent>) {
    plugin_with(RpcConfig::default())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The canonical example: a registered handler's result comes back wrapped.
#[tokio::test]
async fn test_registered_method_returns_success_envelope() {
    let (plugin, _rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/getUser", "{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "data": {"id": 1}}));
}

#[tokio::test]
async fn test_typed_arguments() {
    let (plugin, _rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/greet", r#"{"name":"ada"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "data": "hello ada"}));
}

#[tokio::test]
async fn test_unregistered_method_is_404() {
    let (plugin, mut rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/deleteEverything", "{}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({
            "status": "failure",
            "data": {
                "message": "Missing RPC handler for deleteEverything",
                "code": "ERR_MISSING_HANDLER"
            }
        })
    );

    let event = rx.recv().await.unwrap().event;
    assert_eq!(event.name(), "rpc:error");
    assert_eq!(event.method(), "deleteEverything");
}

#[tokio::test]
async fn test_missing_method_segment_is_404() {
    let (plugin, _rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/", "{}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["code"], "ERR_MISSING_HANDLER");
}

#[tokio::test]
async fn test_response_error_keeps_status_200() {
    let (plugin, mut rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/forbidden", "{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "failure",
            "data": {
                "message": "you shall not pass",
                "code": "E_FORBIDDEN",
                "meta": {"role": "guest"}
            }
        })
    );

    let event = rx.recv().await.unwrap().event;
    assert_eq!(event.status(), Some(CallStatus::Failure));
}

#[tokio::test]
async fn test_unknown_error_is_masked() {
    let (plugin, _rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/explode", "{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "failure", "data": {"message": "Internal Server Error"}})
    );
}

#[tokio::test]
async fn test_unknown_error_hint_in_development() {
    let config = RpcConfig {
        expose_unknown_errors: true,
        ..RpcConfig::default()
    };
    let (plugin, _rx) = plugin_with(config);

    let (_, body) = call(plugin.router(), post_json("/api/explode", "{}")).await;

    let message = body["data"]["message"].as_str().unwrap();
    assert!(message.starts_with("UnknownError"));
    assert!(!message.contains("connection string"));
}

#[tokio::test]
async fn test_invalid_arguments() {
    let (plugin, _rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/greet", r#"{"nom":"ada"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["data"]["code"], "ERR_INVALID_ARGS");
}

#[tokio::test]
async fn test_malformed_json_does_not_invoke_handler() {
    let (plugin, mut rx) = plugin();

    let (status, body) = call(plugin.router(), post_json("/api/echo", r#"{"broken":"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["data"]["code"], "entity.parse.failed");

    let event = rx.recv().await.unwrap().event;
    match event {
        RpcEvent::Method {
            method,
            status,
            error,
            ..
        } => {
            assert_eq!(method, "echo");
            assert_eq!(status, CallStatus::Failure);
            assert!(error.is_some());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_body_too_large() {
    let config = RpcConfig {
        body_parser: BodyParserOptions {
            json_limit: 16,
            ..BodyParserOptions::default()
        },
        ..RpcConfig::default()
    };
    let (plugin, _rx) = plugin_with(config);

    let payload = json!({"data": "x".repeat(64)}).to_string();
    let (status, body) = call(plugin.router(), post_json("/api/echo", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["code"], "entity.too.large");
}

#[tokio::test]
async fn test_form_body() {
    let (plugin, _rx) = plugin();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/echo")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=ada&tag=a&tag=b"))
        .unwrap();

    let (_, body) = call(plugin.router(), request).await;

    assert_eq!(
        body,
        json!({"status": "success", "data": {"name": "ada", "tag": ["a", "b"]}})
    );
}

#[tokio::test]
async fn test_form_body_nested_keys() {
    let (plugin, _rx) = plugin();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/echo")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("user[name]=ada&ids[]=1&ids[]=2"))
        .unwrap();

    let (_, body) = call(plugin.router(), request).await;

    assert_eq!(
        body["data"],
        json!({"user": {"name": "ada"}, "ids": ["1", "2"]})
    );
}

#[tokio::test]
async fn test_msgpack_body() {
    let config = RpcConfig {
        body_parser: BodyParserOptions {
            enable_types: vec![BodyType::Json, BodyType::Msgpack],
            ..BodyParserOptions::default()
        },
        ..RpcConfig::default()
    };
    let (plugin, _rx) = plugin_with(config);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/greet")
        .header(header::CONTENT_TYPE, "application/msgpack")
        .body(Body::from(MsgPackCodec::encode(&json!({"name": "bob"})).unwrap()))
        .unwrap();

    let (_, body) = call(plugin.router(), request).await;

    assert_eq!(body, json!({"status": "success", "data": "hello bob"}));
}

#[tokio::test]
async fn test_multipart_fields_and_files_merged() {
    let (plugin, _rx) = plugin();
    let boundary = "rpcwire-test-boundary";
    let payload = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"title\"\r\n\r\n\
         notes\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"doc\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         line one\nline two\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();

    let (status, body) = call(plugin.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "success",
            "data": {
                "args": {
                    "title": "notes",
                    "doc": {"filename": "notes.txt", "contentType": "text/plain", "size": 17}
                },
                "contents": "line one\nline two"
            }
        })
    );
}

#[tokio::test]
async fn test_context_sees_request() {
    let (plugin, _rx) = plugin();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/whoami")
        .header("x-request-id", "abc-123")
        .header("user-agent", "integration-test")
        .body(Body::empty())
        .unwrap();

    let (_, body) = call(plugin.router(), request).await;

    assert_eq!(
        body["data"],
        json!({"requestId": "abc-123", "agent": "integration-test", "path": "/api/whoami"})
    );
}

#[tokio::test]
async fn test_success_event_carries_scope() {
    let (plugin, mut rx) = plugin();
    let mut request = post_json("/api/getUser", "{}");
    request
        .headers_mut()
        .insert("x-request-id", "req-7".parse().unwrap());

    let _ = call(plugin.router(), request).await;

    let scoped = rx.recv().await.unwrap();
    assert_eq!(scoped.scope.request_id, "req-7");
    assert_eq!(scoped.scope.path, "/api/getUser");
    assert_eq!(scoped.event.status(), Some(CallStatus::Success));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_prefix_is_case_sensitive() {
    let (plugin, mut rx) = plugin();
    let app = plugin.attach(Router::new().route("/API/echo", post(|| async { "downstream" })));

    let response = app.oneshot(post_json("/API/echo", "{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"downstream");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_custom_api_path() {
    let (plugin, _rx) = plugin_with(RpcConfig::default().with_api_path("/internal/rpc"));

    let (status, _) = call(plugin.router(), post_json("/internal/rpc/getUser", "{}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(plugin.router(), post_json("/api/getUser", "{}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "not found"}));
}

#[tokio::test]
async fn test_attach_passes_other_requests_through() {
    let (plugin, _rx) = plugin();
    let app = plugin.attach(
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/api/getUser", get(|| async { "not rpc" }))
            .route("/form", post(|| async { "posted" })),
    );

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");

    // GET on the RPC path is not an RPC call
    let response = app
        .clone()
        .oneshot(Request::get("/api/getUser").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"not rpc");

    let response = app
        .clone()
        .oneshot(Request::post("/form").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"posted");

    let (status, body) = call(app, post_json("/api/getUser", "{}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_route_tags_on_response() {
    let (plugin, _rx) = plugin();

    let response = plugin
        .router()
        .oneshot(post_json("/api/getUser", "{}"))
        .await
        .unwrap();

    assert_eq!(
        response.extensions().get::<RouteTags>().map(|t| t.name.as_str()),
        Some("getUser")
    );
}

#[tokio::test]
async fn test_server_side_call_reports_local_origin() {
    let (plugin, mut rx) = plugin();
    let ctx = RequestContext::new("outer");

    let greeting: String = plugin
        .dispatcher()
        .from(&ctx)
        .request("greet", &json!({"name": "eve"}))
        .await
        .unwrap();
    assert_eq!(greeting, "hello eve");

    match rx.recv().await.unwrap().event {
        RpcEvent::Method { origin, method, .. } => {
            assert_eq!(origin, rpcwire::Origin::Local);
            assert_eq!(method, "greet");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_handler_calls_other_methods() {
    let (plugin, mut rx) = plugin();
    let mut request = post_json("/api/greetUser", "{}");
    request
        .headers_mut()
        .insert("x-request-id", "nested-1".parse().unwrap());

    let (status, body) = call(plugin.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "data": "hello user 1"}));

    let mut seen = Vec::new();
    for _ in 0..3 {
        let scoped = rx.recv().await.unwrap();
        assert_eq!(scoped.scope.request_id, "nested-1");
        match scoped.event {
            RpcEvent::Method {
                method,
                origin,
                status,
                ..
            } => {
                assert_eq!(status, CallStatus::Success);
                seen.push((method, origin));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(
        seen,
        vec![
            ("getUser".to_string(), rpcwire::Origin::Local),
            ("greet".to_string(), rpcwire::Origin::Local),
            ("greetUser".to_string(), rpcwire::Origin::Remote),
        ]
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_serve_over_tcp() {
    let (plugin, _rx) = plugin();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        plugin
            .serve_with_shutdown(listener, &ServerConfig::default(), async move {
                let _ = stopped.await;
            })
            .await
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream
        .write_all(
            b"POST /api/getUser HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
        )
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.ends_with(r#"{"status":"success","data":{"id":1}}"#));

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
