//! Routing through composed groups and the dispatcher
//!
//! Unit-level matching is covered in `src/router/tests.rs`; these tests go
//! through the public API only.

mod common;

use http::{Method, StatusCode};
use routekit::{
    DispatchConfig, DispatchRequest, Dispatcher, Handler, Primitive, RouteError,
    RouteGroup, RouteRegistry, RouteSpec, Router, ValueParam,
};
use routekit::{Depends, ParamType};
use serde_json::json;

fn echo(path: &str) -> RouteSpec {
    let label = path.to_string();
    RouteSpec::get(
        path,
        Handler::sync(move |_| Ok(json!({ "route": label }))),
    )
}

#[test]
fn test_earliest_registration_wins() {
    let mut registry = RouteRegistry::new();
    registry.add(echo("/a/{x}")).unwrap();
    registry.add(echo("/a/static")).unwrap();
    let router = Router::new(&registry).unwrap();

    let m = router.route(&Method::GET, "/a/static").unwrap();
    assert_eq!(m.route.path(), "/a/{x}");
    assert_eq!(m.get_path_param("x"), Some("static"));
}

#[test]
fn test_every_registered_pair_matches() {
    let mut registry = RouteRegistry::new();
    registry
        .add(RouteSpec::new(
            "/users/{user_id}/posts/{post_id}",
            &[Method::GET, Method::PUT],
            Handler::sync(|_| Ok(json!({}))),
        ))
        .unwrap();
    registry.add(echo("/health")).unwrap();
    let router = Router::new(&registry).unwrap();

    for method in [Method::GET, Method::PUT] {
        let m = router.route(&method, "/users/7/posts/99").unwrap();
        assert_eq!(m.get_path_param("user_id"), Some("7"));
        assert_eq!(m.get_path_param("post_id"), Some("99"));
    }
    assert!(router.route(&Method::GET, "/health").is_ok());

    match router.route(&Method::DELETE, "/users/7/posts/99") {
        Err(RouteError::MethodNotAllowed { allowed, .. }) => {
            assert_eq!(allowed, vec![Method::GET, Method::PUT]);
        }
        other => panic!("expected MethodNotAllowed, got {other:?}"),
    }
    assert!(matches!(
        router.route(&Method::GET, "/users/7"),
        Err(RouteError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_group_dependencies_resolve_parent_first() {
    let log = common::Recorder::new();

    let mut items = RouteGroup::with_prefix("/items").tag("items");
    items.route(
        RouteSpec::get("/{item_id}", Handler::sync(|_| Ok(json!({}))))
            .param(ValueParam::path("item_id", Primitive::Integer))
            .depends("conn", Depends::on("conn")),
    );
    let mut api = RouteGroup::with_prefix("/api/v1")
        .tag("v1")
        .dependency(Depends::on("auth"));
    api.include(items);
    let registry = api.into_registry().unwrap();

    let route = &registry.all()[0];
    assert_eq!(route.path(), "/api/v1/items/{item_id}");
    assert_eq!(route.tags(), &["v1".to_string(), "items".to_string()]);

    let dispatcher = Dispatcher::builder(registry)
        .provider(common::recording_generator("auth", &log))
        .provider(common::recording_generator("conn", &log))
        .build()
        .await
        .unwrap();
    let outcome = dispatcher
        .dispatch(DispatchRequest::get("/api/v1/items/3"))
        .await;
    assert_eq!(outcome.response.status, StatusCode::OK);
    assert_eq!(
        log.entries(),
        vec![
            "acquire auth",
            "acquire conn",
            "release conn succeeded",
            "release auth succeeded",
        ]
    );
}

#[tokio::test]
async fn test_strict_slashes_from_config() {
    let build = |strict: bool| {
        let mut registry = RouteRegistry::new();
        registry.add(echo("/items")).unwrap();
        Dispatcher::builder(registry)
            .config(DispatchConfig {
                strict_slashes: strict,
                ..DispatchConfig::default()
            })
            .build()
    };

    let lenient = build(false).await.unwrap();
    let outcome = lenient.dispatch(DispatchRequest::get("/items/")).await;
    assert_eq!(outcome.response.status, StatusCode::OK);

    let strict = build(true).await.unwrap();
    let outcome = strict.dispatch(DispatchRequest::get("/items/")).await;
    assert_eq!(outcome.response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_query_list_and_percent_decoded_path() {
    let mut registry = RouteRegistry::new();
    registry
        .add(
            RouteSpec::get(
                "/files/{name}",
                Handler::sync(|args| {
                    Ok(json!({
                        "name": args.param("name"),
                        "ids": args.param("id"),
                        "who": args.request().get_query_param("who"),
                    }))
                }),
            )
            .param(ValueParam::path("name", Primitive::String))
            .param(ValueParam::query("id", ParamType::List(Primitive::Integer))),
        )
        .unwrap();
    let dispatcher = Dispatcher::builder(registry).build().await.unwrap();

    let outcome = dispatcher
        .dispatch(DispatchRequest::get(
            "/files/annual%20report.pdf?id=1&id=2&who=ana%40example.com",
        ))
        .await;
    assert_eq!(
        outcome.response.body,
        json!({ "name": "annual report.pdf", "ids": [1, 2], "who": "ana@example.com" })
    );
}
