// Scalability checks for the routing table.
//
// Matching is a linear scan over compiled regexes, so these keep an eye on
// per-lookup cost with a few hundred routes and deep parameterized paths.

use super::Router;
use crate::handler::Handler;
use crate::registry::RouteRegistry;
use crate::route::RouteSpec;
use http::Method;
use serde_json::json;
use std::time::Instant;

fn registry_of(paths: &[String]) -> RouteRegistry {
    let mut reg = RouteRegistry::new();
    for path in paths {
        reg.add(RouteSpec::get(path.as_str(), Handler::sync(|_| Ok(json!(null)))))
            .unwrap();
    }
    reg
}

#[test]
fn test_router_with_many_routes() {
    let paths: Vec<String> = (0..500)
        .map(|i| format!("/api/v1/resource{i}/{{id}}"))
        .collect();
    let router = Router::new(&registry_of(&paths)).unwrap();

    let start = Instant::now();
    for _ in 0..200 {
        let m = router.route(&Method::GET, "/api/v1/resource250/123").unwrap();
        assert_eq!(m.route.path(), "/api/v1/resource250/{id}");
    }
    let duration = start.elapsed();

    assert!(
        duration.as_secs() < 5,
        "Router performance degraded: {}ms for 200 lookups with 500 routes",
        duration.as_millis()
    );
}

#[test]
fn test_router_deep_paths() {
    let paths: Vec<String> = ["/a", "/a/b", "/a/b/c", "/a/b/c/d", "/a/b/c/d/e", "/a/b/c/d/e/f"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let router = Router::new(&registry_of(&paths)).unwrap();

    for path in &paths {
        assert_eq!(router.route(&Method::GET, path).unwrap().route.path(), path);
    }
}

#[test]
fn test_router_parameter_extraction() {
    let paths =
        vec!["/api/{version}/users/{user_id}/posts/{post_id}/comments/{comment_id}".to_string()];
    let router = Router::new(&registry_of(&paths)).unwrap();

    for _ in 0..100 {
        let m = router
            .route(&Method::GET, "/api/v1/users/123/posts/456/comments/789")
            .unwrap();
        assert_eq!(m.path_params.len(), 4);
        assert!(!m.path_params.spilled());
        assert_eq!(m.get_path_param("comment_id"), Some("789"));
    }
}
