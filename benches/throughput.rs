use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use routekit::{
    DispatchRequest, Dispatcher, Handler, Primitive, Provider, RouteRegistry, RouteSpec,
    ValueParam,
};
use routekit::{Depends, Router};
use serde_json::json;
use std::hint::black_box;

fn noop() -> Handler {
    Handler::sync(|_| Ok(json!({})))
}

fn zoo_registry() -> RouteRegistry {
    let mut registry = RouteRegistry::new();
    let routes = [
        RouteSpec::get("/", noop()),
        RouteSpec::new("/zoo/animals", &[Method::GET, Method::POST], noop()),
        RouteSpec::new(
            "/zoo/animals/{id}",
            &[Method::GET, Method::PUT, Method::PATCH, Method::DELETE],
            noop(),
        ),
        RouteSpec::get("/zoo/animals/{id}/toys/{toy_id}", noop()),
        RouteSpec::get(
            "/zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}",
            noop(),
        ),
        RouteSpec::post(
            "/inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}",
            noop(),
        ),
        RouteSpec::get("/complex/{a}/{b}/{c}/{d}/{e}/{f}/{g}/{h}/{i}", noop()),
        RouteSpec::new("/zoo/health", &[Method::HEAD, Method::OPTIONS], noop()),
    ];
    for route in routes {
        registry.add(route).unwrap();
    }
    registry
}

fn bench_route_throughput(c: &mut Criterion) {
    let router = Router::new(&zoo_registry()).unwrap();
    c.bench_function("route_match", |b| {
        let test_paths = [
            (Method::GET, "/zoo/animals/123"),
            (Method::GET, "/zoo/animals/123/toys/456"),
            (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
            (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
            (Method::GET, "/complex/1/2/3/4/5/6/7/8/9"),
            (Method::DELETE, "/zoo/health"),
        ];
        b.iter(|| {
            for (method, path) in &test_paths {
                let res = router.route(method, path);
                black_box(&res);
            }
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    let mut registry = RouteRegistry::new();
    registry
        .add(
            RouteSpec::get(
                "/items/{item_id}",
                Handler::sync(|args| {
                    let id: i64 = args.param_as("item_id")?;
                    let tag = args.dep::<&'static str>("db")?;
                    Ok(json!({ "id": id, "source": *tag }))
                }),
            )
            .param(ValueParam::path("item_id", Primitive::Integer))
            .param(ValueParam::query("verbose", Primitive::Boolean).default(false))
            .depends("db", Depends::on("get_db")),
        )
        .unwrap();
    let dispatcher = rt
        .block_on(
            Dispatcher::builder(registry)
                .provider(Provider::sync("get_db", |_| Ok("primary")))
                .build(),
        )
        .unwrap();

    c.bench_function("dispatch_read_item", |b| {
        b.iter(|| {
            let outcome =
                rt.block_on(dispatcher.dispatch(DispatchRequest::get("/items/42?verbose=true")));
            black_box(outcome.response.status);
        })
    });
}

criterion_group!(benches, bench_route_throughput, bench_dispatch);
criterion_main!(benches);
