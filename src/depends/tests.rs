use super::*;
use crate::ids::RequestId;
use crate::request::{DispatchRequest, RequestParts};
use crate::router::ParamVec;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn context(state: Arc<AppState>) -> ResolutionContext {
    let parts = RequestParts::new(
        RequestId::new(),
        DispatchRequest::get("/items/1"),
        ParamVec::new(),
    );
    ResolutionContext::for_request(Arc::new(parts), Arc::new(AppScope::empty(state)))
}

fn resolver(providers: Vec<Provider>) -> Resolver {
    let mut registry = ProviderRegistry::new();
    for p in providers {
        registry.register(p).unwrap();
    }
    Resolver::new(Arc::new(registry))
}

fn counting(name: &str, calls: &Arc<AtomicUsize>) -> Provider {
    let calls = Arc::clone(calls);
    Provider::sync(name.to_string(), move |_| {
        Ok(calls.fetch_add(1, Ordering::SeqCst))
    })
}

#[tokio::test]
async fn cycle_is_reported_before_any_provider_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (ca, cb) = (Arc::clone(&calls), Arc::clone(&calls));
    let r = resolver(vec![
        Provider::sync("a", move |_| Ok(ca.fetch_add(1, Ordering::SeqCst)))
            .depends_on("b", Depends::on("b")),
        Provider::sync("b", move |_| Ok(cb.fetch_add(1, Ordering::SeqCst)))
            .depends_on("a", Depends::on("a")),
    ]);
    let mut ctx = context(Arc::new(AppState::new()));

    let err = r.resolve_one(&mut ctx, &Depends::on("a")).await.unwrap_err();
    match err {
        ResolveError::Circular { cycle } => assert_eq!(cycle, vec!["a", "b", "a"]),
        other => panic!("expected a cycle, got {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(ctx.call_stack().is_empty());
}

#[tokio::test]
async fn cached_value_is_shared_within_a_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let r = resolver(vec![counting("db", &calls)]);
    let mut ctx = context(Arc::new(AppState::new()));

    let plan = vec![
        ("first".to_string(), Depends::on("db")),
        ("second".to_string(), Depends::on("db")),
    ];
    let values = r.resolve(&mut ctx, &plan).await.unwrap();
    assert!(Arc::ptr_eq(&values["first"], &values["second"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(ctx.cached("db").is_some());
}

#[tokio::test]
async fn no_cache_invokes_again() {
    let calls = Arc::new(AtomicUsize::new(0));
    let r = resolver(vec![counting("nonce", &calls)]);
    let mut ctx = context(Arc::new(AppState::new()));

    let plan = vec![
        ("a".to_string(), Depends::on("nonce")),
        ("b".to_string(), Depends::on("nonce").no_cache()),
    ];
    let values = r.resolve(&mut ctx, &plan).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&values["a"], &values["b"]));
}

#[tokio::test]
async fn diamond_resolves_shared_leaf_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let r = resolver(vec![
        counting("settings", &calls),
        Provider::sync("left", |args| args.dep::<usize>("s").map(|v| *v))
            .depends_on("s", Depends::on("settings")),
        Provider::sync("right", |args| args.dep::<usize>("s").map(|v| *v))
            .depends_on("s", Depends::on("settings")),
        Provider::sync("top", |args| {
            Ok(*args.dep::<usize>("l")? + *args.dep::<usize>("r")?)
        })
        .depends_on("l", Depends::on("left"))
        .depends_on("r", Depends::on("right")),
    ]);
    let mut ctx = context(Arc::new(AppState::new()));

    let top = r.resolve_one(&mut ctx, &Depends::on("top")).await.unwrap();
    assert_eq!(*top.downcast::<usize>().unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cleanups_run_in_reverse_acquisition_order() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let generator = |name: &'static str, log: &Arc<Mutex<Vec<String>>>| {
        let log = Arc::clone(log);
        Provider::generator(name, move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("acquire {name}"));
                Ok(Acquired::new(name).on_cleanup(move |_, outcome: Outcome| async move {
                    log.lock().push(format!("release {name} {outcome}"));
                    Ok::<(), anyhow::Error>(())
                }))
            }
        })
    };
    let r = resolver(vec![
        generator("session", &log).depends_on("conn", Depends::on("conn")),
        generator("conn", &log),
    ]);
    let mut ctx = context(Arc::new(AppState::new()));

    r.resolve_one(&mut ctx, &Depends::on("session")).await.unwrap();
    assert_eq!(ctx.pending_cleanups(), 2);

    let report = ctx.teardown(Outcome::Failed).await;
    assert_eq!(report.completed, vec!["session", "conn"]);
    assert_eq!(
        *log.lock(),
        vec![
            "acquire conn",
            "acquire session",
            "release session failed",
            "release conn failed",
        ]
    );
}

#[tokio::test]
async fn override_substitutes_the_provider_under_the_same_name() {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Provider::sync("db", |_| Ok("real")))
        .unwrap();
    registry.override_with("db", Provider::sync("fake_db", |_| Ok("fake")));
    let r = Resolver::new(Arc::new(registry));
    let mut ctx = context(Arc::new(AppState::new()));

    let v = r.resolve_one(&mut ctx, &Depends::on("db")).await.unwrap();
    assert_eq!(*v.downcast::<&str>().unwrap(), "fake");
    assert!(ctx.cached("db").is_some());
}

#[tokio::test]
async fn unknown_and_failing_providers() {
    let r = resolver(vec![
        Provider::sync("broken", |_| -> anyhow::Result<u8> { anyhow::bail!("connection refused") }),
        Provider::sync("explodes", |_| -> anyhow::Result<u8> {
            if true {
                panic!("provider bug");
            }
            Ok(0)
        }),
        Provider::sync("needs_ghost", |_| Ok(1_u8)).depends_on("g", Depends::on("ghost")),
    ]);
    let mut ctx = context(Arc::new(AppState::new()));

    let err = r.resolve_one(&mut ctx, &Depends::on("ghost")).await.unwrap_err();
    assert!(matches!(err, ResolveError::UnknownProvider { ref provider } if provider == "ghost"));

    let err = r.resolve_one(&mut ctx, &Depends::on("broken")).await.unwrap_err();
    assert_eq!(err.provider(), "broken");
    assert!(err.to_string().contains("connection refused"));

    let err = r.resolve_one(&mut ctx, &Depends::on("explodes")).await.unwrap_err();
    assert!(matches!(err, ResolveError::Provider { .. }));
    assert!(err.to_string().contains("provider bug"));

    let err = r
        .resolve_one(&mut ctx, &Depends::on("needs_ghost"))
        .await
        .unwrap_err();
    assert_eq!(err.provider(), "ghost");
    assert!(ctx.call_stack().is_empty());
}

#[tokio::test]
async fn providers_see_request_and_state() {
    struct Prefix(&'static str);
    let r = resolver(vec![Provider::sync("path", |args| {
        let prefix = args.state::<Prefix>().map_or("", |p| p.0);
        let path = args.request().map(|r| r.path.clone()).unwrap_or_default();
        Ok(format!("{prefix}{path}"))
    })]);
    let mut state = AppState::new();
    state.insert(Prefix("GET "));
    let mut ctx = context(Arc::new(state));

    let v = r.resolve_one(&mut ctx, &Depends::on("path")).await.unwrap();
    assert_eq!(*v.downcast::<String>().unwrap(), "GET /items/1");
}

#[tokio::test]
async fn app_scoped_values_are_shared_across_requests() {
    let calls = Arc::new(AtomicUsize::new(0));
    let r = resolver(vec![
        counting("settings", &calls).in_scope(Scope::App),
        Provider::sync("handle", |args| args.dep::<usize>("s").map(|v| *v))
            .depends_on("s", Depends::on("settings")),
    ]);
    let state = Arc::new(AppState::new());
    let app = Arc::new(AppScope::start(&r, Arc::clone(&state)).await.unwrap());
    assert_eq!(app.len(), 1);

    let request = || {
        Arc::new(RequestParts::new(
            RequestId::new(),
            DispatchRequest::get("/"),
            ParamVec::new(),
        ))
    };
    let mut first = ResolutionContext::for_request(request(), Arc::clone(&app));
    let mut second = ResolutionContext::for_request(request(), Arc::clone(&app));
    let a = r.resolve_one(&mut first, &Depends::on("settings")).await.unwrap();
    let b = r.resolve_one(&mut second, &Depends::on("settings").no_cache()).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    r.resolve_one(&mut second, &Depends::on("handle")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn app_scope_cannot_depend_on_request_scope() {
    let r = resolver(vec![
        Provider::sync("per_request", |_| Ok(1_u8)),
        Provider::sync("global", |_| Ok(2_u8))
            .in_scope(Scope::App)
            .depends_on("p", Depends::on("per_request")),
    ]);
    let err = AppScope::start(&r, Arc::new(AppState::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::ScopeMismatch { .. }));
}
