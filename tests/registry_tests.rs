//! Registration, lookup and the descriptions handed to schema generators

use http::Method;
use routekit::{
    BodyParam, Depends, Handler, ParamType, Primitive, RegistrationError, RouteRegistry,
    RouteSpec, SchemaModel, ValueParam,
};
use serde_json::json;
use std::sync::Arc;

fn noop() -> Handler {
    Handler::sync(|_| Ok(json!({})))
}

fn item_model() -> Arc<SchemaModel> {
    Arc::new(
        SchemaModel::new(
            "Item",
            json!({
                "type": "object",
                "required": ["name"],
                "properties": { "name": { "type": "string" } }
            }),
        )
        .unwrap(),
    )
}

fn catalog() -> RouteRegistry {
    let mut registry = RouteRegistry::new();
    registry
        .add(
            RouteSpec::get("/items", noop())
                .tag("items")
                .param(ValueParam::query("tag", ParamType::List(Primitive::String)).optional())
                .param(ValueParam::query("limit", Primitive::Integer).default(20)),
        )
        .unwrap();
    registry
        .add(
            RouteSpec::post("/items", noop())
                .tag("items")
                .tag("write")
                .summary("Create an item")
                .param(BodyParam::new("item", item_model()))
                .depends("db", Depends::on("get_db")),
        )
        .unwrap();
    registry
        .add(
            RouteSpec::get("/internal/stats", noop())
                .include_in_schema(false)
                .deprecated(true),
        )
        .unwrap();
    registry
}

#[test]
fn test_lookup_by_path_and_tag() {
    let registry = catalog();
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get_by_path("/items").len(), 2);
    assert_eq!(registry.get_by_path("/items/").len(), 2);
    assert_eq!(registry.get_by_tag("write").len(), 1);
    assert_eq!(registry.get_by_tag("items").len(), 2);
    assert!(registry.get_by_tag("nope").is_empty());

    let names: Vec<String> = registry.iter().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec!["get_items", "post_items", "get_internal_stats"]);
}

#[test]
fn test_duplicate_pair_is_rejected_atomically() {
    let mut registry = catalog();
    let err = registry
        .add(RouteSpec::new(
            "/items/",
            &[Method::DELETE, Method::GET],
            noop(),
        ))
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::DuplicateRoute {
            path: "/items".into(),
            method: Method::GET,
        }
    );
    // DELETE was not registered either
    assert_eq!(registry.get_by_path("/items").len(), 2);
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_invalid_declarations() {
    let mut registry = RouteRegistry::new();
    assert!(matches!(
        registry.add(RouteSpec::get("/items/{id", noop())),
        Err(RegistrationError::InvalidPattern { .. })
    ));
    assert!(matches!(
        registry.add(
            RouteSpec::get("/items", noop()).param(ValueParam::path("id", Primitive::Integer))
        ),
        Err(RegistrationError::UndeclaredPathParam { ref param, .. }) if param == "id"
    ));
    assert!(matches!(
        registry.add(
            RouteSpec::get("/items", noop())
                .param(ValueParam::query("q", Primitive::String))
                .param(ValueParam::header("q", Primitive::String))
        ),
        Err(RegistrationError::DuplicateParameter { .. })
    ));
    assert!(matches!(
        registry.add(RouteSpec::new("/items", &[], noop())),
        Err(RegistrationError::NoMethods { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_describe_serializes_for_schema_generators() {
    let registry = catalog();
    let described = serde_json::to_value(registry.describe()).unwrap();

    let list = &described[0];
    assert_eq!(list["methods"], json!(["GET"]));
    assert_eq!(list["status"], 200);
    assert_eq!(list["parameters"][0]["type"], "list<string>");
    assert_eq!(list["parameters"][0]["required"], false);
    assert_eq!(list["parameters"][1]["default"], 20);

    let create = &described[1];
    assert_eq!(create["status"], 201);
    assert_eq!(create["summary"], "Create an item");
    assert_eq!(create["tags"], json!(["items", "write"]));
    assert_eq!(create["dependencies"], json!(["get_db"]));
    assert_eq!(create["parameters"][0]["location"], "body");
    assert_eq!(create["parameters"][0]["model"], "Item");
    assert_eq!(create["parameters"][0]["schema"]["required"], json!(["name"]));

    let internal = &described[2];
    assert_eq!(internal["include_in_schema"], false);
    assert_eq!(internal["deprecated"], true);
}
