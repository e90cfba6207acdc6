use serde_json::{json, Map, Value};

use crate::plugin_system::args::{
    infer_schema, parse_args, ArgEnum, ArgSchema, ArgType, EnumChoice, ParamDecl,
};
use crate::plugin_system::error::PluginSystemError;

enum Quality {
    Hd,
    Uhd,
}

impl ArgEnum for Quality {
    fn choices() -> Vec<EnumChoice> {
        vec![EnumChoice::new("HD", "1080p"), EnumChoice::new("UHD", "2160p")]
    }

    fn name(&self) -> &'static str {
        match self {
            Quality::Hd => "HD",
            Quality::Uhd => "UHD",
        }
    }
}

fn raw(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

#[test]
fn test_infers_plain_typed_parameters() {
    let schema = infer_schema(&[
        ParamDecl::context("ctx"),
        ParamDecl::typed::<String>("name"),
        ParamDecl::typed::<i64>("count").with_default(5),
    ]);

    assert_eq!(schema.names(), vec!["name", "count"]);

    let name = schema.get("name").unwrap();
    assert_eq!(name.arg_type, ArgType::String);
    assert_eq!(name.label, "name");
    assert_eq!(name.help_text, "name");
    assert!(name.required);
    assert_eq!(name.default_value, None);

    let count = schema.get("count").unwrap();
    assert_eq!(count.arg_type, ArgType::Int);
    assert!(!count.required);
    assert_eq!(count.default_value, Some(json!(5)));
}

#[test]
fn test_infers_annotated_parameters() {
    let schema = infer_schema(&[
        ParamDecl::structured("title", ArgType::String, "Title", "Media title to search for"),
        ParamDecl::tuple("year", (ArgType::Int, "Year", "Release year")).with_default(Value::Null),
        ParamDecl::enumeration::<Quality>("quality").with_enum_default(Quality::Uhd),
        ParamDecl::schema("site", ArgSchema::new(ArgType::String, "Site", "Indexer site").with_default("all")),
        ParamDecl::untyped("note"),
    ]);

    let title = schema.get("title").unwrap();
    assert_eq!((title.label.as_str(), title.help_text.as_str()), ("Title", "Media title to search for"));
    assert!(title.required);

    let year = schema.get("year").unwrap();
    assert_eq!(year.arg_type, ArgType::Int);
    assert!(!year.required);
    assert_eq!(year.default_value, None);

    let quality = schema.get("quality").unwrap();
    assert_eq!(quality.arg_type, ArgType::Enum);
    assert_eq!(quality.default_value, Some(json!("UHD")));
    assert_eq!(quality.accepted_values(), vec!["1080p", "2160p"]);

    let site = schema.get("site").unwrap();
    assert_eq!(site.name, "site");
    assert_eq!(site.default_value, Some(json!("all")));

    let note = schema.get("note").unwrap();
    assert_eq!(note.arg_type, ArgType::String);
    assert!(note.required);
}

#[test]
fn test_later_declaration_replaces_earlier() {
    let schema = infer_schema(&[
        ParamDecl::typed::<String>("id"),
        ParamDecl::typed::<String>("kind"),
        ParamDecl::typed::<i64>("id"),
    ]);
    assert_eq!(schema.names(), vec!["id", "kind"]);
    assert_eq!(schema.get("id").unwrap().arg_type, ArgType::Int);
}

#[test]
fn test_parse_args_applies_defaults_and_coerces() {
    let schema = infer_schema(&[
        ParamDecl::typed::<String>("name"),
        ParamDecl::typed::<i64>("count").with_default(5),
    ]);

    let parsed = parse_args(&raw(json!({"name": "Dune", "unused": true})), &schema).unwrap();
    assert_eq!(parsed.get("name"), Some(&json!("Dune")));
    assert_eq!(parsed.get("count"), Some(&json!(5)));
    assert!(!parsed.contains_key("unused"));

    let parsed = parse_args(&raw(json!({"name": 42, "count": " 7 "})), &schema).unwrap();
    assert_eq!(parsed.get("name"), Some(&json!("42")));
    assert_eq!(parsed.get("count"), Some(&json!(7)));

    let parsed = parse_args(&raw(json!({"name": "x", "count": 0})), &schema).unwrap();
    assert_eq!(parsed.get("count"), Some(&json!(0)));
}

#[test]
fn test_parse_args_rejects_missing_required_values() {
    let schema = infer_schema(&[ParamDecl::typed::<String>("name")]);

    for blank in [json!({}), json!({"name": null}), json!({"name": ""}), json!({"name": []})] {
        let err = parse_args(&raw(blank), &schema).unwrap_err();
        assert!(matches!(err, PluginSystemError::InvalidParameter { ref param, .. } if param == "name"));
    }
}

#[test]
fn test_parse_args_rejects_bad_integers() {
    let schema = infer_schema(&[ParamDecl::typed::<i64>("count")]);
    let err = parse_args(&raw(json!({"count": "many"})), &schema).unwrap_err();
    assert!(matches!(err, PluginSystemError::InvalidParameter { ref param, .. } if param == "count"));
    assert!(parse_args(&raw(json!({"count": 1.5})), &schema).is_err());
}

#[test]
fn test_parse_args_rejects_integers_out_of_range() {
    let schema = infer_schema(&[ParamDecl::typed::<i64>("count")]);

    for too_large in [json!(1e20), json!(-1e20), json!(u64::MAX), json!("99999999999999999999")] {
        let err = parse_args(&raw(json!({"count": too_large})), &schema).unwrap_err();
        assert!(matches!(err, PluginSystemError::InvalidParameter { ref param, .. } if param == "count"));
    }

    let parsed = parse_args(&raw(json!({"count": 3.0})), &schema).unwrap();
    assert_eq!(parsed.get("count"), Some(&json!(3)));
    let parsed = parse_args(&raw(json!({"count": i64::MIN})), &schema).unwrap();
    assert_eq!(parsed.get("count"), Some(&json!(i64::MIN)));
}

#[test]
fn test_annotated_enum_parameters_take_declared_choices() {
    let schema = infer_schema(&[
        ParamDecl::tuple("q", (ArgType::Enum, "Quality", "Preferred quality")).with_choices::<Quality>(),
        ParamDecl::structured("site", ArgType::Enum, "Site", "Indexer")
            .with_choice_supplier(|| vec![EnumChoice::new("One", "one")])
            .with_default("one"),
    ]);

    assert_eq!(schema.get("q").unwrap().accepted_values(), vec!["1080p", "2160p"]);
    let parsed = parse_args(&raw(json!({"q": "1080p"})), &schema).unwrap();
    assert_eq!(parsed.get("q"), Some(&json!("1080p")));
    assert_eq!(parsed.get("site"), Some(&json!("one")));
    assert!(parse_args(&raw(json!({"q": "720p"})), &schema).is_err());
    assert!(parse_args(&raw(json!({"q": "1080p", "site": "two"})), &schema).is_err());
}

#[test]
fn test_schema_choices_win_over_declared_choices() {
    let schema = infer_schema(&[ParamDecl::schema(
        "site",
        ArgSchema::new(ArgType::Enum, "Site", "Indexer").with_enum_values(vec![EnumChoice::new("A", "a")]),
    )
    .with_choices::<Quality>()]);
    assert_eq!(schema.get("site").unwrap().accepted_values(), vec!["a"]);
}

#[test]
fn test_parse_args_validates_enum_values() {
    let schema = infer_schema(&[ParamDecl::enumeration::<Quality>("quality")]);

    assert!(parse_args(&raw(json!({"quality": "1080p"})), &schema).is_ok());
    assert!(parse_args(&raw(json!({"quality": ["1080p", "2160p"]})), &schema).is_ok());

    let err = parse_args(&raw(json!({"quality": "720p"})), &schema).unwrap_err();
    assert!(err.to_string().contains("1080p, 2160p"));
    assert!(parse_args(&raw(json!({"quality": ["1080p", "480p"]})), &schema).is_err());
}

#[test]
fn test_enum_supplier_is_resolved_on_each_parse() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let schema = infer_schema(&[ParamDecl::schema(
        "site",
        ArgSchema::new(ArgType::Enum, "Site", "Indexer").with_enum_supplier(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![EnumChoice::new("One", "one")]
        }),
    )]);

    assert!(parse_args(&raw(json!({"site": "one"})), &schema).is_ok());
    assert!(parse_args(&raw(json!({"site": "two"})), &schema).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_schema_serializes_in_declaration_order() {
    let schema = infer_schema(&[
        ParamDecl::typed::<String>("name"),
        ParamDecl::enumeration::<Quality>("quality").with_enum_default(Quality::Hd),
    ]);
    let value = serde_json::to_value(&schema).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["name", "quality"]);

    assert_eq!(value["name"]["argType"], json!("String"));
    assert_eq!(value["name"]["enumValues"], Value::Null);
    assert_eq!(value["quality"]["defaultValue"], json!("HD"));
    assert_eq!(
        value["quality"]["enumValues"],
        json!([{"name": "HD", "value": "1080p"}, {"name": "UHD", "value": "2160p"}])
    );
}
