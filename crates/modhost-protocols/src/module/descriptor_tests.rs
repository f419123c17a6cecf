use super::*;
use serde_json::json;

#[test]
fn test_descriptor_new() {
    let descriptor = ModuleDescriptor::new("greeter", "1.0.0");
    assert_eq!(descriptor.id, "greeter");
    assert_eq!(descriptor.version, "1.0.0");
    assert!(descriptor.description.is_empty());
    assert!(descriptor.authors.is_empty());
    assert!(descriptor.dependencies.is_empty());
    assert!(descriptor.config.is_null());
}

#[test]
fn test_descriptor_builders() {
    let descriptor = ModuleDescriptor::new("greeter", "1.0.0")
        .with_description("Says hello")
        .with_author("Ada")
        .with_author("Linus")
        .with_dependency("core")
        .with_config(json!({"greeting": "hi"}));

    assert_eq!(descriptor.description, "Says hello");
    assert_eq!(descriptor.authors, vec!["Ada", "Linus"]);
    assert!(descriptor.depends_on("core"));
    assert!(!descriptor.depends_on("other"));
    assert_eq!(descriptor.config["greeting"], "hi");
}

#[test]
fn test_entry_defaults_to_id() {
    let descriptor = ModuleDescriptor::new("greeter", "1.0.0");
    assert_eq!(descriptor.entry(), "greeter");

    let descriptor = descriptor.with_entry("hello-factory");
    assert_eq!(descriptor.entry(), "hello-factory");
}

#[test]
fn test_authors_keep_order() {
    let descriptor = ModuleDescriptor::new("m", "1")
        .with_author("zed")
        .with_author("amy");
    assert_eq!(descriptor.authors[0], "zed");
    assert_eq!(descriptor.authors[1], "amy");
}

#[test]
fn test_descriptor_deserialize_minimal() {
    let descriptor: ModuleDescriptor =
        serde_json::from_value(json!({"id": "a", "version": "0.1.0"})).unwrap();
    assert_eq!(descriptor.id, "a");
    assert!(descriptor.entry.is_none());
    assert!(descriptor.dependencies.is_empty());
}

#[test]
fn test_descriptor_skips_empty_fields_when_serialized() {
    let descriptor = ModuleDescriptor::new("a", "0.1.0");
    let value = serde_json::to_value(&descriptor).unwrap();
    assert!(value.get("entry").is_none());
    assert!(value.get("config").is_none());
}
