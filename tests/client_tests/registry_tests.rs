//! Registry Tests
//!
//! Tests for named client setup and teardown.

use std::sync::Arc;

use mcpipe::{ClientRegistry, McError, ProtocolKind};

#[test]
fn test_setup_and_get() {
    let registry = ClientRegistry::new();
    let client = registry.setup("sessions", ["127.0.0.1:11211"]).unwrap();

    assert_eq!(client.protocol(), ProtocolKind::Text);
    let found = registry.get("sessions").unwrap();
    assert!(Arc::ptr_eq(&client, &found));
    assert!(registry.get("other").is_none());
}

#[test]
fn test_setup_binary() {
    let registry = ClientRegistry::new();
    let client = registry.setup_binary("pages", ["127.0.0.1:11211"]).unwrap();
    assert_eq!(client.protocol(), ProtocolKind::Binary);
}

#[test]
fn test_duplicate_name_rejected() {
    let registry = ClientRegistry::new();
    registry.setup("a", ["127.0.0.1:11211"]).unwrap();
    let result = registry.setup("a", ["127.0.0.1:11212"]);
    assert!(matches!(result, Err(McError::Config(_))));
}

#[test]
fn test_invalid_servers_rejected() {
    let registry = ClientRegistry::new();
    assert!(registry.setup("a", Vec::<String>::new()).is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_remove_and_reset() {
    let registry = ClientRegistry::new();
    registry.setup("a", ["127.0.0.1:11211"]).unwrap();
    registry.setup("b", ["127.0.0.1:11211"]).unwrap();
    assert_eq!(registry.len(), 2);

    assert!(registry.remove("a").is_some());
    assert!(registry.remove("a").is_none());
    registry.reset();
    assert!(registry.is_empty());
}
