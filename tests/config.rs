use gantry::RuntimeConfig;
use gantry::config::{
    ALLOWED_HOSTS_KEY, ConfigFault, DEBUG_KEY, Provenance, is_runtime_key, resolve_with,
    verify_delivery,
};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn permissive_default_when_allow_list_absent() {
    // Regression guard for the historically observed defect: an
    // absent allow-list must never silently become a closed one.
    let resolved = resolve_with(&RuntimeConfig::new(), no_env).unwrap();

    let entry = resolved.get(ALLOWED_HOSTS_KEY).unwrap();
    assert_eq!(entry.value, "*");
    assert_eq!(entry.provenance, Provenance::Default);
}

#[test]
fn explicit_empty_allow_list_fails_loudly() {
    let runtime = RuntimeConfig::new().allowed_hosts("   ");

    let err = resolve_with(&runtime, no_env).unwrap_err();
    assert!(matches!(err, ConfigFault::Empty { key } if key == ALLOWED_HOSTS_KEY));
}

#[test]
fn empty_environment_allow_list_fails_loudly() {
    let err = resolve_with(&RuntimeConfig::new(), |key| {
        (key == ALLOWED_HOSTS_KEY).then(String::new)
    })
    .unwrap_err();

    assert!(matches!(err, ConfigFault::Empty { .. }));
}

#[test]
fn every_recognized_key_resolves() {
    let resolved = resolve_with(&RuntimeConfig::new(), no_env).unwrap();

    assert!(resolved.get(ALLOWED_HOSTS_KEY).is_some());
    assert!(resolved.get(DEBUG_KEY).is_some());
}

#[test]
fn extra_entries_carry_explicit_provenance() {
    let runtime = RuntimeConfig::new().set("API_BASE", "/api");

    let resolved = resolve_with(&runtime, no_env).unwrap();
    let entry = resolved.get("API_BASE").unwrap();
    assert_eq!(entry.value, "/api");
    assert_eq!(entry.provenance, Provenance::Explicit);
}

#[test]
fn recognized_keys() {
    assert!(is_runtime_key("ALLOWED_HOSTS"));
    assert!(is_runtime_key("DEBUG"));
    assert!(!is_runtime_key("PYTHON_VERSION"));
}

#[test]
fn delivery_confirmed_when_environment_matches() {
    let runtime = RuntimeConfig::new().allowed_hosts("*").debug(false);
    let resolved = resolve_with(&runtime, no_env).unwrap();

    let compose = "\
services:
  api:
    image: r/api:a1b2c3d
    environment:
    - ALLOWED_HOSTS=*
    - DEBUG=false
";

    assert!(verify_delivery(&resolved, compose, "api").is_ok());
}

#[test]
fn resolved_but_absent_from_environment_is_undelivered() {
    // The fault class for "value present but not delivered to the
    // running process" - indistinguishable from a missing value
    // at request time, so it gets its own error.
    let runtime = RuntimeConfig::new().allowed_hosts("*").debug(false);
    let resolved = resolve_with(&runtime, no_env).unwrap();

    let compose = "\
services:
  api:
    image: r/api:a1b2c3d
    environment:
    - DEBUG=false
";

    let err = verify_delivery(&resolved, compose, "api").unwrap_err();
    assert!(matches!(
        err,
        ConfigFault::Undelivered { key, service }
            if key == ALLOWED_HOSTS_KEY && service == "api"
    ));
}

#[test]
fn modified_value_is_undelivered() {
    let runtime = RuntimeConfig::new().allowed_hosts("demo.example.com");
    let resolved = resolve_with(&runtime, no_env).unwrap();

    let compose = "\
services:
  api:
    environment:
    - ALLOWED_HOSTS=demo.example.co
    - DEBUG=false
";

    let err = verify_delivery(&resolved, compose, "api").unwrap_err();
    assert!(matches!(err, ConfigFault::Undelivered { .. }));
}

#[test]
fn wrong_service_is_undelivered() {
    let runtime = RuntimeConfig::new().allowed_hosts("*").debug(false);
    let resolved = resolve_with(&runtime, no_env).unwrap();

    let compose = "\
services:
  proxy:
    environment:
    - ALLOWED_HOSTS=*
    - DEBUG=false
";

    assert!(verify_delivery(&resolved, compose, "api").is_err());
}
