use gantry::compose;
use gantry::config::{RuntimeConfig, resolve_with};
use gantry::{App, ArtifactRef, Component, ReleaseManifest};

fn manifest() -> ReleaseManifest {
    ReleaseManifest::pair(
        ArtifactRef::new(Component::Api, "registry.example.com/demo/api", "a1b2c3d"),
        ArtifactRef::new(Component::Proxy, "registry.example.com/demo/proxy", "a1b2c3d"),
    )
    .unwrap()
}

fn api() -> App {
    App::new("api")
        .expose(8000)
        .healthcheck("curl -f http://localhost:8000/api/hello/")
        .volume("api-data", "/app/data")
}

fn resolved(runtime: &RuntimeConfig) -> gantry::config::ResolvedConfig {
    resolve_with(runtime, |_| None).unwrap()
}

#[test]
fn images_are_pinned_to_the_revision_tag() {
    let runtime = RuntimeConfig::new().allowed_hosts("*");
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    assert!(yaml.contains("registry.example.com/demo/api:a1b2c3d"));
    assert!(yaml.contains("registry.example.com/demo/proxy:a1b2c3d"));
    assert!(!yaml.contains(":latest"));
}

#[test]
fn resolved_config_lands_in_api_environment() {
    let runtime = RuntimeConfig::new()
        .allowed_hosts("demo.example.com")
        .debug(false);
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let env = doc["services"]["api"]["environment"]
        .as_sequence()
        .unwrap();
    let lines: Vec<&str> = env.iter().filter_map(|v| v.as_str()).collect();

    assert!(lines.contains(&"ALLOWED_HOSTS=demo.example.com"));
    assert!(lines.contains(&"DEBUG=false"));
}

#[test]
fn explicit_value_round_trips_verbatim() {
    // No truncation, no default override of a supplied value.
    let pattern = ".example.com,demo.example.com,203.0.113.10";
    let runtime = RuntimeConfig::new().allowed_hosts(pattern);
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    assert!(yaml.contains(&format!("ALLOWED_HOSTS={pattern}")));
}

#[test]
fn app_env_never_shadows_resolved_keys() {
    let app = api().env("ALLOWED_HOSTS", "stale.example.com").env("WORKERS", "2");
    let runtime = RuntimeConfig::new().allowed_hosts("fresh.example.com");
    let yaml = compose::render(&app, &manifest(), &resolved(&runtime));

    assert!(yaml.contains("ALLOWED_HOSTS=fresh.example.com"));
    assert!(!yaml.contains("stale.example.com"));
    assert!(yaml.contains("WORKERS=2"));
}

#[test]
fn proxy_service_shape() {
    let runtime = RuntimeConfig::new().allowed_hosts("*");
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let proxy = &doc["services"]["proxy"];

    let ports: Vec<&str> = proxy["ports"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(ports, vec!["80:80", "443:443"]);

    let volumes: Vec<&str> = proxy["volumes"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(volumes.contains(&"./Caddyfile:/etc/caddy/Caddyfile:ro"));

    // The proxy carries no injected configuration.
    assert!(proxy.get("environment").is_none_or(|e| e.as_sequence().is_none_or(Vec::is_empty)));
}

#[test]
fn proxy_waits_for_healthy_api() {
    let runtime = RuntimeConfig::new().allowed_hosts("*");
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(
        doc["services"]["proxy"]["depends_on"]["api"]["condition"]
            .as_str()
            .unwrap(),
        "service_healthy"
    );
}

#[test]
fn api_healthcheck_and_volumes() {
    let runtime = RuntimeConfig::new().allowed_hosts("*");
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let service = &doc["services"]["api"];

    let test: Vec<&str> = service["healthcheck"]["test"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(test[0], "CMD");
    assert!(test.contains(&"curl -f http://localhost:8000/api/hello/"));

    let volumes: Vec<&str> = service["volumes"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(volumes, vec!["api-data:/app/data"]);

    assert!(doc["volumes"].get("api-data").is_some());
    assert!(doc["volumes"].get("caddy-data").is_some());
}

#[test]
fn services_share_one_bridge_network() {
    let runtime = RuntimeConfig::new().allowed_hosts("*");
    let yaml = compose::render(&api(), &manifest(), &resolved(&runtime));

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(
        doc["networks"]["api-net"]["driver"].as_str().unwrap(),
        "bridge"
    );
    for service in ["proxy", "api"] {
        let nets: Vec<&str> = doc["services"][service]["networks"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(nets, vec!["api-net"]);
    }
}
