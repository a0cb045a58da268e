use gantry::App;

#[test]
fn defaults() {
    let app = App::new("api");

    assert_eq!(app.name, "api");
    assert_eq!(app.context, ".");
    assert_eq!(app.dockerfile, "Dockerfile");
    assert_eq!(app.platform, "linux/amd64");
    assert!(app.build_args.is_empty());
    assert!(app.env.is_empty());
    assert!(app.volumes.is_empty());
    assert!(app.expose.is_empty());
    assert!(app.healthcheck.is_none());
    assert!(app.route_prefixes.is_empty());
}

#[test]
fn builder_chain() {
    let app = App::new("api")
        .context("backend")
        .dockerfile("backend/Dockerfile")
        .platform("linux/arm64")
        .build_arg("PYTHON_VERSION", "3.12")
        .env("WORKERS", "2")
        .volume("api-data", "/app/data")
        .expose(8000)
        .healthcheck("curl -f http://localhost:8000/api/hello/")
        .route_prefix("/api/");

    assert_eq!(app.context, "backend");
    assert_eq!(app.dockerfile, "backend/Dockerfile");
    assert_eq!(app.platform, "linux/arm64");
    assert_eq!(
        app.build_args,
        vec![("PYTHON_VERSION".into(), "3.12".into())]
    );
    assert_eq!(app.env, vec![("WORKERS".into(), "2".into())]);
    assert_eq!(app.volumes, vec![("api-data".into(), "/app/data".into())]);
    assert_eq!(app.expose, vec![8000]);
    assert_eq!(
        app.healthcheck.as_deref(),
        Some("curl -f http://localhost:8000/api/hello/")
    );
    assert_eq!(app.route_prefixes, vec!["/api/"]);
}

#[test]
fn upstream_address() {
    let app = App::new("api").expose(8000);

    assert_eq!(app.upstream().to_string(), "api:8000");
}

#[test]
fn multiple_route_prefixes() {
    let app = App::new("api").route_prefix("/api/").route_prefix("/admin/");

    assert_eq!(app.route_prefixes, vec!["/api/", "/admin/"]);
}
