//! Build and print an activation plan without a host or registry.
//!
//! Shows the pure validation path: configuration resolution with
//! provenance, route table validation, and the rendered
//! Caddyfile and compose file for a pinned revision.

use gantry::{
    Activator, App, ArtifactRef, Caddy, Component, ReleaseManifest, RuntimeConfig,
};

fn main() -> anyhow::Result<()> {
    let api = App::new("api")
        .route_prefix("/api/")
        .healthcheck("curl -f http://localhost:8000/api/hello/")
        .expose(8000);

    let caddy = Caddy::new()
        .route("/api/*", api.upstream())
        .static_site("/srv/www", "/index.html");

    let manifest = ReleaseManifest::pair(
        ArtifactRef::new(Component::Api, "registry.example.com/demo/api", "a1b2c3d"),
        ArtifactRef::new(Component::Proxy, "registry.example.com/demo/proxy", "a1b2c3d"),
    )?;

    let runtime = RuntimeConfig::new().allowed_hosts("*").debug(false);

    let plan = Activator::plan("203.0.113.10", &api, &caddy, &manifest, &runtime)?;
    Activator::new().print_dry_run(&plan);

    Ok(())
}
