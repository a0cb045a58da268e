//! Full two-tier deployment pipeline.
//!
//! Provisions an EC2 host, publishes the API and proxy images to
//! a registry, and activates them behind Caddy with path routing.
//!
//! ```sh
//! # Bring up the host
//! cargo xtask provision
//!
//! # Build and push both images for the current commit
//! cargo xtask publish
//!
//! # Validate and activate
//! cargo xtask activate
//!
//! # Tear everything down
//! cargo xtask destroy
//! ```

use gantry::{App, Caddy, Ec2, HostTopology, Pipeline, Registry, RuntimeConfig};

fn main() -> anyhow::Result<()> {
    let api = App::new("api")
        .context("backend")
        .dockerfile("backend/Dockerfile")
        .route_prefix("/api/")
        .volume("api-data", "/app/data")
        .healthcheck("curl -f http://localhost:8000/api/hello/")
        .expose(8000);

    let proxy = App::new("proxy")
        .context("frontend")
        .dockerfile("frontend/Dockerfile");

    let caddy = Caddy::new()
        .route("/api/*", api.upstream())
        .static_site("/srv/www", "/index.html")
        .gzip()
        .security_headers();

    let pipeline = Pipeline::new(api, proxy, caddy)
        .topology(
            HostTopology::new("demo")
                .region("ap-south-1")
                .instance_class("t3.micro")
                .ssh_ingress("203.0.113.0/24")
                .elastic_address(true),
        )
        .provision(Ec2::new("demo-keypair").ssh_key_file("~/.ssh/demo-keypair.pem"))
        .registry(Registry::new("registry.example.com/demo").token_env("REGISTRY_TOKEN"))
        .runtime(
            RuntimeConfig::new()
                .allowed_hosts("demo.example.com")
                .debug(false),
        );

    pipeline.run()?;
    Ok(())
}
