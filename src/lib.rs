//! Typed deployment pipeline for a two-tier web stack.
//!
//! Gantry deploys a REST API service and a static-asset front end
//! behind a reverse proxy onto a single cloud VM - provisioning,
//! image publishing, and activation from one typed Rust DSL. No
//! YAML templates, no shell scripts, no manual SSH.
//!
//! The part that matters is the configuration propagation
//! contract: every environment-derived value (host allow-list,
//! proxy routes, image tags) is resolved, validated, and proven to
//! reach the running service *before* the live topology is
//! replaced. A broken link in that chain fails loudly at
//! activation instead of surfacing as a rejected request or a
//! silent 404 in production.
//!
//! # Overview
//!
//! A deployment is defined as a [`Pipeline`] that wires together:
//!
//! - Two [`App`]s describing the component containers (the API
//!   service and the static-asset/proxy image)
//! - A [`Caddy`] route table (`/api/*` to the API upstream, a
//!   static fallback for everything else)
//! - A [`RuntimeConfig`] injected at activation, never baked into
//!   an image
//! - A [`HostTopology`] plus a
//!   [`Provisioner`](provision::Provisioner) (e.g. [`Ec2`]) for
//!   the compute host
//! - A [`Registry`] the matched image pair is published to
//!
//! # Architecture
//!
//! The pipeline follows a three-stage model:
//!
//! 1. **Provision** - create a VM with ingress limited to
//!    22/80/443, install Docker, prepare the app directory.
//!    Idempotent: an unchanged topology returns the same host.
//! 2. **Publish** - build both component images independently, tag
//!    each with the immutable source revision plus `latest`, push
//!    the matched pair or fail the run. A lone artifact is never
//!    deployable.
//! 3. **Activate** - resolve and validate the runtime
//!    configuration, validate the route table, render the config
//!    files, pull the pinned images, then replace the running
//!    topology and swap the deployment ledger. Any validation
//!    failure leaves the previous deployment serving.
//!
//! Runs that replace the topology are serialized through a lock
//! file; overlapping triggers queue rather than race.
//!
//! # Examples
//!
//! Create an `xtask/src/main.rs` in your project:
//!
//! ```rust,no_run
//! use gantry::{
//!     App, Caddy, Ec2, HostTopology, Pipeline, Registry,
//!     RuntimeConfig,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let api = App::new("api")
//!         .context("backend")
//!         .dockerfile("backend/Dockerfile")
//!         .route_prefix("/api/")
//!         .healthcheck("curl -f http://localhost:8000/api/hello/")
//!         .expose(8000);
//!
//!     let proxy = App::new("proxy")
//!         .context("frontend")
//!         .dockerfile("frontend/Dockerfile");
//!
//!     let caddy = Caddy::new()
//!         .route("/api/*", api.upstream())
//!         .static_site("/srv/www", "/index.html")
//!         .gzip();
//!
//!     let pipeline = Pipeline::new(api, proxy, caddy)
//!         .topology(
//!             HostTopology::new("demo")
//!                 .region("ap-south-1")
//!                 .instance_class("t3.micro")
//!                 .elastic_address(true),
//!         )
//!         .provision(Ec2::new("demo-keypair"))
//!         .registry(Registry::new("registry.example.com/demo"))
//!         .runtime(
//!             RuntimeConfig::new()
//!                 .allowed_hosts("demo.example.com")
//!                 .debug(false),
//!         );
//!
//!     pipeline.run()?;
//!     Ok(())
//! }
//! ```
//!
//! Then use `cargo xtask` subcommands:
//!
//! ```sh
//! # Bring up the host (re-runnable, never duplicates)
//! cargo xtask provision
//!
//! # Build and push both images for the current commit
//! cargo xtask publish
//!
//! # Validate and activate; preview with --dry-run
//! cargo xtask activate --dry-run
//! cargo xtask activate
//!
//! # Everything at once, as CI would
//! cargo xtask run
//!
//! # Tear everything down
//! cargo xtask destroy
//! ```
//!
//! Rollback is a re-activate of a known-good revision:
//!
//! ```sh
//! cargo xtask activate --revision a1b2c3d
//! ```
//!
//! [`Provisioner`]: provision::Provisioner

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod activate;
pub mod app;
pub mod caddy;
pub mod caddyfile;
pub mod cmd;
pub mod compose;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod publish;
pub mod release;
pub mod ssh;
pub mod state;

pub use activate::{ActivationPlan, Activator};
pub use app::{App, Upstream};
pub use caddy::Caddy;
pub use config::RuntimeConfig;
pub use pipeline::Pipeline;
pub use provision::ec2::Ec2;
pub use provision::{HostRecord, HostTopology, ensure_host};
pub use publish::{Publisher, Registry};
pub use release::{ArtifactRef, Component, ReleaseManifest};
pub use state::{DeploymentState, RunLock, StateStore};
