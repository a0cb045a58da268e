//! Activation: validate, render, then replace the running
//! topology.
//!
//! The plan step is pure. It resolves configuration, validates the
//! route table, renders both config files, and proves the resolved
//! values land in the service environment - all before anything
//! touches the host. Any failure there leaves the previous
//! deployment serving. The execute step pulls the pinned images
//! first, so the stop-then-start gap never serves two versions.

use std::thread;
use std::time::Duration;

use crate::app::App;
use crate::caddy::Caddy;
use crate::caddyfile;
use crate::compose;
use crate::config::{self, ResolvedConfig, RuntimeConfig};
use crate::error::{DeployError, DeployResult};
use crate::publish::Registry;
use crate::release::ReleaseManifest;
use crate::ssh::SshSession;
use crate::state::{self, DeploymentState, StateStore};

const PULL_ATTEMPTS: u32 = 4;
const PULL_BASE_DELAY: Duration = Duration::from_secs(5);

/// A validated, fully rendered activation, ready to execute.
#[derive(Debug)]
pub struct ActivationPlan {
    pub host: String,
    pub manifest: ReleaseManifest,
    pub resolved: ResolvedConfig,
    pub compose: String,
    pub caddyfile: String,
}

/// Performs the remote cutover for a validated plan.
pub struct Activator {
    pub ssh_user: String,
    pub ssh_key: Option<String>,
    pub remote_dir: String,
}

impl Default for Activator {
    fn default() -> Self {
        Self::new()
    }
}

impl Activator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ssh_user: "ubuntu".to_string(),
            ssh_key: None,
            remote_dir: "/opt/app".to_string(),
        }
    }

    #[must_use]
    pub fn ssh_user(mut self, user: &str) -> Self {
        self.ssh_user = user.to_string();
        self
    }

    #[must_use]
    pub fn ssh_key(mut self, key_path: &str) -> Self {
        self.ssh_key = Some(key_path.to_string());
        self
    }

    #[must_use]
    pub fn remote_dir(mut self, dir: &str) -> Self {
        self.remote_dir = dir.to_string();
        self
    }

    /// SSH session for `host` with the configured user and key.
    #[must_use]
    pub fn session(&self, host: &str) -> SshSession {
        let mut ssh = SshSession::new(host, &self.ssh_user);
        if let Some(key) = &self.ssh_key {
            ssh = ssh.with_key(key);
        }
        ssh
    }

    /// The mandated pre-swap validation step. Pure: no remote
    /// action, no state change. Fails with the precise fault class
    /// (resolution, routing gap, delivery) instead of letting the
    /// defect surface as a rejected request later.
    pub fn plan(
        host: &str,
        api: &App,
        caddy: &Caddy,
        manifest: &ReleaseManifest,
        runtime: &RuntimeConfig,
    ) -> DeployResult<ActivationPlan> {
        let resolved = config::resolve(runtime)?;

        caddy.validate_routes(std::slice::from_ref(api))?;

        let compose = compose::render(api, manifest, &resolved);
        config::verify_delivery(&resolved, &compose, &api.name)?;

        let caddyfile = caddyfile::render(caddy, host);

        Ok(ActivationPlan {
            host: host.to_string(),
            manifest: manifest.clone(),
            resolved,
            compose,
            caddyfile,
        })
    }

    /// Replace the running topology with the planned one and swap
    /// the ledger. Stop-then-start; the brief downtime is accepted
    /// at this scale. Every failure before the swap leaves the
    /// previous record current.
    pub fn execute(
        &self,
        plan: &ActivationPlan,
        registry: &Registry,
        api: &App,
        store: &StateStore,
    ) -> DeployResult<DeploymentState> {
        eprintln!("Activating revision {} on {}...", plan.manifest.revision, plan.host);

        let ssh = self.session(&plan.host);

        eprintln!("Writing deployment config...");
        ssh.write_remote_file(&plan.compose, &format!("{}/docker-compose.yml", self.remote_dir))?;
        ssh.write_remote_file(&plan.caddyfile, &format!("{}/Caddyfile", self.remote_dir))?;

        self.remote_login(&ssh, registry)?;
        self.pull_images(&ssh)?;

        eprintln!("Replacing topology...");
        ssh.exec_streamed(&format!(
            "cd {} && \
             docker compose down 2>/dev/null || true && \
             docker compose up -d",
            self.remote_dir
        ))
        .map_err(classify_engine_error)?;

        self.wait_healthy(&ssh, api)?;

        let mut record = DeploymentState {
            version: 0,
            host: plan.host.clone(),
            revision: plan.manifest.revision.clone(),
            api_image: plan.manifest.api.image(),
            proxy_image: plan.manifest.proxy.image(),
            config: plan.resolved.to_env(),
            activated_at: state::unix_now(),
        };
        let previous = store.swap(&mut record)?;

        if let Some(prev) = previous {
            eprintln!(
                "Deployment v{} replaced v{} (was revision {})",
                record.version, prev.version, prev.revision
            );
        }

        eprintln!();
        eprintln!("Activation complete!");
        eprintln!("Application available at: http://{}", plan.host);

        Ok(record)
    }

    /// Print what an activation would do, without touching the
    /// host.
    pub fn print_dry_run(&self, plan: &ActivationPlan) {
        eprintln!("=== Dry run: no changes will be made ===");
        eprintln!();

        eprintln!("--- resolved configuration ---");
        for entry in plan.resolved.iter() {
            eprintln!("{}={} ({:?})", entry.key, entry.value, entry.provenance);
        }
        eprintln!();

        eprintln!("--- docker-compose.yml ---");
        println!("{}", plan.compose);

        eprintln!("--- Caddyfile ---");
        println!("{}", plan.caddyfile);

        eprintln!("--- Actions that would be performed ---");
        eprintln!("1. Write config files to {}/", self.remote_dir);
        eprintln!("2. Pull {} and {}", plan.manifest.api.image(), plan.manifest.proxy.image());
        eprintln!("3. Replace containers via docker compose");
        eprintln!("4. Record deployment in the state ledger");
    }

    fn remote_login(&self, ssh: &SshSession, registry: &Registry) -> DeployResult<()> {
        let token = registry.token()?;
        ssh.exec_with_stdin(
            &format!(
                "docker login {} -u {} --password-stdin",
                registry.location, registry.username
            ),
            token.as_bytes(),
        )
        .map_err(classify_engine_error)?;
        Ok(())
    }

    /// Pull the pinned images with exponential backoff, then
    /// fatal. Pulling before the stop keeps the downtime window to
    /// the container restart itself.
    fn pull_images(&self, ssh: &SshSession) -> DeployResult<()> {
        eprintln!("Pulling images...");
        let mut delay = PULL_BASE_DELAY;

        for attempt in 1..=PULL_ATTEMPTS {
            match ssh.exec_streamed(&format!("cd {} && docker compose pull", self.remote_dir)) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < PULL_ATTEMPTS => {
                    eprintln!(
                        "  Pull attempt {attempt}/{PULL_ATTEMPTS} failed: \
                         {err}; retrying in {}s",
                        delay.as_secs()
                    );
                    thread::sleep(delay);
                    delay *= 2;
                }
                Err(err) => return Err(classify_engine_error(err)),
            }
        }

        unreachable!("pull loop returns on success or final failure")
    }

    fn wait_healthy(&self, ssh: &SshSession, api: &App) -> DeployResult<()> {
        const MAX_ATTEMPTS: u32 = 30;
        const INTERVAL: Duration = Duration::from_secs(5);

        if api.healthcheck.is_none() {
            eprintln!("No healthcheck configured, waiting 5s...");
            thread::sleep(Duration::from_secs(5));
            return Ok(());
        }

        eprintln!("Waiting for '{}' to be healthy...", api.name);

        for attempt in 1..=MAX_ATTEMPTS {
            let output = ssh.exec(&format!(
                "cd {} && \
                 docker inspect \
                 --format='{{{{.State.Health.Status}}}}' {}",
                self.remote_dir, api.name
            ));

            match output {
                Ok(status) => {
                    let status = status.trim();
                    eprint!(
                        "  Health check ({attempt}/{MAX_ATTEMPTS}): \
                         {status}"
                    );
                    if status == "healthy" {
                        eprintln!();
                        return Ok(());
                    }
                    eprintln!(" - retrying...");
                }
                Err(_) => {
                    eprintln!(
                        "  Health check ({attempt}/{MAX_ATTEMPTS}): \
                         waiting for container..."
                    );
                }
            }

            thread::sleep(INTERVAL);
        }

        Err(DeployError::HealthcheckTimeout(api.name.clone(), MAX_ATTEMPTS))
    }
}

fn classify_engine_error(err: DeployError) -> DeployError {
    match err {
        DeployError::CommandFailed { stderr, .. }
            if stderr.contains("permission denied") && stderr.contains("docker") =>
        {
            DeployError::Access(
                "the remote user cannot reach the Docker daemon. \
                 Add it to the 'docker' group on the host and re-login"
                    .into(),
            )
        }
        other => other,
    }
}
