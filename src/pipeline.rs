use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::activate::Activator;
use crate::app::App;
use crate::caddy::Caddy;
use crate::config::RuntimeConfig;
use crate::error::{DeployError, DeployResult};
use crate::provision::{HostTopology, Provisioner, ensure_host};
use crate::publish::{Publisher, Registry};
use crate::release::{self, ArtifactRef, Component, ReleaseManifest};
use crate::state::{RunLock, StateStore};

const LOCK_WAIT: Duration = Duration::from_secs(600);

/// The deployment pipeline: provision, publish, activate.
///
/// Wires the two component [`App`]s, the proxy route table, a
/// [`Provisioner`], and a [`Registry`] behind a clap CLI. Each
/// operator action is idempotent and independently re-runnable;
/// `run` chains all three. Runs that replace the topology are
/// serialized through a lock file - a second trigger queues, it
/// never races the first.
pub struct Pipeline {
    api: App,
    proxy: App,
    caddy: Caddy,
    runtime: RuntimeConfig,
    topology: Option<HostTopology>,
    provisioner: Option<Box<dyn Provisioner>>,
    registry: Option<Registry>,
    activator: Activator,
    state_dir: PathBuf,
}

impl Pipeline {
    #[must_use]
    pub fn new(api: App, proxy: App, caddy: Caddy) -> Self {
        Self {
            api,
            proxy,
            caddy,
            runtime: RuntimeConfig::new(),
            topology: None,
            provisioner: None,
            registry: None,
            activator: Activator::new(),
            state_dir: PathBuf::from(".gantry"),
        }
    }

    #[must_use]
    pub fn topology(mut self, topology: HostTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    #[must_use]
    pub fn provision(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioner = Some(Box::new(provisioner));
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    #[must_use]
    pub fn ssh_user(mut self, user: &str) -> Self {
        self.activator = self.activator.ssh_user(user);
        self
    }

    #[must_use]
    pub fn ssh_key(mut self, key_path: &str) -> Self {
        self.activator = self.activator.ssh_key(key_path);
        self
    }

    #[must_use]
    pub fn remote_dir(mut self, dir: &str) -> Self {
        self.activator = self.activator.remote_dir(dir);
        self
    }

    /// Directory for the deployment ledger and the run lock.
    #[must_use]
    pub fn state_dir(mut self, dir: &str) -> Self {
        self.state_dir = PathBuf::from(dir);
        self
    }

    /// Parse CLI arguments and dispatch the appropriate command.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatched command fails.
    pub fn run(&self) -> DeployResult<()> {
        let cli = Cli::parse();

        match &cli.command {
            Command::Provision => self.cmd_provision().map(|_| ()),
            Command::Publish { revision } => {
                self.cmd_publish(revision.as_deref()).map(|_| ())
            }
            Command::Activate {
                host,
                revision,
                dry_run,
            } => self.cmd_activate(host.as_deref(), revision.as_deref(), *dry_run),
            Command::Run { revision } => self.cmd_run(revision.as_deref()),
            Command::Status { host } => self.cmd_status(host.as_deref()),
            Command::Destroy => self.cmd_destroy(),
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir)
    }

    fn provisioner(&self) -> DeployResult<&dyn Provisioner> {
        self.provisioner
            .as_deref()
            .ok_or_else(|| DeployError::Other("no provisioner configured".into()))
    }

    fn topology_ref(&self) -> DeployResult<&HostTopology> {
        self.topology
            .as_ref()
            .ok_or_else(|| DeployError::Other("no topology configured".into()))
    }

    fn registry_ref(&self) -> DeployResult<&Registry> {
        self.registry
            .as_ref()
            .ok_or_else(|| DeployError::Other("no registry configured".into()))
    }

    fn cmd_provision(&self) -> DeployResult<String> {
        let provisioner = self.provisioner()?;
        let topology = self.topology_ref()?;

        provisioner.check_prerequisites()?;
        let host = ensure_host(provisioner, topology)?;

        // A recreated host gets a new address; everything recorded
        // in the ledger still points at the old one.
        if let Some(prev) = self.store().current()? {
            if prev.host != host.address {
                eprintln!(
                    "WARNING: host address changed \
                     ({} -> {}); the recorded deployment refers to \
                     the old address. Re-run activate.",
                    prev.host, host.address
                );
            }
        }

        eprintln!("Activate with:");
        eprintln!("  cargo xtask activate {}", host.address);
        Ok(host.address)
    }

    fn cmd_publish(&self, revision: Option<&str>) -> DeployResult<ReleaseManifest> {
        let registry = self.registry_ref()?;
        let revision = match revision {
            Some(r) => r.to_string(),
            None => release::current_revision()?,
        };

        let publisher = Publisher::new(registry.clone());
        let manifest = publisher.publish(&self.api, &self.proxy, &revision)?;

        eprintln!("Published:");
        eprintln!("  {}", manifest.api.image());
        eprintln!("  {}", manifest.proxy.image());
        Ok(manifest)
    }

    fn cmd_activate(
        &self,
        host: Option<&str>,
        revision: Option<&str>,
        dry_run: bool,
    ) -> DeployResult<()> {
        let host = self.resolve_host(host)?;
        let manifest = self.manifest_for(revision)?;

        let plan = Activator::plan(&host, &self.api, &self.caddy, &manifest, &self.runtime)?;

        if dry_run {
            self.activator.print_dry_run(&plan);
            return Ok(());
        }

        let registry = self.registry_ref()?;
        let _lock = RunLock::acquire(&self.state_dir, LOCK_WAIT)?;
        self.activator
            .execute(&plan, registry, &self.api, &self.store())?;
        Ok(())
    }

    /// Full pipeline run, as a CI trigger would execute it:
    /// provision and publish (order-independent), then activate.
    fn cmd_run(&self, revision: Option<&str>) -> DeployResult<()> {
        let _lock = RunLock::acquire(&self.state_dir, LOCK_WAIT)?;

        let address = self.cmd_provision()?;
        let manifest = self.cmd_publish(revision)?;

        let plan = Activator::plan(&address, &self.api, &self.caddy, &manifest, &self.runtime)?;
        let registry = self.registry_ref()?;
        self.activator
            .execute(&plan, registry, &self.api, &self.store())?;
        Ok(())
    }

    fn cmd_status(&self, host: Option<&str>) -> DeployResult<()> {
        if let Some(current) = self.store().current()? {
            eprintln!(
                "Recorded deployment: v{} revision {} on {}",
                current.version, current.revision, current.host
            );
        } else {
            eprintln!("No recorded deployment.");
        }

        let host = self.resolve_host(host)?;
        let ssh = self.activator.session(&host);
        ssh.exec_interactive(&format!(
            "cd {} && docker compose ps",
            self.activator.remote_dir
        ))
    }

    fn cmd_destroy(&self) -> DeployResult<()> {
        let provisioner = self.provisioner()?;
        let topology = self.topology_ref()?;
        let name = topology.host_name();

        eprintln!(
            "WARNING: This will permanently delete \
             host '{name}' and its network resources"
        );
        eprintln!();

        eprint!("Are you sure? Type 'yes' to confirm: ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if input.trim() != "yes" {
            eprintln!("Aborted.");
            return Ok(());
        }

        provisioner.destroy_host(topology)?;

        if self.store().current()?.is_some() {
            eprintln!(
                "Note: the deployment ledger still records the last \
                 activation; it no longer serves traffic."
            );
        }

        eprintln!();
        eprintln!("Cleanup complete!");
        Ok(())
    }

    /// Host precedence: explicit argument, then the provisioned
    /// host, then the ledger.
    fn resolve_host(&self, explicit: Option<&str>) -> DeployResult<String> {
        if let Some(host) = explicit {
            return Ok(host.to_string());
        }

        if let (Some(provisioner), Some(topology)) = (&self.provisioner, &self.topology) {
            if let Some(host) = provisioner.find_host(topology)? {
                return Ok(host.address);
            }
        }

        if let Some(current) = self.store().current()? {
            return Ok(current.host);
        }

        Err(DeployError::Other(
            "no host: pass one explicitly or provision first".into(),
        ))
    }

    /// Reconstruct the manifest for an already-published revision.
    fn manifest_for(&self, revision: Option<&str>) -> DeployResult<ReleaseManifest> {
        let registry = self.registry_ref()?;
        let revision = match revision {
            Some(r) => r.to_string(),
            None => release::current_revision()?,
        };

        ReleaseManifest::pair(
            ArtifactRef::new(
                Component::Api,
                &registry.repo_for(&self.api.name),
                &revision,
            ),
            ArtifactRef::new(
                Component::Proxy,
                &registry.repo_for(&self.proxy.name),
                &revision,
            ),
        )
    }
}

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Deployment automation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision the compute host (idempotent)
    Provision,

    /// Build and push both component images
    Publish {
        /// Source revision to tag (defaults to the current commit)
        #[arg(long)]
        revision: Option<String>,
    },

    /// Validate and activate a published revision
    Activate {
        /// Hostname or IP address (defaults to the provisioned
        /// host)
        host: Option<String>,

        /// Revision to activate (defaults to the current commit)
        #[arg(long)]
        revision: Option<String>,

        /// Print the validated plan without executing
        #[arg(long)]
        dry_run: bool,
    },

    /// Provision, publish, and activate in one run
    Run {
        /// Source revision to tag (defaults to the current commit)
        #[arg(long)]
        revision: Option<String>,
    },

    /// Show the recorded deployment and remote container status
    Status {
        /// Hostname or IP address
        host: Option<String>,
    },

    /// Destroy the host and its resources
    Destroy,
}
