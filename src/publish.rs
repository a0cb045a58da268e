//! Building and pushing the two component images.
//!
//! The components build independently; one failure never lets the
//! other slip through as deployable. Only when both builds succeed
//! are the pushes performed and a matched [`ReleaseManifest`]
//! returned.

use crate::app::App;
use crate::cmd;
use crate::config;
use crate::error::{DeployError, DeployResult};
use crate::release::{ArtifactRef, Component, ReleaseManifest};

/// A shared image registry. The credential is opaque: read from
/// the named environment variable at publish time, piped over
/// stdin, never placed in argv or persisted anywhere.
#[derive(Debug, Clone)]
pub struct Registry {
    pub location: String,
    pub username: String,
    pub token_env: String,
}

impl Registry {
    #[must_use]
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            username: "oauth2".to_string(),
            token_env: "REGISTRY_TOKEN".to_string(),
        }
    }

    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    #[must_use]
    pub fn token_env(mut self, var: &str) -> Self {
        self.token_env = var.to_string();
        self
    }

    /// Full repository path for a component image.
    #[must_use]
    pub fn repo_for(&self, name: &str) -> String {
        format!("{}/{name}", self.location)
    }

    pub fn token(&self) -> DeployResult<String> {
        std::env::var(&self.token_env)
            .map_err(|_| DeployError::EnvMissing(self.token_env.clone()))
    }
}

/// Seam over the container CLI so publishing logic is testable
/// without a daemon.
pub trait ContainerEngine {
    fn login(&self, registry: &Registry) -> DeployResult<()>;

    /// Build an image from the app's context and apply every tag.
    fn build(&self, app: &App, tags: &[String]) -> DeployResult<()>;

    fn push(&self, image: &str) -> DeployResult<()>;
}

/// [`ContainerEngine`] backed by the `docker` CLI.
pub struct DockerCli;

impl ContainerEngine for DockerCli {
    fn login(&self, registry: &Registry) -> DeployResult<()> {
        let token = registry.token()?;
        cmd::run_with_stdin(
            "docker",
            &[
                "login",
                &registry.location,
                "-u",
                &registry.username,
                "--password-stdin",
            ],
            token.as_bytes(),
        )
        .map_err(classify_engine_error)?;
        Ok(())
    }

    fn build(&self, app: &App, tags: &[String]) -> DeployResult<()> {
        eprintln!("Building {} for {}...", app.name, app.platform);

        let mut args = vec!["build", "--platform", &app.platform, "-f", &app.dockerfile];

        let build_arg_strings: Vec<String> = app
            .build_args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        for arg in &build_arg_strings {
            args.push("--build-arg");
            args.push(arg);
        }

        for tag in tags {
            args.push("-t");
            args.push(tag);
        }
        args.push(&app.context);

        cmd::run_streamed("docker", &args).map_err(classify_engine_error)
    }

    fn push(&self, image: &str) -> DeployResult<()> {
        eprintln!("Pushing {image}...");
        cmd::run_streamed("docker", &["push", image]).map_err(classify_engine_error)
    }
}

/// Builds and publishes the matched artifact pair.
pub struct Publisher {
    engine: Box<dyn ContainerEngine>,
    registry: Registry,
}

impl Publisher {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            engine: Box::new(DockerCli),
            registry,
        }
    }

    #[must_use]
    pub fn with_engine(engine: Box<dyn ContainerEngine>, registry: Registry) -> Self {
        Self { engine, registry }
    }

    /// Build and push both components at `revision`. Each image
    /// gets the immutable revision tag plus `latest`; only the
    /// revision tags land in the manifest, so a bad `latest` can
    /// always be rolled back by re-activating a prior revision.
    pub fn publish(&self, api: &App, proxy: &App, revision: &str) -> DeployResult<ReleaseManifest> {
        screen_build_args(api)?;
        screen_build_args(proxy)?;

        self.engine.login(&self.registry)?;

        let components = [(Component::Api, api), (Component::Proxy, proxy)];
        let mut failed = Vec::new();
        let mut built = Vec::new();

        for (component, app) in components {
            let repo = self.registry.repo_for(app.name.as_str());
            let tags = vec![format!("{repo}:{revision}"), format!("{repo}:latest")];
            match self.engine.build(app, &tags) {
                Ok(()) => built.push((component, app.name.clone(), repo, tags)),
                Err(e) => {
                    eprintln!("Build failed for '{}': {e}", app.name);
                    failed.push(app.name.clone());
                }
            }
        }

        if !failed.is_empty() {
            return Err(DeployError::Publish { failed });
        }

        for (_, name, _, tags) in &built {
            for tag in tags {
                if let Err(e) = self.engine.push(tag) {
                    eprintln!("Push failed for '{tag}': {e}");
                    return Err(DeployError::Publish {
                        failed: vec![name.clone()],
                    });
                }
            }
        }

        let mut refs = built
            .into_iter()
            .map(|(component, _, repo, _)| ArtifactRef::new(component, &repo, revision));
        let api_ref = refs.next().expect("api artifact present");
        let proxy_ref = refs.next().expect("proxy artifact present");

        ReleaseManifest::pair(api_ref, proxy_ref)
    }
}

/// Artifacts are configuration-free: a build arg carrying a
/// runtime key would bake activation-time configuration into the
/// image.
fn screen_build_args(app: &App) -> DeployResult<()> {
    for (key, _) in &app.build_args {
        if config::is_runtime_key(key) {
            return Err(config::ConfigFault::BakedIn {
                key: key.clone(),
                component: app.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Map daemon-permission failures to an actionable access error.
fn classify_engine_error(err: DeployError) -> DeployError {
    match err {
        DeployError::CommandFailed { stderr, .. }
            if stderr.contains("permission denied")
                && stderr.contains("docker") =>
        {
            DeployError::Access(
                "cannot reach the Docker daemon. Add your user to the \
                 'docker' group (usermod -aG docker $USER) and re-login"
                    .into(),
            )
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_failure(stderr: &str) -> DeployError {
        DeployError::CommandFailed {
            command: "docker push r/api:a1b2c3d".to_string(),
            status: std::process::Command::new("sh")
                .args(["-c", "exit 1"])
                .status()
                .unwrap(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn daemon_permission_failure_becomes_access() {
        let err = classify_engine_error(engine_failure(
            "permission denied while trying to connect to the \
             docker daemon socket",
        ));

        let DeployError::Access(remediation) = err else {
            panic!("expected Access");
        };
        assert!(remediation.contains("docker"));
    }

    #[test]
    fn unrelated_engine_failure_passes_through() {
        let err = classify_engine_error(engine_failure("manifest unknown"));
        assert!(matches!(err, DeployError::CommandFailed { .. }));
    }
}
