use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cmd;
use crate::error::{DeployError, DeployResult};

/// The two deployable components of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Api,
    Proxy,
}

impl Component {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A published, registry-stored image reference. The tag is the
/// immutable source revision, never `latest`, so any manifest can
/// be re-activated as a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub component: Component,
    pub repo: String,
    pub tag: String,
}

impl ArtifactRef {
    #[must_use]
    pub fn new(component: Component, repo: &str, tag: &str) -> Self {
        Self {
            component,
            repo: repo.to_string(),
            tag: tag.to_string(),
        }
    }

    #[must_use]
    pub fn image(&self) -> String {
        format!("{}:{}", self.repo, self.tag)
    }
}

/// A matched artifact pair from one pipeline run. This is the only
/// deployable unit; a lone artifact never reaches activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub revision: String,
    pub api: ArtifactRef,
    pub proxy: ArtifactRef,
}

impl ReleaseManifest {
    /// Pair two artifacts. Refuses components in the wrong slots
    /// and tags from different revisions.
    pub fn pair(api: ArtifactRef, proxy: ArtifactRef) -> DeployResult<Self> {
        if api.component != Component::Api || proxy.component != Component::Proxy {
            return Err(DeployError::PairMismatch {
                api: api.image(),
                proxy: proxy.image(),
            });
        }
        if api.tag != proxy.tag {
            return Err(DeployError::PairMismatch {
                api: api.image(),
                proxy: proxy.image(),
            });
        }
        Ok(Self {
            revision: api.tag.clone(),
            api,
            proxy,
        })
    }
}

/// Short revision hash of the working tree, used as the immutable
/// image tag.
pub fn current_revision() -> DeployResult<String> {
    let revision = cmd::run("git", &["rev-parse", "--short", "HEAD"])?;
    if revision.is_empty() {
        return Err(DeployError::Other(
            "git produced an empty revision; not inside a repository?".into(),
        ));
    }
    Ok(revision)
}
