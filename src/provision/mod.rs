pub mod ec2;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// The only ingress ports this tool will open. Stated policy for
/// the demo topology, not a provider limit.
pub const ALLOWED_INGRESS_PORTS: [u16; 3] = [22, 80, 443];

/// Declarative description of the compute host to provision.
///
/// # Example
///
/// ```
/// use gantry::HostTopology;
///
/// let topology = HostTopology::new("demo")
///     .region("ap-south-1")
///     .instance_class("t3.micro")
///     .ssh_ingress("203.0.113.0/24")
///     .elastic_address(true);
///
/// assert!(topology.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct HostTopology {
    pub project: String,
    pub region: String,
    pub instance_class: String,
    pub ssh_ingress: String,
    pub elastic_address: bool,
    pub ingress: Vec<u16>,
}

impl HostTopology {
    #[must_use]
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            region: "eu-west-1".to_string(),
            instance_class: "t3.micro".to_string(),
            ssh_ingress: "0.0.0.0/0".to_string(),
            elastic_address: false,
            ingress: ALLOWED_INGRESS_PORTS.to_vec(),
        }
    }

    #[must_use]
    pub fn region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    #[must_use]
    pub fn instance_class(mut self, class: &str) -> Self {
        self.instance_class = class.to_string();
        self
    }

    /// CIDR range allowed to reach port 22. Ports 80/443 are
    /// world-reachable.
    #[must_use]
    pub fn ssh_ingress(mut self, cidr: &str) -> Self {
        self.ssh_ingress = cidr.to_string();
        self
    }

    #[must_use]
    pub const fn elastic_address(mut self, on: bool) -> Self {
        self.elastic_address = on;
        self
    }

    #[must_use]
    pub fn ingress(mut self, ports: &[u16]) -> Self {
        self.ingress = ports.to_vec();
        self
    }

    /// Resource name for the host, derived from the project name.
    #[must_use]
    pub fn host_name(&self) -> String {
        format!("{}-server", self.project)
    }

    pub fn validate(&self) -> DeployResult<()> {
        if self.project.trim().is_empty() {
            return Err(DeployError::Other(
                "topology has an empty project name".into(),
            ));
        }
        for port in &self.ingress {
            if !ALLOWED_INGRESS_PORTS.contains(port) {
                return Err(DeployError::Other(format!(
                    "ingress port {port} is not in the allowed set \
                     {ALLOWED_INGRESS_PORTS:?}"
                )));
            }
        }
        Ok(())
    }

    /// The concrete ingress rule set: SSH restricted to the
    /// configured range, web ports open.
    #[must_use]
    pub fn ingress_rules(&self) -> Vec<IngressRule> {
        self.ingress
            .iter()
            .map(|&port| IngressRule {
                port,
                cidr: if port == 22 {
                    self.ssh_ingress.clone()
                } else {
                    "0.0.0.0/0".to_string()
                },
            })
            .collect()
    }
}

/// One security rule: a port open to a CIDR range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: u16,
    pub cidr: String,
}

/// A provisioned compute host. The address is stable for the life
/// of the host; it changes only through destroy and re-create,
/// which must be reported loudly because downstream state refers
/// to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub region: String,
    pub ingress: Vec<IngressRule>,
    pub username: String,
}

/// A provisioner creates, configures, and destroys compute hosts.
pub trait Provisioner {
    /// Check that all prerequisites are installed and
    /// authenticated.
    fn check_prerequisites(&self) -> DeployResult<()>;

    /// Look up an existing host by name.
    fn find_host(&self, topology: &HostTopology) -> DeployResult<Option<HostRecord>>;

    /// Create the host described by the topology.
    fn create_host(&self, topology: &HostTopology) -> DeployResult<HostRecord>;

    /// Install the container runtime, configure the firewall, and
    /// prepare the deployment directory.
    fn setup_host(&self, host: &HostRecord) -> DeployResult<()>;

    /// Destroy the host and its associated resources.
    fn destroy_host(&self, topology: &HostTopology) -> DeployResult<()>;
}

/// The idempotence contract: provisioning an unchanged topology
/// twice yields the same host. An existing host is returned as-is;
/// only a missing one is created and set up.
pub fn ensure_host(
    provisioner: &dyn Provisioner,
    topology: &HostTopology,
) -> DeployResult<HostRecord> {
    topology.validate()?;

    if let Some(existing) = provisioner.find_host(topology)? {
        eprintln!(
            "Host '{}' already exists (address: {})",
            existing.name, existing.address
        );
        return Ok(existing);
    }

    let host = provisioner.create_host(topology)?;
    provisioner.setup_host(&host)?;
    Ok(host)
}

/// Remove a Host block from SSH config content.
#[must_use]
pub fn remove_ssh_host_entry(content: &str, host: &str) -> String {
    let mut result = Vec::new();
    let mut skip = false;
    let header = format!("Host {host}");

    for line in content.lines() {
        if line.trim() == header {
            skip = true;
            continue;
        }
        if skip {
            // A new Host block or a non-indented, non-empty line
            // ends the skipped block
            if !line.is_empty() && !line.starts_with(' ') && !line.starts_with('\t') {
                skip = false;
                result.push(line);
            }
            continue;
        }
        result.push(line);
    }

    let mut out = result.join("\n");
    while out.contains("\n\n\n") {
        out = out.replace("\n\n\n", "\n\n");
    }
    out
}

/// Add an entry to `~/.ssh/config` for a host.
pub fn setup_ssh_config(host: &HostRecord, key_file: &str) -> DeployResult<()> {
    let config_path = ssh_config_path()?;

    let mut content = if config_path.exists() {
        std::fs::read_to_string(&config_path)?
    } else {
        String::new()
    };

    content = remove_ssh_host_entry(&content, &host.name);

    let entry = format!(
        "\nHost {}\n    \
         HostName {}\n    \
         User {}\n    \
         IdentityFile {key_file}\n    \
         StrictHostKeyChecking no\n",
        host.name, host.address, host.username
    );
    content.push_str(&entry);

    std::fs::write(&config_path, &content)?;
    eprintln!("SSH config: ssh {}", host.name);
    Ok(())
}

/// Remove an SSH host entry from `~/.ssh/config`.
pub fn remove_ssh_config_entry(host_alias: &str) -> DeployResult<()> {
    let config_path = ssh_config_path()?;
    if !config_path.exists() {
        return Ok(());
    }

    let content = std::fs::read_to_string(&config_path)?;
    let updated = remove_ssh_host_entry(&content, host_alias);
    std::fs::write(&config_path, updated)?;

    eprintln!("SSH config entry removed: {host_alias}");
    Ok(())
}

fn ssh_config_path() -> DeployResult<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| DeployError::EnvMissing("HOME".into()))?;
    Ok(PathBuf::from(home).join(".ssh").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_outside_allowed_set_refused() {
        let topology = HostTopology::new("demo").ingress(&[22, 80, 8080]);

        assert!(topology.validate().is_err());
    }

    #[test]
    fn ssh_rule_uses_configured_range() {
        let topology = HostTopology::new("demo").ssh_ingress("203.0.113.0/24");

        let rules = topology.ingress_rules();
        let ssh = rules.iter().find(|r| r.port == 22).unwrap();
        let http = rules.iter().find(|r| r.port == 80).unwrap();

        assert_eq!(ssh.cidr, "203.0.113.0/24");
        assert_eq!(http.cidr, "0.0.0.0/0");
    }

    #[test]
    fn remove_middle_host_entry() {
        let content = "Host one\n    HostName 1.1.1.1\n\nHost two\n    HostName 2.2.2.2\n\nHost three\n    HostName 3.3.3.3\n";

        let result = remove_ssh_host_entry(content, "two");

        assert!(result.contains("Host one"));
        assert!(!result.contains("Host two"));
        assert!(result.contains("Host three"));
    }
}
