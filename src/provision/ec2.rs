use std::time::Duration;

use crate::cmd;
use crate::error::{DeployError, DeployResult};
use crate::provision::{HostRecord, HostTopology, Provisioner};
use crate::ssh::SshSession;

const SSH_USER: &str = "ubuntu";
const UBUNTU_AMI_PARAMETER: &str =
    "/aws/service/canonical/ubuntu/server/24.04/stable/current/amd64/hvm/ebs-gp3/ami-id";

/// EC2 provisioner using the `aws` CLI.
///
/// Resources are named after the topology's project: the instance
/// carries a `Name` tag, the security group and elastic IP share
/// the prefix, and teardown walks them in reverse order.
pub struct Ec2 {
    pub key_name: String,
    pub ssh_key_file: Option<String>,
}

impl Ec2 {
    /// `key_name` is the EC2 key pair registered with the
    /// provider.
    #[must_use]
    pub fn new(key_name: &str) -> Self {
        Self {
            key_name: key_name.to_string(),
            ssh_key_file: None,
        }
    }

    /// Local private key matching the registered key pair.
    #[must_use]
    pub fn ssh_key_file(mut self, path: &str) -> Self {
        self.ssh_key_file = Some(path.to_string());
        self
    }

    fn aws(topology: &HostTopology, args: &[&str]) -> DeployResult<String> {
        let mut full = vec!["--region", topology.region.as_str(), "--output", "text"];
        full.extend_from_slice(args);
        cmd::run("aws", &full)
    }

    fn security_group_name(topology: &HostTopology) -> String {
        format!("{}-sg", topology.project)
    }

    fn find_security_group(topology: &HostTopology) -> DeployResult<Option<String>> {
        let name = Self::security_group_name(topology);
        let output = Self::aws(
            topology,
            &[
                "ec2",
                "describe-security-groups",
                "--filters",
                &format!("Name=group-name,Values={name}"),
                "--query",
                "SecurityGroups[0].GroupId",
            ],
        )?;
        Ok((output != "None" && !output.is_empty()).then_some(output))
    }

    /// Create the security group if missing and make sure every
    /// ingress rule exists. Re-authorizing an existing rule is
    /// tolerated, which keeps this step re-runnable.
    fn ensure_security_group(topology: &HostTopology) -> DeployResult<String> {
        let name = Self::security_group_name(topology);

        let group_id = if let Some(existing) = Self::find_security_group(topology)? {
            existing
        } else {
            eprintln!("Creating security group '{name}'...");
            Self::aws(
                topology,
                &[
                    "ec2",
                    "create-security-group",
                    "--group-name",
                    &name,
                    "--description",
                    &format!("{} ingress", topology.project),
                    "--query",
                    "GroupId",
                ],
            )
            .map_err(provider_rejection)?
        };

        for rule in topology.ingress_rules() {
            let port = rule.port.to_string();
            let result = Self::aws(
                topology,
                &[
                    "ec2",
                    "authorize-security-group-ingress",
                    "--group-id",
                    &group_id,
                    "--protocol",
                    "tcp",
                    "--port",
                    &port,
                    "--cidr",
                    &rule.cidr,
                ],
            );
            match result {
                Ok(_) => {}
                Err(DeployError::CommandFailed { stderr, .. })
                    if stderr.contains("InvalidPermission.Duplicate") => {}
                Err(e) => return Err(e),
            }
        }

        Ok(group_id)
    }

    fn resolve_ami(topology: &HostTopology) -> DeployResult<String> {
        Self::aws(
            topology,
            &[
                "ssm",
                "get-parameter",
                "--name",
                UBUNTU_AMI_PARAMETER,
                "--query",
                "Parameter.Value",
            ],
        )
    }

    fn public_address(topology: &HostTopology, instance_id: &str) -> DeployResult<String> {
        let address = Self::aws(
            topology,
            &[
                "ec2",
                "describe-instances",
                "--instance-ids",
                instance_id,
                "--query",
                "Reservations[0].Instances[0].PublicIpAddress",
            ],
        )?;
        if address == "None" || address.is_empty() {
            return Err(DeployError::Provisioning(format!(
                "instance {instance_id} has no public address"
            )));
        }
        Ok(address)
    }

    fn attach_elastic_address(topology: &HostTopology, instance_id: &str) -> DeployResult<String> {
        eprintln!("Allocating elastic address...");
        let allocation_id = Self::aws(
            topology,
            &[
                "ec2",
                "allocate-address",
                "--tag-specifications",
                &format!(
                    "ResourceType=elastic-ip,Tags=[{{Key=Name,Value={}-eip}}]",
                    topology.project
                ),
                "--query",
                "AllocationId",
            ],
        )
        .map_err(provider_rejection)?;

        Self::aws(
            topology,
            &[
                "ec2",
                "associate-address",
                "--instance-id",
                instance_id,
                "--allocation-id",
                &allocation_id,
            ],
        )?;

        Self::public_address(topology, instance_id)
    }

    fn release_elastic_address(topology: &HostTopology) -> DeployResult<()> {
        let allocation_id = Self::aws(
            topology,
            &[
                "ec2",
                "describe-addresses",
                "--filters",
                &format!("Name=tag:Name,Values={}-eip", topology.project),
                "--query",
                "Addresses[0].AllocationId",
            ],
        )?;
        if allocation_id != "None" && !allocation_id.is_empty() {
            eprintln!("Releasing elastic address...");
            Self::aws(
                topology,
                &["ec2", "release-address", "--allocation-id", &allocation_id],
            )?;
        }
        Ok(())
    }

    fn run_setup_script(ssh: &SshSession, remote_dir: &str) -> DeployResult<()> {
        let script = include_str!("../../scripts/setup-server.sh");
        let escaped = script.replace('\'', "'\\''");
        ssh.exec_interactive(&format!("bash -c '{escaped}' _ '{remote_dir}'"))
    }
}

impl Provisioner for Ec2 {
    fn check_prerequisites(&self) -> DeployResult<()> {
        eprintln!("Checking prerequisites...");

        if !cmd::command_exists("aws") {
            return Err(DeployError::PrerequisiteMissing(
                "aws CLI is not installed. \
                 See: https://aws.amazon.com/cli/"
                    .into(),
            ));
        }

        cmd::run(
            "aws",
            &["sts", "get-caller-identity", "--query", "Account", "--output", "text"],
        )
        .map_err(|_| {
            DeployError::PrerequisiteMissing(
                "aws CLI is not authenticated. \
                 Run: aws configure"
                    .into(),
            )
        })?;

        eprintln!("Prerequisites OK");
        Ok(())
    }

    fn find_host(&self, topology: &HostTopology) -> DeployResult<Option<HostRecord>> {
        let name = topology.host_name();
        let output = Self::aws(
            topology,
            &[
                "ec2",
                "describe-instances",
                "--filters",
                &format!("Name=tag:Name,Values={name}"),
                "Name=instance-state-name,Values=pending,running",
                "--query",
                "Reservations[0].Instances[0].[InstanceId,PublicIpAddress]",
            ],
        )?;

        if output == "None" || output.is_empty() {
            return Ok(None);
        }

        let mut parts = output.split_whitespace();
        let (Some(id), Some(address)) = (parts.next(), parts.next()) else {
            return Ok(None);
        };

        Ok(Some(HostRecord {
            id: id.to_string(),
            name,
            address: address.to_string(),
            region: topology.region.clone(),
            ingress: topology.ingress_rules(),
            username: SSH_USER.to_string(),
        }))
    }

    fn create_host(&self, topology: &HostTopology) -> DeployResult<HostRecord> {
        let name = topology.host_name();
        eprintln!(
            "Creating instance '{name}' ({}) in {}...",
            topology.instance_class, topology.region
        );

        let group_id = Self::ensure_security_group(topology)?;
        let ami = Self::resolve_ami(topology)?;

        let instance_id = Self::aws(
            topology,
            &[
                "ec2",
                "run-instances",
                "--image-id",
                &ami,
                "--instance-type",
                &topology.instance_class,
                "--key-name",
                &self.key_name,
                "--security-group-ids",
                &group_id,
                "--tag-specifications",
                &format!("ResourceType=instance,Tags=[{{Key=Name,Value={name}}}]"),
                "--query",
                "Instances[0].InstanceId",
            ],
        )
        .map_err(provider_rejection)?;

        eprintln!("Waiting for instance {instance_id} to run...");
        Self::aws(
            topology,
            &["ec2", "wait", "instance-running", "--instance-ids", &instance_id],
        )?;

        let address = if topology.elastic_address {
            Self::attach_elastic_address(topology, &instance_id)?
        } else {
            Self::public_address(topology, &instance_id)?
        };

        eprintln!("Instance created! Address: {address}");

        Ok(HostRecord {
            id: instance_id,
            name,
            address,
            region: topology.region.clone(),
            ingress: topology.ingress_rules(),
            username: SSH_USER.to_string(),
        })
    }

    fn setup_host(&self, host: &HostRecord) -> DeployResult<()> {
        let mut ssh = SshSession::new(&host.address, &host.username);
        if let Some(key) = &self.ssh_key_file {
            ssh = ssh.with_key(key);
        }

        ssh.wait_for_ready(30, Duration::from_secs(10))?;

        Self::run_setup_script(&ssh, "/opt/app")?;

        if let Some(key) = &self.ssh_key_file {
            super::setup_ssh_config(host, key)?;
        }

        eprintln!();
        eprintln!("========================================");
        eprintln!("Host provisioned successfully!");
        eprintln!("========================================");
        eprintln!();
        eprintln!("Host: {}", host.name);
        eprintln!("Address: {}", host.address);
        eprintln!("Region: {}", host.region);
        eprintln!("SSH: ssh {}@{}", host.username, host.address);
        eprintln!();

        Ok(())
    }

    fn destroy_host(&self, topology: &HostTopology) -> DeployResult<()> {
        let name = topology.host_name();
        let host = self
            .find_host(topology)?
            .ok_or_else(|| DeployError::HostNotFound(name.clone()))?;

        eprintln!("Terminating instance '{name}' ({})...", host.id);
        Self::aws(
            topology,
            &["ec2", "terminate-instances", "--instance-ids", &host.id],
        )?;
        Self::aws(
            topology,
            &["ec2", "wait", "instance-terminated", "--instance-ids", &host.id],
        )?;

        Self::release_elastic_address(topology)?;

        if Self::find_security_group(topology)?.is_some() {
            eprintln!("Deleting security group...");
            Self::aws(
                topology,
                &[
                    "ec2",
                    "delete-security-group",
                    "--group-name",
                    &Self::security_group_name(topology),
                ],
            )?;
        }

        super::remove_ssh_config_entry(&name)?;

        eprintln!("Host '{name}' destroyed");
        Ok(())
    }
}

/// Provider-side rejections (quota, auth, capacity) surface as
/// provisioning errors and are never retried automatically.
fn provider_rejection(err: DeployError) -> DeployError {
    match err {
        DeployError::CommandFailed { stderr, .. } if !stderr.is_empty() => {
            DeployError::Provisioning(stderr)
        }
        other => other,
    }
}
