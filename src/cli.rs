//! CLI argument parsing.
//!
//! The surface is deliberately thin: nine sub-commands and no flags. Runtime
//! parameters come from the environment or interactive prompts so the same
//! invocation works in a fresh shell and in a runbook.

use clap::{Parser, Subcommand};

/// Root CLI entrypoint for the demo provisioner.
#[derive(Parser, Debug)]
#[command(
    name = "vsodemo",
    version,
    about = "Provision the Vault Secrets Operator demo across Vault, Kubernetes, and VSO",
    after_help = "Environment:\n  VAULT_ADDR           Vault endpoint (prompted when unset)\n  VAULT_TOKEN          Vault token (prompted when unset)\n  AWS_REGION           AWS region (default us-west-2)\n  VSO_DEMO_NAMESPACE   Target namespace (default vso-demo)\n  VSO_DEMO_IMAGE       Workload image tag (default vso-demo-app:latest)\n  VSODEMO_KUBECTL      kubectl override, shell-parsed (e.g. 'minikube kubectl --')\n\nExamples:\n  vsodemo setup-all\n  vsodemo deploy\n  vsodemo status\n  vsodemo cleanup",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply the demo workload and its sync resources
    Deploy,
    /// Deploy, then attach an ingress once the load balancer has a hostname
    DeployWithIngress,
    /// Operator install, Vault configuration, deploy, ingress, status
    SetupAll,
    /// Install or upgrade the Vault Secrets Operator
    InstallVso,
    /// Configure the Vault backend (mount, secrets, policy, auth binding)
    ConfigureVault,
    /// Read-only operator diagnostics
    CheckVso,
    /// Build and push the app image to ECR, then repoint the deployment
    FixImage,
    /// Delete the demo namespace (and optionally the operator)
    Cleanup,
    /// Read-only aggregate status report
    Status,
}
