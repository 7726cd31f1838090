//! `fix-image`: build and push the demo app image to the provisioned
//! registry, then point the running deployment at it.
//!
//! The infra-as-code layer is consumed read-only: terraform outputs supply
//! the registry URL and cluster name as plain strings.

use crate::context::EnvContext;
use crate::exec::{CmdSpec, Runner};
use crate::ui;
use anyhow::{anyhow, Result};

pub const TERRAFORM_DIR: &str = "terraform";
pub const APP_DIR: &str = "app";
pub const BUILD_PLATFORM: &str = "linux/amd64";

pub fn fix_image(runner: &dyn Runner, ctx: &EnvContext) -> Result<()> {
    let registry = terraform_output(runner, "ecr_repository_url")?;
    let cluster = terraform_output(runner, "cluster_name")?;
    ui::info(format!("registry {registry}, cluster {cluster}"));

    // Make sure kubectl targets the provisioned cluster before set image.
    let kubeconfig = runner.run(&CmdSpec::new(
        "aws",
        [
            "eks",
            "update-kubeconfig",
            "--name",
            cluster.as_str(),
            "--region",
            ctx.region.as_str(),
        ],
    ))?;
    if !kubeconfig.success() {
        return Err(anyhow!(
            "aws eks update-kubeconfig failed: {}",
            kubeconfig.stderr_line()
        ));
    }

    login_to_registry(runner, ctx, &registry)?;

    let remote_ref = format!("{registry}:latest");
    ui::info(format!("building {} for {BUILD_PLATFORM}", ctx.image_tag));
    let build = runner.run(&CmdSpec::new(
        "docker",
        [
            "build",
            "--platform",
            BUILD_PLATFORM,
            "-t",
            ctx.image_tag.as_str(),
            APP_DIR,
        ],
    ))?;
    if !build.success() {
        return Err(anyhow!("docker build failed: {}", build.stderr_line()));
    }

    let tag = runner.run(&CmdSpec::new(
        "docker",
        ["tag", ctx.image_tag.as_str(), remote_ref.as_str()],
    ))?;
    if !tag.success() {
        return Err(anyhow!("docker tag failed: {}", tag.stderr_line()));
    }

    ui::info(format!("pushing {remote_ref}"));
    let push = runner.run(&CmdSpec::new("docker", ["push", remote_ref.as_str()]))?;
    if !push.success() {
        return Err(anyhow!("docker push failed: {}", push.stderr_line()));
    }

    ui::info("pointing deployment at the pushed image");
    let image_arg = format!("app={remote_ref}");
    let set_image = runner.run(&ctx.kubectl_ns([
        "set",
        "image",
        "deployment/vso-demo-app",
        image_arg.as_str(),
    ]))?;
    if !set_image.success() {
        return Err(anyhow!(
            "kubectl set image failed: {} (is the workload deployed?)",
            set_image.stderr_line()
        ));
    }

    let rollout = runner.run(&ctx.kubectl_ns([
        "rollout",
        "status",
        "deployment/vso-demo-app",
        "--timeout=180s",
    ]))?;
    if !rollout.success() {
        return Err(anyhow!(
            "rollout after image fix never completed: {}",
            rollout.stderr_line()
        ));
    }

    ui::ok(format!("workload now runs {remote_ref}"));
    Ok(())
}

fn terraform_output(runner: &dyn Runner, name: &str) -> Result<String> {
    let chdir = format!("-chdir={TERRAFORM_DIR}");
    let output = runner.run(&CmdSpec::new(
        "terraform",
        [chdir.as_str(), "output", "-raw", name],
    ))?;
    if !output.success() || output.stdout_trim().is_empty() {
        return Err(anyhow!(
            "terraform output {name} unavailable: {} \
             (run: terraform -chdir={TERRAFORM_DIR} apply)",
            output.stderr_line()
        ));
    }
    Ok(output.stdout_trim().to_string())
}

/// `docker login` with the ECR password on stdin so it never appears in argv.
fn login_to_registry(runner: &dyn Runner, ctx: &EnvContext, registry: &str) -> Result<()> {
    let password = runner.run(&CmdSpec::new(
        "aws",
        ["ecr", "get-login-password", "--region", ctx.region.as_str()],
    ))?;
    if !password.success() || password.stdout_trim().is_empty() {
        return Err(anyhow!(
            "aws ecr get-login-password failed: {}",
            password.stderr_line()
        ));
    }

    let registry_host = registry.split('/').next().unwrap_or(registry);
    let login = runner.run(
        &CmdSpec::new(
            "docker",
            ["login", "--username", "AWS", "--password-stdin", registry_host],
        )
        .stdin(password.stdout_trim()),
    )?;
    if !login.success() {
        return Err(anyhow!("docker login failed: {}", login.stderr_line()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedRunner;

    const REGISTRY: &str = "123456789.dkr.ecr.us-west-2.amazonaws.com/vso-demo";

    fn ctx() -> EnvContext {
        EnvContext::load_from(&|_| None).expect("load")
    }

    fn scripted() -> ScriptedRunner {
        ScriptedRunner::new()
            .ok_on("output -raw ecr_repository_url", REGISTRY)
            .ok_on("output -raw cluster_name", "vso-demo-cluster")
            .ok_on("get-login-password", "ecr-password")
    }

    #[test]
    fn builds_tags_pushes_and_repoints() {
        let runner = scripted();
        fix_image(&runner, &ctx()).expect("fix-image");
        assert!(runner.called("docker build --platform linux/amd64"));
        assert!(runner.called(&format!("docker push {REGISTRY}:latest")));
        assert!(runner.called(&format!("set image deployment/vso-demo-app app={REGISTRY}:latest")));
    }

    #[test]
    fn login_targets_registry_host_only() {
        let runner = scripted();
        fix_image(&runner, &ctx()).expect("fix-image");
        assert!(runner.called("docker login --username AWS --password-stdin 123456789.dkr.ecr.us-west-2.amazonaws.com"));
        assert!(!runner.called("ecr-password"), "password must travel via stdin");
    }

    #[test]
    fn missing_terraform_output_is_fatal_with_remediation() {
        let runner = ScriptedRunner::new().fail_on("terraform", 1, "no outputs found");
        let err = fix_image(&runner, &ctx()).expect_err("must fail");
        assert!(err.to_string().contains("terraform -chdir=terraform apply"));
        assert!(!runner.called("docker"));
    }
}
