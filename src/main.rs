use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod context;
mod deploy;
mod exec;
mod image;
mod ingress;
mod manifests;
mod operator;
mod poll;
mod prereq;
mod report;
#[cfg(test)]
mod testutil;
mod ui;
mod vault;
mod workflow;

use cli::{Command, RootArgs};
use workflow::{Session, Timings};

fn main() {
    // Structured diagnostics go to stderr; step output owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = RootArgs::parse();
    if let Err(err) = dispatch(args) {
        ui::error(format!("{err:#}"));
        std::process::exit(1);
    }
}

fn dispatch(args: RootArgs) -> anyhow::Result<()> {
    let ctx = context::EnvContext::load()?;
    let runner = exec::SystemRunner;
    let session = Session {
        runner: &runner,
        ctx: &ctx,
        lookup: &context::process_env,
        prompt: &ui::prompt_stdin,
        confirm: &ui::confirm_stdin,
        tools: &prereq::tool_on_path,
        probe: &report::http_probe,
        timings: Timings::default(),
    };

    match args.command {
        Command::Deploy => workflow::run_deploy(&session),
        Command::DeployWithIngress => workflow::run_deploy_with_ingress(&session),
        Command::SetupAll => workflow::run_setup_all(&session),
        Command::InstallVso => workflow::run_install_vso(&session),
        Command::ConfigureVault => workflow::run_configure_vault(&session),
        Command::CheckVso => workflow::run_check_vso(&session),
        Command::FixImage => workflow::run_fix_image(&session),
        Command::Cleanup => workflow::run_cleanup(&session),
        Command::Status => workflow::run_status(&session),
    }
}
