//! ecsy
//!
//! Opens an interactive shell in a running ECS container. Each choice the
//! operator did not pass on the command line is asked for in turn:
//! 1. AWS profile
//! 2. Cluster (denied listings trigger a one-time MFA escalation)
//! 3. Service
//! 4. Task (offering to start one when none are running)
//! 5. Container
//!
//! The session itself is handed to `aws ecs execute-command`.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

mod app;
mod aws;
mod cli;
mod credentials;
mod ecs;
mod error;
mod exec;
mod mfa;
mod profile;
mod prompt;
mod selector;
#[cfg(test)]
mod testing;
mod updater;

use app::{Pipeline, select_profile};
use aws::{Backend, SdkBackend};
use cli::{Args, Commands};
use profile::ConfigFiles;
use prompt::TerminalPrompter;
use updater::Updater;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let prompter = TerminalPrompter::default();

    match args.subcommand {
        Some(Commands::Version) => {
            println!("ecsy version {}", updater::current_version());
            Ok(())
        }
        Some(Commands::Update) => Updater::new()?.run(&prompter).await,
        None => connect(&args, &prompter).await,
    }
}

async fn connect(args: &Args, prompter: &TerminalPrompter) -> Result<()> {
    let options = args.options();
    let files = ConfigFiles::resolve(args.config_path.clone(), args.credentials_path.clone())?;

    let profile = select_profile(&options, &files, prompter)
        .await
        .context("failed to select profile")?;
    info!("Using profile {profile}");

    let backend = SdkBackend::load(&profile, &files).await;
    let session = Pipeline::new(&options, &files, &backend, prompter)
        .resolve(profile)
        .await?;

    let resolved = &session.resolved;
    info!(
        "Resolved {}/{} with profile {}",
        resolved.cluster.id, resolved.service.id, resolved.profile
    );
    println!("Executing command on task {}...", resolved.task.id);
    let region = backend.region();
    session
        .exec_command(&options.command, region.as_deref())
        .run()
}
