//! Command-line interface definitions.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use crate::app::{DEFAULT_COMMAND, Options};

/// Interactive helper for `aws ecs execute-command`.
///
/// Walks through profile, cluster, service, task and container selection,
/// prompting only for what was not given on the command line. When the
/// profile's own credentials are denied, an MFA session is requested and the
/// cluster lookup is retried once.
#[derive(Parser, Debug)]
#[command(author, about, disable_version_flag = true)]
pub struct Args {
    #[command(subcommand)]
    pub subcommand: Option<Commands>,

    /// AWS profile to use
    #[arg(short, long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// ECS cluster name or ARN
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// ECS service name
    #[arg(short, long)]
    pub service: Option<String>,

    /// Task ID or ARN
    #[arg(short, long)]
    pub task: Option<String>,

    /// Container name
    #[arg(long)]
    pub container: Option<String>,

    /// Command to run inside the container
    #[arg(long = "command", default_value = DEFAULT_COMMAND)]
    pub exec: String,

    /// Path to AWS config file [default: ~/.aws/config]
    #[arg(long, env = "AWS_CONFIG_FILE")]
    pub config_path: Option<PathBuf>,

    /// Path to AWS credentials file [default: ~/.aws/credentials]
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub credentials_path: Option<PathBuf>,

    /// Seconds to wait for a newly started task to reach RUNNING
    #[arg(long, env = "ECSY_WAIT_TIMEOUT", default_value = "120")]
    pub wait_timeout: u64,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Print the version
    Version,
    /// Update ecsy to the latest release
    Update,
}

impl Args {
    pub fn options(&self) -> Options {
        Options {
            profile: self.profile.clone(),
            cluster: self.cluster.clone(),
            service: self.service.clone(),
            task: self.task.clone(),
            container: self.container.clone(),
            command: self.exec.clone(),
            wait_timeout: Duration::from_secs(self.wait_timeout),
        }
    }
}
