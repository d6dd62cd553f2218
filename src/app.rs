//! The profile → credentials → cluster → service → task → container pipeline.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    aws::Backend,
    credentials::{CredentialProvider, CredentialSet},
    error,
    exec::ExecCommand,
    profile::ConfigFiles,
    prompt::Prompter,
    selector::{Selection, Selector, WaitConfig},
};

pub const DEFAULT_COMMAND: &str = "/bin/sh";

/// Startup choices; any value given here skips the matching prompt.
#[derive(Debug, Clone)]
pub struct Options {
    pub profile: Option<String>,
    pub cluster: Option<String>,
    pub service: Option<String>,
    pub task: Option<String>,
    pub container: Option<String>,
    pub command: String,
    pub wait_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            profile: None,
            cluster: None,
            service: None,
            task: None,
            container: None,
            command: DEFAULT_COMMAND.to_string(),
            wait_timeout: WaitConfig::default().timeout,
        }
    }
}

/// Outputs of each completed step.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub profile: String,
    pub cluster: Selection,
    pub service: Selection,
    pub task: Selection,
    pub container: Selection,
}

/// Which credentials the pipeline currently runs with.
///
/// The only transition is `Unescalated -> Escalated`, taken at most once.
#[derive(Debug)]
pub enum Escalation {
    Unescalated(CredentialSet),
    Escalated(CredentialSet),
}

impl Escalation {
    pub fn credentials(&self) -> &CredentialSet {
        match self {
            Self::Unescalated(creds) | Self::Escalated(creds) => creds,
        }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalated(_))
    }

    pub fn escalate(&mut self, credentials: CredentialSet) -> Result<()> {
        if self.is_escalated() {
            bail!("MFA escalation already performed for this run");
        }
        *self = Self::Escalated(credentials);
        Ok(())
    }

    pub fn into_credentials(self) -> CredentialSet {
        match self {
            Self::Unescalated(creds) | Self::Escalated(creds) => creds,
        }
    }
}

/// A fully resolved target plus the credentials to reach it with.
#[derive(Debug)]
pub struct Session {
    pub resolved: Resolved,
    pub credentials: CredentialSet,
}

impl Session {
    pub fn exec_command(&self, command: &str, region: Option<&str>) -> ExecCommand {
        ExecCommand::new(
            &self.resolved.cluster.id,
            &self.resolved.task.id,
            Some(self.resolved.container.id.as_str()),
            command,
            region,
            &self.credentials,
        )
    }
}

/// Use `--profile` when given, otherwise ask among the configured profiles.
pub async fn select_profile<P: Prompter>(
    options: &Options,
    files: &ConfigFiles,
    prompter: &P,
) -> Result<String> {
    if let Some(profile) = &options.profile {
        return Ok(profile.clone());
    }

    let mut profiles = files.profiles().await?;
    let index = prompter.select("Select AWS Profile", &profiles)?;
    if index >= profiles.len() {
        bail!("invalid profile choice {index}");
    }
    Ok(profiles.swap_remove(index))
}

pub struct Pipeline<'a, B, P> {
    options: &'a Options,
    files: &'a ConfigFiles,
    backend: &'a B,
    prompter: &'a P,
}

impl<'a, B: Backend, P: Prompter> Pipeline<'a, B, P> {
    pub fn new(
        options: &'a Options,
        files: &'a ConfigFiles,
        backend: &'a B,
        prompter: &'a P,
    ) -> Self {
        Self {
            options,
            files,
            backend,
            prompter,
        }
    }

    fn wait_config(&self) -> WaitConfig {
        WaitConfig::with_timeout(self.options.wait_timeout)
    }

    /// Resolve the cluster, escalating to MFA if the profile's own access is denied.
    ///
    /// A denial can come from resolving the baseline credentials (a role whose
    /// trust policy demands MFA) or from the first cluster listing. Either
    /// one triggers a single MFA escalation and one more listing.
    ///
    /// # Errors
    ///
    /// Returns the escalated listing's error unchanged in kind, so a second
    /// `AccessDenied` is reported rather than retried.
    pub async fn connect_cluster(&self, profile: &str) -> Result<(Escalation, Selection)> {
        let provider = CredentialProvider::new(self.backend, self.prompter, self.files);

        let (baseline, denied) = match provider.load(profile).await {
            Ok(credentials) => match self.pick_cluster(&credentials).await {
                Ok(cluster) => return Ok((Escalation::Unescalated(credentials), cluster)),
                Err(e) if error::is_access_denied(&e) => (Some(credentials), e),
                Err(e) => return Err(e.context("failed to select cluster")),
            },
            Err(e) if error::is_access_denied(&e) => (None, e),
            Err(e) => return Err(e.context("failed to load AWS config")),
        };

        println!("Access denied. Attempting MFA authentication...");
        info!("Profile {profile} denied: {denied:#}");

        let credentials = provider
            .load_with_mfa(profile)
            .await
            .context("failed to load AWS config with MFA")?;
        let escalation = match baseline {
            Some(baseline) => {
                let mut escalation = Escalation::Unescalated(baseline);
                escalation.escalate(credentials)?;
                escalation
            }
            None => Escalation::Escalated(credentials),
        };

        let cluster = self
            .pick_cluster(escalation.credentials())
            .await
            .context("failed to select cluster after MFA")?;
        Ok((escalation, cluster))
    }

    async fn pick_cluster(&self, credentials: &CredentialSet) -> Result<Selection> {
        let ecs = self.backend.ecs(credentials);
        Selector::new(&ecs, self.prompter, self.wait_config())
            .select_cluster(self.options.cluster.as_deref())
            .await
    }

    /// Walk every step and return the target with its credentials.
    pub async fn resolve(&self, profile: String) -> Result<Session> {
        let (escalation, cluster) = self.connect_cluster(&profile).await?;

        let ecs = self.backend.ecs(escalation.credentials());
        let selector = Selector::new(&ecs, self.prompter, self.wait_config());

        let service = selector
            .select_service(&cluster.id, self.options.service.as_deref())
            .await
            .context("failed to select service")?;
        let task = selector
            .select_task(&cluster.id, &service.id, self.options.task.as_deref())
            .await
            .context("failed to select task")?;
        let container = selector
            .select_container(&cluster.id, &task.id, self.options.container.as_deref())
            .await
            .context("failed to select container")?;

        Ok(Session {
            resolved: Resolved {
                profile,
                cluster,
                service,
                task,
                container,
            },
            credentials: escalation.into_credentials(),
        })
    }
}
