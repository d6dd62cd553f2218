//! Hands the resolved task over to `aws ecs execute-command`.

use std::process::Command;

use anyhow::{Context, Result, ensure};
use log::debug;

use crate::credentials::CredentialSet;

const AWS_CLI: &str = "aws";

/// A fully assembled `aws ecs execute-command` invocation.
#[derive(Debug)]
pub struct ExecCommand {
    args: Vec<String>,
    env: Vec<(&'static str, String)>,
}

impl ExecCommand {
    pub fn new(
        cluster: &str,
        task: &str,
        container: Option<&str>,
        command: &str,
        region: Option<&str>,
        credentials: &CredentialSet,
    ) -> Self {
        let mut args: Vec<String> = [
            "ecs",
            "execute-command",
            "--cluster",
            cluster,
            "--task",
            task,
            "--interactive",
            "--command",
            command,
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        if let Some(container) = container.filter(|c| !c.is_empty()) {
            args.extend(["--container".to_string(), container.to_string()]);
        }
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            args.extend(["--region".to_string(), region.to_string()]);
        }

        Self {
            args,
            env: credentials.env_vars(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(&'static str, String)] {
        &self.env
    }

    /// Run the session attached to this terminal and wait for it to end.
    pub fn run(&self) -> Result<()> {
        debug!("Running {AWS_CLI} {}", self.args().join(" "));
        let status = Command::new(AWS_CLI)
            .args(self.args())
            .envs(self.env().iter().map(|(k, v)| (*k, v.as_str())))
            .status()
            .with_context(|| format!("failed to run {AWS_CLI} CLI"))?;
        ensure!(status.success(), "{AWS_CLI} ecs execute-command exited with {status}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temporary() -> CredentialSet {
        CredentialSet::Temporary {
            access_key_id: "ASIATEMP".to_string(),
            secret_access_key: "temp-secret".to_string(),
            session_token: "temp-token".to_string(),
            expiry: None,
        }
    }

    #[test]
    fn full_argument_list() {
        let cmd = ExecCommand::new(
            "prod",
            "abc123",
            Some("web"),
            "/bin/bash",
            Some("ap-northeast-1"),
            &temporary(),
        );
        assert_eq!(
            cmd.args(),
            [
                "ecs",
                "execute-command",
                "--cluster",
                "prod",
                "--task",
                "abc123",
                "--interactive",
                "--command",
                "/bin/bash",
                "--container",
                "web",
                "--region",
                "ap-northeast-1",
            ]
        );
    }

    #[test]
    fn optional_flags_are_omitted() {
        let creds = CredentialSet::Static {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
        };
        let cmd = ExecCommand::new("prod", "abc123", None, "/bin/sh", None, &creds);
        assert!(!cmd.args().iter().any(|a| a == "--container" || a == "--region"));
    }

    #[test]
    fn credentials_become_environment() {
        let cmd = ExecCommand::new("prod", "abc123", None, "/bin/sh", None, &temporary());
        assert_eq!(
            cmd.env(),
            [
                ("AWS_ACCESS_KEY_ID", "ASIATEMP".to_string()),
                ("AWS_SECRET_ACCESS_KEY", "temp-secret".to_string()),
                ("AWS_SESSION_TOKEN", "temp-token".to_string()),
            ]
        );

        let creds = CredentialSet::Static {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
        };
        let cmd = ExecCommand::new("prod", "abc123", None, "/bin/sh", None, &creds);
        assert!(cmd.env().iter().all(|(k, _)| *k != "AWS_SESSION_TOKEN"));
    }
}
