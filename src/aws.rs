//! AWS SDK wiring.
//!
//! The selected profile's `SdkConfig` supplies region and endpoint settings;
//! credentials come from whichever [`CredentialSet`] is active, so the same
//! backend can hand out clients before and after MFA escalation.

use anyhow::{Context, Result};
use aws_config::{ConfigLoader, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use log::debug;

use crate::{
    credentials::{CredentialSet, StsTokenService, TokenService},
    ecs::{EcsApi, EcsClient},
    error,
    mfa::{IamDirectory, MfaDirectory},
    profile::ConfigFiles,
};

/// Builds API clients for a given credential set.
#[allow(async_fn_in_trait)]
pub trait Backend {
    type Ecs: EcsApi;
    type Iam: MfaDirectory;
    type Sts: TokenService;

    /// Credentials resolved from the profile's own configuration.
    async fn baseline(&self, profile: &str) -> Result<CredentialSet>;

    fn region(&self) -> Option<String>;

    fn ecs(&self, credentials: &CredentialSet) -> Self::Ecs;

    fn iam(&self, credentials: &CredentialSet) -> Self::Iam;

    fn sts(&self, credentials: &CredentialSet) -> Self::Sts;
}

pub struct SdkBackend {
    config: SdkConfig,
    files: ConfigFiles,
}

impl SdkBackend {
    /// Load shared configuration for `profile` from `files`.
    pub async fn load(profile: &str, files: &ConfigFiles) -> Self {
        let config = loader(files, profile).load().await;
        debug!(
            "Loaded AWS config for profile {profile} (region: {:?})",
            config.region()
        );
        Self {
            config,
            files: files.clone(),
        }
    }
}

fn loader(files: &ConfigFiles, profile: &str) -> ConfigLoader {
    aws_config::from_env()
        .profile_files(files.profile_files())
        .profile_name(profile)
}

impl Backend for SdkBackend {
    type Ecs = EcsClient;
    type Iam = IamDirectory;
    type Sts = StsTokenService;

    async fn baseline(&self, profile: &str) -> Result<CredentialSet> {
        let config = loader(&self.files, profile).load().await;
        let credentials = config
            .credentials_provider()
            .context("No credentials provider configured")?
            .provide_credentials()
            .await
            .map_err(|e| {
                let message = aws_smithy_types::error::display::DisplayErrorContext(&e).to_string();
                error::classify(None, message)
            })?;
        Ok(CredentialSet::from(&credentials))
    }

    fn region(&self) -> Option<String> {
        self.config.region().map(|r| r.to_string())
    }

    fn ecs(&self, credentials: &CredentialSet) -> EcsClient {
        let config = aws_sdk_ecs::config::Builder::from(&self.config)
            .credentials_provider(credentials.to_sdk())
            .build();
        EcsClient::new(aws_sdk_ecs::Client::from_conf(config))
    }

    fn iam(&self, credentials: &CredentialSet) -> IamDirectory {
        let config = aws_sdk_iam::config::Builder::from(&self.config)
            .credentials_provider(credentials.to_sdk())
            .build();
        IamDirectory::new(aws_sdk_iam::Client::from_conf(config))
    }

    fn sts(&self, credentials: &CredentialSet) -> StsTokenService {
        let config = aws_sdk_sts::config::Builder::from(&self.config)
            .credentials_provider(credentials.to_sdk())
            .build();
        StsTokenService::new(aws_sdk_sts::Client::from_conf(config))
    }
}
