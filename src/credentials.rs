use std::{fmt, time::SystemTime};

use anyhow::{Context, Result};
use aws_credential_types::Credentials;
use aws_sdk_sts::{Client, types};
use aws_smithy_types::{DateTime, date_time::Format};
use log::info;

use crate::{aws::Backend, error, mfa, profile::ConfigFiles, prompt::Prompter};

const PROVIDER_NAME: &str = "ecsy";

/// An access key pair, optionally backed by a session token.
///
/// A set is either fully static (long-lived keys) or fully temporary (keys
/// plus session token); there is no in-between.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSet {
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    Temporary {
        access_key_id: String,
        secret_access_key: String,
        session_token: String,
        expiry: Option<SystemTime>,
    },
}

impl CredentialSet {
    pub fn access_key_id(&self) -> &str {
        match self {
            Self::Static { access_key_id, .. } | Self::Temporary { access_key_id, .. } => {
                access_key_id
            }
        }
    }

    pub fn secret_access_key(&self) -> &str {
        match self {
            Self::Static {
                secret_access_key, ..
            }
            | Self::Temporary {
                secret_access_key, ..
            } => secret_access_key,
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::Static { .. } => None,
            Self::Temporary { session_token, .. } => Some(session_token),
        }
    }

    pub fn expiry(&self) -> Option<SystemTime> {
        match self {
            Self::Static { .. } => None,
            Self::Temporary { expiry, .. } => *expiry,
        }
    }

    pub fn can_expire(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    /// Credentials in the form the AWS SDK clients accept.
    pub fn to_sdk(&self) -> Credentials {
        Credentials::new(
            self.access_key_id(),
            self.secret_access_key(),
            self.session_token().map(str::to_string),
            self.expiry(),
            PROVIDER_NAME,
        )
    }

    /// Environment variables handing this set to a child AWS CLI process.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("AWS_ACCESS_KEY_ID", self.access_key_id().to_string()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key().to_string()),
        ];
        if let Some(token) = self.session_token() {
            vars.push(("AWS_SESSION_TOKEN", token.to_string()));
        }
        vars
    }
}

impl From<&Credentials> for CredentialSet {
    fn from(credentials: &Credentials) -> Self {
        let access_key_id = credentials.access_key_id().to_string();
        let secret_access_key = credentials.secret_access_key().to_string();
        match credentials.session_token() {
            Some(token) => Self::Temporary {
                access_key_id,
                secret_access_key,
                session_token: token.to_string(),
                expiry: credentials.expiry(),
            },
            None => Self::Static {
                access_key_id,
                secret_access_key,
            },
        }
    }
}

impl TryFrom<types::Credentials> for CredentialSet {
    type Error = anyhow::Error;

    fn try_from(session: types::Credentials) -> Result<Self> {
        let expiry = SystemTime::try_from(session.expiration().clone())
            .context("Session expiration out of range")?;
        Ok(Self::Temporary {
            access_key_id: session.access_key_id().to_string(),
            secret_access_key: session.secret_access_key().to_string(),
            session_token: session.session_token().to_string(),
            expiry: Some(expiry),
        })
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expiry = self
            .expiry()
            .and_then(|t| DateTime::from(t).fmt(Format::DateTime).ok());
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id())
            .field("secret_access_key", &"** redacted **")
            .field("temporary", &self.can_expire())
            .field("expiry", &expiry)
            .finish()
    }
}

/// Exchanges an MFA code for temporary session credentials.
#[allow(async_fn_in_trait)]
pub trait TokenService {
    async fn session_token(&self, mfa_serial: &str, code: &str) -> Result<CredentialSet>;
}

pub struct StsTokenService {
    client: Client,
}

impl StsTokenService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl TokenService for StsTokenService {
    async fn session_token(&self, mfa_serial: &str, code: &str) -> Result<CredentialSet> {
        self.client
            .get_session_token()
            .serial_number(mfa_serial)
            .token_code(code)
            .send()
            .await
            .map_err(error::from_sdk)?
            .credentials()
            .cloned()
            .context("No credentials returned")?
            .try_into()
    }
}

/// Produces credential sets for named profiles, escalating to MFA on demand.
pub struct CredentialProvider<'a, B, P> {
    backend: &'a B,
    prompter: &'a P,
    files: &'a ConfigFiles,
}

impl<'a, B: Backend, P: Prompter> CredentialProvider<'a, B, P> {
    pub fn new(backend: &'a B, prompter: &'a P, files: &'a ConfigFiles) -> Self {
        Self {
            backend,
            prompter,
            files,
        }
    }

    /// Baseline credentials straight from the profile's configuration.
    pub async fn load(&self, profile: &str) -> Result<CredentialSet> {
        self.backend
            .baseline(profile)
            .await
            .with_context(|| format!("failed to load credentials for profile {profile}"))
    }

    /// Temporary credentials obtained with an MFA code.
    ///
    /// When the profile names a `source_profile`, that profile's keys are the
    /// basis of the exchange instead of the profile's own.
    pub async fn load_with_mfa(&self, profile: &str) -> Result<CredentialSet> {
        let settings = self.files.mfa_settings(profile).await;

        let basis = match settings.source_profile.as_deref() {
            Some(source) => {
                info!("Using source profile {source} for MFA session");
                self.load(source).await?
            }
            None => self.load(profile).await?,
        };

        let mfa_serial = match settings.mfa_serial {
            Some(serial) => serial,
            None => mfa::resolve_device(&self.backend.iam(&basis), self.prompter)
                .await
                .context("failed to select MFA device")?,
        };

        let code = self.prompter.input("Enter MFA Code")?;
        let session = self
            .backend
            .sts(&basis)
            .session_token(&mfa_serial, code.trim())
            .await
            .context("failed to get session token")?;

        if let Some(expiry) = session.expiry() {
            let expiry = DateTime::from(expiry).fmt(Format::DateTime)?;
            info!("MFA session established, expires at: {expiry}");
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::PathBuf};

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{
        mfa::MfaDevice,
        prompt::MockPrompter,
        testing::{FakeBackend, static_credentials},
    };

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn files_for(config: &NamedTempFile) -> ConfigFiles {
        ConfigFiles::new(config.path().to_path_buf(), PathBuf::from("/nonexistent/credentials"))
    }

    #[test]
    fn static_and_temporary_shapes() {
        let static_set =
            CredentialSet::from(&Credentials::new("AKIA", "secret", None, None, "test"));
        assert!(!static_set.can_expire());
        assert_eq!(static_set.session_token(), None);
        assert_eq!(static_set.env_vars().len(), 2);

        let expiry = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_900_000_000);
        let temp_set = CredentialSet::from(&Credentials::new(
            "ASIA",
            "secret",
            Some("token".to_string()),
            Some(expiry),
            "test",
        ));
        assert!(temp_set.can_expire());
        assert_eq!(temp_set.expiry(), Some(expiry));
        assert!(temp_set.env_vars().contains(&("AWS_SESSION_TOKEN", "token".to_string())));

        let sdk = temp_set.to_sdk();
        assert_eq!(sdk.session_token(), Some("token"));
        assert_eq!(sdk.expiry(), Some(expiry));
    }

    #[test]
    fn sts_credentials_become_temporary() {
        let session = types::Credentials::builder()
            .access_key_id("ASIATEMP")
            .secret_access_key("temp-secret")
            .session_token("temp-token")
            .expiration(DateTime::from_secs(1_900_000_000))
            .build()
            .unwrap();
        let set = CredentialSet::try_from(session).unwrap();
        assert_eq!(set.access_key_id(), "ASIATEMP");
        assert_eq!(set.session_token(), Some("temp-token"));
        assert_eq!(
            set.expiry(),
            Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_900_000_000))
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", static_credentials("AKIA"));
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("AKIA-secret"));
    }

    #[tokio::test]
    async fn mfa_serial_from_config_skips_device_listing() {
        let config = config_file("[profile dev]\nmfa_serial = arn:aws:iam::1:mfa/dev\n");
        let files = files_for(&config);
        let backend = FakeBackend::new().with_profile("dev", static_credentials("AKIADEV"));

        let mut prompter = MockPrompter::new();
        prompter
            .expect_input()
            .withf(|label| label == "Enter MFA Code")
            .times(1)
            .returning(|_| Ok(" 123456 ".to_string()));

        let provider = CredentialProvider::new(&backend, &prompter, &files);
        let creds = provider.load_with_mfa("dev").await.unwrap();

        assert!(creds.can_expire());
        assert_eq!(backend.device_listings(), 0);
        assert_eq!(
            backend.token_requests(),
            [(
                "AKIADEV".to_string(),
                "arn:aws:iam::1:mfa/dev".to_string(),
                "123456".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn source_profile_keys_are_the_basis() {
        let config = config_file(
            "[profile base]\n[profile admin]\nsource_profile = base\nmfa_serial = serial-1\n",
        );
        let files = files_for(&config);
        let backend = FakeBackend::new()
            .with_profile("admin", static_credentials("AKIAADMIN"))
            .with_profile("base", static_credentials("AKIABASE"));

        let mut prompter = MockPrompter::new();
        prompter.expect_input().returning(|_| Ok("654321".to_string()));

        let provider = CredentialProvider::new(&backend, &prompter, &files);
        provider.load_with_mfa("admin").await.unwrap();

        let requests = backend.token_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "AKIABASE");
    }

    #[tokio::test]
    async fn resolver_used_when_no_serial_configured() {
        let config = config_file("[default]\nregion = us-east-1\n");
        let files = files_for(&config);
        let backend = FakeBackend::new()
            .with_profile("default", static_credentials("AKIADEFAULT"))
            .with_devices(vec![MfaDevice {
                serial: "arn:aws:iam::1:mfa/phone".to_string(),
                user_name: "alice".to_string(),
            }]);

        let mut prompter = MockPrompter::new();
        prompter.expect_select().never();
        prompter.expect_input().times(1).returning(|_| Ok("111111".to_string()));

        let provider = CredentialProvider::new(&backend, &prompter, &files);
        provider.load_with_mfa("default").await.unwrap();

        assert_eq!(backend.device_listings(), 1);
        assert_eq!(backend.token_requests()[0].1, "arn:aws:iam::1:mfa/phone");
    }

    #[tokio::test]
    async fn rejected_code_is_fatal() {
        let config = config_file("[default]\nmfa_serial = serial-1\n");
        let files = files_for(&config);
        let backend = FakeBackend::new()
            .with_profile("default", static_credentials("AKIADEFAULT"))
            .rejecting_codes();

        let mut prompter = MockPrompter::new();
        prompter.expect_input().times(1).returning(|_| Ok("000000".to_string()));

        let provider = CredentialProvider::new(&backend, &prompter, &files);
        let err = provider.load_with_mfa("default").await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to get session token"));
        assert_eq!(backend.token_requests().len(), 1);
    }

    #[tokio::test]
    async fn unknown_profile_fails_to_load() {
        let config = config_file("[default]\n");
        let files = files_for(&config);
        let backend = FakeBackend::new();
        let prompter = MockPrompter::new();

        let provider = CredentialProvider::new(&backend, &prompter, &files);
        let err = provider.load("missing").await.unwrap_err();
        assert!(format!("{err:#}").contains("profile missing"));
    }
}
