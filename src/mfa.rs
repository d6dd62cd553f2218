//! MFA device discovery.

use anyhow::{Context, Result};
use aws_sdk_iam::Client;

use crate::{error, error::Error, prompt::Prompter, selector::short_name};

const MANUAL_ENTRY_PROMPT: &str =
    "Enter MFA Device ARN (e.g., arn:aws:iam::123456789012:mfa/username)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaDevice {
    pub serial: String,
    pub user_name: String,
}

impl MfaDevice {
    pub fn label(&self) -> String {
        format!("{} (User: {})", short_name(&self.serial), self.user_name)
    }
}

/// Lists the MFA devices registered to the calling identity.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait MfaDirectory {
    async fn list_mfa_devices(&self) -> Result<Vec<MfaDevice>>;
}

pub struct IamDirectory {
    client: Client,
}

impl IamDirectory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl MfaDirectory for IamDirectory {
    async fn list_mfa_devices(&self) -> Result<Vec<MfaDevice>> {
        let output = self
            .client
            .list_mfa_devices()
            .send()
            .await
            .map_err(error::from_sdk)?;

        Ok(output
            .mfa_devices()
            .iter()
            .map(|device| MfaDevice {
                serial: device.serial_number().to_string(),
                user_name: device.user_name().to_string(),
            })
            .collect())
    }
}

/// Pick the MFA device serial to use for the session-token exchange.
///
/// A single registered device is used without asking. When the listing
/// fails or comes back empty the operator types the ARN in.
pub async fn resolve_device<D, P>(directory: &D, prompter: &P) -> Result<String>
where
    D: MfaDirectory,
    P: Prompter,
{
    let devices = match directory.list_mfa_devices().await {
        Ok(devices) => devices,
        Err(e) => {
            println!("Unable to list MFA devices: {e:#}");
            return manual_entry(prompter);
        }
    };

    match devices.as_slice() {
        [] => {
            println!("No MFA devices found for the current user.");
            manual_entry(prompter)
        }
        [device] => {
            println!("Using MFA device: {}", device.label());
            Ok(device.serial.clone())
        }
        _ => {
            let labels: Vec<String> = devices.iter().map(MfaDevice::label).collect();
            let index = prompter.select("Select MFA Device", &labels)?;
            devices
                .get(index)
                .map(|device| device.serial.clone())
                .context(Error::NotFound("selected MFA device not found".to_string()))
        }
    }
}

fn manual_entry<P: Prompter>(prompter: &P) -> Result<String> {
    let serial = prompter.input(MANUAL_ENTRY_PROMPT)?;
    if serial.is_empty() {
        return Err(Error::UserCancelled("no MFA device ARN entered".to_string()).into());
    }
    Ok(serial)
}
