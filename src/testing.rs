//! In-memory AWS account used by the pipeline tests.
//!
//! Cluster listing can be made to require MFA: static credentials are denied
//! and the temporary ones handed out by the fake STS are accepted.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
    time::{Duration, SystemTime},
};

use anyhow::{Result, anyhow};

use crate::{
    aws::Backend,
    credentials::{CredentialSet, TokenService},
    ecs::{EcsApi, Page, RunTaskRequest, ServiceInfo, TaskInfo},
    error::Error,
    mfa::{MfaDevice, MfaDirectory},
    selector::{RUNNING, short_name},
};

pub fn static_credentials(access_key_id: &str) -> CredentialSet {
    CredentialSet::Static {
        access_key_id: access_key_id.to_string(),
        secret_access_key: format!("{access_key_id}-secret"),
    }
}

#[derive(Default)]
struct Calls {
    cluster_listings: usize,
    device_listings: usize,
    token_requests: Vec<(String, String, String)>,
    run_tasks: usize,
}

#[derive(Default)]
struct Cloud {
    profiles: HashMap<String, CredentialSet>,
    region: Option<String>,
    clusters: Vec<String>,
    tasks: Vec<TaskInfo>,
    devices: Vec<MfaDevice>,
    launch: Option<TaskInfo>,
    require_mfa: bool,
    denied_profiles: Vec<String>,
    deny_clusters: bool,
    deny_services: bool,
    reject_codes: bool,
    calls: RefCell<Calls>,
}

pub struct FakeBackend {
    cloud: Rc<Cloud>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            cloud: Rc::new(Cloud::default()),
        }
    }

    fn cloud_mut(&mut self) -> &mut Cloud {
        Rc::get_mut(&mut self.cloud).expect("FakeBackend configured after first use")
    }

    pub fn with_profile(mut self, name: &str, credentials: CredentialSet) -> Self {
        self.cloud_mut().profiles.insert(name.to_string(), credentials);
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.cloud_mut().region = Some(region.to_string());
        self
    }

    pub fn with_clusters(mut self, clusters: Vec<String>) -> Self {
        self.cloud_mut().clusters = clusters;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskInfo>) -> Self {
        self.cloud_mut().tasks = tasks;
        self
    }

    pub fn with_devices(mut self, devices: Vec<MfaDevice>) -> Self {
        self.cloud_mut().devices = devices;
        self
    }

    /// `run_task` starts this task, which is running by the first poll.
    pub fn launching(mut self, arn: &str, containers: &[&str]) -> Self {
        self.cloud_mut().launch = Some(TaskInfo {
            arn: arn.to_string(),
            last_status: Some(RUNNING.to_string()),
            containers: containers.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Cluster listing is denied unless the caller holds session credentials.
    pub fn requiring_mfa(mut self) -> Self {
        self.cloud_mut().require_mfa = true;
        self
    }

    /// Cluster listing is always denied.
    pub fn denying_clusters(mut self) -> Self {
        self.cloud_mut().deny_clusters = true;
        self
    }

    /// Resolving `profile`'s own credentials is denied, as for a role whose
    /// trust policy requires MFA.
    pub fn denying_profile(mut self, profile: &str) -> Self {
        self.cloud_mut().denied_profiles.push(profile.to_string());
        self
    }

    /// Service listing is always denied.
    pub fn denying_services(mut self) -> Self {
        self.cloud_mut().deny_services = true;
        self
    }

    pub fn rejecting_codes(mut self) -> Self {
        self.cloud_mut().reject_codes = true;
        self
    }

    pub fn cluster_listings(&self) -> usize {
        self.cloud.calls.borrow().cluster_listings
    }

    pub fn device_listings(&self) -> usize {
        self.cloud.calls.borrow().device_listings
    }

    /// `(access key used, MFA serial, code)` per session-token request.
    pub fn token_requests(&self) -> Vec<(String, String, String)> {
        self.cloud.calls.borrow().token_requests.clone()
    }

    pub fn run_task_requests(&self) -> usize {
        self.cloud.calls.borrow().run_tasks
    }
}

impl Backend for FakeBackend {
    type Ecs = FakeEcs;
    type Iam = FakeIam;
    type Sts = FakeSts;

    async fn baseline(&self, profile: &str) -> Result<CredentialSet> {
        if self.cloud.denied_profiles.iter().any(|p| p == profile) {
            return Err(Error::AccessDenied(format!(
                "User: arn:aws:iam::1:user/alice is not authorized to perform: \
                 sts:AssumeRole on resource: arn:aws:iam::1:role/{profile}"
            ))
            .into());
        }
        self.cloud
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| anyhow!("The config profile ({profile}) could not be found"))
    }

    fn region(&self) -> Option<String> {
        self.cloud.region.clone()
    }

    fn ecs(&self, credentials: &CredentialSet) -> FakeEcs {
        FakeEcs {
            cloud: Rc::clone(&self.cloud),
            credentials: credentials.clone(),
        }
    }

    fn iam(&self, _credentials: &CredentialSet) -> FakeIam {
        FakeIam {
            cloud: Rc::clone(&self.cloud),
        }
    }

    fn sts(&self, credentials: &CredentialSet) -> FakeSts {
        FakeSts {
            cloud: Rc::clone(&self.cloud),
            credentials: credentials.clone(),
        }
    }
}

pub struct FakeEcs {
    cloud: Rc<Cloud>,
    credentials: CredentialSet,
}

impl EcsApi for FakeEcs {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        self.cloud.calls.borrow_mut().cluster_listings += 1;
        let denied = self.cloud.deny_clusters
            || (self.cloud.require_mfa && !self.credentials.can_expire());
        if denied {
            return Err(Error::AccessDenied(
                "not authorized to perform ecs:ListClusters with an explicit deny".to_string(),
            )
            .into());
        }
        Ok(self.cloud.clusters.clone())
    }

    async fn list_services(&self, cluster: &str, _next_token: Option<String>) -> Result<Page> {
        if self.cloud.deny_services {
            return Err(Error::AccessDenied(
                "not authorized to perform ecs:ListServices".to_string(),
            )
            .into());
        }
        Ok(Page {
            items: vec![format!("arn:aws:ecs:us-east-1:1:service/{cluster}/api")],
            next_token: None,
        })
    }

    async fn list_tasks(&self, _cluster: &str, _service: &str) -> Result<Vec<String>> {
        Ok(self.cloud.tasks.iter().map(|t| t.arn.clone()).collect())
    }

    async fn describe_tasks(&self, _cluster: &str, tasks: Vec<String>) -> Result<Vec<TaskInfo>> {
        let started = self.cloud.calls.borrow().run_tasks > 0;
        let launched = self.cloud.launch.iter().filter(move |_| started);
        Ok(self
            .cloud
            .tasks
            .iter()
            .chain(launched)
            .filter(|t| tasks.iter().any(|id| *id == t.arn || id == short_name(&t.arn)))
            .cloned()
            .collect())
    }

    async fn describe_service(&self, _cluster: &str, service: &str) -> Result<Option<ServiceInfo>> {
        Ok(Some(ServiceInfo {
            task_definition: Some(format!("arn:aws:ecs:us-east-1:1:task-definition/{service}:1")),
            ..Default::default()
        }))
    }

    async fn run_task(&self, _request: RunTaskRequest) -> Result<Vec<TaskInfo>> {
        self.cloud.calls.borrow_mut().run_tasks += 1;
        Ok(self
            .cloud
            .launch
            .iter()
            .map(|t| TaskInfo {
                last_status: Some("PROVISIONING".to_string()),
                ..t.clone()
            })
            .collect())
    }
}

pub struct FakeIam {
    cloud: Rc<Cloud>,
}

impl MfaDirectory for FakeIam {
    async fn list_mfa_devices(&self) -> Result<Vec<MfaDevice>> {
        self.cloud.calls.borrow_mut().device_listings += 1;
        Ok(self.cloud.devices.clone())
    }
}

pub struct FakeSts {
    cloud: Rc<Cloud>,
    credentials: CredentialSet,
}

impl TokenService for FakeSts {
    async fn session_token(&self, mfa_serial: &str, code: &str) -> Result<CredentialSet> {
        self.cloud.calls.borrow_mut().token_requests.push((
            self.credentials.access_key_id().to_string(),
            mfa_serial.to_string(),
            code.to_string(),
        ));
        if self.cloud.reject_codes {
            return Err(Error::AccessDenied("MultiFactorAuthentication failed".to_string()).into());
        }
        Ok(CredentialSet::Temporary {
            access_key_id: "ASIASESSION".to_string(),
            secret_access_key: "session-secret".to_string(),
            session_token: "session-token".to_string(),
            expiry: Some(SystemTime::now() + Duration::from_secs(3600)),
        })
    }
}
