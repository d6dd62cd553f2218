//! The slice of the ECS API the selection chain needs.

use anyhow::Result;
use aws_sdk_ecs::{
    Client,
    types::{LaunchType, NetworkConfiguration, Task},
};

use crate::error;

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<String>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInfo {
    pub arn: String,
    pub last_status: Option<String>,
    pub containers: Vec<String>,
}

/// What a service needs to launch one more of its tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceInfo {
    pub task_definition: Option<String>,
    pub launch_type: Option<LaunchType>,
    pub network_configuration: Option<NetworkConfiguration>,
    pub platform_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunTaskRequest {
    pub cluster: String,
    pub task_definition: String,
    pub launch_type: Option<LaunchType>,
    pub network_configuration: Option<NetworkConfiguration>,
    pub platform_version: Option<String>,
}

/// ECS operations used while resolving a target task.
///
/// Slices are passed as owned `Vec`s to keep the mock simple.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait EcsApi {
    /// Lists cluster ARNs visible to the caller.
    ///
    /// # Errors
    ///
    /// `AccessDenied` when the credentials may not list clusters, `Transport`
    /// for any other API failure.
    async fn list_clusters(&self) -> Result<Vec<String>>;

    /// Fetches one page of service ARNs.
    ///
    /// # Arguments
    /// * `cluster` - Cluster name or ARN
    /// * `next_token` - Token from the previous page, `None` for the first
    ///
    /// # Returns
    /// The page's ARNs plus the token for the next page, absent on the last.
    async fn list_services(&self, cluster: &str, next_token: Option<String>) -> Result<Page>;

    /// Lists the task ARNs belonging to `service`.
    async fn list_tasks(&self, cluster: &str, service: &str) -> Result<Vec<String>>;

    /// Describes tasks by ID or ARN. Unknown tasks are left out of the result.
    async fn describe_tasks(&self, cluster: &str, tasks: Vec<String>) -> Result<Vec<TaskInfo>>;

    /// Reads the launch settings of `service`.
    ///
    /// # Returns
    /// `None` when the service does not exist.
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Option<ServiceInfo>>;

    /// Starts one task with execute-command enabled.
    ///
    /// # Returns
    /// The tasks ECS reports as started; empty when placement failed.
    async fn run_task(&self, request: RunTaskRequest) -> Result<Vec<TaskInfo>>;
}

pub struct EcsClient {
    client: Client,
}

impl EcsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn task_info(task: &Task) -> TaskInfo {
    TaskInfo {
        arn: task.task_arn().unwrap_or_default().to_string(),
        last_status: task.last_status().map(str::to_string),
        containers: task
            .containers()
            .iter()
            .filter_map(|c| c.name().map(str::to_string))
            .collect(),
    }
}

impl EcsApi for EcsClient {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_clusters()
            .send()
            .await
            .map_err(error::from_sdk)?;
        Ok(output.cluster_arns().to_vec())
    }

    async fn list_services(&self, cluster: &str, next_token: Option<String>) -> Result<Page> {
        let output = self
            .client
            .list_services()
            .cluster(cluster)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(error::from_sdk)?;
        Ok(Page {
            items: output.service_arns().to_vec(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn list_tasks(&self, cluster: &str, service: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .list_tasks()
            .cluster(cluster)
            .service_name(service)
            .send()
            .await
            .map_err(error::from_sdk)?;
        Ok(output.task_arns().to_vec())
    }

    async fn describe_tasks(&self, cluster: &str, tasks: Vec<String>) -> Result<Vec<TaskInfo>> {
        let output = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(tasks))
            .send()
            .await
            .map_err(error::from_sdk)?;
        Ok(output.tasks().iter().map(task_info).collect())
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Option<ServiceInfo>> {
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(error::from_sdk)?;
        Ok(output.services().first().map(|s| ServiceInfo {
            task_definition: s.task_definition().map(str::to_string),
            launch_type: s.launch_type().cloned(),
            network_configuration: s.network_configuration().cloned(),
            platform_version: s.platform_version().map(str::to_string),
        }))
    }

    async fn run_task(&self, request: RunTaskRequest) -> Result<Vec<TaskInfo>> {
        let output = self
            .client
            .run_task()
            .cluster(request.cluster)
            .task_definition(request.task_definition)
            .set_launch_type(request.launch_type)
            .set_network_configuration(request.network_configuration)
            .set_platform_version(request.platform_version)
            .enable_execute_command(true)
            .send()
            .await
            .map_err(error::from_sdk)?;
        Ok(output.tasks().iter().map(task_info).collect())
    }
}
