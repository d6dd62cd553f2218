//! Cluster → service → task → container selection.
//!
//! Each step takes the value given on the command line verbatim. Otherwise
//! it queries ECS and asks the operator, and the next step only starts once
//! this one has settled on exactly one identifier.

use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use tokio::time::{sleep, timeout};

use crate::{
    ecs::{EcsApi, RunTaskRequest, TaskInfo},
    error::{self, Error},
    prompt::Prompter,
};

pub const RUNNING: &str = "RUNNING";
const STOPPED: &str = "STOPPED";

/// The part of an ARN-like identifier after its last `/`.
pub fn short_name(id: &str) -> &str {
    id.rsplit_once('/').map_or(id, |(_, tail)| tail)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cluster,
    Service,
    Task,
    Container,
}

/// The identifier one step resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: ResourceKind,
    pub id: String,
    pub label: String,
    pub status: Option<String>,
}

impl Selection {
    fn named(kind: ResourceKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            label: id.to_string(),
            status: None,
        }
    }

    fn task(info: &TaskInfo) -> Self {
        let id = short_name(&info.arn).to_string();
        let status = info.last_status.clone().unwrap_or_default();
        Self {
            kind: ResourceKind::Task,
            label: format!("{id} ({status})"),
            id,
            status: Some(status),
        }
    }
}

/// Bounds the wait for a freshly launched task.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(6),
            timeout: Duration::from_secs(120),
        }
    }
}

impl WaitConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

pub struct Selector<'a, E, P> {
    ecs: &'a E,
    prompter: &'a P,
    wait: WaitConfig,
}

impl<'a, E: EcsApi, P: Prompter> Selector<'a, E, P> {
    pub fn new(ecs: &'a E, prompter: &'a P, wait: WaitConfig) -> Self {
        Self { ecs, prompter, wait }
    }

    /// Resolves the cluster to connect to.
    ///
    /// # Arguments
    /// * `given` - Cluster from the command line; used verbatim without an API call
    ///
    /// # Errors
    /// * `NotFound` when the account has no clusters
    /// * `AccessDenied` when listing is not permitted (the caller may escalate)
    /// * `UserCancelled` when the prompt is aborted
    pub async fn select_cluster(&self, given: Option<&str>) -> Result<Selection> {
        if let Some(cluster) = given {
            return Ok(Selection::named(ResourceKind::Cluster, cluster));
        }

        let arns = self
            .ecs
            .list_clusters()
            .await
            .context("failed to list clusters")?;
        if arns.is_empty() {
            return Err(Error::NotFound("no clusters found".to_string()).into());
        }

        let options = arns
            .iter()
            .map(|arn| Selection::named(ResourceKind::Cluster, short_name(arn)))
            .collect();
        self.choose("Select ECS Cluster", options)
    }

    /// Resolves the service, reading every page of the cluster's listing.
    ///
    /// # Errors
    /// `NotFound` when the cluster has no services.
    pub async fn select_service(&self, cluster: &str, given: Option<&str>) -> Result<Selection> {
        if let Some(service) = given {
            return Ok(Selection::named(ResourceKind::Service, service));
        }

        let arns = self.list_all_services(cluster).await?;
        if arns.is_empty() {
            return Err(Error::NotFound(format!("no services found in cluster {cluster}")).into());
        }

        let options = arns
            .iter()
            .map(|arn| Selection::named(ResourceKind::Service, short_name(arn)))
            .collect();
        self.choose("Select ECS Service", options)
    }

    async fn list_all_services(&self, cluster: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .ecs
                .list_services(cluster, next_token)
                .await
                .context("failed to list services")?;
            arns.extend(page.items);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        debug!("Found {} services in cluster {cluster}", arns.len());
        Ok(arns)
    }

    /// Resolves a running task of `service`.
    ///
    /// Only `RUNNING` tasks are offered. With none running the operator is
    /// asked whether to launch one, and the launched task is returned once it
    /// runs.
    ///
    /// # Returns
    /// The task's short ID, as accepted by `execute-command`.
    ///
    /// # Errors
    /// * `NotRunning` when the launch offer is declined or the launch fails
    /// * `Timeout` when a launched task does not reach `RUNNING` in time
    pub async fn select_task(
        &self,
        cluster: &str,
        service: &str,
        given: Option<&str>,
    ) -> Result<Selection> {
        if let Some(task) = given {
            return Ok(Selection::named(ResourceKind::Task, task));
        }

        let arns = self
            .ecs
            .list_tasks(cluster, service)
            .await
            .context("failed to list tasks")?;
        let tasks = if arns.is_empty() {
            Vec::new()
        } else {
            self.ecs
                .describe_tasks(cluster, arns)
                .await
                .context("failed to describe tasks")?
        };

        let running: Vec<Selection> = tasks
            .iter()
            .map(Selection::task)
            .filter(|task| task.status.as_deref() == Some(RUNNING))
            .collect();

        if running.is_empty() {
            println!("No running tasks found for service {service}.");
            return self.offer_launch(cluster, service).await;
        }
        self.choose("Select ECS Task", running)
    }

    async fn offer_launch(&self, cluster: &str, service: &str) -> Result<Selection> {
        if !self.prompter.confirm("Would you like to start a new task")? {
            return Err(
                Error::NotRunning(format!("no running tasks found for service {service}")).into(),
            );
        }

        println!("Starting a new task...");
        match self.launch_task(cluster, service).await {
            Ok(task) => Ok(task),
            Err(e) if matches!(error::kind(&e), Some(Error::Timeout(_))) => {
                Err(e.context("task failed to start"))
            }
            Err(e) => Err(e.context(Error::NotRunning(format!(
                "failed to start new task for service {service}"
            )))),
        }
    }

    /// Runs one more task from the service's definition and waits until it runs.
    ///
    /// # Errors
    /// * `NotFound` when the service or its task definition is missing, or
    ///   ECS started nothing
    /// * `NotRunning` when the task stops while being waited on
    /// * `Timeout` when the wait ceiling elapses
    pub async fn launch_task(&self, cluster: &str, service: &str) -> Result<Selection> {
        let info = self
            .ecs
            .describe_service(cluster, service)
            .await
            .context("failed to describe service")?
            .ok_or_else(|| Error::NotFound(format!("service not found: {service}")))?;

        let task_definition = info.task_definition.ok_or_else(|| {
            Error::NotFound(format!("no task definition found for service {service}"))
        })?;

        let started = self
            .ecs
            .run_task(RunTaskRequest {
                cluster: cluster.to_string(),
                task_definition,
                launch_type: info.launch_type,
                network_configuration: info.network_configuration,
                platform_version: info.platform_version,
            })
            .await
            .context("failed to run task")?;

        let task = started
            .first()
            .map(Selection::task)
            .ok_or_else(|| Error::NotFound("no task was created".to_string()))?;

        println!("New task started: {}", task.id);
        println!("Waiting for task to become running...");
        self.wait_for_running(cluster, &task.id).await?;
        println!("Task is now running!");

        Ok(Selection {
            status: Some(RUNNING.to_string()),
            label: format!("{} ({RUNNING})", task.id),
            ..task
        })
    }

    async fn wait_for_running(&self, cluster: &str, task_id: &str) -> Result<()> {
        match timeout(self.wait.timeout, self.poll_until_running(cluster, task_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "task {task_id} did not reach {RUNNING} within {}s",
                self.wait.timeout.as_secs()
            ))
            .into()),
        }
    }

    async fn poll_until_running(&self, cluster: &str, task_id: &str) -> Result<()> {
        loop {
            let tasks = self
                .ecs
                .describe_tasks(cluster, vec![task_id.to_string()])
                .await
                .context("failed to describe launched task")?;

            match tasks.first().and_then(|t| t.last_status.as_deref()) {
                Some(RUNNING) => return Ok(()),
                Some(STOPPED) => {
                    return Err(Error::NotRunning(format!(
                        "task {task_id} stopped before reaching {RUNNING}"
                    ))
                    .into());
                }
                status => debug!("Task {task_id} is {}", status.unwrap_or("UNKNOWN")),
            }
            sleep(self.wait.poll_interval).await;
        }
    }

    /// Resolves the container inside `task`; a lone container is picked without asking.
    ///
    /// # Errors
    /// `NotFound` when the task is unknown or has no containers.
    pub async fn select_container(
        &self,
        cluster: &str,
        task: &str,
        given: Option<&str>,
    ) -> Result<Selection> {
        if let Some(container) = given {
            return Ok(Selection::named(ResourceKind::Container, container));
        }

        let tasks = self
            .ecs
            .describe_tasks(cluster, vec![task.to_string()])
            .await
            .context("failed to describe task")?;
        let info = tasks
            .first()
            .ok_or_else(|| Error::NotFound(format!("task not found: {task}")))?;

        let mut options: Vec<Selection> = info
            .containers
            .iter()
            .map(|name| Selection::named(ResourceKind::Container, name))
            .collect();

        match options.len() {
            0 => Err(Error::NotFound(format!("no containers found in task {task}")).into()),
            1 => {
                let container = options.remove(0);
                info!("Using container {}", container.id);
                Ok(container)
            }
            _ => self.choose("Select Container", options),
        }
    }

    fn choose(&self, label: &str, mut options: Vec<Selection>) -> Result<Selection> {
        let labels: Vec<String> = options.iter().map(|o| o.label.clone()).collect();
        let index = self.prompter.select(label, &labels)?;
        if index >= options.len() {
            return Err(Error::NotFound(format!("{label}: invalid choice {index}")).into());
        }
        Ok(options.swap_remove(index))
    }
}
