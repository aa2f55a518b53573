//! Poll a resource until the provider reports it usable.
//!
//! Creation calls return as soon as the control plane accepts a request, well before the
//! resource can be used by anything depending on it. [until] re-issues a describe call
//! every [Policy::interval] until the resource reaches its target state, enters a
//! terminal failure state, or [Policy::max_attempts] is exhausted. Only the status
//! query is repeated, never the call that created the resource.

use crate::{
    provider::{ImageState, InstanceState, LoadBalancerState, Provider, TargetHealth},
    Error, Interrupt,
};
use std::{collections::HashMap, fmt, time::Duration};
use tracing::debug;

/// Default interval between status checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Default number of status checks before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 40;

/// How often and how long to poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// A resource whose usability lags its creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// Every instance is running.
    Instances(Vec<String>),
    /// The image is available.
    Image(String),
    /// At least `min_size` members are in service.
    Group { name: String, min_size: usize },
    /// The load balancer is active.
    LoadBalancer(String),
    /// At least one target is registered and every target is healthy.
    Targets { group_arn: String, ids: Vec<String> },
}

impl Resource {
    /// State the resource must reach.
    pub fn target(&self) -> &'static str {
        match self {
            Resource::Instances(_) => "running",
            Resource::Image(_) => "available",
            Resource::Group { .. } => "in service",
            Resource::LoadBalancer(_) => "active",
            Resource::Targets { .. } => "healthy",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Instances(ids) => write!(f, "instances {ids:?}"),
            Resource::Image(id) => write!(f, "image {id}"),
            Resource::Group { name, .. } => write!(f, "group {name}"),
            Resource::LoadBalancer(arn) => write!(f, "load balancer {arn}"),
            Resource::Targets { group_arn, .. } => write!(f, "targets of {group_arn}"),
        }
    }
}

/// A polling predicate: `resource` must reach [Resource::target] within `policy`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub resource: Resource,
    pub policy: Policy,
}

/// Outcome of a single status check.
#[derive(Debug, PartialEq, Eq)]
enum Status {
    Pending,
    Ready,
    Failed(String),
}

/// Poll until `condition` holds.
///
/// Returns the number of status checks issued. Fails with [Error::WaitTimeout] once the
/// attempt budget is spent, [Error::WaitFailed] if the resource enters a state it can
/// never leave, [Error::ProviderCall] if a status check fails, or [Error::Interrupted].
pub async fn until<P: Provider>(
    provider: &P,
    condition: &Condition,
    interrupt: &Interrupt,
) -> Result<usize, Error> {
    let Condition { resource, policy } = condition;
    for attempt in 1..=policy.max_attempts {
        match check(provider, resource).await? {
            Status::Ready => {
                debug!(%resource, attempt, target = resource.target(), "resource ready");
                return Ok(attempt);
            }
            Status::Failed(state) => {
                return Err(Error::WaitFailed {
                    resource: resource.to_string(),
                    target: resource.target(),
                    state,
                });
            }
            Status::Pending => {
                debug!(%resource, attempt, target = resource.target(), "resource not ready");
            }
        }
        if attempt < policy.max_attempts && !interrupt.sleep(policy.interval).await {
            return Err(Error::Interrupted);
        }
    }
    Err(Error::WaitTimeout {
        resource: resource.to_string(),
        target: resource.target(),
        attempts: policy.max_attempts,
    })
}

async fn check<P: Provider>(provider: &P, resource: &Resource) -> Result<Status, Error> {
    let status = match resource {
        Resource::Instances(ids) => {
            let states: HashMap<String, InstanceState> =
                provider.describe_instances(ids).await?.into_iter().collect();
            let mut status = Status::Ready;
            for id in ids {
                match states.get(id) {
                    Some(InstanceState::Running) => {}
                    Some(
                        state @ (InstanceState::ShuttingDown
                        | InstanceState::Terminated
                        | InstanceState::Stopping
                        | InstanceState::Stopped),
                    ) => return Ok(Status::Failed(format!("{id} {}", state.as_str()))),
                    _ => status = Status::Pending,
                }
            }
            status
        }
        Resource::Image(id) => match provider.describe_image(id).await? {
            ImageState::Available => Status::Ready,
            ImageState::Failed => Status::Failed(ImageState::Failed.as_str().to_string()),
            ImageState::Other(state) if state == "error" => Status::Failed(state),
            _ => Status::Pending,
        },
        Resource::Group { name, min_size } => {
            let members = provider.describe_group(name).await?;
            let in_service = members.iter().filter(|m| m.in_service).count();
            if in_service >= *min_size {
                Status::Ready
            } else {
                Status::Pending
            }
        }
        Resource::LoadBalancer(arn) => match provider.describe_load_balancer(arn).await? {
            LoadBalancerState::Active => Status::Ready,
            LoadBalancerState::Failed => {
                Status::Failed(LoadBalancerState::Failed.as_str().to_string())
            }
            _ => Status::Pending,
        },
        Resource::Targets { group_arn, ids } => {
            let health: HashMap<String, TargetHealth> = provider
                .describe_target_health(group_arn, ids)
                .await?
                .into_iter()
                .collect();
            if !ids.is_empty() && ids.iter().all(|id| health.get(id) == Some(&TargetHealth::Healthy))
            {
                Status::Ready
            } else {
                Status::Pending
            }
        }
    };
    Ok(status)
}
