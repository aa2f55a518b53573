//! Interface to the cloud provider's control plane.
//!
//! [Provider] exposes exactly the operations the pipeline needs, in provider-neutral
//! terms. Implementations own request construction, credentials, and region selection.

use std::{fmt, future::Future};
use thiserror::Error;

/// An operation exposed by a [Provider].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateKeyPair,
    CreateSecurityGroup,
    AuthorizeIngress,
    LaunchInstance,
    DescribeInstances,
    DescribeSubnet,
    CreateImage,
    DescribeImage,
    TerminateInstance,
    CreateLaunchTemplate,
    CreateGroup,
    DescribeGroup,
    ListGroupInstances,
    DescribeVpcSubnets,
    CreateLoadBalancer,
    DescribeLoadBalancer,
    CreateTargetGroup,
    RegisterTargets,
    CreateListener,
    DescribeTargetHealth,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateKeyPair => "create_key_pair",
            Operation::CreateSecurityGroup => "create_security_group",
            Operation::AuthorizeIngress => "authorize_ingress",
            Operation::LaunchInstance => "launch_instance",
            Operation::DescribeInstances => "describe_instances",
            Operation::DescribeSubnet => "describe_subnet",
            Operation::CreateImage => "create_image",
            Operation::DescribeImage => "describe_image",
            Operation::TerminateInstance => "terminate_instance",
            Operation::CreateLaunchTemplate => "create_launch_template",
            Operation::CreateGroup => "create_group",
            Operation::DescribeGroup => "describe_group",
            Operation::ListGroupInstances => "list_group_instances",
            Operation::DescribeVpcSubnets => "describe_vpc_subnets",
            Operation::CreateLoadBalancer => "create_load_balancer",
            Operation::DescribeLoadBalancer => "describe_load_balancer",
            Operation::CreateTargetGroup => "create_target_group",
            Operation::RegisterTargets => "register_targets",
            Operation::CreateListener => "create_listener",
            Operation::DescribeTargetHealth => "describe_target_health",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request rejected (or answered unusably) by the provider.
#[derive(Error, Debug)]
#[error("{operation}: {source}")]
pub struct Error {
    pub operation: Operation,
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    pub fn new(
        operation: Operation,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// The provider accepted the request but omitted a field the pipeline depends on.
    pub fn missing(operation: Operation, field: &str) -> Self {
        Self::new(operation, format!("response missing {field}"))
    }
}

/// A freshly created key pair.
#[derive(Clone)]
pub struct KeyPair {
    pub name: String,
    pub material: String,
}

/// A single inbound rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: String,
    pub port: u16,
    pub cidr: String,
}

/// Parameters for launching the instance that gets baked into an image.
#[derive(Clone, Debug)]
pub struct InstanceSpec<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub instance_type: &'a str,
    pub key_name: &'a str,
    pub security_group_id: &'a str,
    pub user_data: &'a str,
}

/// A launched instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub subnet_id: String,
}

/// Placement of a subnet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subnet {
    pub availability_zone: String,
    pub vpc_id: String,
}

/// Parameters for the launch template used by the autoscaling group.
#[derive(Clone, Debug)]
pub struct TemplateSpec<'a> {
    pub name: &'a str,
    pub image_id: &'a str,
    pub instance_type: &'a str,
    pub key_name: &'a str,
    pub security_group_id: &'a str,
    pub user_data: &'a str,
}

/// Parameters for the autoscaling group.
#[derive(Clone, Debug)]
pub struct GroupSpec<'a> {
    pub name: &'a str,
    pub launch_template_id: &'a str,
    pub availability_zone: &'a str,
    pub min_size: usize,
    pub max_size: usize,
}

/// Parameters for the load balancer.
#[derive(Clone, Debug)]
pub struct LoadBalancerSpec<'a> {
    pub name: &'a str,
    pub security_group_id: &'a str,
    pub subnet_ids: &'a [String],
}

/// Parameters for the target group.
#[derive(Clone, Debug)]
pub struct TargetGroupSpec<'a> {
    pub name: &'a str,
    pub vpc_id: &'a str,
    pub port: u16,
    pub health_check_path: &'a str,
}

/// Lifecycle state of an instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Other(String),
}

impl InstanceState {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Other(state) => state,
        }
    }
}

/// Lifecycle state of a machine image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageState {
    Pending,
    Available,
    Failed,
    Other(String),
}

impl ImageState {
    pub fn as_str(&self) -> &str {
        match self {
            ImageState::Pending => "pending",
            ImageState::Available => "available",
            ImageState::Failed => "failed",
            ImageState::Other(state) => state,
        }
    }
}

/// A member of an autoscaling group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMember {
    pub instance_id: String,
    pub in_service: bool,
}

/// Provisioning state of a load balancer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadBalancerState {
    Provisioning,
    Active,
    ActiveImpaired,
    Failed,
    Other(String),
}

impl LoadBalancerState {
    pub fn as_str(&self) -> &str {
        match self {
            LoadBalancerState::Provisioning => "provisioning",
            LoadBalancerState::Active => "active",
            LoadBalancerState::ActiveImpaired => "active_impaired",
            LoadBalancerState::Failed => "failed",
            LoadBalancerState::Other(state) => state,
        }
    }
}

/// Health of a registered target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetHealth {
    Initial,
    Healthy,
    Unhealthy,
    Unused,
    Draining,
    Unavailable,
    Other(String),
}

impl TargetHealth {
    pub fn as_str(&self) -> &str {
        match self {
            TargetHealth::Initial => "initial",
            TargetHealth::Healthy => "healthy",
            TargetHealth::Unhealthy => "unhealthy",
            TargetHealth::Unused => "unused",
            TargetHealth::Draining => "draining",
            TargetHealth::Unavailable => "unavailable",
            TargetHealth::Other(state) => state,
        }
    }
}

/// Control-plane operations used by the pipeline.
///
/// Mutating operations are invoked at most once per run. `describe_*` operations may be
/// invoked repeatedly while waiting for a resource to become usable.
pub trait Provider: Send + Sync {
    fn create_key_pair(&self, name: &str) -> impl Future<Output = Result<KeyPair, Error>> + Send;

    /// Returns the security group ID.
    fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    fn authorize_ingress(
        &self,
        security_group_id: &str,
        rules: &[IngressRule],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn launch_instance(
        &self,
        spec: &InstanceSpec<'_>,
    ) -> impl Future<Output = Result<Instance, Error>> + Send;

    /// Returns the state of each requested instance the provider knows about.
    fn describe_instances(
        &self,
        instance_ids: &[String],
    ) -> impl Future<Output = Result<Vec<(String, InstanceState)>, Error>> + Send;

    fn describe_subnet(&self, subnet_id: &str) -> impl Future<Output = Result<Subnet, Error>> + Send;

    /// Returns the image ID.
    fn create_image(
        &self,
        instance_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    fn describe_image(
        &self,
        image_id: &str,
    ) -> impl Future<Output = Result<ImageState, Error>> + Send;

    fn terminate_instance(&self, instance_id: &str)
        -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the launch template ID.
    fn create_launch_template(
        &self,
        spec: &TemplateSpec<'_>,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    fn create_group(&self, spec: &GroupSpec<'_>) -> impl Future<Output = Result<(), Error>> + Send;

    fn describe_group(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<GroupMember>, Error>> + Send;

    /// Returns the IDs of the instances in the group.
    fn list_group_instances(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Returns the IDs of every subnet in the VPC.
    fn describe_vpc_subnets(
        &self,
        vpc_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Returns the load balancer ARN.
    fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec<'_>,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    fn describe_load_balancer(
        &self,
        arn: &str,
    ) -> impl Future<Output = Result<LoadBalancerState, Error>> + Send;

    /// Returns the target group ARN.
    fn create_target_group(
        &self,
        spec: &TargetGroupSpec<'_>,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    fn register_targets(
        &self,
        target_group_arn: &str,
        instance_ids: &[String],
        port: u16,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the listener ARN.
    fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        port: u16,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    /// Returns the health of each requested target the provider knows about.
    fn describe_target_health(
        &self,
        target_group_arn: &str,
        instance_ids: &[String],
    ) -> impl Future<Output = Result<Vec<(String, TargetHealth)>, Error>> + Send;
}
