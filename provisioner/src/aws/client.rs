//! AWS SDK wrappers backing [Provider]

use crate::provider::{
    Error, GroupMember, GroupSpec, ImageState, IngressRule, Instance, InstanceSpec,
    InstanceState, KeyPair, LoadBalancerSpec, LoadBalancerState, Operation, Provider, Subnet,
    TargetGroupSpec, TargetHealth, TemplateSpec,
};
use aws_config::{retry::RetryConfig, BehaviorVersion, Region};
use aws_sdk_autoscaling::{
    types::{LaunchTemplateSpecification, LifecycleState},
    Client as AutoscalingClient,
};
use aws_sdk_ec2::{
    error::ProvideErrorMetadata,
    types::{
        Filter, ImageState as Ec2ImageState, InstanceStateName, InstanceType, IpPermission,
        IpRange, RequestLaunchTemplateData, ResourceType, Tag, TagSpecification,
    },
    Client as Ec2Client,
};
use aws_sdk_elasticloadbalancingv2::{
    types::{
        Action, ActionTypeEnum, LoadBalancerStateEnum, LoadBalancerTypeEnum, ProtocolEnum,
        TargetDescription, TargetHealthStateEnum, TargetTypeEnum,
    },
    Client as ElbClient,
};
use std::time::Duration;
use tracing::debug;

/// Error code returned while a just-launched instance has not propagated yet
const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";

/// Error code returned while a just-created load balancer has not propagated yet
const LOAD_BALANCER_NOT_FOUND: &str = "LoadBalancerNotFound";

/// Handles to the EC2, Auto Scaling, and Elastic Load Balancing (v2) APIs of one region
#[derive(Clone)]
pub struct Client {
    ec2: Ec2Client,
    autoscaling: AutoscalingClient,
    elb: ElbClient,
}

impl Client {
    /// Loads credentials from the environment and creates clients for `region`
    pub async fn new(region: String) -> Self {
        let retry = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(500))
            .with_max_backoff(Duration::from_secs(10));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .retry_config(retry)
            .load()
            .await;
        Self {
            ec2: Ec2Client::new(&config),
            autoscaling: AutoscalingClient::new(&config),
            elb: ElbClient::new(&config),
        }
    }
}

/// Tags a resource with a human-readable name
fn name_tag(resource: ResourceType, name: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource)
        .tags(Tag::builder().key("Name").value(name).build())
        .build()
}

impl Provider for Client {
    async fn create_key_pair(&self, name: &str) -> Result<KeyPair, Error> {
        let op = Operation::CreateKeyPair;
        let output = self
            .ec2
            .create_key_pair()
            .key_name(name)
            .tag_specifications(name_tag(ResourceType::KeyPair, name))
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        let name = output
            .key_name()
            .ok_or_else(|| Error::missing(op, "key name"))?;
        let material = output
            .key_material()
            .ok_or_else(|| Error::missing(op, "key material"))?;
        Ok(KeyPair {
            name: name.to_string(),
            material: material.to_string(),
        })
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<String, Error> {
        let op = Operation::CreateSecurityGroup;
        let output = self
            .ec2
            .create_security_group()
            .group_name(name)
            .description(description)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        output
            .group_id()
            .map(String::from)
            .ok_or_else(|| Error::missing(op, "group id"))
    }

    async fn authorize_ingress(
        &self,
        security_group_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), Error> {
        let permissions = rules
            .iter()
            .map(|rule| {
                IpPermission::builder()
                    .ip_protocol(&rule.protocol)
                    .from_port(i32::from(rule.port))
                    .to_port(i32::from(rule.port))
                    .ip_ranges(IpRange::builder().cidr_ip(&rule.cidr).build())
                    .build()
            })
            .collect();
        self.ec2
            .authorize_security_group_ingress()
            .group_id(security_group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
            .map_err(|err| Error::new(Operation::AuthorizeIngress, err.into_service_error()))?;
        Ok(())
    }

    async fn launch_instance(&self, spec: &InstanceSpec<'_>) -> Result<Instance, Error> {
        let op = Operation::LaunchInstance;
        let output = self
            .ec2
            .run_instances()
            .image_id(spec.image)
            .instance_type(InstanceType::from(spec.instance_type))
            .key_name(spec.key_name)
            .security_group_ids(spec.security_group_id)
            .user_data(spec.user_data)
            .min_count(1)
            .max_count(1)
            .tag_specifications(name_tag(ResourceType::Instance, spec.name))
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        let instance = output
            .instances()
            .first()
            .ok_or_else(|| Error::missing(op, "instance"))?;
        let id = instance
            .instance_id()
            .ok_or_else(|| Error::missing(op, "instance id"))?;
        let subnet_id = instance
            .subnet_id()
            .ok_or_else(|| Error::missing(op, "subnet id"))?;
        Ok(Instance {
            id: id.to_string(),
            subnet_id: subnet_id.to_string(),
        })
    }

    async fn describe_instances(
        &self,
        instance_ids: &[String],
    ) -> Result<Vec<(String, InstanceState)>, Error> {
        // An empty filter would describe every instance in the account
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }
        let output = match self
            .ec2
            .describe_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.code() == Some(INSTANCE_NOT_FOUND) {
                    return Ok(Vec::new());
                }
                return Err(Error::new(Operation::DescribeInstances, err));
            }
        };
        let mut states = Vec::new();
        for reservation in output.reservations() {
            for instance in reservation.instances() {
                let Some(id) = instance.instance_id() else {
                    continue;
                };
                let state = match instance.state().and_then(|s| s.name()) {
                    Some(InstanceStateName::Pending) => InstanceState::Pending,
                    Some(InstanceStateName::Running) => InstanceState::Running,
                    Some(InstanceStateName::ShuttingDown) => InstanceState::ShuttingDown,
                    Some(InstanceStateName::Terminated) => InstanceState::Terminated,
                    Some(InstanceStateName::Stopping) => InstanceState::Stopping,
                    Some(InstanceStateName::Stopped) => InstanceState::Stopped,
                    Some(other) => InstanceState::Other(other.as_str().to_string()),
                    None => InstanceState::Other("unknown".to_string()),
                };
                states.push((id.to_string(), state));
            }
        }
        Ok(states)
    }

    async fn describe_subnet(&self, subnet_id: &str) -> Result<Subnet, Error> {
        let op = Operation::DescribeSubnet;
        let output = self
            .ec2
            .describe_subnets()
            .subnet_ids(subnet_id)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        let subnet = output
            .subnets()
            .first()
            .ok_or_else(|| Error::missing(op, "subnet"))?;
        let availability_zone = subnet
            .availability_zone()
            .ok_or_else(|| Error::missing(op, "availability zone"))?;
        let vpc_id = subnet
            .vpc_id()
            .ok_or_else(|| Error::missing(op, "vpc id"))?;
        Ok(Subnet {
            availability_zone: availability_zone.to_string(),
            vpc_id: vpc_id.to_string(),
        })
    }

    async fn create_image(&self, instance_id: &str, name: &str) -> Result<String, Error> {
        let op = Operation::CreateImage;
        let output = self
            .ec2
            .create_image()
            .instance_id(instance_id)
            .name(name)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        output
            .image_id()
            .map(String::from)
            .ok_or_else(|| Error::missing(op, "image id"))
    }

    async fn describe_image(&self, image_id: &str) -> Result<ImageState, Error> {
        let output = self
            .ec2
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(|err| Error::new(Operation::DescribeImage, err.into_service_error()))?;
        let state = match output.images().first().and_then(|image| image.state()) {
            Some(Ec2ImageState::Available) => ImageState::Available,
            Some(Ec2ImageState::Pending) | None => ImageState::Pending,
            Some(Ec2ImageState::Failed) => ImageState::Failed,
            Some(other) => ImageState::Other(other.as_str().to_string()),
        };
        Ok(state)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<(), Error> {
        let output = self
            .ec2
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| Error::new(Operation::TerminateInstance, err.into_service_error()))?;
        for change in output.terminating_instances() {
            debug!(
                instance = change.instance_id(),
                state = ?change.current_state().and_then(|s| s.name()),
                "terminating instance"
            );
        }
        Ok(())
    }

    async fn create_launch_template(&self, spec: &TemplateSpec<'_>) -> Result<String, Error> {
        let op = Operation::CreateLaunchTemplate;
        let data = RequestLaunchTemplateData::builder()
            .image_id(spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type))
            .key_name(spec.key_name)
            .security_group_ids(spec.security_group_id)
            .user_data(spec.user_data)
            .build();
        let output = self
            .ec2
            .create_launch_template()
            .launch_template_name(spec.name)
            .launch_template_data(data)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        output
            .launch_template()
            .and_then(|template| template.launch_template_id())
            .map(String::from)
            .ok_or_else(|| Error::missing(op, "launch template id"))
    }

    async fn create_group(&self, spec: &GroupSpec<'_>) -> Result<(), Error> {
        let op = Operation::CreateGroup;
        let min_size = i32::try_from(spec.min_size).map_err(|err| Error::new(op, err))?;
        let max_size = i32::try_from(spec.max_size).map_err(|err| Error::new(op, err))?;
        self.autoscaling
            .create_auto_scaling_group()
            .auto_scaling_group_name(spec.name)
            .availability_zones(spec.availability_zone)
            .launch_template(
                LaunchTemplateSpecification::builder()
                    .launch_template_id(spec.launch_template_id)
                    .build(),
            )
            .min_size(min_size)
            .max_size(max_size)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        Ok(())
    }

    async fn describe_group(&self, name: &str) -> Result<Vec<GroupMember>, Error> {
        let output = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(|err| Error::new(Operation::DescribeGroup, err.into_service_error()))?;
        let mut members = Vec::new();
        for group in output.auto_scaling_groups() {
            for instance in group.instances() {
                let id: Option<&str> = instance.instance_id().into();
                let Some(id) = id else {
                    continue;
                };
                let state: Option<&LifecycleState> = instance.lifecycle_state().into();
                members.push(GroupMember {
                    instance_id: id.to_string(),
                    in_service: state == Some(&LifecycleState::InService),
                });
            }
        }
        Ok(members)
    }

    async fn list_group_instances(&self, name: &str) -> Result<Vec<String>, Error> {
        let output = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(|err| Error::new(Operation::ListGroupInstances, err.into_service_error()))?;
        let mut ids = Vec::new();
        for group in output.auto_scaling_groups() {
            for instance in group.instances() {
                let id: Option<&str> = instance.instance_id().into();
                if let Some(id) = id {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    async fn describe_vpc_subnets(&self, vpc_id: &str) -> Result<Vec<String>, Error> {
        let output = self
            .ec2
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|err| Error::new(Operation::DescribeVpcSubnets, err.into_service_error()))?;
        Ok(output
            .subnets()
            .iter()
            .filter_map(|subnet| subnet.subnet_id().map(String::from))
            .collect())
    }

    async fn create_load_balancer(&self, spec: &LoadBalancerSpec<'_>) -> Result<String, Error> {
        let op = Operation::CreateLoadBalancer;
        let output = self
            .elb
            .create_load_balancer()
            .name(spec.name)
            .security_groups(spec.security_group_id)
            .set_subnets(Some(spec.subnet_ids.to_vec()))
            .r#type(LoadBalancerTypeEnum::Application)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        output
            .load_balancers()
            .first()
            .and_then(|lb| lb.load_balancer_arn())
            .map(String::from)
            .ok_or_else(|| Error::missing(op, "load balancer arn"))
    }

    async fn describe_load_balancer(&self, arn: &str) -> Result<LoadBalancerState, Error> {
        let output = match self
            .elb
            .describe_load_balancers()
            .load_balancer_arns(arn)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.code() == Some(LOAD_BALANCER_NOT_FOUND) {
                    return Ok(LoadBalancerState::Provisioning);
                }
                return Err(Error::new(Operation::DescribeLoadBalancer, err));
            }
        };
        let code = output
            .load_balancers()
            .first()
            .and_then(|lb| lb.state())
            .and_then(|state| state.code());
        let state = match code {
            Some(LoadBalancerStateEnum::Active) => LoadBalancerState::Active,
            Some(LoadBalancerStateEnum::ActiveImpaired) => LoadBalancerState::ActiveImpaired,
            Some(LoadBalancerStateEnum::Failed) => LoadBalancerState::Failed,
            Some(LoadBalancerStateEnum::Provisioning) | None => LoadBalancerState::Provisioning,
            Some(other) => LoadBalancerState::Other(other.as_str().to_string()),
        };
        Ok(state)
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec<'_>) -> Result<String, Error> {
        let op = Operation::CreateTargetGroup;
        let output = self
            .elb
            .create_target_group()
            .name(spec.name)
            .protocol(ProtocolEnum::Http)
            .port(i32::from(spec.port))
            .vpc_id(spec.vpc_id)
            .target_type(TargetTypeEnum::Instance)
            .health_check_path(spec.health_check_path)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        output
            .target_groups()
            .first()
            .and_then(|group| group.target_group_arn())
            .map(String::from)
            .ok_or_else(|| Error::missing(op, "target group arn"))
    }

    async fn register_targets(
        &self,
        target_group_arn: &str,
        instance_ids: &[String],
        port: u16,
    ) -> Result<(), Error> {
        let op = Operation::RegisterTargets;
        // The API rejects an empty target list
        if instance_ids.is_empty() {
            return Ok(());
        }
        let targets = instance_ids
            .iter()
            .map(|id| {
                TargetDescription::builder()
                    .id(id)
                    .port(i32::from(port))
                    .build()
                    .map_err(|err| Error::new(op, err))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.elb
            .register_targets()
            .target_group_arn(target_group_arn)
            .set_targets(Some(targets))
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        Ok(())
    }

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        port: u16,
    ) -> Result<String, Error> {
        let op = Operation::CreateListener;
        let forward = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn(target_group_arn)
            .build()
            .map_err(|err| Error::new(op, err))?;
        let output = self
            .elb
            .create_listener()
            .load_balancer_arn(load_balancer_arn)
            .protocol(ProtocolEnum::Http)
            .port(i32::from(port))
            .default_actions(forward)
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        output
            .listeners()
            .first()
            .and_then(|listener| listener.listener_arn())
            .map(String::from)
            .ok_or_else(|| Error::missing(op, "listener arn"))
    }

    async fn describe_target_health(
        &self,
        target_group_arn: &str,
        instance_ids: &[String],
    ) -> Result<Vec<(String, TargetHealth)>, Error> {
        let op = Operation::DescribeTargetHealth;
        let mut request = self
            .elb
            .describe_target_health()
            .target_group_arn(target_group_arn);
        for id in instance_ids {
            let target = TargetDescription::builder()
                .id(id)
                .build()
                .map_err(|err| Error::new(op, err))?;
            request = request.targets(target);
        }
        let output = request
            .send()
            .await
            .map_err(|err| Error::new(op, err.into_service_error()))?;
        let mut health = Vec::new();
        for description in output.target_health_descriptions() {
            let Some(target) = description.target() else {
                continue;
            };
            let id: Option<&str> = target.id().into();
            let Some(id) = id else {
                continue;
            };
            let state = match description.target_health().and_then(|h| h.state()) {
                Some(TargetHealthStateEnum::Initial) | None => TargetHealth::Initial,
                Some(TargetHealthStateEnum::Healthy) => TargetHealth::Healthy,
                Some(TargetHealthStateEnum::Unhealthy) => TargetHealth::Unhealthy,
                Some(TargetHealthStateEnum::Unused) => TargetHealth::Unused,
                Some(TargetHealthStateEnum::Draining) => TargetHealth::Draining,
                Some(TargetHealthStateEnum::Unavailable) => TargetHealth::Unavailable,
                Some(other) => TargetHealth::Other(other.as_str().to_string()),
            };
            health.push((id.to_string(), state));
        }
        Ok(health)
    }
}
