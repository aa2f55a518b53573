//! Execute the provisioning steps in order, threading identifiers between them.

use crate::{
    provider::{
        GroupSpec, IngressRule, InstanceSpec, LoadBalancerSpec, Provider, TargetGroupSpec,
        TemplateSpec,
    },
    registry::{Key, Registry, Value},
    services,
    sink::Sink,
    step::Step,
    wait::{self, Condition, Policy, Resource},
    Aborted, Error, Interrupt,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Base image launched (and customized) before baking.
pub const DEFAULT_IMAGE: &str = "ami-0c94855ba95c71c99";

/// Instance type of the source instance and of every group member.
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

/// Minimum number of group members.
pub const DEFAULT_MIN_SIZE: usize = 2;

/// Maximum number of group members.
pub const DEFAULT_MAX_SIZE: usize = 3;

/// Port the listener accepts and targets serve on.
pub const DEFAULT_PORT: u16 = 80;

/// Path probed by target health checks.
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/";

/// Delay between the group entering service and enumerating its members.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(20);

/// Ports opened to the world by default: HTTP, HTTPS, and SSH.
pub fn default_ingress() -> Vec<IngressRule> {
    [80, 443, 22]
        .into_iter()
        .map(|port| IngressRule {
            protocol: "tcp".to_string(),
            port,
            cidr: "0.0.0.0/0".to_string(),
        })
        .collect()
}

/// Names given to created resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Names {
    pub key_pair: String,
    pub security_group: String,
    pub instance: String,
    pub image: String,
    pub launch_template: String,
    pub group: String,
    pub load_balancer: String,
    pub target_group: String,
}

impl Names {
    /// Derive every resource name from a deployment tag.
    pub fn from_tag(tag: &str) -> Self {
        Self {
            key_pair: format!("{tag}-key"),
            security_group: format!("{tag}-sg"),
            instance: tag.to_string(),
            image: format!("{tag}-image"),
            launch_template: format!("{tag}-template"),
            group: format!("{tag}-group"),
            load_balancer: format!("{tag}-lb"),
            target_group: format!("{tag}-tg"),
        }
    }
}

/// Listener and health check settings for the load balancer segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancing {
    pub port: u16,
    pub health_check_path: String,
}

impl Default for LoadBalancing {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            health_check_path: DEFAULT_HEALTH_CHECK_PATH.to_string(),
        }
    }
}

/// Everything a run needs besides the identifiers it discovers along the way.
#[derive(Clone, Debug)]
pub struct Plan {
    pub names: Names,
    pub image: String,
    pub instance_type: String,
    pub ingress: Vec<IngressRule>,
    /// Encoded user data, passed through untouched.
    pub user_data: String,
    pub min_size: usize,
    pub max_size: usize,
    /// When `None`, the run ends once the group's members are known.
    pub load_balancer: Option<LoadBalancing>,
    pub wait: Policy,
    pub settle: Duration,
}

impl Plan {
    /// A plan with default sizing, ingress, and bootstrap for `tag`.
    pub fn new(tag: &str) -> Self {
        Self {
            names: Names::from_tag(tag),
            image: DEFAULT_IMAGE.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            ingress: default_ingress(),
            user_data: services::user_data(),
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            load_balancer: Some(LoadBalancing::default()),
            wait: Policy::default(),
            settle: DEFAULT_SETTLE,
        }
    }

    fn port(&self) -> u16 {
        self.load_balancer
            .as_ref()
            .map_or(DEFAULT_PORT, |lb| lb.port)
    }

    fn health_check_path(&self) -> &str {
        self.load_balancer
            .as_ref()
            .map_or(DEFAULT_HEALTH_CHECK_PATH, |lb| lb.health_check_path.as_str())
    }
}

/// State threaded through a single run.
pub struct Context<'a, P> {
    pub registry: Registry,
    pub provider: &'a P,
}

impl<'a, P: Provider> Context<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            registry: Registry::new(),
            provider,
        }
    }
}

/// What a step's action produced.
#[derive(Default)]
struct Outcome {
    outputs: Vec<(Key, Value)>,
    wait: Option<Resource>,
}

impl Outcome {
    fn output(mut self, key: Key, value: impl Into<Value>) -> Self {
        self.outputs.push((key, value.into()));
        self
    }

    fn wait(mut self, resource: Resource) -> Self {
        self.wait = Some(resource);
        self
    }
}

/// An ordered sequence of [Step]s and the [Plan] that parameterizes them.
pub struct Pipeline {
    plan: Plan,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(plan: Plan) -> Self {
        let mut steps = Step::BASE.to_vec();
        if plan.load_balancer.is_some() {
            steps.extend(Step::LOAD_BALANCER);
        }
        Self { plan, steps }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Execute every step in order, stopping at the first failure.
    ///
    /// On success, returns every identifier recorded. On failure, nothing is retried or
    /// rolled back: the returned [Aborted] names the failing step and carries the
    /// identifiers recorded up to that point.
    pub async fn run<P: Provider, S: Sink>(
        &self,
        provider: &P,
        sink: &S,
        interrupt: &Interrupt,
    ) -> Result<Registry, Aborted> {
        let mut context = Context::new(provider);
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            info!(step = step.name(), index = index + 1, total, "executing step");
            let start = Instant::now();
            if let Err(source) = self.execute(*step, &mut context, sink, interrupt).await {
                return Err(Aborted {
                    step: *step,
                    source,
                    registry: context.registry,
                });
            }
            info!(step = step.name(), elapsed = ?start.elapsed(), "completed step");
        }
        Ok(context.registry)
    }

    /// Execute a single step against `context`.
    ///
    /// Fails with [Error::MissingDependency] (before touching the provider) if a key the
    /// step requires has not been recorded. Outputs are recorded as soon as the provider
    /// call succeeds, before any wait, so a resource that never becomes usable is still
    /// accounted for.
    pub async fn execute<P: Provider, S: Sink>(
        &self,
        step: Step,
        context: &mut Context<'_, P>,
        sink: &S,
        interrupt: &Interrupt,
    ) -> Result<(), Error> {
        if interrupt.is_interrupted() {
            return Err(Error::Interrupted);
        }
        for key in step.requires() {
            context.registry.get(*key)?;
        }
        let Outcome { outputs, wait } = self.act(step, context, sink, interrupt).await?;
        for (key, value) in outputs {
            debug!(step = step.name(), %key, "recorded output");
            context.registry.set(key, value)?;
        }
        if let Some(resource) = wait {
            let condition = Condition {
                resource,
                policy: self.plan.wait,
            };
            let attempts = wait::until(context.provider, &condition, interrupt).await?;
            info!(
                step = step.name(),
                resource = %condition.resource,
                target = condition.resource.target(),
                attempts,
                "resource ready"
            );
        }
        Ok(())
    }

    async fn act<P: Provider, S: Sink>(
        &self,
        step: Step,
        context: &Context<'_, P>,
        sink: &S,
        interrupt: &Interrupt,
    ) -> Result<Outcome, Error> {
        let plan = &self.plan;
        let registry = &context.registry;
        let provider = context.provider;
        let outcome = match step {
            Step::CreateKeyPair => {
                let key_pair = provider.create_key_pair(&plan.names.key_pair).await?;
                Outcome::default()
                    .output(Key::KeyName, key_pair.name)
                    .output(Key::KeyMaterial, key_pair.material)
            }
            Step::PersistKeyMaterial => {
                let path = sink.persist(
                    registry.id(Key::KeyName)?,
                    registry.id(Key::KeyMaterial)?,
                )?;
                info!(?path, "persisted key material");
                Outcome::default()
            }
            Step::CreateSecurityGroup => {
                let description = format!("ingress for {}", plan.names.instance);
                let id = provider
                    .create_security_group(&plan.names.security_group, &description)
                    .await?;
                Outcome::default().output(Key::SecurityGroupId, id)
            }
            Step::AuthorizeIngress => {
                provider
                    .authorize_ingress(registry.id(Key::SecurityGroupId)?, &plan.ingress)
                    .await?;
                Outcome::default()
            }
            Step::LaunchInstance => {
                let instance = provider
                    .launch_instance(&InstanceSpec {
                        name: &plan.names.instance,
                        image: &plan.image,
                        instance_type: &plan.instance_type,
                        key_name: registry.id(Key::KeyName)?,
                        security_group_id: registry.id(Key::SecurityGroupId)?,
                        user_data: &plan.user_data,
                    })
                    .await?;
                Outcome::default()
                    .output(Key::InstanceId, instance.id.clone())
                    .output(Key::SubnetId, instance.subnet_id)
                    .wait(Resource::Instances(vec![instance.id]))
            }
            Step::ResolveSubnet => {
                let subnet = provider
                    .describe_subnet(registry.id(Key::SubnetId)?)
                    .await?;
                Outcome::default()
                    .output(Key::AvailabilityZone, subnet.availability_zone)
                    .output(Key::VpcId, subnet.vpc_id)
            }
            Step::CreateImage => {
                let id = provider
                    .create_image(registry.id(Key::InstanceId)?, &plan.names.image)
                    .await?;
                Outcome::default()
                    .output(Key::ImageId, id.clone())
                    .wait(Resource::Image(id))
            }
            Step::TerminateInstance => {
                provider
                    .terminate_instance(registry.id(Key::InstanceId)?)
                    .await?;
                Outcome::default()
            }
            Step::CreateLaunchTemplate => {
                let id = provider
                    .create_launch_template(&TemplateSpec {
                        name: &plan.names.launch_template,
                        image_id: registry.id(Key::ImageId)?,
                        instance_type: &plan.instance_type,
                        key_name: registry.id(Key::KeyName)?,
                        security_group_id: registry.id(Key::SecurityGroupId)?,
                        user_data: &plan.user_data,
                    })
                    .await?;
                Outcome::default().output(Key::LaunchTemplateId, id)
            }
            Step::CreateGroup => {
                provider
                    .create_group(&GroupSpec {
                        name: &plan.names.group,
                        launch_template_id: registry.id(Key::LaunchTemplateId)?,
                        availability_zone: registry.id(Key::AvailabilityZone)?,
                        min_size: plan.min_size,
                        max_size: plan.max_size,
                    })
                    .await?;
                Outcome::default()
                    .output(Key::GroupName, plan.names.group.clone())
                    .wait(Resource::Group {
                        name: plan.names.group.clone(),
                        min_size: plan.min_size,
                    })
            }
            Step::EnumerateMembers => {
                if !interrupt.sleep(plan.settle).await {
                    return Err(Error::Interrupted);
                }
                let members = provider
                    .list_group_instances(registry.id(Key::GroupName)?)
                    .await?;
                if members.is_empty() {
                    warn!(group = plan.names.group.as_str(), "group has no members");
                }
                Outcome::default().output(Key::MemberIds, members)
            }
            Step::ResolveLoadBalancerSubnets => {
                let subnets = provider
                    .describe_vpc_subnets(registry.id(Key::VpcId)?)
                    .await?;
                Outcome::default().output(Key::LoadBalancerSubnetIds, subnets)
            }
            Step::CreateLoadBalancer => {
                let arn = provider
                    .create_load_balancer(&LoadBalancerSpec {
                        name: &plan.names.load_balancer,
                        security_group_id: registry.id(Key::SecurityGroupId)?,
                        subnet_ids: registry.ids(Key::LoadBalancerSubnetIds)?,
                    })
                    .await?;
                Outcome::default()
                    .output(Key::LoadBalancerArn, arn.clone())
                    .wait(Resource::LoadBalancer(arn))
            }
            Step::CreateTargetGroup => {
                let arn = provider
                    .create_target_group(&TargetGroupSpec {
                        name: &plan.names.target_group,
                        vpc_id: registry.id(Key::VpcId)?,
                        port: plan.port(),
                        health_check_path: plan.health_check_path(),
                    })
                    .await?;
                Outcome::default().output(Key::TargetGroupArn, arn)
            }
            Step::ConfirmMembersRunning => Outcome::default().wait(Resource::Instances(
                registry.ids(Key::MemberIds)?.to_vec(),
            )),
            Step::RegisterTargets => {
                provider
                    .register_targets(
                        registry.id(Key::TargetGroupArn)?,
                        registry.ids(Key::MemberIds)?,
                        plan.port(),
                    )
                    .await?;
                Outcome::default()
            }
            Step::CreateListener => {
                let arn = provider
                    .create_listener(
                        registry.id(Key::LoadBalancerArn)?,
                        registry.id(Key::TargetGroupArn)?,
                        plan.port(),
                    )
                    .await?;
                info!(listener = arn.as_str(), "created listener");
                Outcome::default()
            }
            Step::ConfirmTargetsHealthy => Outcome::default().wait(Resource::Targets {
                group_arn: registry.id(Key::TargetGroupArn)?.to_string(),
                ids: registry.ids(Key::MemberIds)?.to_vec(),
            }),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, provider::Operation, Interrupter};
    use test_case::test_case;

    fn plan(load_balancer: bool) -> Plan {
        let mut plan = Plan::new("web");
        plan.wait = Policy {
            interval: Duration::from_secs(15),
            max_attempts: 5,
        };
        if !load_balancer {
            plan.load_balancer = None;
        }
        plan
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_steps_succeed() {
        let provider = mocks::Provider::default();
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));
        assert_eq!(pipeline.steps().len(), 18);

        let registry = pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap();

        for key in Key::ALL {
            assert!(registry.contains(key), "missing {key}");
        }
        assert_eq!(registry.len(), Key::ALL.len());
        assert_eq!(registry.ids(Key::MemberIds).unwrap(), provider.member_ids());
        assert_eq!(registry.id(Key::AvailabilityZone).unwrap(), mocks::AVAILABILITY_ZONE);

        // One call per step (steps 15 and 18 are a single status check) plus one status
        // check for each step that waits on a resource it created.
        assert_eq!(
            provider.calls(),
            vec![
                Operation::CreateKeyPair,
                Operation::CreateSecurityGroup,
                Operation::AuthorizeIngress,
                Operation::LaunchInstance,
                Operation::DescribeInstances,
                Operation::DescribeSubnet,
                Operation::CreateImage,
                Operation::DescribeImage,
                Operation::TerminateInstance,
                Operation::CreateLaunchTemplate,
                Operation::CreateGroup,
                Operation::DescribeGroup,
                Operation::ListGroupInstances,
                Operation::DescribeVpcSubnets,
                Operation::CreateLoadBalancer,
                Operation::DescribeLoadBalancer,
                Operation::CreateTargetGroup,
                Operation::DescribeInstances,
                Operation::RegisterTargets,
                Operation::CreateListener,
                Operation::DescribeTargetHealth,
            ]
        );
        let written = sink.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "web-key");
        assert_eq!(provider.calls().len() + written.len(), 18 + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_aborts() {
        let provider = mocks::Provider::default();
        provider.fail_on(Operation::LaunchInstance);
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));

        let aborted = pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap_err();

        assert_eq!(aborted.step, Step::LaunchInstance);
        assert_eq!(aborted.step.name(), "Launch instance");
        assert!(matches!(
            aborted.source,
            Error::ProviderCall(ref err) if err.operation == Operation::LaunchInstance
        ));
        let keys: Vec<Key> = aborted.registry.keys().collect();
        assert_eq!(
            keys,
            vec![Key::KeyName, Key::KeyMaterial, Key::SecurityGroupId]
        );
        assert_eq!(
            provider.calls(),
            vec![
                Operation::CreateKeyPair,
                Operation::CreateSecurityGroup,
                Operation::AuthorizeIngress,
                Operation::LaunchInstance,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_never_available() {
        let provider = mocks::Provider::default();
        provider.never_ready(Operation::DescribeImage);
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));

        let aborted = pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap_err();

        assert_eq!(aborted.step, Step::CreateImage);
        assert_eq!(aborted.step.name(), "Create image from instance");
        assert!(matches!(
            aborted.source,
            Error::WaitTimeout { attempts: 5, .. }
        ));
        assert_eq!(provider.count(Operation::DescribeImage), 5);

        // The source instance was never terminated and nothing was cleaned up
        assert_eq!(provider.count(Operation::TerminateInstance), 0);
        assert_eq!(provider.calls().last(), Some(&Operation::DescribeImage));
        assert!(aborted.registry.contains(Key::InstanceId));
        assert!(aborted.registry.contains(Key::ImageId));
    }

    #[test_case(Operation::CreateKeyPair, Step::CreateKeyPair)]
    #[test_case(Operation::CreateSecurityGroup, Step::CreateSecurityGroup)]
    #[test_case(Operation::AuthorizeIngress, Step::AuthorizeIngress)]
    #[test_case(Operation::DescribeSubnet, Step::ResolveSubnet)]
    #[test_case(Operation::CreateImage, Step::CreateImage)]
    #[test_case(Operation::TerminateInstance, Step::TerminateInstance)]
    #[test_case(Operation::CreateLaunchTemplate, Step::CreateLaunchTemplate)]
    #[test_case(Operation::CreateGroup, Step::CreateGroup)]
    #[test_case(Operation::DescribeGroup, Step::CreateGroup)]
    #[test_case(Operation::ListGroupInstances, Step::EnumerateMembers)]
    #[test_case(Operation::DescribeVpcSubnets, Step::ResolveLoadBalancerSubnets)]
    #[test_case(Operation::CreateLoadBalancer, Step::CreateLoadBalancer)]
    #[test_case(Operation::CreateTargetGroup, Step::CreateTargetGroup)]
    #[test_case(Operation::RegisterTargets, Step::RegisterTargets)]
    #[test_case(Operation::CreateListener, Step::CreateListener)]
    #[test_case(Operation::DescribeTargetHealth, Step::ConfirmTargetsHealthy)]
    fn test_fail_fast(operation: Operation, step: Step) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            let provider = mocks::Provider::default();
            provider.fail_on(operation);
            let sink = mocks::Sink::default();
            let pipeline = Pipeline::new(plan(true));

            let aborted = pipeline
                .run(&provider, &sink, &Interrupt::never())
                .await
                .unwrap_err();

            assert_eq!(aborted.step, step);
            assert!(matches!(
                aborted.source,
                Error::ProviderCall(ref err) if err.operation == operation
            ));
            // Nothing is invoked after the failing call
            assert_eq!(provider.count(operation), 1);
            assert_eq!(provider.calls().last(), Some(&operation));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_premature_read() {
        let provider = mocks::Provider::default();
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));

        // Only the key pair exists: every step needing the security group must refuse
        let mut context = Context::new(&provider);
        context.registry.set(Key::KeyName, "web-key").unwrap();
        context.registry.set(Key::KeyMaterial, "secret").unwrap();
        for step in [
            Step::AuthorizeIngress,
            Step::LaunchInstance,
            Step::CreateLaunchTemplate,
            Step::CreateLoadBalancer,
        ] {
            let err = pipeline
                .execute(step, &mut context, &sink, &Interrupt::never())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::MissingDependency(_)), "{step}");
        }
        let err = pipeline
            .execute(Step::TerminateInstance, &mut context, &sink, &Interrupt::never())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingDependency(Key::InstanceId)));
        assert!(provider.calls().is_empty());
        assert_eq!(context.registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_records_outputs() {
        let provider = mocks::Provider::default();
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));
        let mut context = Context::new(&provider);

        pipeline
            .execute(Step::CreateSecurityGroup, &mut context, &sink, &Interrupt::never())
            .await
            .unwrap();
        assert_eq!(context.registry.id(Key::SecurityGroupId).unwrap(), "sg-0001");

        // A second execution would overwrite a recorded identifier
        let err = pipeline
            .execute(Step::CreateSecurityGroup, &mut context, &sink, &Interrupt::never())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(Key::SecurityGroupId)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_load_balancer() {
        let provider = mocks::Provider::default();
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(false));
        assert_eq!(pipeline.steps(), &Step::BASE);

        let registry = pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap();

        assert!(registry.contains(Key::MemberIds));
        assert!(!registry.contains(Key::LoadBalancerArn));
        assert_eq!(provider.count(Operation::CreateLoadBalancer), 0);
        assert_eq!(
            provider.calls().last(),
            Some(&Operation::ListGroupInstances)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_group_times_out_on_health() {
        let provider = mocks::Provider::default();
        provider.set_members(0);
        let sink = mocks::Sink::default();
        let mut plan = plan(true);
        plan.min_size = 0;
        let pipeline = Pipeline::new(plan);

        let aborted = pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap_err();

        assert_eq!(aborted.step, Step::ConfirmTargetsHealthy);
        assert!(matches!(aborted.source, Error::WaitTimeout { .. }));
        assert!(aborted.registry.ids(Key::MemberIds).unwrap().is_empty());
        assert_eq!(provider.count(Operation::RegisterTargets), 1);
        assert_eq!(provider.count(Operation::CreateListener), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resources() {
        let provider = mocks::Provider::default();
        provider.ready_after(Operation::DescribeImage, 3);
        provider.ready_after(Operation::DescribeLoadBalancer, 2);
        provider.ready_after(Operation::DescribeTargetHealth, 4);
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));

        pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap();

        assert_eq!(provider.count(Operation::DescribeImage), 3);
        assert_eq!(provider.count(Operation::DescribeLoadBalancer), 2);
        assert_eq!(provider.count(Operation::DescribeTargetHealth), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure() {
        let provider = mocks::Provider::default();
        let sink = mocks::Sink::failing();
        let pipeline = Pipeline::new(plan(true));

        let aborted = pipeline
            .run(&provider, &sink, &Interrupt::never())
            .await
            .unwrap_err();

        assert_eq!(aborted.step, Step::PersistKeyMaterial);
        assert!(matches!(aborted.source, Error::Sink(_)));
        assert_eq!(provider.calls(), vec![Operation::CreateKeyPair]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_wait() {
        let provider = mocks::Provider::default();
        provider.never_ready(Operation::DescribeGroup);
        let sink = mocks::Sink::default();
        let mut plan = plan(true);
        plan.wait.max_attempts = 1000;
        let pipeline = Pipeline::new(plan);
        let (interrupter, interrupt) = Interrupter::new();

        let run = pipeline.run(&provider, &sink, &interrupt);
        let trigger = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            interrupter.interrupt();
        };
        let (result, _) = tokio::join!(run, trigger);

        let aborted = result.unwrap_err();
        assert_eq!(aborted.step, Step::CreateGroup);
        assert!(matches!(aborted.source, Error::Interrupted));
        assert!(provider.count(Operation::DescribeGroup) < 1000);
        assert_eq!(provider.count(Operation::ListGroupInstances), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_before_start() {
        let provider = mocks::Provider::default();
        let sink = mocks::Sink::default();
        let pipeline = Pipeline::new(plan(true));
        let (interrupter, interrupt) = Interrupter::new();
        interrupter.interrupt();

        let aborted = pipeline.run(&provider, &sink, &interrupt).await.unwrap_err();

        assert_eq!(aborted.step, Step::CreateKeyPair);
        assert!(matches!(aborted.source, Error::Interrupted));
        assert!(provider.calls().is_empty());
        assert!(aborted.registry.is_empty());
    }
}
