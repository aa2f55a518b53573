//! The units of work that make up a provisioning run.

use crate::registry::Key;
use std::fmt;

/// A named unit of the pipeline.
///
/// Steps are declared in execution order. A step only [requires](Step::requires) keys
/// [produced](Step::produces) by a strictly earlier step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    CreateKeyPair,
    PersistKeyMaterial,
    CreateSecurityGroup,
    AuthorizeIngress,
    LaunchInstance,
    ResolveSubnet,
    CreateImage,
    TerminateInstance,
    CreateLaunchTemplate,
    CreateGroup,
    EnumerateMembers,
    ResolveLoadBalancerSubnets,
    CreateLoadBalancer,
    CreateTargetGroup,
    ConfirmMembersRunning,
    RegisterTargets,
    CreateListener,
    ConfirmTargetsHealthy,
}

impl Step {
    /// Steps that bake an image and stand up an autoscaling group from it.
    pub const BASE: [Step; 11] = [
        Step::CreateKeyPair,
        Step::PersistKeyMaterial,
        Step::CreateSecurityGroup,
        Step::AuthorizeIngress,
        Step::LaunchInstance,
        Step::ResolveSubnet,
        Step::CreateImage,
        Step::TerminateInstance,
        Step::CreateLaunchTemplate,
        Step::CreateGroup,
        Step::EnumerateMembers,
    ];

    /// Steps that put a load balancer in front of the group (optional trailing segment).
    pub const LOAD_BALANCER: [Step; 7] = [
        Step::ResolveLoadBalancerSubnets,
        Step::CreateLoadBalancer,
        Step::CreateTargetGroup,
        Step::ConfirmMembersRunning,
        Step::RegisterTargets,
        Step::CreateListener,
        Step::ConfirmTargetsHealthy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::CreateKeyPair => "Create key pair",
            Step::PersistKeyMaterial => "Persist key material",
            Step::CreateSecurityGroup => "Create security group",
            Step::AuthorizeIngress => "Authorize ingress rules",
            Step::LaunchInstance => "Launch instance",
            Step::ResolveSubnet => "Resolve subnet",
            Step::CreateImage => "Create image from instance",
            Step::TerminateInstance => "Terminate source instance",
            Step::CreateLaunchTemplate => "Create launch template",
            Step::CreateGroup => "Create autoscaling group",
            Step::EnumerateMembers => "Enumerate group members",
            Step::ResolveLoadBalancerSubnets => "Resolve load-balancer subnets",
            Step::CreateLoadBalancer => "Create load balancer",
            Step::CreateTargetGroup => "Create target group",
            Step::ConfirmMembersRunning => "Confirm members running",
            Step::RegisterTargets => "Register targets",
            Step::CreateListener => "Create listener",
            Step::ConfirmTargetsHealthy => "Confirm targets healthy",
        }
    }

    /// Keys that must be present before the step runs.
    pub fn requires(&self) -> &'static [Key] {
        match self {
            Step::CreateKeyPair => &[],
            Step::PersistKeyMaterial => &[Key::KeyName, Key::KeyMaterial],
            Step::CreateSecurityGroup => &[],
            Step::AuthorizeIngress => &[Key::SecurityGroupId],
            Step::LaunchInstance => &[Key::KeyName, Key::SecurityGroupId],
            Step::ResolveSubnet => &[Key::SubnetId],
            Step::CreateImage => &[Key::InstanceId],
            Step::TerminateInstance => &[Key::InstanceId],
            Step::CreateLaunchTemplate => &[Key::ImageId, Key::SecurityGroupId, Key::KeyName],
            Step::CreateGroup => &[Key::LaunchTemplateId, Key::AvailabilityZone],
            Step::EnumerateMembers => &[Key::GroupName],
            Step::ResolveLoadBalancerSubnets => &[Key::VpcId],
            Step::CreateLoadBalancer => &[Key::SecurityGroupId, Key::LoadBalancerSubnetIds],
            Step::CreateTargetGroup => &[Key::VpcId],
            Step::ConfirmMembersRunning => &[Key::MemberIds],
            Step::RegisterTargets => &[Key::TargetGroupArn, Key::MemberIds],
            Step::CreateListener => &[Key::TargetGroupArn, Key::LoadBalancerArn],
            Step::ConfirmTargetsHealthy => &[Key::TargetGroupArn, Key::MemberIds],
        }
    }

    /// Keys recorded once the step's provider call succeeds.
    pub fn produces(&self) -> &'static [Key] {
        match self {
            Step::CreateKeyPair => &[Key::KeyName, Key::KeyMaterial],
            Step::CreateSecurityGroup => &[Key::SecurityGroupId],
            Step::LaunchInstance => &[Key::InstanceId, Key::SubnetId],
            Step::ResolveSubnet => &[Key::AvailabilityZone, Key::VpcId],
            Step::CreateImage => &[Key::ImageId],
            Step::CreateLaunchTemplate => &[Key::LaunchTemplateId],
            Step::CreateGroup => &[Key::GroupName],
            Step::EnumerateMembers => &[Key::MemberIds],
            Step::ResolveLoadBalancerSubnets => &[Key::LoadBalancerSubnetIds],
            Step::CreateLoadBalancer => &[Key::LoadBalancerArn],
            Step::CreateTargetGroup => &[Key::TargetGroupArn],
            Step::PersistKeyMaterial
            | Step::AuthorizeIngress
            | Step::TerminateInstance
            | Step::ConfirmMembersRunning
            | Step::RegisterTargets
            | Step::CreateListener
            | Step::ConfirmTargetsHealthy => &[],
        }
    }

    /// Whether the step blocks until the resource it touched is usable.
    pub fn waits(&self) -> bool {
        matches!(
            self,
            Step::LaunchInstance
                | Step::CreateImage
                | Step::CreateGroup
                | Step::CreateLoadBalancer
                | Step::ConfirmMembersRunning
                | Step::ConfirmTargetsHealthy
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_case::test_case;

    fn all() -> Vec<Step> {
        Step::BASE
            .iter()
            .chain(Step::LOAD_BALANCER.iter())
            .copied()
            .collect()
    }

    #[test]
    fn test_dependencies_produced_earlier() {
        let mut available = HashSet::new();
        for step in all() {
            for key in step.requires() {
                assert!(available.contains(key), "{step} reads {key} too early");
            }
            for key in step.produces() {
                assert!(available.insert(*key), "{key} produced twice");
            }
        }
        assert_eq!(available.len(), Key::ALL.len());
    }

    #[test]
    fn test_base_segment_self_contained() {
        let produced: HashSet<Key> = Step::BASE
            .iter()
            .flat_map(|step| step.produces().iter().copied())
            .collect();
        for step in Step::BASE {
            for key in step.requires() {
                assert!(produced.contains(key));
            }
        }
    }

    #[test]
    fn test_declaration_order() {
        let steps = all();
        assert_eq!(steps.len(), 18);
        let mut sorted = steps.clone();
        sorted.sort();
        assert_eq!(steps, sorted);
    }

    #[test_case(Step::LaunchInstance, true; "instance running")]
    #[test_case(Step::CreateImage, true; "image available")]
    #[test_case(Step::CreateGroup, true; "group in service")]
    #[test_case(Step::CreateLoadBalancer, true; "load balancer available")]
    #[test_case(Step::ConfirmMembersRunning, true; "members running")]
    #[test_case(Step::ConfirmTargetsHealthy, true; "targets healthy")]
    #[test_case(Step::TerminateInstance, false; "terminate")]
    #[test_case(Step::RegisterTargets, false; "register")]
    fn test_waits(step: Step, waits: bool) {
        assert_eq!(step.waits(), waits);
    }
}
