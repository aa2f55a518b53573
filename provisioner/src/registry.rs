//! Run-scoped mapping from logical resource names to provider-assigned identifiers.

use crate::Error;
use std::{collections::BTreeMap, fmt};

/// Logical name of a value produced by a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    KeyName,
    KeyMaterial,
    SecurityGroupId,
    InstanceId,
    SubnetId,
    AvailabilityZone,
    VpcId,
    ImageId,
    LaunchTemplateId,
    GroupName,
    MemberIds,
    LoadBalancerSubnetIds,
    LoadBalancerArn,
    TargetGroupArn,
}

impl Key {
    /// Every key a full pipeline (including the load balancer segment) produces.
    pub const ALL: [Key; 14] = [
        Key::KeyName,
        Key::KeyMaterial,
        Key::SecurityGroupId,
        Key::InstanceId,
        Key::SubnetId,
        Key::AvailabilityZone,
        Key::VpcId,
        Key::ImageId,
        Key::LaunchTemplateId,
        Key::GroupName,
        Key::MemberIds,
        Key::LoadBalancerSubnetIds,
        Key::LoadBalancerArn,
        Key::TargetGroupArn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Key::KeyName => "keyName",
            Key::KeyMaterial => "keyMaterial",
            Key::SecurityGroupId => "securityGroupID",
            Key::InstanceId => "instanceID",
            Key::SubnetId => "subnetID",
            Key::AvailabilityZone => "availabilityZone",
            Key::VpcId => "vpcID",
            Key::ImageId => "imageID",
            Key::LaunchTemplateId => "launchTemplateID",
            Key::GroupName => "asgName",
            Key::MemberIds => "memberInstanceIDs",
            Key::LoadBalancerSubnetIds => "loadBalancerSubnetIDs",
            Key::LoadBalancerArn => "loadBalancerARN",
            Key::TargetGroupArn => "targetGroupARN",
        }
    }

    /// Whether the value must never be logged.
    pub fn is_secret(&self) -> bool {
        matches!(self, Key::KeyMaterial)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value stored in the [Registry].
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    Id(String),
    Ids(Vec<String>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Id(id) => write!(f, "{id:?}"),
            Value::Ids(ids) => write!(f, "{ids:?}"),
        }
    }
}

impl From<String> for Value {
    fn from(id: String) -> Self {
        Value::Id(id)
    }
}

impl From<&str> for Value {
    fn from(id: &str) -> Self {
        Value::Id(id.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(ids: Vec<String>) -> Self {
        Value::Ids(ids)
    }
}

/// Identifiers recorded by completed steps.
///
/// Keys are written at most once per run and never removed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<Key, Value>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` under `key`.
    ///
    /// Returns [Error::DuplicateKey] if `key` was already written.
    pub fn set(&mut self, key: Key, value: impl Into<Value>) -> Result<(), Error> {
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.entries.insert(key, value.into());
        Ok(())
    }

    /// Returns [Error::MissingDependency] if no step has produced `key` yet.
    pub fn get(&self, key: Key) -> Result<&Value, Error> {
        self.entries.get(&key).ok_or(Error::MissingDependency(key))
    }

    /// Read a single identifier.
    pub fn id(&self, key: Key) -> Result<&str, Error> {
        match self.get(key)? {
            Value::Id(id) => Ok(id),
            Value::Ids(_) => Err(Error::UnexpectedValue(key)),
        }
    }

    /// Read a list of identifiers.
    pub fn ids(&self, key: Key) -> Result<&[String], Error> {
        match self.get(key)? {
            Value::Ids(ids) => Ok(ids),
            Value::Id(_) => Err(Error::UnexpectedValue(key)),
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.entries.keys().copied()
    }

    /// Entries safe to display (secrets are skipped).
    pub fn resources(&self) -> impl Iterator<Item = (Key, &Value)> {
        self.entries
            .iter()
            .filter(|(key, _)| !key.is_secret())
            .map(|(key, value)| (*key, value))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if key.is_secret() {
                map.entry(&key.as_str(), &"<redacted>");
            } else {
                map.entry(&key.as_str(), value);
            }
        }
        map.finish()
    }
}
