//! Provision a web service fleet on AWS.
//!
//! # Setup
//!
//! _To run this command, you must have [AWS credentials](https://docs.aws.amazon.com/sdkref/latest/guide/access.html)
//! available in your environment._
//!
//! # Configuration
//!
//! ```yaml
//! tag: web
//! region: us-east-1
//! key_directory: ./keys
//! instance:
//!   image: ami-0c94855ba95c71c99
//!   instance_type: t2.micro
//! ingress:
//!   - protocol: tcp
//!     port: 80
//!     cidr: 0.0.0.0/0
//!   - protocol: tcp
//!     port: 22
//!     cidr: 203.0.113.7/32
//! group:
//!   min_size: 2
//!   max_size: 3
//! load_balancer:
//!   port: 80
//!   health_check_path: /
//! wait:
//!   interval: 15
//!   max_attempts: 40
//! settle: 20
//! ```
//!
//! Every field but `tag` and `region` is optional. Setting `load_balancer: null` stops the
//! run once the autoscaling group's members are known.

use crate::{
    pipeline::{self, LoadBalancing, Names, Plan},
    provider::IngressRule,
    services,
    wait::{self, Policy},
    Aborted,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

mod client;
pub use client::Client;
mod create;
pub use create::create;

pub const CMD: &str = "aws";
pub const CREATE_CMD: &str = "create";

/// Longest allowed tag (load balancer names are capped at 32 characters).
pub const MAX_TAG_LENGTH: usize = 29;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid tag: {0}")]
    InvalidTag(String),
    #[error("invalid group size: min {min} > max {max}")]
    InvalidGroupSize { min: usize, max: usize },
    #[error("max_attempts must be at least 1")]
    InvalidWait,
    #[error(transparent)]
    Aborted(#[from] Box<Aborted>),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceConfig {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            instance_type: default_instance_type(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PortConfig {
    pub protocol: String,
    pub port: u16,
    pub cidr: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GroupConfig {
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            min_size: pipeline::DEFAULT_MIN_SIZE,
            max_size: pipeline::DEFAULT_MAX_SIZE,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
}

/// Polling applied to every wait (`interval` in seconds).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WaitConfig {
    pub interval: u64,
    pub max_attempts: usize,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: wait::DEFAULT_INTERVAL.as_secs(),
            max_attempts: wait::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub tag: String,
    pub region: String,
    #[serde(default = "default_key_directory")]
    pub key_directory: PathBuf,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default = "default_ingress")]
    pub ingress: Vec<PortConfig>,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default = "default_load_balancer")]
    pub load_balancer: Option<LoadBalancerConfig>,
    #[serde(default)]
    pub wait: WaitConfig,
    /// Seconds to wait after the group enters service before listing its members.
    #[serde(default = "default_settle")]
    pub settle: u64,
}

impl Config {
    /// Reject configurations AWS would refuse partway through a run.
    pub fn validate(&self) -> Result<(), Error> {
        let tag = &self.tag;
        if tag.is_empty()
            || tag.len() > MAX_TAG_LENGTH
            || tag.starts_with('-')
            || tag.ends_with('-')
            || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::InvalidTag(tag.clone()));
        }
        if self.group.min_size > self.group.max_size {
            return Err(Error::InvalidGroupSize {
                min: self.group.min_size,
                max: self.group.max_size,
            });
        }
        if self.wait.max_attempts == 0 {
            return Err(Error::InvalidWait);
        }
        Ok(())
    }

    /// The [Plan] this configuration describes.
    pub fn plan(&self) -> Plan {
        Plan {
            names: Names::from_tag(&self.tag),
            image: self.instance.image.clone(),
            instance_type: self.instance.instance_type.clone(),
            ingress: self
                .ingress
                .iter()
                .map(|rule| IngressRule {
                    protocol: rule.protocol.clone(),
                    port: rule.port,
                    cidr: rule.cidr.clone(),
                })
                .collect(),
            user_data: services::user_data(),
            min_size: self.group.min_size,
            max_size: self.group.max_size,
            load_balancer: self.load_balancer.as_ref().map(|lb| LoadBalancing {
                port: lb.port,
                health_check_path: lb.health_check_path.clone(),
            }),
            wait: Policy {
                interval: Duration::from_secs(self.wait.interval),
                max_attempts: self.wait.max_attempts,
            },
            settle: Duration::from_secs(self.settle),
        }
    }
}

fn default_image() -> String {
    pipeline::DEFAULT_IMAGE.to_string()
}

fn default_instance_type() -> String {
    pipeline::DEFAULT_INSTANCE_TYPE.to_string()
}

fn default_port() -> u16 {
    pipeline::DEFAULT_PORT
}

fn default_health_check_path() -> String {
    pipeline::DEFAULT_HEALTH_CHECK_PATH.to_string()
}

fn default_load_balancer() -> Option<LoadBalancerConfig> {
    Some(LoadBalancerConfig {
        port: default_port(),
        health_check_path: default_health_check_path(),
    })
}

fn default_key_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_ingress() -> Vec<PortConfig> {
    pipeline::default_ingress()
        .into_iter()
        .map(|rule| PortConfig {
            protocol: rule.protocol,
            port: rule.port,
            cidr: rule.cidr,
        })
        .collect()
}

fn default_settle() -> u64 {
    pipeline::DEFAULT_SETTLE.as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "tag: web\nregion: us-east-1\n";

    #[test]
    fn test_minimal_config() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.instance, InstanceConfig::default());
        assert_eq!(config.ingress.len(), 3);
        assert_eq!(config.load_balancer, default_load_balancer());

        let plan = config.plan();
        assert_eq!(plan.names.group, "web-group");
        assert_eq!(plan.min_size, 2);
        assert_eq!(plan.max_size, 3);
        assert_eq!(plan.wait, Policy::default());
        assert_eq!(plan.settle, Duration::from_secs(20));
        assert_eq!(plan.load_balancer, Some(LoadBalancing::default()));
    }

    #[test]
    fn test_load_balancer_disabled() {
        let yaml = format!("{MINIMAL}load_balancer: null\n");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.plan().load_balancer.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
tag: shop-7
region: eu-west-1
key_directory: /tmp/keys
instance:
  image: ami-123
  instance_type: t3.small
ingress:
  - protocol: tcp
    port: 8080
    cidr: 10.0.0.0/8
group:
  min_size: 1
  max_size: 4
load_balancer:
  port: 8080
wait:
  interval: 5
  max_attempts: 12
settle: 0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        let plan = config.plan();
        assert_eq!(plan.image, "ami-123");
        assert_eq!(plan.instance_type, "t3.small");
        assert_eq!(
            plan.ingress,
            vec![IngressRule {
                protocol: "tcp".into(),
                port: 8080,
                cidr: "10.0.0.0/8".into(),
            }]
        );
        assert_eq!(
            plan.load_balancer,
            Some(LoadBalancing {
                port: 8080,
                health_check_path: "/".into(),
            })
        );
        assert_eq!(plan.wait.interval, Duration::from_secs(5));
        assert_eq!(plan.wait.max_attempts, 12);
        assert_eq!(plan.settle, Duration::ZERO);
        assert_eq!(config.key_directory, PathBuf::from("/tmp/keys"));
    }

    #[test]
    fn test_invalid_tags() {
        for tag in ["", "-web", "web-", "web_server", "a-very-long-tag-that-overflows-names"] {
            let config = Config {
                tag: tag.to_string(),
                ..serde_yaml::from_str::<Config>(MINIMAL).unwrap()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidTag(_))), "{tag}");
        }
    }

    #[test]
    fn test_invalid_sizes() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.group = GroupConfig {
            min_size: 4,
            max_size: 2,
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidGroupSize { min: 4, max: 2 })
        ));
        config.group = GroupConfig::default();
        config.wait.max_attempts = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidWait)));
    }
}
