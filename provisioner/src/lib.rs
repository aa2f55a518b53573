//! Provision an autoscaled, load-balanced web service from a single bootstrapped instance.
//!
//! A run walks an ordered [pipeline::Pipeline] of [step::Step]s against a [provider::Provider].
//! Each step reads the identifiers produced by earlier steps from a [registry::Registry],
//! issues one provider call, records what it created, and (when the created resource is
//! only eventually usable) blocks on a [wait::Condition] until the provider reports it ready.
//!
//! Runs are fail-fast: the first error aborts the pipeline with an [Aborted] naming the
//! step that failed. Resources created by earlier steps are left in place and reported
//! through [Aborted::registry].
//!
//! # Status
//!
//! `commonware-provisioner` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

use thiserror::Error;

pub mod interrupt;
pub mod mocks;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod services;
pub mod sink;
pub mod step;
pub mod wait;

cfg_if::cfg_if! {
    if #[cfg(feature = "aws")] {
        pub mod aws;
    }
}

pub use interrupt::{Interrupt, Interrupter};
pub use pipeline::{Pipeline, Plan};
pub use registry::{Key, Registry, Value};
pub use step::Step;

/// Errors that can abort a provisioning run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("provider call failed: {0}")]
    ProviderCall(#[from] provider::Error),
    #[error("{resource} not {target} after {attempts} attempts")]
    WaitTimeout {
        resource: String,
        target: &'static str,
        attempts: usize,
    },
    #[error("{resource} entered {state} while waiting for {target}")]
    WaitFailed {
        resource: String,
        target: &'static str,
        state: String,
    },
    #[error("missing dependency: {0}")]
    MissingDependency(Key),
    #[error("key already set: {0}")]
    DuplicateKey(Key),
    #[error("unexpected value for {0}")]
    UnexpectedValue(Key),
    #[error("key sink failed: {0}")]
    Sink(#[from] std::io::Error),
    #[error("interrupted")]
    Interrupted,
}

/// A run that stopped before completing every step.
///
/// Nothing created before `step` is rolled back: `registry` holds the identifiers of
/// every resource that was created (and is still live in the provider account).
#[derive(Error, Debug)]
#[error("step '{step}' failed: {source}")]
pub struct Aborted {
    pub step: Step,
    pub source: Error,
    pub registry: Registry,
}
