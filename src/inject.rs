// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fuse sidecar injection.
//!
//! [`Injector`] decides whether a pod spec needs fuse containers, then hands the
//! spec to a platform [`mutator::Mutator`] once per Fluid PVC.

use crate::context;
use crate::types;
use crate::types::common::Platform;
use snafu::Snafu;
use strum::Display;

pub mod injector;
pub mod mount_ready;
pub mod mutator;
pub mod poststart;
pub mod volume;

pub use injector::Injector;

pub const DEFAULT_FUSE_DEVICE_RESOURCE_NAME: &str = "fluid.io/fuse";

/// Base names of injected containers; a `-<index>` suffix is appended per PVC.
pub const FUSE_CONTAINER_NAME: &str = "fluid-fuse";
pub const INIT_FUSE_CONTAINER_NAME: &str = "fluid-init-fuse";

/// Shared prefix for renamed volumes.
pub const FLUID_PREFIX: &str = "fluid";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("serverless platform '{}' is not supported", value))]
    UnresolvablePlatform { value: String },

    #[snafu(display(
        "no serverless platform set on the pod and no default platform configured"
    ))]
    PlatformNotSet,

    #[snafu(display("runtime '{}' has no fuse container template", runtime))]
    FuseTemplateMissing { runtime: String },

    #[snafu(display(
        "fuse container '{}' has no host mount volume for fs type '{}'",
        container,
        fs_type
    ))]
    FuseMountNotFound { container: String, fs_type: String },

    #[snafu(display("unsupported host mount path format: '{}'", path))]
    UnsupportedHostPath { path: String },

    #[snafu(display(
        "volume name '{}' still conflicts after {} retries, giving up",
        name,
        retries
    ))]
    VolumeNameExhausted { name: String, retries: usize },

    #[snafu(display("vineyard rpc configmap '{}/{}' is not ready", namespace, name))]
    RpcConfigMapNotReady { name: String, namespace: String },

    #[snafu(display("mutating context field '{}' read before it was set", field))]
    ContextNotPopulated { field: &'static str },

    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("failed to mutate pvc '{}' for runtime '{}': {}", pvc, runtime, source))]
    Mutate {
        pvc: String,
        runtime: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },
}

/// How a caller should treat an injection failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ErrorCategory {
    /// The pod or its configuration asks for something that cannot be done.
    UserConfiguration,
    /// A dependent object does not exist yet; retrying later may succeed.
    DependencyNotReady,
    /// The API server call failed.
    ApiServer,
    /// A bug: the injector reached a state it should never reach.
    InternalInvariant,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnresolvablePlatform { .. }
            | Error::PlatformNotSet
            | Error::UnsupportedHostPath { .. } => ErrorCategory::UserConfiguration,
            Error::FuseTemplateMissing { .. } | Error::RpcConfigMapNotReady { .. } => {
                ErrorCategory::DependencyNotReady
            }
            Error::FuseMountNotFound { .. }
            | Error::VolumeNameExhausted { .. }
            | Error::ContextNotPopulated { .. } => ErrorCategory::InternalInvariant,
            Error::Context { source } if source.is_not_found() => {
                ErrorCategory::DependencyNotReady
            }
            Error::Context { source } => match source {
                context::Error::Types { source } => types_category(source),
                _ => ErrorCategory::ApiServer,
            },
            Error::Types { source } => types_category(source),
            Error::Mutate { source, .. } => source.category(),
        }
    }
}

fn types_category(err: &types::error::Error) -> ErrorCategory {
    match err {
        types::error::Error::UnsupportedKind { .. } | types::error::Error::InternalError { .. } => {
            ErrorCategory::InternalInvariant
        }
        _ => ErrorCategory::UserConfiguration,
    }
}

/// Settings shared by every injection pass.
#[derive(clap::Args, Clone, Debug, PartialEq, Eq)]
pub struct InjectorConfig {
    /// Extended resource that stands for the virtual fuse device.
    #[arg(
        long,
        env = "FUSE_DEVICE_RESOURCE_NAME",
        default_value = DEFAULT_FUSE_DEVICE_RESOURCE_NAME
    )]
    pub fuse_device_resource_name: String,

    /// Platform used for pods that do not name one.
    #[arg(long, env = "FLUID_DEFAULT_SERVERLESS_PLATFORM")]
    pub default_platform: Option<Platform>,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            fuse_device_resource_name: DEFAULT_FUSE_DEVICE_RESOURCE_NAME.to_string(),
            default_platform: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::UnresolvablePlatform {
                value: "x".to_string()
            }
            .category(),
            ErrorCategory::UserConfiguration
        );
        assert_eq!(
            Error::RpcConfigMapNotReady {
                name: "v-rpc-conf".to_string(),
                namespace: "ns".to_string()
            }
            .category(),
            ErrorCategory::DependencyNotReady
        );

        let missing_dataset = Error::Context {
            source: context::Error::DatasetNotFound {
                name: "d".to_string(),
                namespace: "ns".to_string(),
            },
        };
        assert_eq!(missing_dataset.category(), ErrorCategory::DependencyNotReady);

        let wrapped = Error::Mutate {
            pvc: "data".to_string(),
            runtime: "ns_d".to_string(),
            source: Box::new(Error::VolumeNameExhausted {
                name: "fluid-x".to_string(),
                retries: 100,
            }),
        };
        assert_eq!(wrapped.category(), ErrorCategory::InternalInvariant);
        assert_eq!(
            Error::Types {
                source: types::error::Error::UnsupportedKind {
                    kind: "Service".to_string()
                }
            }
            .category(),
            ErrorCategory::InternalInvariant
        );
    }

    #[test]
    fn test_default_config() {
        let config = InjectorConfig::default();
        assert_eq!(config.fuse_device_resource_name, "fluid.io/fuse");
        assert!(config.default_platform.is_none());
    }
}
