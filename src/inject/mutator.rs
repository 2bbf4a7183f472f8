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

//! Per-platform pod spec mutation.

use crate::application::FluidObject;
use crate::context::ClusterResources;
use crate::inject::{ContextNotPopulatedSnafu, Error, InjectorConfig};
use crate::types::common::{FuseSidecarInjectOption, Platform};
use crate::types::error::Error as TypesError;
use crate::types::runtime::RuntimeInfo;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod default;
pub mod helper;
pub mod unprivileged;
pub mod vineyard;

pub use default::DefaultMutator;
pub use unprivileged::UnprivilegedMutator;
pub use vineyard::VineyardMutator;

/// Working copy of one pod spec for the duration of an injection pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutatingPodSpecs {
    pub meta: metav1::ObjectMeta,
    pub volumes: Vec<corev1::Volume>,
    pub containers: Vec<corev1::Container>,
    pub init_containers: Vec<corev1::Container>,
}

impl MutatingPodSpecs {
    pub fn collect(object: &dyn FluidObject) -> Result<Self, TypesError> {
        Ok(Self {
            meta: object.meta()?,
            volumes: object.volumes()?,
            containers: object.containers()?,
            init_containers: object.init_containers()?,
        })
    }

    pub fn apply_to(self, object: &mut dyn FluidObject) -> Result<(), TypesError> {
        object.set_volumes(self.volumes)?;
        object.set_containers(self.containers)?;
        object.set_init_containers(self.init_containers)?;
        object.set_meta(self.meta)
    }

    pub fn volume_mounts(&self) -> impl Iterator<Item = &corev1::VolumeMount> {
        self.containers
            .iter()
            .chain(&self.init_containers)
            .flat_map(|c| c.volume_mounts.iter().flatten())
    }

    /// Claim names of PVC volumes that at least one container mounts.
    pub fn mounted_pvc_names(&self) -> BTreeSet<&str> {
        let mounted: BTreeSet<&str> = self.volume_mounts().map(|m| m.name.as_str()).collect();
        self.volumes
            .iter()
            .filter(|v| mounted.contains(v.name.as_str()))
            .filter_map(|v| v.persistent_volume_claim.as_ref())
            .map(|pvc| pvc.claim_name.as_str())
            .collect()
    }

    pub fn volume_names(&self) -> BTreeSet<String> {
        self.volumes.iter().map(|v| v.name.clone()).collect()
    }

    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.containers
            .iter()
            .chain(&self.init_containers)
            .map(|c| c.name.as_str())
    }
}

/// Bookkeeping for a single PVC's mutation. Flags are unset until the step
/// that computes them has run.
#[derive(Clone, Debug, Default)]
pub struct MutatingContext {
    dataset_used_in_containers: Option<bool>,
    dataset_used_in_init_containers: Option<bool>,
    appended_volume_names: BTreeMap<String, String>,
    unique_host_mount_path: Option<String>,
}

impl MutatingContext {
    pub fn set_dataset_used_in_containers(&mut self, used: bool) {
        self.dataset_used_in_containers = Some(used);
    }

    pub fn dataset_used_in_containers(&self) -> Result<bool, Error> {
        self.dataset_used_in_containers
            .ok_or_else(|| ContextNotPopulatedSnafu { field: "datasetUsedInContainers" }.build())
    }

    pub fn set_dataset_used_in_init_containers(&mut self, used: bool) {
        self.dataset_used_in_init_containers = Some(used);
    }

    pub fn dataset_used_in_init_containers(&self) -> Result<bool, Error> {
        self.dataset_used_in_init_containers.ok_or_else(|| {
            ContextNotPopulatedSnafu {
                field: "datasetUsedInInitContainers",
            }
            .build()
        })
    }

    /// Template volume names that were renamed while appending, old to new.
    pub fn appended_volume_names(&self) -> &BTreeMap<String, String> {
        &self.appended_volume_names
    }

    pub fn record_renamed_volume(&mut self, old: &str, new: &str) {
        self.appended_volume_names
            .insert(old.to_string(), new.to_string());
    }

    pub fn set_unique_host_mount_path(&mut self, path: String) {
        self.unique_host_mount_path = Some(path);
    }

    pub fn unique_host_mount_path(&self) -> Option<&str> {
        self.unique_host_mount_path.as_deref()
    }
}

/// Everything a mutator needs, fixed for the whole pod.
#[derive(Clone)]
pub struct MutatorBuildArgs {
    pub resources: Arc<dyn ClusterResources>,
    pub options: FuseSidecarInjectOption,
    pub config: Arc<InjectorConfig>,
    pub specs: MutatingPodSpecs,
}

#[async_trait]
pub trait Mutator: Send {
    /// Mutates the pod for one Fluid PVC. `name_suffix` is `-<index>` of the
    /// PVC within this pass and is appended to injected names.
    async fn mutate_with_runtime_info(
        &mut self,
        pvc_name: &str,
        runtime: &RuntimeInfo,
        name_suffix: &str,
    ) -> Result<(), Error>;

    /// Runs once after every PVC has been handled.
    async fn post_mutate(&mut self) -> Result<(), Error>;

    fn pod_specs(&self) -> &MutatingPodSpecs;

    fn into_pod_specs(self: Box<Self>) -> MutatingPodSpecs;
}

/// Selects the mutator for a platform. An unprivileged sidecar requested by
/// label on the default platform uses the unprivileged mutator as well.
pub fn build_mutator(platform: Platform, args: MutatorBuildArgs) -> Box<dyn Mutator> {
    match platform {
        Platform::Vineyard => Box::new(VineyardMutator::new(args)),
        Platform::Unprivileged => Box::new(UnprivilegedMutator::new(args)),
        Platform::Default if args.options.enable_unprivileged_sidecar => {
            Box::new(UnprivilegedMutator::new(args))
        }
        Platform::Default => Box::new(DefaultMutator::new(args)),
    }
}
