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

use super::{MutatingPodSpecs, Mutator, MutatorBuildArgs};
use crate::inject::volume::randomize_new_volume_name;
use crate::inject::{Error, RpcConfigMapNotReadySnafu};
use crate::types::runtime::RuntimeInfo;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use std::collections::BTreeSet;
use tracing::{debug, info};

pub const VINEYARD_RPC_VOLUME_NAME: &str = "vineyard-rpc-conf";
pub const VINEYARD_RPC_MOUNT_DIR: &str = "/var/run/vineyard-rpc";
pub const VINEYARD_RPC_ENDPOINT: &str = "VINEYARD_RPC_ENDPOINT";

/// Vineyard clients talk to the runtime over RPC rather than a fuse mount, so
/// the dataset volume is replaced by the runtime's RPC endpoint ConfigMap.
pub struct VineyardMutator {
    args: MutatorBuildArgs,
}

impl VineyardMutator {
    pub fn new(args: MutatorBuildArgs) -> Self {
        Self { args }
    }
}

pub fn rpc_config_map_name(runtime: &RuntimeInfo) -> String {
    format!("{}-rpc-conf", runtime.name)
}

fn remove_dataset_volumes(specs: &mut MutatingPodSpecs, pvc_name: &str) -> BTreeSet<String> {
    let mut removed = BTreeSet::new();
    specs.volumes.retain(|v| {
        let bound = v
            .persistent_volume_claim
            .as_ref()
            .is_some_and(|pvc| pvc.claim_name == pvc_name);
        if bound {
            removed.insert(v.name.clone());
        }
        !bound
    });

    for container in specs
        .containers
        .iter_mut()
        .chain(specs.init_containers.iter_mut())
    {
        if let Some(mounts) = container.volume_mounts.as_mut() {
            mounts.retain(|m| !removed.contains(&m.name));
        }
    }
    removed
}

fn rpc_endpoint_env(config_map_name: &str) -> corev1::EnvVar {
    corev1::EnvVar {
        name: VINEYARD_RPC_ENDPOINT.to_string(),
        value_from: Some(corev1::EnvVarSource {
            config_map_key_ref: Some(corev1::ConfigMapKeySelector {
                name: config_map_name.to_string(),
                key: VINEYARD_RPC_ENDPOINT.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl Mutator for VineyardMutator {
    async fn mutate_with_runtime_info(
        &mut self,
        pvc_name: &str,
        runtime: &RuntimeInfo,
        name_suffix: &str,
    ) -> Result<(), Error> {
        let cm_name = rpc_config_map_name(runtime);
        let ready = self
            .args
            .resources
            .config_map_exists(&cm_name, &runtime.namespace)
            .await?;
        if !ready {
            return RpcConfigMapNotReadySnafu {
                name: cm_name,
                namespace: runtime.namespace.clone(),
            }
            .fail();
        }

        let specs = &mut self.args.specs;
        let removed = remove_dataset_volumes(specs, pvc_name);

        let names = specs.volume_names();
        let mut volume_name = format!("{VINEYARD_RPC_VOLUME_NAME}{name_suffix}");
        if names.contains(&volume_name) {
            volume_name = randomize_new_volume_name(&volume_name, |n| names.contains(n))?;
        }
        specs.volumes.push(corev1::Volume {
            name: volume_name.clone(),
            config_map: Some(corev1::ConfigMapVolumeSource {
                name: cm_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });

        let mount = corev1::VolumeMount {
            name: volume_name.clone(),
            mount_path: format!("{VINEYARD_RPC_MOUNT_DIR}/{pvc_name}"),
            read_only: Some(true),
            ..Default::default()
        };
        for container in specs
            .containers
            .iter_mut()
            .chain(specs.init_containers.iter_mut())
        {
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .push(mount.clone());

            let env = container.env.get_or_insert_with(Vec::new);
            if env.iter().any(|e| e.name == VINEYARD_RPC_ENDPOINT) {
                info!(container = %container.name, "rpc endpoint env already set, keeping it");
            } else {
                env.push(rpc_endpoint_env(&cm_name));
            }
        }

        debug!(
            pvc = pvc_name,
            removed = ?removed,
            volume = %volume_name,
            "replaced dataset volumes with vineyard rpc config"
        );
        Ok(())
    }

    async fn post_mutate(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn pod_specs(&self) -> &MutatingPodSpecs {
        &self.args.specs
    }

    fn into_pod_specs(self: Box<Self>) -> MutatingPodSpecs {
        self.args.specs
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::{FakeResources, fluid_pod};
    use std::sync::Arc;

    fn mutator(resources: FakeResources, pod: corev1::Pod) -> VineyardMutator {
        let spec = pod.spec.unwrap();
        VineyardMutator::new(MutatorBuildArgs {
            resources: Arc::new(resources),
            options: Default::default(),
            config: Default::default(),
            specs: MutatingPodSpecs {
                meta: pod.metadata,
                volumes: spec.volumes.unwrap_or_default(),
                containers: spec.containers,
                init_containers: spec.init_containers.unwrap_or_default(),
            },
        })
    }

    #[tokio::test]
    async fn test_existing_endpoint_env_and_volume_name_are_kept() {
        let mut pod = fluid_pod("app", &[("data", "vineyard")]);
        let spec = pod.spec.as_mut().unwrap();
        spec.containers[0].env = Some(vec![corev1::EnvVar {
            name: VINEYARD_RPC_ENDPOINT.to_string(),
            value: Some("vineyardd:9600".to_string()),
            ..Default::default()
        }]);
        spec.volumes.as_mut().unwrap().push(corev1::Volume {
            name: "vineyard-rpc-conf-0".to_string(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        });

        let runtime = RuntimeInfo::new(
            "vineyard",
            "big-data",
            crate::types::runtime::RuntimeType::Vineyard,
        );
        let mut mutator = mutator(
            FakeResources::default().with_config_map(&rpc_config_map_name(&runtime), "big-data"),
            pod,
        );
        mutator
            .mutate_with_runtime_info("vineyard", &runtime, "-0")
            .await
            .unwrap();

        let specs = mutator.pod_specs();
        let names: Vec<_> = specs.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["vineyard-rpc-conf-0", "fluid-rpc-conf-0"]);

        let app = &specs.containers[0];
        let env = app.env.as_ref().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].value.as_deref(), Some("vineyardd:9600"));
        let mounts = app.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].name, "fluid-rpc-conf-0");
    }
}
