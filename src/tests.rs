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

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::context::{self, ClusterResources};
use crate::types::common::{INJECT_SERVERLESS, TRUE};
use crate::types::runtime::{FuseInjectionTemplate, FuseMountInfo, RuntimeInfo, RuntimeType};
use crate::types::v1alpha1::dataset::{Dataset, DatasetSpec};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

pub fn create_test_dataset(name: &str, namespace: &str) -> Dataset {
    let mut dataset = Dataset::new(name, DatasetSpec::default());
    dataset.metadata.namespace = Some(namespace.to_string());
    dataset.metadata.uid = Some(format!("uid-{name}"));
    dataset
}

fn host_path_volume(name: &str, path: &str) -> corev1::Volume {
    corev1::Volume {
        name: name.to_string(),
        host_path: Some(corev1::HostPathVolumeSource {
            path: path.to_string(),
            type_: None,
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> corev1::VolumeMount {
    corev1::VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

/// A JindoFS fuse DaemonSet: a privileged container mounting a cache volume,
/// the host fuse device and the host fuse mount point, plus one volume the
/// container does not mount.
pub fn fuse_daemon_set() -> appsv1::DaemonSet {
    let container = corev1::Container {
        name: "fuse".to_string(),
        image: Some("registry.example.com/jindo-fuse:6.2.0".to_string()),
        volume_mounts: Some(vec![
            mount("duplicate", "/cache"),
            mount("jindofs-fuse-device", "/dev/fuse"),
            corev1::VolumeMount {
                mount_propagation: Some("Bidirectional".to_string()),
                ..mount("jindofs-fuse-mount", "/jfs")
            },
        ]),
        security_context: Some(corev1::SecurityContext {
            privileged: Some(true),
            capabilities: Some(corev1::Capabilities {
                add: Some(vec!["SYS_ADMIN".to_string()]),
                drop: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    appsv1::DaemonSet {
        metadata: metav1::ObjectMeta {
            name: Some("duplicate-jindofs-fuse".to_string()),
            namespace: Some("big-data".to_string()),
            ..Default::default()
        },
        spec: Some(appsv1::DaemonSetSpec {
            template: corev1::PodTemplateSpec {
                metadata: None,
                spec: Some(corev1::PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![
                        host_path_volume("duplicate", "/mnt/disk1/jindo/big-data/duplicate"),
                        host_path_volume("jindofs-fuse-device", "/dev/fuse"),
                        host_path_volume("jindofs-fuse-mount", "/runtime-mnt/jindo/big-data/duplicate"),
                        host_path_volume("unused", "/tmp/unused"),
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub fn fuse_mount_info(fs_type: &str, namespace: &str, name: &str) -> FuseMountInfo {
    FuseMountInfo {
        host_mount_path: format!("/runtime-mnt/{fs_type}/{namespace}/{name}/jindofs-fuse"),
        fs_type: fs_type.to_string(),
        sub_path: None,
    }
}

pub fn jindo_runtime(namespace: &str, name: &str) -> RuntimeInfo {
    let template = FuseInjectionTemplate::from_daemon_set(
        &fuse_daemon_set(),
        fuse_mount_info("jindo", namespace, name),
    )
    .expect("fixture daemonset has a container");
    RuntimeInfo::new(name, namespace, RuntimeType::Jindo).with_fuse_template(template)
}

pub fn pvc_volume(name: &str, claim_name: &str) -> corev1::Volume {
    corev1::Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            read_only: None,
        }),
        ..Default::default()
    }
}

/// A pod asking for serverless injection, with one app container mounting
/// every `(volume, claim)` pair at `/<volume>`.
pub fn fluid_pod(container_name: &str, claims: &[(&str, &str)]) -> corev1::Pod {
    corev1::Pod {
        metadata: metav1::ObjectMeta {
            name: Some("test-pod".to_string()),
            namespace: Some("big-data".to_string()),
            labels: Some(BTreeMap::from([(
                INJECT_SERVERLESS.to_string(),
                TRUE.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(corev1::PodSpec {
            containers: vec![corev1::Container {
                name: container_name.to_string(),
                image: Some("nginx".to_string()),
                volume_mounts: Some(
                    claims
                        .iter()
                        .map(|(volume, _)| mount(volume, &format!("/{volume}")))
                        .collect(),
                ),
                ..Default::default()
            }],
            volumes: Some(
                claims
                    .iter()
                    .map(|(volume, claim)| pvc_volume(volume, claim))
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// In-memory cluster state for injection tests.
#[derive(Default)]
pub struct FakeResources {
    datasets: BTreeMap<(String, String), Dataset>,
    config_maps: Mutex<BTreeSet<(String, String)>>,
    created: Mutex<Vec<String>>,
    create_race: bool,
}

impl FakeResources {
    pub fn with_dataset(mut self, name: &str, namespace: &str) -> Self {
        self.datasets.insert(
            (namespace.to_string(), name.to_string()),
            create_test_dataset(name, namespace),
        );
        self
    }

    pub fn with_config_map(self, name: &str, namespace: &str) -> Self {
        self.config_maps
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()));
        self
    }

    /// Every create reports that someone else created the ConfigMap first.
    pub fn with_create_race(mut self) -> Self {
        self.create_race = true;
        self
    }

    /// `<namespace>/<name>` of every ConfigMap created, in order.
    pub fn created_config_maps(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterResources for FakeResources {
    async fn get_dataset(&self, name: &str, namespace: &str) -> Result<Dataset, context::Error> {
        self.datasets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| context::Error::DatasetNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn config_map_exists(&self, name: &str, namespace: &str) -> Result<bool, context::Error> {
        Ok(self
            .config_maps
            .lock()
            .unwrap()
            .contains(&(namespace.to_string(), name.to_string())))
    }

    async fn create_config_map(&self, cm: &corev1::ConfigMap) -> Result<(), context::Error> {
        let name = cm.name_any();
        let namespace = cm.namespace().unwrap_or_default();
        if self.create_race {
            return Err(context::Error::AlreadyExists {
                kind: "ConfigMap".to_string(),
                name,
                namespace,
            });
        }

        let inserted = self
            .config_maps
            .lock()
            .unwrap()
            .insert((namespace.clone(), name.clone()));
        if !inserted {
            return Err(context::Error::AlreadyExists {
                kind: "ConfigMap".to_string(),
                name,
                namespace,
            });
        }
        self.created
            .lock()
            .unwrap()
            .push(format!("{namespace}/{name}"));
        Ok(())
    }
}
