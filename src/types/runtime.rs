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

//! Runtime metadata supplied to the injector for every Fluid PVC.

use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumString};

/// Caching runtime backing a dataset. The display form is the short
/// lowercase token used in ConfigMap names and mount checks.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RuntimeType {
    #[serde(alias = "alluxio")]
    Alluxio,
    #[serde(alias = "jindo")]
    Jindo,
    #[serde(alias = "goosefs")]
    GooseFS,
    #[serde(alias = "juicefs")]
    JuiceFS,
    #[serde(alias = "thin")]
    Thin,
    #[serde(alias = "efc")]
    EFC,
    #[serde(alias = "vineyard")]
    Vineyard,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TieredStoreLevel {
    pub medium_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TieredStore {
    #[serde(default)]
    pub levels: Vec<TieredStoreLevel>,
}

/// Where the runtime's fuse client mounts the dataset.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FuseMountInfo {
    /// Mount point of the fuse filesystem on the node.
    pub host_mount_path: String,

    /// Filesystem type token as it appears in the mount table.
    pub fs_type: String,

    /// Sub-directory of the dataset exposed by the PV, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

impl FuseMountInfo {
    /// The host path an overridden dataset volume points at.
    pub fn dataset_host_path(&self, mount_path: &str) -> String {
        match self.sub_path.as_deref() {
            Some(sub_path) if !sub_path.is_empty() => format!("{mount_path}/{sub_path}"),
            _ => mount_path.to_string(),
        }
    }
}

/// Fuse container and volumes to inject, derived from the runtime's fuse DaemonSet.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FuseInjectionTemplate {
    pub fuse_container: corev1::Container,

    #[serde(default)]
    pub volumes_to_add: Vec<corev1::Volume>,

    pub fuse_mount_info: FuseMountInfo,
}

impl FuseInjectionTemplate {
    /// Builds a template from the first container of a fuse DaemonSet and the
    /// pod volumes that container mounts. Returns `None` when the DaemonSet has
    /// no container.
    pub fn from_daemon_set(ds: &appsv1::DaemonSet, mount_info: FuseMountInfo) -> Option<Self> {
        let pod_spec = ds.spec.as_ref()?.template.spec.as_ref()?;
        let fuse_container = pod_spec.containers.first()?.clone();

        let mounted: BTreeSet<&str> = fuse_container
            .volume_mounts
            .iter()
            .flatten()
            .map(|m| m.name.as_str())
            .collect();

        let volumes_to_add = pod_spec
            .volumes
            .iter()
            .flatten()
            .filter(|v| mounted.contains(v.name.as_str()))
            .cloned()
            .collect();

        Some(Self {
            fuse_container,
            volumes_to_add,
            fuse_mount_info: mount_info,
        })
    }
}

/// Dataset and runtime metadata for one Fluid PVC.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    /// Dataset (and runtime) name.
    pub name: String,
    pub namespace: String,
    pub runtime_type: RuntimeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiered_store: Option<TieredStore>,

    /// Whether fuse metrics are scraped from sidecars.
    #[serde(default)]
    pub fuse_metrics_scrape: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuse_template: Option<FuseInjectionTemplate>,
}

impl RuntimeInfo {
    pub fn new(name: &str, namespace: &str, runtime_type: RuntimeType) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            runtime_type,
            tiered_store: None,
            fuse_metrics_scrape: false,
            fuse_template: None,
        }
    }

    pub fn with_fuse_template(mut self, template: FuseInjectionTemplate) -> Self {
        self.fuse_template = Some(template);
        self
    }

    /// `<namespace>_<name>`, used to map injected containers back to datasets.
    pub fn dataset_ref(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    /// Name of the fuse DaemonSet the runtime controller deploys.
    pub fn fuse_daemon_set_name(&self) -> String {
        match self.runtime_type {
            RuntimeType::Jindo => format!("{}-jindofs-fuse", self.name),
            _ => format!("{}-fuse", self.name),
        }
    }
}
