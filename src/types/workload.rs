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

//! Workload objects accepted by the injector.

use crate::types::error::{Error, MalformedObjectSnafu};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::batch::v1 as batchv1;
use k8s_openapi::api::core::v1 as corev1;
use serde_json::Value;
use snafu::OptionExt;

/// Typed workloads that carry a single pod template.
pub trait HasPodTemplate {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec>;
}

impl HasPodTemplate for appsv1::Deployment {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }
}

impl HasPodTemplate for appsv1::StatefulSet {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }
}

impl HasPodTemplate for appsv1::DaemonSet {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }
}

impl HasPodTemplate for appsv1::ReplicaSet {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec.as_mut().and_then(|s| s.template.as_mut())
    }
}

impl HasPodTemplate for corev1::ReplicationController {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec.as_mut().and_then(|s| s.template.as_mut())
    }
}

impl HasPodTemplate for corev1::PodTemplate {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.template.as_mut()
    }
}

impl HasPodTemplate for batchv1::Job {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec.as_mut().map(|s| &mut s.template)
    }
}

impl HasPodTemplate for batchv1::CronJob {
    fn pod_template_mut(&mut self) -> Option<&mut corev1::PodTemplateSpec> {
        self.spec
            .as_mut()
            .and_then(|s| s.job_template.spec.as_mut())
            .map(|s| &mut s.template)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Workload {
    Pod(Box<corev1::Pod>),
    Deployment(Box<appsv1::Deployment>),
    StatefulSet(Box<appsv1::StatefulSet>),
    DaemonSet(Box<appsv1::DaemonSet>),
    ReplicaSet(Box<appsv1::ReplicaSet>),
    ReplicationController(Box<corev1::ReplicationController>),
    PodTemplate(Box<corev1::PodTemplate>),
    Job(Box<batchv1::Job>),
    CronJob(Box<batchv1::CronJob>),

    /// A `v1/List`; items stay raw until they are injected.
    List(Value),

    /// A custom resource; pod templates are located structurally.
    Unstructured(Value),

    /// A built-in kind without a pod template location.
    Unsupported { kind: String, object: Value },
}

impl From<corev1::Pod> for Workload {
    fn from(pod: corev1::Pod) -> Self {
        Workload::Pod(Box::new(pod))
    }
}

fn is_builtin_api_version(api_version: &str) -> bool {
    match api_version.split_once('/') {
        None => true,
        Some((group, _)) => !group.contains('.') || group.ends_with(".k8s.io"),
    }
}

impl Workload {
    /// Decodes a raw object into its workload variant.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .context(MalformedObjectSnafu {
                path: "apiVersion",
                message: "missing apiVersion",
            })?
            .to_string();
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .context(MalformedObjectSnafu {
                path: "kind",
                message: "missing kind",
            })?
            .to_string();

        let workload = match (api_version.as_str(), kind.as_str()) {
            ("v1", "Pod") => Workload::Pod(Box::new(serde_json::from_value(value)?)),
            ("v1", "List") => Workload::List(value),
            ("apps/v1", "Deployment") => Workload::Deployment(Box::new(serde_json::from_value(value)?)),
            ("apps/v1", "StatefulSet") => {
                Workload::StatefulSet(Box::new(serde_json::from_value(value)?))
            }
            ("apps/v1", "DaemonSet") => Workload::DaemonSet(Box::new(serde_json::from_value(value)?)),
            ("apps/v1", "ReplicaSet") => {
                Workload::ReplicaSet(Box::new(serde_json::from_value(value)?))
            }
            ("v1", "ReplicationController") => {
                Workload::ReplicationController(Box::new(serde_json::from_value(value)?))
            }
            ("v1", "PodTemplate") => Workload::PodTemplate(Box::new(serde_json::from_value(value)?)),
            ("batch/v1", "Job") => Workload::Job(Box::new(serde_json::from_value(value)?)),
            ("batch/v1", "CronJob") => Workload::CronJob(Box::new(serde_json::from_value(value)?)),
            (api_version, _) if is_builtin_api_version(api_version) => {
                Workload::Unsupported {
                    kind,
                    object: value,
                }
            }
            _ => Workload::Unstructured(value),
        };

        Ok(workload)
    }

    pub fn to_value(&self) -> Result<Value, Error> {
        let value = match self {
            Workload::Pod(o) => serde_json::to_value(o)?,
            Workload::Deployment(o) => serde_json::to_value(o)?,
            Workload::StatefulSet(o) => serde_json::to_value(o)?,
            Workload::DaemonSet(o) => serde_json::to_value(o)?,
            Workload::ReplicaSet(o) => serde_json::to_value(o)?,
            Workload::ReplicationController(o) => serde_json::to_value(o)?,
            Workload::PodTemplate(o) => serde_json::to_value(o)?,
            Workload::Job(o) => serde_json::to_value(o)?,
            Workload::CronJob(o) => serde_json::to_value(o)?,
            Workload::List(v) | Workload::Unstructured(v) => v.clone(),
            Workload::Unsupported { object, .. } => object.clone(),
        };
        Ok(value)
    }

    pub fn kind(&self) -> &str {
        match self {
            Workload::Pod(_) => "Pod",
            Workload::Deployment(_) => "Deployment",
            Workload::StatefulSet(_) => "StatefulSet",
            Workload::DaemonSet(_) => "DaemonSet",
            Workload::ReplicaSet(_) => "ReplicaSet",
            Workload::ReplicationController(_) => "ReplicationController",
            Workload::PodTemplate(_) => "PodTemplate",
            Workload::Job(_) => "Job",
            Workload::CronJob(_) => "CronJob",
            Workload::List(_) => "List",
            Workload::Unstructured(v) => v.get("kind").and_then(Value::as_str).unwrap_or_default(),
            Workload::Unsupported { kind, .. } => kind,
        }
    }

    /// `<namespace>/<name>` for logging; generateName stands in for a missing name.
    pub fn display_name(&self) -> String {
        let value = self.to_value().unwrap_or(Value::Null);
        let meta = value.get("metadata");
        let field = |key: &str| {
            meta.and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let name = match field("name") {
            n if n.is_empty() => field("generateName"),
            n => n,
        };
        format!("{}/{}", field("namespace"), name)
    }
}
