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

//! Uniform pod spec access over the workload kinds the injector accepts.

use crate::types::error::{Error, InternalSnafu, UnsupportedKindSnafu};
use crate::types::workload::{HasPodTemplate, Workload};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

pub mod pod;
pub mod unstructured;

/// One pod spec inside a workload, together with the metadata that governs it.
///
/// Setters either write the whole value or fail; they never leave a field half
/// written.
pub trait FluidObject {
    fn meta(&self) -> Result<metav1::ObjectMeta, Error>;
    fn set_meta(&mut self, meta: metav1::ObjectMeta) -> Result<(), Error>;

    fn volumes(&self) -> Result<Vec<corev1::Volume>, Error>;
    fn set_volumes(&mut self, volumes: Vec<corev1::Volume>) -> Result<(), Error>;

    fn containers(&self) -> Result<Vec<corev1::Container>, Error>;
    fn set_containers(&mut self, containers: Vec<corev1::Container>) -> Result<(), Error>;

    fn init_containers(&self) -> Result<Vec<corev1::Container>, Error>;
    fn set_init_containers(&mut self, containers: Vec<corev1::Container>) -> Result<(), Error>;
}

pub type PodSpecView<'a> = Box<dyn FluidObject + Send + 'a>;

/// A workload that exposes its pod specs for mutation in place.
pub trait Application {
    fn pod_specs(&mut self) -> Result<Vec<PodSpecView<'_>>, Error>;
}

fn template_view<T: HasPodTemplate>(workload: &mut T) -> Vec<PodSpecView<'_>> {
    workload
        .pod_template_mut()
        .and_then(pod::PodSpecRef::from_template)
        .map(|view| vec![Box::new(view) as PodSpecView<'_>])
        .unwrap_or_default()
}

impl Application for Workload {
    fn pod_specs(&mut self) -> Result<Vec<PodSpecView<'_>>, Error> {
        let views = match self {
            Workload::Pod(pod) => pod::PodSpecRef::from_pod(pod)
                .map(|view| vec![Box::new(view) as PodSpecView<'_>])
                .unwrap_or_default(),
            Workload::Deployment(o) => template_view(o.as_mut()),
            Workload::StatefulSet(o) => template_view(o.as_mut()),
            Workload::DaemonSet(o) => template_view(o.as_mut()),
            Workload::ReplicaSet(o) => template_view(o.as_mut()),
            Workload::ReplicationController(o) => template_view(o.as_mut()),
            Workload::PodTemplate(o) => template_view(o.as_mut()),
            Workload::Job(o) => template_view(o.as_mut()),
            Workload::CronJob(o) => template_view(o.as_mut()),
            Workload::Unstructured(value) => unstructured::pod_spec_views(value),
            Workload::List(_) => {
                return InternalSnafu {
                    msg: "list items must be expanded before pod specs are read",
                }
                .fail();
            }
            Workload::Unsupported { kind, .. } => {
                return UnsupportedKindSnafu { kind: kind.clone() }.fail();
            }
        };
        Ok(views)
    }
}
