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

use crate::application::FluidObject;
use crate::types::error::Error;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

enum MetaSlot<'a> {
    Required(&'a mut metav1::ObjectMeta),
    Optional(&'a mut Option<metav1::ObjectMeta>),
}

/// Direct field access to a typed pod spec: a Pod, or the template of a
/// built-in controller.
pub struct PodSpecRef<'a> {
    meta: MetaSlot<'a>,
    spec: &'a mut corev1::PodSpec,
}

impl<'a> PodSpecRef<'a> {
    /// `None` for a Pod without a spec.
    pub fn from_pod(pod: &'a mut corev1::Pod) -> Option<Self> {
        let spec = pod.spec.as_mut()?;
        Some(Self {
            meta: MetaSlot::Required(&mut pod.metadata),
            spec,
        })
    }

    pub fn from_template(template: &'a mut corev1::PodTemplateSpec) -> Option<Self> {
        let spec = template.spec.as_mut()?;
        Some(Self {
            meta: MetaSlot::Optional(&mut template.metadata),
            spec,
        })
    }
}

impl FluidObject for PodSpecRef<'_> {
    fn meta(&self) -> Result<metav1::ObjectMeta, Error> {
        Ok(match &self.meta {
            MetaSlot::Required(meta) => (**meta).clone(),
            MetaSlot::Optional(meta) => (**meta).clone().unwrap_or_default(),
        })
    }

    fn set_meta(&mut self, meta: metav1::ObjectMeta) -> Result<(), Error> {
        match &mut self.meta {
            MetaSlot::Required(slot) => **slot = meta,
            MetaSlot::Optional(slot) => **slot = Some(meta),
        }
        Ok(())
    }

    fn volumes(&self) -> Result<Vec<corev1::Volume>, Error> {
        Ok(self.spec.volumes.clone().unwrap_or_default())
    }

    fn set_volumes(&mut self, volumes: Vec<corev1::Volume>) -> Result<(), Error> {
        self.spec.volumes = (!volumes.is_empty() || self.spec.volumes.is_some()).then_some(volumes);
        Ok(())
    }

    fn containers(&self) -> Result<Vec<corev1::Container>, Error> {
        Ok(self.spec.containers.clone())
    }

    fn set_containers(&mut self, containers: Vec<corev1::Container>) -> Result<(), Error> {
        self.spec.containers = containers;
        Ok(())
    }

    fn init_containers(&self) -> Result<Vec<corev1::Container>, Error> {
        Ok(self.spec.init_containers.clone().unwrap_or_default())
    }

    fn set_init_containers(&mut self, containers: Vec<corev1::Container>) -> Result<(), Error> {
        self.spec.init_containers =
            (!containers.is_empty() || self.spec.init_containers.is_some()).then_some(containers);
        Ok(())
    }
}
