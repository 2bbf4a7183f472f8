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

//! Pod specs embedded in custom resources.
//!
//! A node counts as a pod template when it has a `spec.containers` array, which
//! covers `spec.template` of most controllers as well as nested replica specs
//! such as `spec.tfReplicaSpecs.Worker.template`. Templates are not searched
//! for further templates.

use crate::application::{FluidObject, PodSpecView};
use crate::types::error::{Error, MalformedObjectSnafu};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

fn is_pod_template(node: &Value) -> bool {
    node.get("spec")
        .and_then(|spec| spec.get("containers"))
        .is_some_and(Value::is_array)
}

fn collect<'a>(node: &'a mut Value, out: &mut Vec<&'a mut Value>) {
    if is_pod_template(node) {
        out.push(node);
        return;
    }
    match node {
        Value::Object(map) => map.values_mut().for_each(|child| collect(child, out)),
        Value::Array(items) => items.iter_mut().for_each(|child| collect(child, out)),
        _ => {}
    }
}

pub fn pod_spec_views(object: &mut Value) -> Vec<PodSpecView<'_>> {
    let mut nodes = Vec::new();
    if let Some(spec) = object.get_mut("spec") {
        collect(spec, &mut nodes);
    }
    nodes
        .into_iter()
        .map(|node| Box::new(UnstructuredPodSpec { node }) as PodSpecView<'_>)
        .collect()
}

pub struct UnstructuredPodSpec<'a> {
    node: &'a mut Value,
}

impl UnstructuredPodSpec<'_> {
    fn read<T: DeserializeOwned + Default>(&self, path: &[&str]) -> Result<T, Error> {
        let mut current = &*self.node;
        for key in path {
            match current.get(key) {
                Some(next) => current = next,
                None => return Ok(T::default()),
            }
        }
        serde_json::from_value(current.clone()).map_err(|e| Error::MalformedObject {
            path: path.join("."),
            message: e.to_string(),
        })
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), Error> {
        let encoded = serde_json::to_value(value)?;
        let spec = self
            .node
            .get_mut("spec")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                MalformedObjectSnafu {
                    path: "spec",
                    message: "pod template spec is not an object",
                }
                .build()
            })?;

        let empty = encoded.as_array().is_some_and(Vec::is_empty);
        if empty && !spec.contains_key(key) {
            return Ok(());
        }
        spec.insert(key.to_string(), encoded);
        Ok(())
    }
}

fn merge_string_map(
    target: &mut Map<String, Value>,
    key: &str,
    entries: Option<std::collections::BTreeMap<String, String>>,
) {
    let Some(entries) = entries.filter(|e| !e.is_empty()) else {
        return;
    };
    let slot = target
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        for (k, v) in entries {
            map.insert(k, Value::String(v));
        }
    }
}

impl FluidObject for UnstructuredPodSpec<'_> {
    fn meta(&self) -> Result<metav1::ObjectMeta, Error> {
        self.read(&["metadata"])
    }

    /// Only labels and annotations are written back; other metadata of a
    /// template is owned by its controller.
    fn set_meta(&mut self, meta: metav1::ObjectMeta) -> Result<(), Error> {
        let node = self.node.as_object_mut().ok_or_else(|| {
            MalformedObjectSnafu {
                path: "",
                message: "pod template is not an object",
            }
            .build()
        })?;
        let metadata = node
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        let metadata = metadata.as_object_mut().ok_or_else(|| {
            MalformedObjectSnafu {
                path: "metadata",
                message: "metadata is not an object",
            }
            .build()
        })?;
        merge_string_map(metadata, "labels", meta.labels);
        merge_string_map(metadata, "annotations", meta.annotations);
        Ok(())
    }

    fn volumes(&self) -> Result<Vec<corev1::Volume>, Error> {
        self.read(&["spec", "volumes"])
    }

    fn set_volumes(&mut self, volumes: Vec<corev1::Volume>) -> Result<(), Error> {
        self.write("volumes", &volumes)
    }

    fn containers(&self) -> Result<Vec<corev1::Container>, Error> {
        self.read(&["spec", "containers"])
    }

    fn set_containers(&mut self, containers: Vec<corev1::Container>) -> Result<(), Error> {
        self.write("containers", &containers)
    }

    fn init_containers(&self) -> Result<Vec<corev1::Container>, Error> {
        self.read(&["spec", "initContainers"])
    }

    fn set_init_containers(&mut self, containers: Vec<corev1::Container>) -> Result<(), Error> {
        self.write("initContainers", &containers)
    }
}
