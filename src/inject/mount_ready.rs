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

//! App-side mount readiness for unprivileged sidecars.
//!
//! An unprivileged sidecar cannot tell when the mount propagates to the app,
//! so the app container itself waits for every Fluid mount it uses.

use crate::context::ClusterResources;
use crate::inject::Error;
use crate::inject::mutator::MutatingPodSpecs;
use crate::inject::poststart::app::AppScriptGenerator;
use crate::inject::volume::randomize_new_volume_name;
use crate::types::common::app_post_start_enabled;
use crate::types::runtime::RuntimeInfo;
use k8s_openapi::api::core::v1 as corev1;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Mount path to runtime fs type for every Fluid PVC the container mounts.
pub fn collect_dataset_volume_mount_info(
    container: &corev1::Container,
    volumes: &[corev1::Volume],
    runtime_infos: &BTreeMap<String, RuntimeInfo>,
) -> BTreeMap<String, String> {
    container
        .volume_mounts
        .iter()
        .flatten()
        .filter_map(|mount| {
            let claim = volumes
                .iter()
                .find(|v| v.name == mount.name)?
                .persistent_volume_claim
                .as_ref()?;
            let runtime = runtime_infos.get(&claim.claim_name)?;
            let fs_type = runtime
                .fuse_template
                .as_ref()
                .map(|t| t.fuse_mount_info.fs_type.clone())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| runtime.runtime_type.to_string());
            Some((mount.mount_path.clone(), fs_type))
        })
        .collect()
}

/// Colon-joined mount paths and fs types, paired by position.
pub fn assemble_mount_infos(path_to_type: &BTreeMap<String, String>) -> (String, String) {
    let paths: Vec<&str> = path_to_type.keys().map(String::as_str).collect();
    let types: Vec<&str> = path_to_type.values().map(String::as_str).collect();
    (paths.join(":"), types.join(":"))
}

pub async fn ensure_script_config_map_exists(
    resources: &dyn ClusterResources,
    namespace: &str,
) -> Result<AppScriptGenerator, Error> {
    let generator = AppScriptGenerator::new(namespace);
    generator.helper().ensure_config_map(resources, None).await?;
    Ok(generator)
}

/// Mounts the readiness script into every container that uses a Fluid PVC and,
/// when the pod opts in, runs it as the app containers' postStart hook. An
/// existing postStart hook is left alone.
///
/// Must run before the dataset volumes are rewritten, while they still
/// reference their claims.
pub async fn inject_check_mount_ready_script(
    resources: &dyn ClusterResources,
    specs: &mut MutatingPodSpecs,
    runtime_infos: &BTreeMap<String, RuntimeInfo>,
) -> Result<(), Error> {
    let Some(first) = runtime_infos.values().next() else {
        return Ok(());
    };
    let namespace = specs
        .meta
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| first.namespace.clone());

    let generator = ensure_script_config_map_exists(resources, &namespace).await?;
    let mut volume = generator.helper().volume();
    let names = specs.volume_names();
    if names.contains(&volume.name) {
        volume.name = randomize_new_volume_name(&volume.name, |n| names.contains(n))?;
    }
    let mut mount = generator.helper().volume_mount();
    mount.name = volume.name.clone();

    let post_start_enabled = app_post_start_enabled(&specs.meta);
    let mut mounted = false;

    for container in specs.containers.iter_mut() {
        let path_to_type =
            collect_dataset_volume_mount_info(container, &specs.volumes, runtime_infos);
        if path_to_type.is_empty() {
            continue;
        }
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(mount.clone());
        mounted = true;

        if !post_start_enabled {
            continue;
        }
        let lifecycle = container.lifecycle.get_or_insert_with(Default::default);
        if lifecycle.post_start.is_some() {
            info!(container = %container.name, "postStart already present, skip mount ready check");
            continue;
        }
        let (paths, types) = assemble_mount_infos(&path_to_type);
        lifecycle.post_start = Some(generator.post_start_handler(&paths, &types));
    }

    for container in specs.init_containers.iter_mut() {
        if collect_dataset_volume_mount_info(container, &specs.volumes, runtime_infos).is_empty() {
            continue;
        }
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(mount.clone());
        mounted = true;
    }

    if mounted {
        debug!(volume = %volume.name, "added mount ready script volume");
        specs.volumes.push(volume);
    }
    Ok(())
}
