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

//! Mutation steps shared by the fuse sidecar mutators.

use super::{MutatingContext, MutatingPodSpecs};
use crate::context::ClusterResources;
use crate::inject::poststart::sidecar::SidecarScriptGenerator;
use crate::inject::volume::{has_prefix, randomize_new_volume_name, trim_volume_mounts, trim_volumes};
use crate::inject::{
    Error, FUSE_CONTAINER_NAME, FuseMountNotFoundSnafu, FuseTemplateMissingSnafu,
    INIT_FUSE_CONTAINER_NAME, UnsupportedHostPathSnafu,
};
use crate::types::common::{
    CONTAINER_DATASET_MAPPING_PREFIX, FuseSidecarInjectOption, PROMETHEUS_SCRAPE,
    SidecarInjectionMode, TRUE,
};
use crate::types::runtime::{FuseInjectionTemplate, RuntimeInfo};
use k8s_openapi::api::core::v1 as corev1;
use rand::Rng;
use snafu::OptionExt;
use tracing::debug;

/// Cache volumes: `datavolume-` and `volume-localtime` for JindoFS, tier
/// mediums for Alluxio and GooseFS, `cache-dir` for JuiceFS.
pub const CACHE_DIR_NAMES: &[&str] = &[
    "datavolume-",
    "volume-localtime",
    "cache-dir",
    "mem",
    "ssd",
    "hdd",
];

/// Host path volumes exposing the fuse mount point.
pub const HOST_MOUNT_NAMES: &[&str] = &[
    "alluxio-fuse-mount",
    "jindofs-fuse-mount",
    "goosefs-fuse-mount",
    "juicefs-fuse-mount",
    "thin-fuse-mount",
    "efc-fuse-mount",
    "efc-sock",
];

/// Host `/dev/fuse` volumes.
pub const HOST_FUSE_DEVICE_NAMES: &[&str] = &[
    "alluxio-fuse-device",
    "jindofs-fuse-device",
    "goosefs-fuse-device",
    "thin-fuse-device",
];

const MOUNT_PROPAGATION_HOST_TO_CONTAINER: &str = "HostToContainer";
const CONTAINER_RESTART_POLICY_ALWAYS: &str = "Always";

/// State of one `mutate_with_runtime_info` call. The template is a private
/// copy, so specializing it never leaks into other PVCs or pods.
pub struct HelperData<'a> {
    pub pvc_name: &'a str,
    pub runtime: &'a RuntimeInfo,
    pub name_suffix: &'a str,
    pub options: FuseSidecarInjectOption,
    pub template: FuseInjectionTemplate,
    pub specs: &'a mut MutatingPodSpecs,
    pub ctx: MutatingContext,
}

impl<'a> HelperData<'a> {
    pub fn new(
        pvc_name: &'a str,
        runtime: &'a RuntimeInfo,
        name_suffix: &'a str,
        options: FuseSidecarInjectOption,
        specs: &'a mut MutatingPodSpecs,
    ) -> Result<Self, Error> {
        let template = runtime
            .fuse_template
            .clone()
            .context(FuseTemplateMissingSnafu {
                runtime: runtime.dataset_ref(),
            })?;
        Ok(Self {
            pvc_name,
            runtime,
            name_suffix,
            options,
            template,
            specs,
            ctx: MutatingContext::default(),
        })
    }
}

pub fn transform_template_with_cache_dir_disabled(helper: &mut HelperData<'_>) {
    trim_volume_mounts(&mut helper.template.fuse_container, CACHE_DIR_NAMES);
    trim_volumes(&mut helper.template.volumes_to_add, CACHE_DIR_NAMES);
}

pub fn remove_fuse_metrics_container_port(helper: &mut HelperData<'_>) {
    if let Some(ports) = helper.template.fuse_container.ports.as_mut() {
        ports.retain(|p| !p.name.as_deref().is_some_and(|n| n.ends_with("-metrics")));
    }
}

pub fn enable_prometheus_metrics_scrape(specs: &mut MutatingPodSpecs) {
    specs
        .meta
        .annotations
        .get_or_insert_with(Default::default)
        .entry(PROMETHEUS_SCRAPE.to_string())
        .or_insert_with(|| TRUE.to_string());
}

/// The fuse container mount that exposes the host fuse mount point.
pub fn fuse_mount_in_container(
    template: &FuseInjectionTemplate,
) -> Result<&corev1::VolumeMount, Error> {
    template
        .fuse_container
        .volume_mounts
        .iter()
        .flatten()
        .find(|m| has_prefix(&m.name, HOST_MOUNT_NAMES))
        .context(FuseMountNotFoundSnafu {
            container: template.fuse_container.name.clone(),
            fs_type: template.fuse_mount_info.fs_type.clone(),
        })
}

/// Ensures the sidecar check script ConfigMap, then wires its volume, mount
/// and postStart hook into the template.
pub async fn prepare_fuse_container_post_start_script(
    helper: &mut HelperData<'_>,
    resources: &dyn ClusterResources,
) -> Result<(), Error> {
    let runtime = helper.runtime;
    let dataset = resources
        .get_dataset(&runtime.name, &runtime.namespace)
        .await?;

    let unprivileged = helper.options.enable_unprivileged_sidecar;
    let mount_path = if unprivileged {
        String::new()
    } else {
        fuse_mount_in_container(&helper.template)?.mount_path.clone()
    };

    let generator = SidecarScriptGenerator::new(runtime, &mount_path, unprivileged);
    generator
        .helper()
        .ensure_config_map(resources, Some(&dataset))
        .await?;

    let container = &mut helper.template.fuse_container;
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(generator.helper().volume_mount());
    container
        .lifecycle
        .get_or_insert_with(Default::default)
        .post_start = Some(generator.post_start_handler());
    helper
        .template
        .volumes_to_add
        .push(generator.helper().volume());

    Ok(())
}

/// `<pod name>/<unix micros>-<8 hex>` inserted before the last component of
/// `original`. Pods without a name use `<generateName>--generate-name`.
pub fn generate_unique_host_path(
    helper: &mut HelperData<'_>,
    original: &str,
) -> Result<String, Error> {
    let (base, last) = original
        .trim_end_matches('/')
        .rsplit_once('/')
        .context(UnsupportedHostPathSnafu { path: original })?;

    let meta = &helper.specs.meta;
    let name = match meta.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!(
            "{}--generate-name",
            meta.generate_name.as_deref().unwrap_or_default()
        ),
    };
    let unique = format!(
        "{}/{}-{:08x}",
        name,
        chrono::Utc::now().timestamp_micros(),
        rand::thread_rng().r#gen::<u32>()
    );
    helper.ctx.set_unique_host_mount_path(unique.clone());

    let components: Vec<&str> = base
        .split('/')
        .chain([unique.as_str(), last])
        .filter(|c| !c.is_empty())
        .collect();
    Ok(format!("/{}", components.join("/")))
}

/// Points every volume bound to the PVC at the fuse mount on the host, and
/// records whether containers and init containers use it.
pub fn mutate_dataset_volumes(
    helper: &mut HelperData<'_>,
    random_host_path: bool,
) -> Result<(), Error> {
    let mount_info = helper.template.fuse_mount_info.clone();
    let mut mount_path = mount_info.host_mount_path.clone();
    if random_host_path {
        mount_path = generate_unique_host_path(helper, &mount_path)?;
    }
    let host_path = mount_info.dataset_host_path(&mount_path);

    let mut overridden = Vec::new();
    for volume in helper.specs.volumes.iter_mut() {
        let bound = volume
            .persistent_volume_claim
            .as_ref()
            .is_some_and(|pvc| pvc.claim_name == helper.pvc_name);
        if bound {
            *volume = corev1::Volume {
                name: volume.name.clone(),
                host_path: Some(corev1::HostPathVolumeSource {
                    path: host_path.clone(),
                    type_: None,
                }),
                ..Default::default()
            };
            overridden.push(volume.name.clone());
        }
    }

    let set_propagation = |containers: &mut Vec<corev1::Container>| {
        let mut used = false;
        for mount in containers
            .iter_mut()
            .flat_map(|c| c.volume_mounts.iter_mut().flatten())
        {
            if overridden.contains(&mount.name) {
                mount.mount_propagation = Some(MOUNT_PROPAGATION_HOST_TO_CONTAINER.to_string());
                used = true;
            }
        }
        used
    };
    let used_in_containers = set_propagation(&mut helper.specs.containers);
    let used_in_init_containers = set_propagation(&mut helper.specs.init_containers);
    helper.ctx.set_dataset_used_in_containers(used_in_containers);
    helper
        .ctx
        .set_dataset_used_in_init_containers(used_in_init_containers);

    debug!(
        pvc = helper.pvc_name,
        host_path = %host_path,
        volumes = ?overridden,
        used_in_containers,
        used_in_init_containers,
        "overrode dataset volumes"
    );
    Ok(())
}

/// Appends the template volumes, suffixed with the PVC index. A suffixed name
/// that is still taken is renamed and the rename recorded in the context.
pub fn append_fuse_container_volumes(helper: &mut HelperData<'_>) -> Result<(), Error> {
    let mut names = helper.specs.volume_names();

    let unique = helper.ctx.unique_host_mount_path().map(str::to_string);
    for volume in helper.template.volumes_to_add.clone() {
        let mut volume = volume;
        if let Some(unique) = unique.as_deref()
            && has_prefix(&volume.name, HOST_MOUNT_NAMES)
            && let Some(host_path) = volume.host_path.as_mut()
        {
            host_path.path = format!("{}/{}", host_path.path, unique);
        }

        let old_name = volume.name.clone();
        let mut new_name = format!("{}{}", old_name, helper.name_suffix);
        if names.contains(&new_name) {
            new_name = randomize_new_volume_name(&new_name, |n| names.contains(n))?;
        }
        names.insert(new_name.clone());
        if old_name != new_name {
            helper.ctx.record_renamed_volume(&old_name, &new_name);
        }
        volume.name = new_name;
        helper.specs.volumes.push(volume);
    }
    Ok(())
}

fn named_fuse_container(helper: &HelperData<'_>, base_name: &str) -> corev1::Container {
    let mut container = helper.template.fuse_container.clone();
    container.name = format!("{}{}", base_name, helper.name_suffix);

    let renames = helper.ctx.appended_volume_names();
    for mount in container.volume_mounts.iter_mut().flatten() {
        if let Some(new_name) = renames.get(&mount.name) {
            mount.name = new_name.clone();
        }
    }
    container
}

fn label_container_dataset_mapping(helper: &mut HelperData<'_>, container_name: &str) {
    helper
        .specs
        .meta
        .labels
        .get_or_insert_with(Default::default)
        .insert(
            format!("{CONTAINER_DATASET_MAPPING_PREFIX}{container_name}"),
            helper.runtime.dataset_ref(),
        );
}

/// Prepends the fuse container to containers, or a short-lived twin to init
/// containers so that init containers can read the dataset too.
pub fn prepend_fuse_container(helper: &mut HelperData<'_>, as_init: bool) {
    let base_name = if as_init {
        INIT_FUSE_CONTAINER_NAME
    } else {
        FUSE_CONTAINER_NAME
    };
    let mut container = named_fuse_container(helper, base_name);
    let name = container.name.clone();

    if as_init {
        container.lifecycle = None;
        container.command = Some(vec!["sleep".to_string()]);
        container.args = Some(vec!["2s".to_string()]);
        helper.specs.init_containers.insert(0, container);
    } else {
        helper.specs.containers.insert(0, container);
    }

    debug!(pvc = helper.pvc_name, container = %name, as_init, "prepended fuse container");
    label_container_dataset_mapping(helper, &name);
}

/// Places a single always-restarting fuse container at the front of the init
/// containers.
pub fn prepend_fuse_native_sidecar(helper: &mut HelperData<'_>) {
    let mut container = named_fuse_container(helper, FUSE_CONTAINER_NAME);
    container.restart_policy = Some(CONTAINER_RESTART_POLICY_ALWAYS.to_string());
    let name = container.name.clone();
    helper.specs.init_containers.insert(0, container);

    debug!(pvc = helper.pvc_name, container = %name, "prepended native fuse sidecar");
    label_container_dataset_mapping(helper, &name);
}

pub fn inject_fuse_container(helper: &mut HelperData<'_>) -> Result<(), Error> {
    let used_in_containers = helper.ctx.dataset_used_in_containers()?;
    let used_in_init_containers = helper.ctx.dataset_used_in_init_containers()?;

    match helper.options.sidecar_injection_mode {
        SidecarInjectionMode::NativeSidecar => {
            if used_in_containers || used_in_init_containers {
                prepend_fuse_native_sidecar(helper);
            }
        }
        SidecarInjectionMode::Default => {
            if used_in_containers {
                prepend_fuse_container(helper, false);
            }
            if used_in_init_containers {
                prepend_fuse_container(helper, true);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::runtime::RuntimeType;

    fn specs_for(pod: corev1::Pod) -> MutatingPodSpecs {
        let spec = pod.spec.unwrap();
        MutatingPodSpecs {
            meta: pod.metadata,
            volumes: spec.volumes.unwrap_or_default(),
            containers: spec.containers,
            init_containers: spec.init_containers.unwrap_or_default(),
        }
    }

    #[test]
    fn test_missing_template() {
        let runtime = RuntimeInfo::new("ds", "ns", RuntimeType::Jindo);
        let mut specs = MutatingPodSpecs::default();
        let err = HelperData::new("ds", &runtime, "-0", Default::default(), &mut specs)
            .err()
            .unwrap();
        assert!(matches!(err, Error::FuseTemplateMissing { .. }));
    }

    #[test]
    fn test_dataset_volume_override_and_propagation() {
        let runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        let mut specs = specs_for(crate::tests::fluid_pod("app", &[("data", "duplicate")]));
        let mut helper =
            HelperData::new("duplicate", &runtime, "-0", Default::default(), &mut specs).unwrap();

        mutate_dataset_volumes(&mut helper, false).unwrap();
        assert!(helper.ctx.dataset_used_in_containers().unwrap());
        assert!(!helper.ctx.dataset_used_in_init_containers().unwrap());

        let volume = &specs.volumes[0];
        assert_eq!(volume.name, "data");
        assert!(volume.persistent_volume_claim.is_none());
        assert_eq!(
            volume.host_path.as_ref().unwrap().path,
            "/runtime-mnt/jindo/big-data/duplicate/jindofs-fuse"
        );
        let mount = &specs.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_propagation.as_deref(), Some("HostToContainer"));
    }

    #[test]
    fn test_unique_host_path_shape() {
        let runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        let mut pod = crate::tests::fluid_pod("app", &[("data", "duplicate")]);
        pod.metadata.name = None;
        pod.metadata.generate_name = Some("web-".to_string());
        let mut specs = specs_for(pod);
        let mut helper =
            HelperData::new("duplicate", &runtime, "-0", Default::default(), &mut specs).unwrap();

        let path = generate_unique_host_path(&mut helper, "/runtime-mnt/jindo/ns/ds/jindofs-fuse")
            .unwrap();
        let unique = helper.ctx.unique_host_mount_path().unwrap().to_string();
        assert!(unique.starts_with("web---generate-name/"));
        assert_eq!(
            path,
            format!("/runtime-mnt/jindo/ns/ds/{unique}/jindofs-fuse")
        );
        let tag = unique.rsplit('-').next().unwrap();
        assert_eq!(tag.len(), 8);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(generate_unique_host_path(&mut helper, "no-slash").is_err());
    }

    #[test]
    fn test_metrics_ports() {
        let runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        let mut specs = MutatingPodSpecs::default();
        let mut helper =
            HelperData::new("duplicate", &runtime, "-0", Default::default(), &mut specs).unwrap();
        helper.template.fuse_container.ports = Some(vec![
            corev1::ContainerPort {
                name: Some("fuse-metrics".to_string()),
                container_port: 9090,
                ..Default::default()
            },
            corev1::ContainerPort {
                name: Some("rpc".to_string()),
                container_port: 8101,
                ..Default::default()
            },
        ]);
        remove_fuse_metrics_container_port(&mut helper);
        let ports = helper.template.fuse_container.ports.clone().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("rpc"));

        enable_prometheus_metrics_scrape(helper.specs);
        assert_eq!(
            specs.meta.annotations.unwrap().get(PROMETHEUS_SCRAPE).map(String::as_str),
            Some("true")
        );
    }
}
