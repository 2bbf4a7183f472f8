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

use super::helper::{self, HOST_FUSE_DEVICE_NAMES, HOST_MOUNT_NAMES, HelperData};
use super::{MutatingPodSpecs, Mutator, MutatorBuildArgs};
use crate::context::ClusterResources;
use crate::inject::Error;
use crate::inject::volume::{trim_volume_mounts, trim_volumes};
use crate::types::runtime::RuntimeInfo;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::sync::Arc;
use tracing::debug;

const SYS_ADMIN: &str = "SYS_ADMIN";

/// Fuse sidecars for sandboxes without privileged containers: the sidecar
/// mounts through a virtual fuse device resource instead of host paths.
pub struct UnprivilegedMutator {
    args: MutatorBuildArgs,
}

impl UnprivilegedMutator {
    pub fn new(args: MutatorBuildArgs) -> Self {
        Self { args }
    }
}

/// Strips host mount and host device wiring, requests one virtual fuse device
/// and revokes privileges from the template container.
pub fn transform_template_with_unprivileged_sidecar_enabled(
    helper: &mut HelperData<'_>,
    fuse_device_resource_name: &str,
) {
    let template = &mut helper.template;
    for prefixes in [HOST_MOUNT_NAMES, HOST_FUSE_DEVICE_NAMES] {
        trim_volume_mounts(&mut template.fuse_container, prefixes);
        trim_volumes(&mut template.volumes_to_add, prefixes);
    }

    let resources = template
        .fuse_container
        .resources
        .get_or_insert_with(Default::default);
    for quantities in [&mut resources.limits, &mut resources.requests] {
        quantities
            .get_or_insert_with(Default::default)
            .insert(fuse_device_resource_name.to_string(), Quantity("1".to_string()));
    }

    let security_context = template
        .fuse_container
        .security_context
        .get_or_insert_with(Default::default);
    security_context.privileged = Some(false);
    if let Some(add) = security_context
        .capabilities
        .as_mut()
        .and_then(|c| c.add.as_mut())
    {
        add.retain(|cap| cap != SYS_ADMIN);
    }
}

async fn prepare_mutation(
    helper: &mut HelperData<'_>,
    resources: &dyn ClusterResources,
    fuse_device_resource_name: &str,
) -> Result<(), Error> {
    if !helper.options.enable_cache_dir {
        helper::transform_template_with_cache_dir_disabled(helper);
    }

    transform_template_with_unprivileged_sidecar_enabled(helper, fuse_device_resource_name);

    if !helper.options.skip_sidecar_post_start_inject {
        helper::prepare_fuse_container_post_start_script(helper, resources).await?;
    }

    if !helper.runtime.fuse_metrics_scrape {
        helper::remove_fuse_metrics_container_port(helper);
    }
    Ok(())
}

#[async_trait]
impl Mutator for UnprivilegedMutator {
    async fn mutate_with_runtime_info(
        &mut self,
        pvc_name: &str,
        runtime: &RuntimeInfo,
        name_suffix: &str,
    ) -> Result<(), Error> {
        let resources = Arc::clone(&self.args.resources);
        let config = Arc::clone(&self.args.config);

        // Unprivileged sidecars always carry the unprivileged check script.
        let mut options = self.args.options;
        options.enable_unprivileged_sidecar = true;

        let mut helper =
            HelperData::new(pvc_name, runtime, name_suffix, options, &mut self.args.specs)?;
        prepare_mutation(
            &mut helper,
            resources.as_ref(),
            &config.fuse_device_resource_name,
        )
        .await?;
        helper::mutate_dataset_volumes(&mut helper, false)?;
        helper::append_fuse_container_volumes(&mut helper)?;
        helper::inject_fuse_container(&mut helper)?;

        if runtime.fuse_metrics_scrape {
            helper::enable_prometheus_metrics_scrape(&mut self.args.specs);
        }
        debug!(pvc = pvc_name, runtime = %runtime.dataset_ref(), "unprivileged mutation done");
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

    #[test]
    fn test_template_transform() {
        let runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        let mut specs = MutatingPodSpecs::default();
        let mut helper =
            HelperData::new("duplicate", &runtime, "-0", Default::default(), &mut specs).unwrap();

        transform_template_with_unprivileged_sidecar_enabled(&mut helper, "fluid.io/fuse");

        let container = &helper.template.fuse_container;
        let security = container.security_context.as_ref().unwrap();
        assert_eq!(security.privileged, Some(false));
        let caps = security.capabilities.as_ref().unwrap().add.as_ref().unwrap();
        assert!(!caps.iter().any(|c| c == "SYS_ADMIN"));

        let resources = container.resources.as_ref().unwrap();
        for quantities in [&resources.limits, &resources.requests] {
            assert_eq!(
                quantities.as_ref().unwrap().get("fluid.io/fuse"),
                Some(&Quantity("1".to_string()))
            );
        }

        let volumes: Vec<_> = helper
            .template
            .volumes_to_add
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(volumes, vec!["duplicate"]);
        assert!(
            container
                .volume_mounts
                .iter()
                .flatten()
                .all(|m| m.name != "jindofs-fuse-mount")
        );
    }

    #[test]
    fn test_privileged_is_forced_off_without_security_context() {
        let mut runtime = crate::tests::jindo_runtime("big-data", "duplicate");
        if let Some(template) = runtime.fuse_template.as_mut() {
            template.fuse_container.security_context = None;
        }
        let mut specs = MutatingPodSpecs::default();
        let mut helper =
            HelperData::new("duplicate", &runtime, "-0", Default::default(), &mut specs).unwrap();

        transform_template_with_unprivileged_sidecar_enabled(&mut helper, "fluid.io/fuse");

        let security = helper.template.fuse_container.security_context.as_ref().unwrap();
        assert_eq!(security.privileged, Some(false));
        assert!(security.capabilities.is_none());
    }
}
