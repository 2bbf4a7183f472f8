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

use super::helper::{self, HelperData};
use super::{MutatingPodSpecs, Mutator, MutatorBuildArgs};
use crate::context::ClusterResources;
use crate::inject::Error;
use crate::types::common::{HostPathMode, host_path_mode};
use crate::types::runtime::RuntimeInfo;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Privileged fuse sidecars mounting through the host's `/dev/fuse`.
pub struct DefaultMutator {
    args: MutatorBuildArgs,
}

impl DefaultMutator {
    pub fn new(args: MutatorBuildArgs) -> Self {
        Self { args }
    }
}

/// Cache dirs and metrics ports are dropped unless asked for; the sidecar check
/// script is attached unless skipped.
async fn prepare_mutation(
    helper: &mut HelperData<'_>,
    resources: &dyn ClusterResources,
) -> Result<(), Error> {
    if !helper.options.enable_cache_dir {
        helper::transform_template_with_cache_dir_disabled(helper);
    }

    if !helper.options.skip_sidecar_post_start_inject {
        helper::prepare_fuse_container_post_start_script(helper, resources).await?;
    }

    if !helper.runtime.fuse_metrics_scrape {
        helper::remove_fuse_metrics_container_port(helper);
    }
    Ok(())
}

#[async_trait]
impl Mutator for DefaultMutator {
    async fn mutate_with_runtime_info(
        &mut self,
        pvc_name: &str,
        runtime: &RuntimeInfo,
        name_suffix: &str,
    ) -> Result<(), Error> {
        let resources = Arc::clone(&self.args.resources);
        let random_host_path = host_path_mode(&self.args.specs.meta) == HostPathMode::RandomSuffix;

        let mut helper = HelperData::new(
            pvc_name,
            runtime,
            name_suffix,
            self.args.options,
            &mut self.args.specs,
        )?;
        prepare_mutation(&mut helper, resources.as_ref()).await?;
        helper::mutate_dataset_volumes(&mut helper, random_host_path)?;
        helper::append_fuse_container_volumes(&mut helper)?;
        helper::inject_fuse_container(&mut helper)?;

        if runtime.fuse_metrics_scrape {
            helper::enable_prometheus_metrics_scrape(&mut self.args.specs);
        }
        debug!(pvc = pvc_name, runtime = %runtime.dataset_ref(), "default mutation done");
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
