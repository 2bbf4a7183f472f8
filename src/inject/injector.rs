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

use crate::application::{Application, FluidObject};
use crate::context::ClusterResources;
use crate::inject::mount_ready::inject_check_mount_ready_script;
use crate::inject::mutator::{MutatingPodSpecs, MutatorBuildArgs, build_mutator};
use crate::inject::{
    Error, FUSE_CONTAINER_NAME, INIT_FUSE_CONTAINER_NAME, InjectorConfig, MutateSnafu,
    PlatformNotSetSnafu, UnresolvablePlatformSnafu,
};
use crate::types;
use crate::types::common::{
    FuseSidecarInjectOption, INJECT_SIDECAR_DONE, Platform, TRUE, injection_done, platform_value,
    serverless_enabled,
};
use crate::types::runtime::RuntimeInfo;
use crate::types::workload::Workload;
use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Fluid PVC name to the runtime that serves it.
pub type RuntimeInfos = BTreeMap<String, RuntimeInfo>;

/// Injects fuse sidecars into workloads.
///
/// Each call works on its own copy of the workload; the caller's object is
/// never touched, and on error nothing of the copy is returned.
#[derive(Clone)]
pub struct Injector {
    resources: Arc<dyn ClusterResources>,
    config: Arc<InjectorConfig>,
}

impl Injector {
    pub fn new(resources: Arc<dyn ClusterResources>, config: InjectorConfig) -> Self {
        Self {
            resources,
            config: Arc::new(config),
        }
    }

    pub async fn inject_pod(
        &self,
        pod: &corev1::Pod,
        runtime_infos: &RuntimeInfos,
    ) -> Result<corev1::Pod, Error> {
        match self
            .inject(&Workload::from(pod.clone()), runtime_infos)
            .await?
        {
            Workload::Pod(pod) => Ok(*pod),
            other => Err(types::error::Error::InternalError {
                msg: format!("injecting a pod returned a {}", other.kind()),
            }
            .into()),
        }
    }

    /// Injects every pod spec of `workload`. List items are injected one by one;
    /// the first failing item fails the whole list.
    pub fn inject<'a>(
        &'a self,
        workload: &'a Workload,
        runtime_infos: &'a RuntimeInfos,
    ) -> BoxFuture<'a, Result<Workload, Error>> {
        async move {
            let mut out = workload.clone();

            if let Workload::List(list) = &mut out {
                if let Some(items) = list.get_mut("items").and_then(Value::as_array_mut) {
                    for item in items.iter_mut() {
                        let decoded = Workload::from_value(item.take())?;
                        let injected = self.inject(&decoded, runtime_infos).await?;
                        *item = injected.to_value()?;
                    }
                }
                return Ok(out);
            }

            let name = out.display_name();
            debug!(name = %name, kind = out.kind(), "inject application");
            {
                let mut views = out.pod_specs()?;
                for view in views.iter_mut() {
                    self.inject_pod_spec(view.as_mut(), runtime_infos, &name)
                        .await?;
                }
            }
            Ok(out)
        }
        .boxed()
    }

    /// Returns whether the pod spec was mutated.
    async fn inject_pod_spec(
        &self,
        object: &mut (dyn FluidObject + Send),
        runtime_infos: &RuntimeInfos,
        name: &str,
    ) -> Result<bool, Error> {
        let meta = object.meta()?;
        let specs = MutatingPodSpecs::collect(&*object)?;
        if !should_inject(&specs, name) {
            return Ok(false);
        }

        let platform = self.resolve_platform(&meta)?;
        let options = FuseSidecarInjectOption::from_meta(&meta, platform);
        debug!(name, %platform, ?options, "injecting pod spec");

        let mut specs = specs;
        if options.enable_unprivileged_sidecar && platform != Platform::Vineyard {
            inject_check_mount_ready_script(self.resources.as_ref(), &mut specs, runtime_infos)
                .await?;
        }

        let mut mutator = build_mutator(
            platform,
            MutatorBuildArgs {
                resources: Arc::clone(&self.resources),
                options,
                config: Arc::clone(&self.config),
                specs,
            },
        );

        for (index, (pvc_name, runtime)) in runtime_infos.iter().enumerate() {
            if !mutator
                .pod_specs()
                .mounted_pvc_names()
                .contains(pvc_name.as_str())
            {
                info!(name, pvc = %pvc_name, "pvc not mounted by the pod spec, skip");
                continue;
            }

            let suffix = format!("-{index}");
            mutator
                .mutate_with_runtime_info(pvc_name, runtime, &suffix)
                .await
                .context(MutateSnafu {
                    pvc: pvc_name.as_str(),
                    runtime: runtime.dataset_ref(),
                })?;
        }
        mutator.post_mutate().await?;

        mutator.into_pod_specs().apply_to(&mut *object)?;
        label_injection_done(&mut *object)?;
        info!(name, "fuse sidecar injection done");
        Ok(true)
    }

    /// The pod's platform label or annotation, else the configured default.
    pub fn resolve_platform(&self, meta: &metav1::ObjectMeta) -> Result<Platform, Error> {
        match platform_value(meta) {
            Some(value) => value
                .parse::<Platform>()
                .ok()
                .context(UnresolvablePlatformSnafu { value }),
            None => self.config.default_platform.context(PlatformNotSetSnafu),
        }
    }
}

fn is_fuse_container_name(name: &str) -> bool {
    name.starts_with(FUSE_CONTAINER_NAME) || name.starts_with(INIT_FUSE_CONTAINER_NAME)
}

/// A pod spec is injected when it asks for it, has not been injected yet and
/// carries no container that looks like an injected one.
pub fn should_inject(specs: &MutatingPodSpecs, name: &str) -> bool {
    if !serverless_enabled(&specs.meta) || injection_done(&specs.meta) {
        debug!(name, "serverless injection not requested or already done, skip");
        return false;
    }

    if let Some(conflict) = specs.container_names().find(|n| is_fuse_container_name(n)) {
        info!(name, container = conflict, "found existing fuse container name before injection, skip");
        return false;
    }
    true
}

fn label_injection_done(object: &mut dyn FluidObject) -> Result<(), Error> {
    let mut meta = object.meta()?;
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(INJECT_SIDECAR_DONE.to_string(), TRUE.to_string());
    object.set_meta(meta)?;
    Ok(())
}
