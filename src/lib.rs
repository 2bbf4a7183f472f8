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

use crate::context::Context;
use crate::inject::injector::RuntimeInfos;
use crate::inject::{Injector, InjectorConfig};
use crate::types::runtime::{FuseInjectionTemplate, FuseMountInfo, RuntimeInfo};
use crate::types::workload::Workload;
use kube::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod application;
pub mod context;
pub mod inject;
pub mod types;

#[cfg(test)]
mod tests;

/// An entry of the runtime infos file. A runtime without a fuse template gets
/// one derived from its fuse DaemonSet when `fuseMountInfo` is given.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeInfoSource {
    #[serde(flatten)]
    info: RuntimeInfo,

    #[serde(default)]
    fuse_mount_info: Option<FuseMountInfo>,
}

async fn resolve_runtime_infos(
    ctx: &Context,
    sources: BTreeMap<String, RuntimeInfoSource>,
) -> Result<RuntimeInfos, context::Error> {
    let mut infos = RuntimeInfos::new();
    for (pvc, source) in sources {
        let mut info = source.info;
        if info.fuse_template.is_none() {
            match source.fuse_mount_info {
                Some(mount_info) => {
                    let ds = ctx
                        .get_fuse_daemon_set(&info.fuse_daemon_set_name(), &info.namespace)
                        .await?;
                    info.fuse_template = FuseInjectionTemplate::from_daemon_set(&ds, mount_info);
                    info!(pvc = %pvc, daemonset = %info.fuse_daemon_set_name(), "derived fuse template");
                }
                None => warn!(pvc = %pvc, "runtime has neither a fuse template nor fuse mount info"),
            }
        }
        infos.insert(pvc, info);
    }
    Ok(infos)
}

/// Injects fuse sidecars into the workload in `object_file` and writes the
/// result as YAML to `output`, or stdout when unset.
pub async fn run_inject(
    object_file: String,
    runtime_infos_file: String,
    output: Option<String>,
    config: InjectorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let object: serde_json::Value =
        serde_yaml_ng::from_str(&tokio::fs::read_to_string(&object_file).await?)?;
    let sources: BTreeMap<String, RuntimeInfoSource> =
        serde_yaml_ng::from_str(&tokio::fs::read_to_string(&runtime_infos_file).await?)?;

    let client = Client::try_default().await?;
    let ctx = Context::new(client);
    let runtime_infos = resolve_runtime_infos(&ctx, sources).await?;

    let workload = Workload::from_value(object)?;
    let injector = Injector::new(Arc::new(ctx), config);
    let injected = match injector.inject(&workload, &runtime_infos).await {
        Ok(injected) => injected,
        Err(e) => {
            warn!(name = %workload.display_name(), category = %e.category(), "injection failed: {}", e);
            return Err(e.into());
        }
    };
    info!(name = %injected.display_name(), kind = injected.kind(), "injection finished");

    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = output {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_yaml_ng::to_string(&injected.to_value()?)?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
