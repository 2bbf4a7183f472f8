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

use crate::types;
use crate::types::v1alpha1::dataset::Dataset;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::PostParams;
use kube::{Resource, ResourceExt, api::Api};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::futures::TryFutureExt;
use snafu::{OptionExt, Snafu};
use std::fmt::Debug;
use tracing::debug;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("dataset '{}/{}' not found", namespace, name))]
    DatasetNotFound { name: String, namespace: String },

    #[snafu(display("fuse daemonset '{}/{}' not found", namespace, name))]
    DaemonSetNotFound { name: String, namespace: String },

    #[snafu(display("{} '{}/{}' already exists", kind, namespace, name))]
    AlreadyExists {
        kind: String,
        name: String,
        namespace: String,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::DatasetNotFound { .. } | Error::DaemonSetNotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(resp),
            } => resp.code == 404,
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }
}

/// Cluster reads and writes the injector depends on.
///
/// The injector only holds this trait so that concurrent injection passes can
/// share one client, and tests can swap in an in-memory implementation.
#[async_trait]
pub trait ClusterResources: Send + Sync {
    async fn get_dataset(&self, name: &str, namespace: &str) -> Result<Dataset, Error>;

    async fn config_map_exists(&self, name: &str, namespace: &str) -> Result<bool, Error>;

    /// Creates the ConfigMap, returning [`Error::AlreadyExists`] on a create race.
    async fn create_config_map(&self, cm: &ConfigMap) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct Context {
    pub(crate) client: kube::Client,
}

impl Context {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub async fn get_opt<T>(&self, name: &str, namespace: &str) -> Result<Option<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).context(KubeSnafu).await
    }

    pub async fn create<T>(&self, resource: &T, namespace: &str) -> Result<T, Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as kube::Resource>::DynamicType: Default,
    {
        let api: Api<T> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), resource).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(resp)) if resp.code == 409 => AlreadyExistsSnafu {
                kind: T::kind(&Default::default()).to_string(),
                name: resource.name_any(),
                namespace,
            }
            .fail(),
            Err(source) => Err(Error::Kube { source }),
        }
    }

    /// The fuse DaemonSet of a runtime, from which injection templates are derived.
    pub async fn get_fuse_daemon_set(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<DaemonSet, Error> {
        self.get_opt::<DaemonSet>(name, namespace)
            .await?
            .context(DaemonSetNotFoundSnafu { name, namespace })
    }
}

#[async_trait]
impl ClusterResources for Context {
    async fn get_dataset(&self, name: &str, namespace: &str) -> Result<Dataset, Error> {
        self.get_opt::<Dataset>(name, namespace)
            .await?
            .context(DatasetNotFoundSnafu { name, namespace })
    }

    async fn config_map_exists(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let found = self.get_opt::<ConfigMap>(name, namespace).await?.is_some();
        debug!(configmap = name, namespace, found, "checked configmap");
        Ok(found)
    }

    async fn create_config_map(&self, cm: &ConfigMap) -> Result<(), Error> {
        let namespace = cm.namespace().context(types::error::NoNamespaceSnafu)?;
        self.create(cm, &namespace).await?;
        Ok(())
    }
}
