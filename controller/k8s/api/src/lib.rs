#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod application;
pub mod labels;
pub mod security_config;
pub mod store;

pub use self::{
    application::{Application, ApplicationSpec},
    security_config::{SecurityConfig, SecurityConfigSpec, SecurityConfigStatus, TokenXConfig},
    store::{ConfigLookup, ReconcileStore, StoreError},
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            Container, ContainerPort, EnvFromSource, EnvVar, Pod, PodSpec, SecretEnvSource,
        },
        networking::v1::{
            NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
        },
    },
    apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector},
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    Client, Error, Resource, ResourceExt,
};
