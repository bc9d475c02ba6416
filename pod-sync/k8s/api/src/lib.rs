#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use k8s_openapi::{
    api::core::v1::{Pod, PodStatus},
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{Api, ObjectMeta},
    runtime::{reflector, watcher},
    Client,
};
