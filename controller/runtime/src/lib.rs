#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use accesserator_controller_core as core;
pub use accesserator_controller_k8s_api as k8s;
pub use accesserator_controller_k8s_reconcile as reconcile;

mod admission;
mod args;
mod lease;

pub use self::{
    admission::{Admission, AdmissionMetrics},
    args::Args,
};
