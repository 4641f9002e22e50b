#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod index;
mod resource_id;


pub use self::{
    controller::{Controller, ControllerMetrics, Outcome},
    index::{Index, IndexMetrics, SharedIndex, Update},
    resource_id::ResourceId,
};
