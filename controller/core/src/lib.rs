#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod inject;
pub mod naming;
pub mod netpol;
pub mod resolve;
pub mod tokenx;
pub mod validate;


pub use self::{
    inject::inject,
    netpol::{synthesize, Target},
    resolve::{resolve, Resolution, ResolveError, Scope},
    validate::{check, MissingArtifact, Rejection},
};
