#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kanali_gateway_core as core;
pub use kanali_gateway_k8s_api as k8s;
pub use kanali_gateway_k8s_index as index;
pub use kanali_gateway_proxy as proxy;

mod admission;
mod args;
pub mod crds;
mod server;

pub use self::args::Args;
