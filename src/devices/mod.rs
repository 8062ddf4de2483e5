pub mod handlers;
pub mod models;
mod service;
mod update;

pub use models::Device;
pub use service::{DevicesOptions, DevicesService};
