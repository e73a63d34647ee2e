//! # External Compute Service
//!
//! The minimal boundary the job lifecycle needs: submit a workflow payload,
//! then ask for its status. [`HttpComputeClient`] speaks the ComfyUI-style
//! HTTP contract; tests substitute their own [`ComputeService`].

pub mod http_client;
pub mod traits;

pub use http_client::HttpComputeClient;
pub use traits::{ComputeService, ExternalJobStatus, OutputEntry};
