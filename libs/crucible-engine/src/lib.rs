pub mod docker;
pub mod engine;
pub mod error;
pub mod image;
pub mod logs;
pub mod result;
pub mod workspace;

#[cfg(test)]
mod fake_runtime;

pub use docker::{BollardRuntime, ContainerHandle, ContainerRuntime, ContainerSpec, LogStream};
pub use engine::ExecutionEngine;
pub use error::{ExecutionError, RuntimeError, RuntimeOperation};
pub use image::{ImageProvisioner, ImageStatus};
pub use logs::{demultiplex, DemuxedOutput, Demultiplexer, StreamKind};
pub use workspace::Workspace;
