//! Irradiance spherical-harmonics projection of environment capture faces.
//!
//! Each face texel's radiance is projected onto nine real SH bands, reduced per
//! 16x16 group and merged into a shared coefficient buffer with a compare-and-swap
//! float add. The same kernel runs on the CPU (`kernel`) and through wgpu (`gpu`);
//! `probe` owns the host-side buffer lifecycle.

pub mod atomic_float;
pub mod cli;
pub mod coefficients;
pub mod config;
pub mod direction;
pub mod gpu;
pub mod kernel;
pub mod probe;
pub mod sh;
pub mod texture;

pub use coefficients::{BufferState, ShCoefficientBuffer};
pub use kernel::{CpuShKernel, FaceDispatch};
pub use probe::{ShAccumulator, ShProbeBaker};
pub use sh::ShCoefficients;
pub use texture::FaceTexture;
