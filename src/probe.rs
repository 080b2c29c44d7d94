//! Host-side orchestration of a probe bake: `allocate -> reset -> dispatch x6 -> finalize`.
//!
//! The kernel cannot report failure, so every caller-side precondition is checked here
//! before a dispatch reaches a backend.

use crate::coefficients::{BufferState, ShCoefficientBuffer};
use crate::config::{BakeConfig, ShBackendKind};
use crate::direction::CubeFace;
use crate::kernel::{CpuShKernel, FaceDispatch};
use crate::sh::ShCoefficients;
use crate::texture::FaceTexture;
use anyhow::{bail, Context, Result};

/// A coefficient buffer together with the kernel that accumulates into it.
pub trait ShAccumulator {
    fn label(&self) -> &'static str;
    fn state(&self) -> BufferState;
    fn reset(&mut self) -> Result<()>;
    fn dispatch(&mut self, dispatch: &FaceDispatch<'_>) -> Result<()>;
    fn read(&self) -> Result<ShCoefficients>;
}

pub struct CpuShBackend {
    kernel: CpuShKernel,
    buffer: ShCoefficientBuffer,
}

impl CpuShBackend {
    pub fn new(kernel: CpuShKernel) -> Self {
        Self { kernel, buffer: ShCoefficientBuffer::allocate() }
    }

    pub fn buffer(&self) -> &ShCoefficientBuffer {
        &self.buffer
    }
}

impl ShAccumulator for CpuShBackend {
    fn label(&self) -> &'static str {
        "cpu"
    }

    fn state(&self) -> BufferState {
        self.buffer.state()
    }

    fn reset(&mut self) -> Result<()> {
        self.buffer.reset();
        Ok(())
    }

    fn dispatch(&mut self, dispatch: &FaceDispatch<'_>) -> Result<()> {
        self.buffer.begin_dispatch()?;
        self.kernel.dispatch(dispatch, &self.buffer);
        Ok(())
    }

    fn read(&self) -> Result<ShCoefficients> {
        self.buffer.finalize()
    }
}

/// Checks the preconditions the kernel silently relies on.
pub fn validate_dispatch(dispatch: &FaceDispatch<'_>) -> Result<()> {
    if dispatch.width == 0 || dispatch.height == 0 {
        bail!("Dispatch extent must be non-zero (got {}x{})", dispatch.width, dispatch.height);
    }
    let texture = dispatch.texture;
    if dispatch.width != texture.width() || dispatch.height != texture.height() {
        bail!(
            "Dispatch extent {}x{} does not match the bound face texture {}x{}",
            dispatch.width,
            dispatch.height,
            texture.width(),
            texture.height()
        );
    }
    if !dispatch.inv_view_proj.is_finite() {
        bail!("Inverse view-projection matrix contains non-finite values");
    }
    Ok(())
}

/// Drives one backend through a probe bake.
pub struct ShProbeBaker {
    backend: Box<dyn ShAccumulator>,
}

impl ShProbeBaker {
    /// Takes ownership of a freshly allocated backend. Call [`reset`](Self::reset) before dispatching.
    pub fn allocate(backend: Box<dyn ShAccumulator>) -> Self {
        Self { backend }
    }

    pub fn cpu(kernel: CpuShKernel) -> Self {
        Self::allocate(Box::new(CpuShBackend::new(kernel)))
    }

    pub fn from_config(config: &BakeConfig) -> Result<Self> {
        match config.backend {
            ShBackendKind::Cpu => Ok(Self::cpu(CpuShKernel::new(config.worker_threads(), config.row_origin))),
            ShBackendKind::Gpu => {
                let context = crate::gpu::GpuContext::new_blocking().context("Initializing GPU backend")?;
                let backend = crate::gpu::GpuShBackend::new(&context, config.row_origin)?;
                Ok(Self::allocate(Box::new(backend)))
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend.label()
    }

    pub fn state(&self) -> BufferState {
        self.backend.state()
    }

    /// Zeroes the coefficient buffer; required before a fresh accumulation sequence.
    pub fn reset(&mut self) -> Result<()> {
        log::debug!("[sh] resetting {} coefficient buffer", self.backend.label());
        self.backend.reset()
    }

    pub fn dispatch(&mut self, dispatch: &FaceDispatch<'_>) -> Result<()> {
        validate_dispatch(dispatch)?;
        self.backend.dispatch(dispatch)
    }

    /// Dispatches `texture` with the capture matrix of `face`.
    pub fn dispatch_face(&mut self, face: CubeFace, texture: &FaceTexture) -> Result<()> {
        let dispatch = FaceDispatch::new(texture, face.inverse_view_projection());
        self.dispatch(&dispatch).with_context(|| format!("Dispatching cube face {}", face.label()))
    }

    /// Reads the accumulated coefficients. Any post-scaling is up to the caller.
    pub fn finalize(&self) -> Result<ShCoefficients> {
        self.backend.read()
    }

    /// Resets, dispatches every given face once and finalizes.
    pub fn bake_cube(&mut self, faces: &[(CubeFace, FaceTexture)]) -> Result<ShCoefficients> {
        self.reset()?;
        for (face, texture) in faces {
            self.dispatch_face(*face, texture)?;
        }
        let coeffs = self.finalize()?;
        log::info!("[sh] baked {} face(s) on {} backend", faces.len(), self.backend.label());
        Ok(coeffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::RowOrigin;
    use glam::{Mat4, Vec3};

    fn baker() -> ShProbeBaker {
        ShProbeBaker::cpu(CpuShKernel::new(2, RowOrigin::TopLeft))
    }

    #[test]
    fn dispatch_before_reset_is_rejected() {
        let mut baker = baker();
        let face = FaceTexture::uniform(16, 16, Vec3::ONE);
        let err = baker.dispatch_face(CubeFace::PositiveX, &face).unwrap_err();
        assert!(format!("{err:#}").contains("never reset"));
        assert!(baker.finalize().is_err());
    }

    #[test]
    fn mismatched_extent_is_rejected() {
        let mut baker = baker();
        baker.reset().unwrap();
        let face = FaceTexture::uniform(16, 16, Vec3::ONE);
        let mut dispatch = FaceDispatch::new(&face, CubeFace::PositiveX.inverse_view_projection());
        dispatch.width = 32;
        assert!(baker.dispatch(&dispatch).is_err());
        assert_eq!(baker.state(), BufferState::Zeroed);
    }

    #[test]
    fn empty_face_is_rejected() {
        let mut baker = baker();
        baker.reset().unwrap();
        let face = FaceTexture::uniform(0, 16, Vec3::ONE);
        let err = baker.dispatch_face(CubeFace::PositiveY, &face).unwrap_err();
        assert!(format!("{err:#}").contains("non-zero"));
        assert_eq!(baker.state(), BufferState::Zeroed);
    }

    #[test]
    fn non_finite_matrix_is_rejected() {
        let mut baker = baker();
        baker.reset().unwrap();
        let face = FaceTexture::uniform(16, 16, Vec3::ONE);
        let dispatch = FaceDispatch::new(&face, Mat4::from_cols_array(&[f32::NAN; 16]));
        assert!(baker.dispatch(&dispatch).is_err());
    }

    #[test]
    fn dispatches_are_counted_until_reset() {
        let mut baker = baker();
        baker.reset().unwrap();
        let face = FaceTexture::uniform(16, 16, Vec3::ONE);
        baker.dispatch_face(CubeFace::PositiveX, &face).unwrap();
        baker.dispatch_face(CubeFace::NegativeX, &face).unwrap();
        assert_eq!(baker.state(), BufferState::Accumulating { dispatches: 2 });
        baker.reset().unwrap();
        assert_eq!(baker.finalize().unwrap(), ShCoefficients::zero());
    }
}
