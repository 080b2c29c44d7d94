use glam::Vec3;
use irradiance_sh::direction::{CubeFace, RowOrigin};
use irradiance_sh::gpu::{GpuContext, GpuShBackend};
use irradiance_sh::kernel::CpuShKernel;
use irradiance_sh::probe::ShProbeBaker;
use irradiance_sh::sh::SH_BAND_COUNT;
use irradiance_sh::{BufferState, FaceTexture, ShCoefficients};
use std::f32::consts::PI;

fn gpu_baker(row_origin: RowOrigin) -> Option<ShProbeBaker> {
    let context = match GpuContext::new_blocking() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("[sh] skipping GPU test, no adapter: {err:#}");
            return None;
        }
    };
    let backend = GpuShBackend::new(&context, row_origin).expect("create GPU backend");
    Some(ShProbeBaker::allocate(Box::new(backend)))
}

#[test_log::test]
fn gpu_uniform_face_matches_expected_l0() {
    let Some(mut baker) = gpu_baker(RowOrigin::TopLeft) else {
        return;
    };
    assert!(baker.dispatch_face(CubeFace::PositiveZ, &FaceTexture::uniform(32, 32, Vec3::splat(0.5))).is_err());
    baker.reset().expect("reset");
    let face = FaceTexture::uniform(32, 32, Vec3::splat(0.5));
    baker.dispatch_face(CubeFace::PositiveZ, &face).expect("dispatch");
    let once = baker.finalize().expect("read once");
    let want = 0.5 * 0.282095 * 0.887227 * (4.0 * PI / 6.0);
    assert!((once.band(0).x - want).abs() < 1e-4, "{} vs {want}", once.band(0).x);

    baker.dispatch_face(CubeFace::PositiveZ, &face).expect("second dispatch");
    let twice = baker.finalize().expect("read twice");
    assert!(once.scaled(2.0).max_abs_diff(&twice) < 1e-5);
    assert_eq!(baker.state(), BufferState::Accumulating { dispatches: 2 });
}

fn sky_faces(size: u32) -> Vec<(CubeFace, FaceTexture)> {
    CubeFace::ALL
        .iter()
        .map(|face| {
            let texture = FaceTexture::from_radiance(*face, size, |dir| {
                Vec3::new(1.0 + dir.y.max(0.0) * 4.0, 0.5 + 0.5 * dir.x, 0.25 + dir.z * dir.z)
            });
            (*face, texture)
        })
        .collect()
}

/// Bakes `faces` on both backends and checks they agree up to f32 summation order.
fn assert_backends_agree(row_origin: RowOrigin, faces: &[(CubeFace, FaceTexture)]) -> Option<ShCoefficients> {
    let mut gpu = gpu_baker(row_origin)?;
    let mut cpu = ShProbeBaker::cpu(CpuShKernel::new(4, row_origin));
    let from_gpu = gpu.bake_cube(faces).expect("gpu bake");
    let from_cpu = cpu.bake_cube(faces).expect("cpu bake");
    let scale = (0..SH_BAND_COUNT).map(|band| from_cpu.band(band).abs().max_element()).fold(1.0f32, f32::max);
    let diff = from_gpu.max_abs_diff(&from_cpu);
    assert!(diff <= 1e-4 * scale, "gpu/cpu mismatch {diff} (scale {scale}): {from_gpu:?} vs {from_cpu:?}");
    Some(from_gpu)
}

#[test_log::test]
fn gpu_and_cpu_backends_agree() {
    // 40x40 leaves partially filled groups on the right and bottom edges.
    let Some(coeffs) = assert_backends_agree(RowOrigin::TopLeft, &sky_faces(40)) else {
        return;
    };
    assert!(coeffs.band(1).x > 0.0, "upper hemisphere is brighter, L1 y should be positive");
}

#[test_log::test]
fn gpu_and_cpu_agree_with_bottom_left_rows() {
    // A face that is bright only in its first rows makes the row mapping visible.
    let faces: Vec<_> = CubeFace::ALL
        .iter()
        .map(|face| {
            let texture = FaceTexture::from_fn(24, 24, |x, y| {
                if y < 6 {
                    Vec3::new(3.0, 1.0 + x as f32 * 0.1, 0.5)
                } else {
                    Vec3::splat(0.1)
                }
            });
            (*face, texture)
        })
        .collect();
    let Some(bottom_left) = assert_backends_agree(RowOrigin::BottomLeft, &faces) else {
        return;
    };
    let Some(top_left) = assert_backends_agree(RowOrigin::TopLeft, &faces) else {
        return;
    };
    assert!(
        bottom_left.max_abs_diff(&top_left) > 1e-2,
        "row origin should change the result: {bottom_left:?} vs {top_left:?}"
    );
}

#[test_log::test]
fn gpu_keeps_radiance_beyond_half_float_range() {
    // 1e5 is above the largest finite f16 (65504).
    let face = FaceTexture::from_fn(32, 32, |x, y| {
        if (x, y) == (7, 20) {
            Vec3::splat(1.0e5)
        } else {
            Vec3::splat(0.3)
        }
    });
    let faces = vec![(CubeFace::PositiveZ, face.clone())];
    let Some(coeffs) = assert_backends_agree(RowOrigin::TopLeft, &faces) else {
        return;
    };
    assert!(coeffs.band(0).is_finite(), "L0 must stay finite: {coeffs:?}");

    let doubled = vec![(CubeFace::PositiveZ, face.scaled(2.0))];
    let Some(twice) = assert_backends_agree(RowOrigin::TopLeft, &doubled) else {
        return;
    };
    let diff = coeffs.scaled(2.0).max_abs_diff(&twice);
    assert!(diff <= 1e-4 * twice.band(0).x.abs(), "doubling radiance should double L0: {coeffs:?} vs {twice:?}");
}
