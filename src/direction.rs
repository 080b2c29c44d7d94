use glam::{Mat3, Mat4, UVec2, Vec2, Vec3, Vec4};
use serde::Deserialize;
use std::f32::consts::{FRAC_PI_2, PI};

/// NDC depth used when unprojecting a texel (far plane for a `[0, 1]` depth range).
pub const UNPROJECT_DEPTH: f32 = 1.0;

const CAPTURE_NEAR: f32 = 0.1;
const CAPTURE_FAR: f32 = 100.0;

/// Which image row the NDC `y = +1` edge lands on.
///
/// `TopLeft` is the wgpu/D3D framebuffer convention (row 0 is the top of the
/// face, NDC `y = +1`). `BottomLeft` is the GL convention (row 0 is NDC `y = -1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrigin {
    #[default]
    TopLeft,
    BottomLeft,
}

impl RowOrigin {
    pub fn label(self) -> &'static str {
        match self {
            RowOrigin::TopLeft => "top_left",
            RowOrigin::BottomLeft => "bottom_left",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "top_left" | "top-left" => Some(RowOrigin::TopLeft),
            "bottom_left" | "bottom-left" => Some(RowOrigin::BottomLeft),
            _ => None,
        }
    }

    /// Converts a texel-center UV into normalized device coordinates.
    pub fn uv_to_ndc(self, uv: Vec2) -> Vec2 {
        let ndc = uv * 2.0 - Vec2::ONE;
        match self {
            RowOrigin::TopLeft => Vec2::new(ndc.x, -ndc.y),
            RowOrigin::BottomLeft => ndc,
        }
    }

    /// Shader-side encoding of the convention.
    pub fn flip_rows(self) -> bool {
        matches!(self, RowOrigin::TopLeft)
    }
}

/// UV of the center of texel `texel` in an image of `size` texels.
pub fn texel_center_uv(texel: UVec2, size: UVec2) -> Vec2 {
    (texel.as_vec2() + Vec2::splat(0.5)) / size.as_vec2()
}

/// World-space viewing direction of a texel, or `None` for texels outside the image
/// and for degenerate unprojections.
///
/// The inverse view-projection must not carry a translation: the unprojected far-plane
/// point is treated as a direction from the capture origin.
pub fn texel_direction(texel: UVec2, size: UVec2, inv_view_proj: &Mat4, row_origin: RowOrigin) -> Option<Vec3> {
    if texel.x >= size.x || texel.y >= size.y {
        return None;
    }
    let ndc = row_origin.uv_to_ndc(texel_center_uv(texel, size));
    let clip = *inv_view_proj * Vec4::new(ndc.x, ndc.y, UNPROJECT_DEPTH, 1.0);
    if clip.w.abs() <= f32::EPSILON {
        return None;
    }
    let dir = (clip.truncate() / clip.w).normalize_or_zero();
    if dir == Vec3::ZERO || !dir.is_finite() {
        return None;
    }
    Some(dir)
}

/// Uniform per-texel solid angle: a face covers a sixth of the sphere, split evenly
/// across its texels. Texel-dependent differential solid angle is not applied.
pub fn uniform_texel_solid_angle(width: u32, height: u32) -> f32 {
    (4.0 * PI) / (6.0 * (width as f32) * (height as f32))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+x",
            CubeFace::NegativeX => "-x",
            CubeFace::PositiveY => "+y",
            CubeFace::NegativeY => "-y",
            CubeFace::PositiveZ => "+z",
            CubeFace::NegativeZ => "-z",
        }
    }

    /// (forward, right, up) of the face in the wgpu cube texture layout, with row 0 at the top.
    pub fn basis(self) -> (Vec3, Vec3, Vec3) {
        match self {
            CubeFace::PositiveX => (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            CubeFace::NegativeX => (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            CubeFace::PositiveY => (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            CubeFace::NegativeY => (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            CubeFace::PositiveZ => (Vec3::Z, Vec3::X, Vec3::Y),
            CubeFace::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        }
    }

    /// Rotation-only view matrix. Cube faces are mirrored relative to a right-handed
    /// camera, so the basis may have a negative determinant.
    pub fn view_matrix(self) -> Mat4 {
        let (forward, right, up) = self.basis();
        Mat4::from_mat3(Mat3::from_cols(right, up, -forward).transpose())
    }

    pub fn projection_matrix() -> Mat4 {
        Mat4::perspective_rh(FRAC_PI_2, 1.0, CAPTURE_NEAR, CAPTURE_FAR)
    }

    pub fn view_projection(self) -> Mat4 {
        Self::projection_matrix() * self.view_matrix()
    }

    pub fn inverse_view_projection(self) -> Mat4 {
        self.view_projection().inverse()
    }

    /// Reference direction of texel `(x, y)` on a `size`-texel face, row 0 at the top.
    pub fn texel_direction(self, x: u32, y: u32, size: u32) -> Vec3 {
        let a = (2.0 * (x as f32 + 0.5) / size as f32) - 1.0;
        let b = (2.0 * (y as f32 + 0.5) / size as f32) - 1.0;
        let (forward, right, up) = self.basis();
        (forward + right * a - up * b).normalize()
    }
}
