use crate::coefficients::ShCoefficientBuffer;
use crate::direction::{texel_center_uv, texel_direction, uniform_texel_solid_angle, RowOrigin};
use crate::sh::{sh_basis, SH_BAND_COUNT, SH_CONVOLUTION};
use crate::texture::FaceTexture;
use glam::{Mat4, UVec2, Vec3};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

pub const GROUP_WIDTH: u32 = 16;
pub const GROUP_HEIGHT: u32 = 16;
pub const GROUP_LANES: usize = (GROUP_WIDTH * GROUP_HEIGHT) as usize;

/// Number of groups to launch for a `width` x `height` face: `ceil(W/16) x ceil(H/16)`.
pub fn group_count(width: u32, height: u32) -> UVec2 {
    UVec2::new(width.div_ceil(GROUP_WIDTH), height.div_ceil(GROUP_HEIGHT))
}

/// Inputs bound for one face dispatch.
#[derive(Clone, Copy, Debug)]
pub struct FaceDispatch<'a> {
    pub texture: &'a FaceTexture,
    pub inv_view_proj: Mat4,
    pub width: u32,
    pub height: u32,
}

impl<'a> FaceDispatch<'a> {
    /// Dispatch over the whole texture.
    pub fn new(texture: &'a FaceTexture, inv_view_proj: Mat4) -> Self {
        Self { texture, inv_view_proj, width: texture.width(), height: texture.height() }
    }

    pub fn extent(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn groups(&self) -> UVec2 {
        group_count(self.width, self.height)
    }
}

/// Weighted contribution of one texel to every band, before convolution.
///
/// Texels outside the dispatch extent contribute nothing.
pub fn texel_contribution(
    texel: UVec2,
    dispatch: &FaceDispatch<'_>,
    row_origin: RowOrigin,
) -> Option<[Vec3; SH_BAND_COUNT]> {
    let extent = dispatch.extent();
    let dir = texel_direction(texel, extent, &dispatch.inv_view_proj, row_origin)?;
    let color = dispatch.texture.sample(texel_center_uv(texel, extent));
    let weight = uniform_texel_solid_angle(dispatch.width, dispatch.height);
    let basis = sh_basis(dir);
    Some(basis.map(|b| color * b * weight))
}

/// Per-group scratch shaped `[band][lane_x][lane_y]`.
pub struct GroupLocalAccumulator {
    values: Box<[[[Vec3; GROUP_HEIGHT as usize]; GROUP_WIDTH as usize]; SH_BAND_COUNT]>,
}

impl GroupLocalAccumulator {
    pub fn new() -> Self {
        Self { values: Box::new([[[Vec3::ZERO; GROUP_HEIGHT as usize]; GROUP_WIDTH as usize]; SH_BAND_COUNT]) }
    }

    pub fn clear(&mut self) {
        for band in self.values.iter_mut() {
            for column in band.iter_mut() {
                column.fill(Vec3::ZERO);
            }
        }
    }

    pub fn write(&mut self, lane: UVec2, band: usize, value: Vec3) {
        self.values[band][lane.x as usize][lane.y as usize] = value;
    }

    /// Sum of every lane's entry for `band`.
    pub fn reduce(&self, band: usize) -> Vec3 {
        let mut sum = Vec3::ZERO;
        for column in &self.values[band] {
            for value in column {
                sum += *value;
            }
        }
        sum
    }
}

impl Default for GroupLocalAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// CPU execution of the accumulation kernel.
///
/// A group runs in two phases: every lane writes its contribution into the group-local
/// accumulator, then lane 0 reduces and merges. The phase boundary is the group barrier.
/// Groups are independent and are spread over worker threads in no particular order.
#[derive(Clone, Copy, Debug)]
pub struct CpuShKernel {
    worker_threads: usize,
    row_origin: RowOrigin,
}

impl CpuShKernel {
    pub fn new(worker_threads: usize, row_origin: RowOrigin) -> Self {
        Self { worker_threads: worker_threads.max(1), row_origin }
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn row_origin(&self) -> RowOrigin {
        self.row_origin
    }

    pub fn dispatch(&self, dispatch: &FaceDispatch<'_>, buffer: &ShCoefficientBuffer) {
        let groups = dispatch.groups();
        let total = (groups.x as usize) * (groups.y as usize);
        let workers = self.worker_threads.min(total);
        log::debug!(
            "[sh] dispatching {}x{} groups for a {}x{} face on {} worker(s)",
            groups.x,
            groups.y,
            dispatch.width,
            dispatch.height,
            workers
        );
        if workers <= 1 {
            let mut local = GroupLocalAccumulator::new();
            for index in 0..total {
                self.run_group(group_id(index, groups), dispatch, &mut local, buffer);
            }
            return;
        }
        let cursor = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut local = GroupLocalAccumulator::new();
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= total {
                            break;
                        }
                        self.run_group(group_id(index, groups), dispatch, &mut local, buffer);
                    }
                });
            }
        });
    }

    pub fn run_group(
        &self,
        group: UVec2,
        dispatch: &FaceDispatch<'_>,
        local: &mut GroupLocalAccumulator,
        buffer: &ShCoefficientBuffer,
    ) {
        local.clear();
        let origin = group * UVec2::new(GROUP_WIDTH, GROUP_HEIGHT);
        for lane_y in 0..GROUP_HEIGHT {
            for lane_x in 0..GROUP_WIDTH {
                let lane = UVec2::new(lane_x, lane_y);
                let Some(contribution) = texel_contribution(origin + lane, dispatch, self.row_origin) else {
                    continue;
                };
                for (band, value) in contribution.into_iter().enumerate() {
                    local.write(lane, band, value);
                }
            }
        }
        // barrier: all lane writes are visible from here on; only lane 0 continues.
        merge_group(local, buffer);
    }
}

impl Default for CpuShKernel {
    fn default() -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(workers, RowOrigin::default())
    }
}

fn group_id(index: usize, groups: UVec2) -> UVec2 {
    let columns = groups.x as usize;
    UVec2::new((index % columns) as u32, (index / columns) as u32)
}

/// Lane 0's serial reduction: per band, sum the group, apply the convolution constant
/// and merge into the shared buffer.
fn merge_group(local: &GroupLocalAccumulator, buffer: &ShCoefficientBuffer) {
    for band in 0..SH_BAND_COUNT {
        let coeff = local.reduce(band) * SH_CONVOLUTION[band];
        buffer.accumulate_band(band, coeff);
        buffer.clear_padding(band);
    }
}
