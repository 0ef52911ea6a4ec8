//! Voxel ray walker.
//!
//! A 3D DDA: the ray keeps, per axis, the parameter `t_max` at which it
//! next crosses a voxel boundary and the step `t_delta` between crossings.
//! Each iteration advances along the axis with the smallest `t_max`,
//! remembering which face it crossed, until a voxel satisfies the caller's
//! predicate or the maximum distance runs out.

use cgmath::{InnerSpace, Point3, Vector3};

use super::{block::block_type::BlockType, world::World};

/// A voxel the ray stopped in.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RaycastHit {
    /// World coordinate of the hit voxel.
    pub voxel: Point3<i32>,
    /// Outward normal of the face the ray entered through.
    pub normal: Vector3<i32>,
    /// Distance along the normalised ray.
    pub distance: f32,
    /// Point where the ray entered the voxel.
    pub point: Point3<f32>,
    /// Block found in the voxel.
    pub block: BlockType,
}

impl RaycastHit {
    /// The cell a block placed against the hit face lands in.
    pub fn place_position(&self) -> Point3<i32> {
        self.voxel + self.normal
    }
}

/// Longest walk any ray takes, whatever distance is asked for.
pub const MAX_RAY_DISTANCE: f32 = 1024.0;

/// Solid blocks are what the player can point at.
pub fn solid(block: BlockType) -> bool {
    block.is_solid()
}

/// Walks a ray through `world` and returns the first voxel accepted by
/// `predicate`.
///
/// A ray that starts inside an accepted voxel hits it at distance zero; the
/// reported normal then faces back along the dominant axis of `direction`,
/// with ties going to X, then Y, then Z.
pub fn raycast<F>(
    world: &World,
    origin: Point3<f32>,
    direction: Vector3<f32>,
    max_distance: f32,
    predicate: F,
) -> Option<RaycastHit>
where
    F: Fn(BlockType) -> bool,
{
    let finite = origin.x.is_finite()
        && origin.y.is_finite()
        && origin.z.is_finite()
        && direction.x.is_finite()
        && direction.y.is_finite()
        && direction.z.is_finite();
    if !finite || direction.magnitude2() <= f32::EPSILON || max_distance.is_nan() || max_distance < 0.0 {
        return None;
    }
    let direction = direction.normalize();
    let max_distance = max_distance.min(MAX_RAY_DISTANCE);

    let mut voxel = Point3::new(
        origin.x.floor() as i32,
        origin.y.floor() as i32,
        origin.z.floor() as i32,
    );

    let start = world.get_block(voxel.x, voxel.y, voxel.z);
    if predicate(start) {
        return Some(RaycastHit {
            voxel,
            normal: facing_back(direction),
            distance: 0.0,
            point: origin,
            block: start,
        });
    }

    let step = Vector3::new(
        direction.x.signum() as i32,
        direction.y.signum() as i32,
        direction.z.signum() as i32,
    );
    let t_delta = Vector3::new(
        inverse_abs(direction.x),
        inverse_abs(direction.y),
        inverse_abs(direction.z),
    );
    let mut t_max = Vector3::new(
        first_crossing(origin.x, direction.x, voxel.x),
        first_crossing(origin.y, direction.y, voxel.y),
        first_crossing(origin.z, direction.z, voxel.z),
    );

    loop {
        let (distance, normal) = if t_max.x <= t_max.y && t_max.x <= t_max.z {
            voxel.x += step.x;
            let t = t_max.x;
            t_max.x += t_delta.x;
            (t, Vector3::new(-step.x, 0, 0))
        } else if t_max.y <= t_max.z {
            voxel.y += step.y;
            let t = t_max.y;
            t_max.y += t_delta.y;
            (t, Vector3::new(0, -step.y, 0))
        } else {
            voxel.z += step.z;
            let t = t_max.z;
            t_max.z += t_delta.z;
            (t, Vector3::new(0, 0, -step.z))
        };

        if distance > max_distance {
            return None;
        }

        let block = world.get_block(voxel.x, voxel.y, voxel.z);
        if predicate(block) {
            return Some(RaycastHit {
                voxel,
                normal,
                distance,
                point: origin + direction * distance,
                block,
            });
        }
    }
}

fn inverse_abs(component: f32) -> f32 {
    if component == 0.0 {
        f32::INFINITY
    } else {
        1.0 / component.abs()
    }
}

fn first_crossing(origin: f32, direction: f32, voxel: i32) -> f32 {
    if direction > 0.0 {
        (voxel as f32 + 1.0 - origin) / direction
    } else if direction < 0.0 {
        (origin - voxel as f32) / -direction
    } else {
        f32::INFINITY
    }
}

/// Unit normal opposing the dominant axis of `direction`.
fn facing_back(direction: Vector3<f32>) -> Vector3<i32> {
    let (ax, ay, az) = (direction.x.abs(), direction.y.abs(), direction.z.abs());
    if ax >= ay && ax >= az {
        Vector3::new(-direction.x.signum() as i32, 0, 0)
    } else if ay >= az {
        Vector3::new(0, -direction.y.signum() as i32, 0)
    } else {
        Vector3::new(0, 0, -direction.z.signum() as i32)
    }
}
