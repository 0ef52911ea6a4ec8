//! Observer body physics.
//!
//! The observer is an axis-aligned box resolved against the voxel grid one
//! axis at a time: the box is moved along X, then Y, then Z, and after each
//! move every solid voxel it overlaps is found. On contact the velocity
//! along that axis is zeroed and the box snaps flush to the contact plane.
//! Long frames are split into sub-steps so a fast fall cannot tunnel
//! through a one-block floor.

use cgmath::{Point3, Vector3, Zero};

use super::{block::block_type::BlockType, world::World};

/// Box width along X and Z.
pub const PLAYER_WIDTH: f32 = 0.6;
/// Box height.
pub const PLAYER_HEIGHT: f32 = 1.8;
/// Camera height above the feet.
pub const EYE_HEIGHT: f32 = 1.62;
/// Downward acceleration in blocks/s².
pub const GRAVITY: f32 = 28.0;
/// Fastest fall speed in blocks/s.
pub const TERMINAL_VELOCITY: f32 = 78.0;
/// Fraction of gravity still felt while submerged.
pub const WATER_GRAVITY_SCALE: f32 = 0.25;
/// Fall speed cap while submerged.
pub const WATER_TERMINAL_VELOCITY: f32 = 4.0;
/// Upward speed while holding jump in water.
pub const SWIM_UP_VELOCITY: f32 = 4.0;
/// Take-off speed of a jump from the ground.
pub const JUMP_VELOCITY: f32 = 8.5;
/// Walking speed.
pub const WALK_SPEED: f32 = 5.5;
/// Flying speed.
pub const FLY_SPEED: f32 = 15.0;

const CONTACT_EPSILON: f32 = 1e-3;
const MAX_STEP_DISTANCE: f32 = 0.45;

/// Movement intent for one step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MovementInput {
    /// Desired horizontal direction in world space; normalised internally.
    pub horizontal: Vector3<f32>,
    /// Jump, swim up, or ascend when flying.
    pub jump: bool,
    /// Descend when flying.
    pub sneak: bool,
}

impl Default for MovementInput {
    fn default() -> Self {
        MovementInput {
            horizontal: Vector3::zero(),
            jump: false,
            sneak: false,
        }
    }
}

/// The single observer entity.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlayerBody {
    /// Feet position; the box is centred on X and Z.
    pub position: Point3<f32>,
    /// Current velocity in blocks/s.
    pub velocity: Vector3<f32>,
    /// Horizontal look angle in radians.
    pub yaw: f32,
    /// Vertical look angle in radians.
    pub pitch: f32,
    /// Fly mode ignores gravity and collision.
    pub flying: bool,
    /// Resting on a solid block after the last step.
    pub on_ground: bool,
    /// Box overlapped water after the last step.
    pub in_water: bool,
}

impl PlayerBody {
    /// A body standing at `position`.
    pub fn new(position: Point3<f32>) -> Self {
        PlayerBody {
            position,
            velocity: Vector3::new(0.0, 0.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            flying: false,
            on_ground: false,
            in_water: false,
        }
    }

    /// Camera position.
    pub fn eye_position(&self) -> Point3<f32> {
        Point3::new(self.position.x, self.position.y + EYE_HEIGHT, self.position.z)
    }

    /// Unit look vector from yaw and pitch.
    pub fn forward(&self) -> Vector3<f32> {
        Vector3::new(
            -self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        )
    }

    /// Advances the body by `dt` seconds.
    pub fn step(&mut self, world: &World, input: &MovementInput, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let speed = if self.flying { FLY_SPEED } else { WALK_SPEED };
        let mut horizontal = Vector3::new(input.horizontal.x, 0.0, input.horizontal.z);
        let length = (horizontal.x * horizontal.x + horizontal.z * horizontal.z).sqrt();
        if length > 1e-3 {
            horizontal = horizontal * (speed / length);
        } else {
            horizontal = Vector3::new(0.0, 0.0, 0.0);
        }
        self.velocity.x = horizontal.x;
        self.velocity.z = horizontal.z;

        if self.flying {
            self.velocity.y = match (input.jump, input.sneak) {
                (true, false) => speed,
                (false, true) => -speed,
                _ => 0.0,
            };
            self.position += self.velocity * dt;
            self.on_ground = false;
            self.in_water = self.overlaps(world, self.position, |block| block == BlockType::Water);
            return;
        }

        self.in_water = self.overlaps(world, self.position, |block| block == BlockType::Water);
        if self.in_water {
            self.velocity.y -= GRAVITY * WATER_GRAVITY_SCALE * dt;
            if input.jump {
                self.velocity.y = SWIM_UP_VELOCITY;
            }
            self.velocity.y = self.velocity.y.max(-WATER_TERMINAL_VELOCITY);
        } else {
            self.velocity.y -= GRAVITY * dt;
            if input.jump && self.on_ground {
                self.velocity.y = JUMP_VELOCITY;
            }
            self.velocity.y = self.velocity.y.max(-TERMINAL_VELOCITY);
        }

        let travel = self.velocity * dt;
        let longest = travel.x.abs().max(travel.y.abs()).max(travel.z.abs());
        let steps = (longest / MAX_STEP_DISTANCE).ceil().max(1.0) as u32;
        let sub_dt = dt / steps as f32;

        self.on_ground = false;
        for _ in 0..steps {
            self.move_axis(world, 0, self.velocity.x * sub_dt);
            self.move_axis(world, 1, self.velocity.y * sub_dt);
            self.move_axis(world, 2, self.velocity.z * sub_dt);
        }
    }

    fn move_axis(&mut self, world: &World, axis: usize, delta: f32) {
        if delta == 0.0 {
            return;
        }
        let mut target = self.position;
        target[axis] += delta;

        let Some(contact) = self.blocking_plane(world, target, axis, delta > 0.0) else {
            self.position = target;
            return;
        };

        let half = PLAYER_WIDTH / 2.0;
        self.position[axis] = match (axis, delta > 0.0) {
            (1, true) => contact - PLAYER_HEIGHT - CONTACT_EPSILON,
            (1, false) => contact + CONTACT_EPSILON,
            (_, true) => contact - half - CONTACT_EPSILON,
            (_, false) => contact + half + CONTACT_EPSILON,
        };
        if axis == 1 && delta < 0.0 {
            self.on_ground = true;
        }
        self.velocity[axis] = 0.0;
    }

    /// Voxel range covered by the box with its feet at `position`.
    fn cell_bounds(position: Point3<f32>) -> (Point3<i32>, Point3<i32>) {
        let half = PLAYER_WIDTH / 2.0;
        (
            Point3::new(
                (position.x - half).floor() as i32,
                position.y.floor() as i32,
                (position.z - half).floor() as i32,
            ),
            Point3::new(
                (position.x + half).floor() as i32,
                (position.y + PLAYER_HEIGHT).floor() as i32,
                (position.z + half).floor() as i32,
            ),
        )
    }

    fn overlaps<F: Fn(BlockType) -> bool>(&self, world: &World, position: Point3<f32>, test: F) -> bool {
        let (min, max) = Self::cell_bounds(position);
        (min.x..=max.x).any(|x| {
            (min.y..=max.y).any(|y| (min.z..=max.z).any(|z| test(world.get_block(x, y, z))))
        })
    }

    /// The nearest plane of a solid voxel the box at `position` overlaps,
    /// facing against the direction of travel along `axis`.
    fn blocking_plane(&self, world: &World, position: Point3<f32>, axis: usize, positive: bool) -> Option<f32> {
        let (min, max) = Self::cell_bounds(position);
        let mut plane: Option<f32> = None;
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    if !world.get_block(x, y, z).is_solid() {
                        continue;
                    }
                    let cell = [x, y, z][axis] as f32;
                    let candidate = if positive { cell } else { cell + 1.0 };
                    plane = Some(match plane {
                        Some(best) if positive => best.min(candidate),
                        Some(best) => best.max(candidate),
                        None => candidate,
                    });
                }
            }
        }
        plane
    }
}
