//! # Camera
//!
//! View and projection matrices for a first-person observer. The world only
//! needs the product of the two, to extract the culling frustum.

use cgmath::*;
use std::f32::consts::FRAC_PI_2;

use super::voxels::physics::PlayerBody;

/// Transformation matrix to convert from OpenGL's coordinate system to WGPU's.
///
/// Scales Z from [-1, 1] to [-0.5, 0.5], then translates it to [0, 1].
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// A first-person camera.
///
/// Yaw 0 looks along +Z, a quarter turn of yaw looks along -X; positive
/// pitch looks up. This matches the observer body.
#[derive(Copy, Clone, Debug)]
pub struct Camera {
    /// Eye position in world space
    pub position: Point3<f32>,
    /// Horizontal rotation around Y
    pub yaw: Rad<f32>,
    /// Vertical rotation, clamped short of straight up or down
    pub pitch: Rad<f32>,
}

impl From<&PlayerBody> for Camera {
    fn from(body: &PlayerBody) -> Self {
        Camera::new(body.eye_position(), Rad(body.yaw), Rad(body.pitch))
    }
}

impl Camera {
    /// Creates a camera, clamping the pitch.
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        let pitch = pitch.into();
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: Rad(pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2)),
        }
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(-yaw_sin * pitch_cos, pitch_sin, yaw_cos * pitch_cos).normalize()
    }

    /// Calculates the view matrix for this camera.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }
}

/// Perspective projection settings.
#[derive(Copy, Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    /// Creates a projection for a `width` by `height` viewport.
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        let mut projection = Self {
            aspect: 1.0,
            fovy: fovy.into(),
            znear,
            zfar,
        };
        projection.resize(width, height);
        projection
    }

    /// Updates the aspect ratio for a resized viewport.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// Calculates the projection matrix, in WGPU clip space.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    /// Projection times view: the matrix the culler consumes.
    pub fn view_projection(&self, camera: &Camera) -> Matrix4<f32> {
        self.calc_matrix() * camera.calc_matrix()
    }
}
