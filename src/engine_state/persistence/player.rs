//! `player.dat`: five little-endian `f32` (x, y, z, yaw, pitch) then a `u8`
//! flying flag.

use cgmath::Point3;

use crate::engine_state::error::PersistenceError;

/// Length of a player file in bytes.
pub const PLAYER_FILE_LEN: usize = 21;

/// The observer state that survives a relaunch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlayerState {
    /// Feet position.
    pub position: Point3<f32>,
    /// Heading in radians.
    pub yaw: f32,
    /// Elevation in radians.
    pub pitch: f32,
    /// Fly mode.
    pub flying: bool,
}

impl PlayerState {
    /// Encodes the state as a player file.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PLAYER_FILE_LEN);
        for value in [
            self.position.x,
            self.position.y,
            self.position.z,
            self.yaw,
            self.pitch,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.push(self.flying as u8);
        out
    }

    /// Decodes a player file.
    ///
    /// # Errors
    /// [`PersistenceError::CorruptPlayer`] unless the file is exactly
    /// [`PLAYER_FILE_LEN`] bytes.
    pub fn decode(data: &[u8]) -> Result<Self, PersistenceError> {
        if data.len() != PLAYER_FILE_LEN {
            return Err(PersistenceError::CorruptPlayer(data.len()));
        }
        let float = |index: usize| {
            let start = index * 4;
            f32::from_le_bytes([data[start], data[start + 1], data[start + 2], data[start + 3]])
        };
        Ok(PlayerState {
            position: Point3::new(float(0), float(1), float(2)),
            yaw: float(3),
            pitch: float(4),
            flying: data[20] != 0,
        })
    }
}
