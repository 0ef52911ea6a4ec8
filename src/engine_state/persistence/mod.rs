//! # Persistence
//!
//! On-disk layout of one world:
//!
//! ```text
//! saves/<world>/world.meta
//! saves/<world>/player.dat
//! saves/<world>/region/c.<cx>.<cz>.chunk
//! ```
//!
//! Files are written to a temporary sibling first and renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use super::{error::PersistenceError, voxels::chunk::{Chunk, ChunkPos}};

pub mod chunk_codec;
pub mod metadata;
pub mod player;

pub use metadata::WorldMetadata;
pub use player::PlayerState;

/// Paths and file access for one world's save directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveDirectory {
    root: PathBuf,
}

impl SaveDirectory {
    /// Wraps an existing or future world directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SaveDirectory { root: root.into() }
    }

    /// `saves_root/<world_name>`.
    pub fn in_saves(saves_root: &Path, world_name: &str) -> Self {
        Self::new(saves_root.join(world_name))
    }

    /// The world directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `world.meta`.
    pub fn meta_path(&self) -> PathBuf {
        self.root.join("world.meta")
    }

    /// `player.dat`.
    pub fn player_path(&self) -> PathBuf {
        self.root.join("player.dat")
    }

    /// `region/`.
    pub fn region_dir(&self) -> PathBuf {
        self.root.join("region")
    }

    /// `region/c.<cx>.<cz>.chunk`.
    pub fn chunk_path(&self, position: ChunkPos) -> PathBuf {
        self.region_dir()
            .join(format!("c.{}.{}.chunk", position.x, position.z))
    }

    /// True if the directory holds a world.
    pub fn exists(&self) -> bool {
        self.meta_path().is_file()
    }

    /// Creates the world and region directories.
    pub fn create_dirs(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(self.region_dir())?;
        Ok(())
    }

    /// Reads a saved chunk.
    ///
    /// # Returns
    /// `Ok(None)` if the chunk was never saved.
    pub fn read_chunk(&self, position: ChunkPos) -> Result<Option<Chunk>, PersistenceError> {
        match fs::read(self.chunk_path(position)) {
            Ok(bytes) => chunk_codec::decode(&bytes, position).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a chunk file in the current encoding.
    pub fn write_chunk(&self, chunk: &Chunk) -> Result<(), PersistenceError> {
        write_atomically(
            &self.chunk_path(chunk.position),
            &chunk_codec::encode_rle(chunk),
        )?;
        debug!("Saved chunk {:?}", chunk.position);
        Ok(())
    }

    /// Reads `world.meta`.
    pub fn read_metadata(&self) -> Result<WorldMetadata, PersistenceError> {
        let text = fs::read_to_string(self.meta_path())?;
        WorldMetadata::parse(&text)
    }

    /// Writes `world.meta`.
    pub fn write_metadata(&self, metadata: &WorldMetadata) -> Result<(), PersistenceError> {
        write_atomically(&self.meta_path(), metadata.to_text().as_bytes())
    }

    /// Reads `player.dat`, `Ok(None)` if there is none.
    pub fn read_player(&self) -> Result<Option<PlayerState>, PersistenceError> {
        match fs::read(self.player_path()) {
            Ok(bytes) => PlayerState::decode(&bytes).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes `player.dat`.
    pub fn write_player(&self, player: &PlayerState) -> Result<(), PersistenceError> {
        write_atomically(&self.player_path(), &player.encode())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::{config::GenerationType, voxels::block::block_type::BlockType};

    fn scratch(name: &str) -> SaveDirectory {
        let root = std::env::temp_dir().join(format!("voxel-world-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        SaveDirectory::new(root)
    }

    #[test]
    fn directory_round_trip() {
        let saves = scratch("persistence");
        saves.create_dirs().unwrap();
        assert!(!saves.exists());
        assert!(saves.read_chunk(ChunkPos::new(1, 2)).unwrap().is_none());
        assert_eq!(saves.read_player().unwrap(), None);
        assert!(saves.chunk_path(ChunkPos::new(-1, 2)).ends_with("region/c.-1.2.chunk"));

        let mut chunk = Chunk::empty(ChunkPos::new(1, 2));
        chunk.set_block(3, 4, 5, BlockType::Planks);
        saves.write_chunk(&chunk).unwrap();
        let loaded = saves.read_chunk(ChunkPos::new(1, 2)).unwrap().unwrap();
        assert_eq!(loaded.blocks(), chunk.blocks());

        let metadata = WorldMetadata {
            name: "round trip".to_string(),
            seed: 9,
            generation_type: GenerationType::Standard,
            max_height: 256,
            last_played: metadata::now_epoch_seconds(),
            custom_equation: None,
            sea_level: Some(62),
        };
        saves.write_metadata(&metadata).unwrap();
        assert!(saves.exists());
        assert_eq!(saves.read_metadata().unwrap(), metadata);

        let player = PlayerState {
            position: Point3::new(1.0, 2.0, 3.0),
            yaw: 0.5,
            pitch: 0.25,
            flying: false,
        };
        saves.write_player(&player).unwrap();
        assert_eq!(saves.read_player().unwrap(), Some(player));

        let _ = fs::remove_dir_all(saves.root());
    }
}
