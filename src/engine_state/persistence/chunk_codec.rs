//! Binary chunk files.
//!
//! Layout, all integers little-endian:
//!
//! | bytes | field |
//! |-------|-------|
//! | 4 | magic `0x43484E4B` (`CHNK`) |
//! | 4 | version |
//! | 4 | cx |
//! | 4 | cz |
//! | ... | payload |
//!
//! Version 1 stores the `16 * 256 * 16` block ids raw, in storage order
//! (`x`-major, then `z`, `y` innermost). Version 2 stores the block ids as
//! runs followed by the water levels as runs, each run a `u16` length and a
//! `u8` value. Writers emit version 2; readers accept both.

use crate::engine_state::{
    error::PersistenceError,
    voxels::chunk::{Chunk, ChunkPos, CHUNK_VOLUME},
};

/// `CHNK` read as a little-endian `u32`.
pub const CHUNK_MAGIC: u32 = 0x4348_4E4B;
/// Raw block ids.
pub const VERSION_RAW: u32 = 1;
/// Run-length encoded block ids and water levels.
pub const VERSION_RLE: u32 = 2;

const HEADER_LEN: usize = 16;

fn write_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u32_le(data: &[u8], cursor: &mut usize) -> Option<u32> {
    let bytes = data.get(*cursor..*cursor + 4)?;
    *cursor += 4;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Some(u32::from_le_bytes(buf))
}

fn write_header(out: &mut Vec<u8>, version: u32, position: ChunkPos) {
    write_u32_le(out, CHUNK_MAGIC);
    write_u32_le(out, version);
    write_u32_le(out, position.x as u32);
    write_u32_le(out, position.z as u32);
}

/// Encodes a chunk in the raw version 1 layout.
pub fn encode_raw(chunk: &Chunk) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + CHUNK_VOLUME);
    write_header(&mut out, VERSION_RAW, chunk.position);
    out.extend(chunk.blocks().iter().map(|block| block.id()));
    out
}

/// Encodes a chunk in the run-length version 2 layout.
pub fn encode_rle(chunk: &Chunk) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 4096);
    write_header(&mut out, VERSION_RLE, chunk.position);
    write_runs(&mut out, chunk.blocks().iter().map(|block| block.id()));
    write_runs(&mut out, (0..CHUNK_VOLUME).map(|index| chunk.water_level_at_index(index)));
    out
}

fn write_runs(out: &mut Vec<u8>, values: impl Iterator<Item = u8>) {
    let mut run: Option<(u8, u16)> = None;
    for value in values {
        run = match run {
            Some((current, length)) if current == value && length < u16::MAX => {
                Some((current, length + 1))
            }
            Some((current, length)) => {
                push_run(out, current, length);
                Some((value, 1))
            }
            None => Some((value, 1)),
        };
    }
    if let Some((value, length)) = run {
        push_run(out, value, length);
    }
}

fn push_run(out: &mut Vec<u8>, value: u8, length: u16) {
    out.extend_from_slice(&length.to_le_bytes());
    out.push(value);
}

fn read_runs(data: &[u8], cursor: &mut usize) -> Result<Vec<u8>, PersistenceError> {
    let mut values = Vec::with_capacity(CHUNK_VOLUME);
    while values.len() < CHUNK_VOLUME {
        let Some(run) = data.get(*cursor..*cursor + 3) else {
            return Err(PersistenceError::SizeMismatch {
                expected: CHUNK_VOLUME,
                found: values.len(),
            });
        };
        *cursor += 3;
        let length = u16::from_le_bytes([run[0], run[1]]) as usize;
        if length == 0 || values.len() + length > CHUNK_VOLUME {
            return Err(PersistenceError::SizeMismatch {
                expected: CHUNK_VOLUME,
                found: values.len() + length,
            });
        }
        values.resize(values.len() + length, run[2]);
    }
    Ok(values)
}

/// Decodes a chunk file that is expected to hold `position`.
///
/// # Errors
/// Bad magic, unknown version, wrong payload size, a header position other
/// than `position`, or an unknown block id.
pub fn decode(data: &[u8], position: ChunkPos) -> Result<Chunk, PersistenceError> {
    let mut cursor = 0;
    let header_error = || PersistenceError::SizeMismatch {
        expected: HEADER_LEN,
        found: data.len(),
    };
    let magic = read_u32_le(data, &mut cursor).ok_or_else(header_error)?;
    if magic != CHUNK_MAGIC {
        return Err(PersistenceError::BadMagic(magic));
    }
    let version = read_u32_le(data, &mut cursor).ok_or_else(header_error)?;
    let cx = read_u32_le(data, &mut cursor).ok_or_else(header_error)? as i32;
    let cz = read_u32_le(data, &mut cursor).ok_or_else(header_error)? as i32;
    if (cx, cz) != (position.x, position.z) {
        return Err(PersistenceError::PositionMismatch {
            expected: (position.x, position.z),
            found: (cx, cz),
        });
    }

    let (ids, water) = match version {
        VERSION_RAW => {
            let payload = &data[cursor..];
            if payload.len() != CHUNK_VOLUME {
                return Err(PersistenceError::SizeMismatch {
                    expected: CHUNK_VOLUME,
                    found: payload.len(),
                });
            }
            (payload.to_vec(), None)
        }
        VERSION_RLE => {
            let ids = read_runs(data, &mut cursor)?;
            let water = read_runs(data, &mut cursor)?;
            if cursor != data.len() {
                return Err(PersistenceError::SizeMismatch {
                    expected: cursor,
                    found: data.len(),
                });
            }
            (ids, Some(water))
        }
        other => return Err(PersistenceError::UnsupportedVersion(other)),
    };

    Chunk::from_block_ids(position, &ids, water.as_deref()).ok_or(PersistenceError::UnknownBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    fn sample() -> Chunk {
        let mut chunk = Chunk::empty(ChunkPos::new(-7, 12));
        for x in 0..16 {
            for z in 0..16 {
                for y in 0..40 {
                    chunk.set_block(x, y, z, BlockType::Stone);
                }
            }
        }
        chunk.set_block(0, 0, 0, BlockType::Bedrock);
        chunk.set_block(5, 41, 5, BlockType::Water);
        chunk.set_water_level(6, 41, 5, 3);
        chunk
    }

    #[test]
    fn raw_layout_is_bit_exact() {
        let chunk = sample();
        let bytes = encode_raw(&chunk);
        assert_eq!(&bytes[0..4], &[0x4B, 0x4E, 0x48, 0x43]);
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-7i32).to_le_bytes());
        assert_eq!(&bytes[12..16], &12i32.to_le_bytes());
        assert_eq!(bytes.len(), 16 + 65536);
        assert_eq!(bytes[16 + Chunk::index(0, 0, 0)], BlockType::Bedrock.id());
        assert_eq!(bytes[16 + Chunk::index(0, 1, 0)], BlockType::Stone.id());

        let decoded = decode(&bytes, chunk.position).unwrap();
        assert_eq!(decoded.blocks(), chunk.blocks());
        // Version 1 has no water levels, so every water cell is a source.
        assert_eq!(decoded.get_water_level(6, 41, 5), 8);
    }

    #[test]
    fn rle_keeps_blocks_and_water_levels() {
        let chunk = sample();
        let bytes = encode_rle(&chunk);
        assert!(bytes.len() < 4096);
        let decoded = decode(&bytes, chunk.position).unwrap();
        assert_eq!(decoded.blocks(), chunk.blocks());
        assert_eq!(decoded.get_water_level(5, 41, 5), 8);
        assert_eq!(decoded.get_water_level(6, 41, 5), 3);
        assert!(!decoded.modified);
    }

    #[test]
    fn malformed_files_are_rejected() {
        let chunk = sample();
        let position = chunk.position;
        let mut bytes = encode_rle(&chunk);

        assert!(matches!(decode(&bytes[..10], position), Err(PersistenceError::SizeMismatch { .. })));
        assert!(matches!(
            decode(&bytes, ChunkPos::new(0, 0)),
            Err(PersistenceError::PositionMismatch { .. })
        ));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 3], position),
            Err(PersistenceError::SizeMismatch { .. })
        ));

        bytes[4] = 9;
        assert!(matches!(decode(&bytes, position), Err(PersistenceError::UnsupportedVersion(9))));
        bytes[0] = 0;
        assert!(matches!(decode(&bytes, position), Err(PersistenceError::BadMagic(_))));

        let mut raw = encode_raw(&chunk);
        raw[16] = 250;
        assert!(matches!(decode(&raw, position), Err(PersistenceError::UnknownBlock)));
    }
}
