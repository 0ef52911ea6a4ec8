//! # Error Types
//!
//! Failure kinds surfaced by the world core. Only world-open failures travel
//! up to the UI layer; everything else is handled where it happens (a
//! malformed chunk file is regenerated, a failed upload is re-meshed).

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

/// A custom terrain equation failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationError {
    /// Byte offset of the offending token in the source text.
    pub position: usize,
    /// The offending token as written, or `end of input`.
    pub token: String,
    /// What the parser expected instead.
    pub expected: String,
}

impl Display for EquationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid equation at column {} near '{}': expected {}",
            self.position + 1,
            self.token,
            self.expected
        )
    }
}

impl Error for EquationError {}

/// A configuration option is out of range or inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An integer or float option fell outside its documented range.
    OutOfRange {
        /// Option name as it appears in the config file.
        option: &'static str,
        /// Offending value, formatted.
        value: String,
        /// Human readable accepted range.
        range: &'static str,
    },
    /// `generation_type = custom-equation` without an equation.
    MissingEquation,
    /// The custom equation did not parse.
    Equation(EquationError),
    /// The config file was not valid JSON for `WorldConfig`.
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::OutOfRange {
                option,
                value,
                range,
            } => write!(f, "Option {} = {} is outside {}", option, value, range),
            ConfigError::MissingEquation => {
                write!(f, "Generation type custom-equation needs a custom_equation")
            }
            ConfigError::Equation(err) => write!(f, "{}", err),
            ConfigError::Parse(message) => write!(f, "Unreadable config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Equation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EquationError> for ConfigError {
    fn from(err: EquationError) -> Self {
        ConfigError::Equation(err)
    }
}

/// Reading or writing save files failed.
#[derive(Debug)]
pub enum PersistenceError {
    /// Underlying filesystem error.
    Io(io::Error),
    /// A chunk file did not start with `CHNK`.
    BadMagic(u32),
    /// A chunk file used an encoding this build cannot read.
    UnsupportedVersion(u32),
    /// A chunk file's payload had the wrong length.
    SizeMismatch {
        /// Bytes or cells expected.
        expected: usize,
        /// Bytes or cells found.
        found: usize,
    },
    /// A chunk file belongs to a different chunk than its file name says.
    PositionMismatch {
        /// Position taken from the file name.
        expected: (i32, i32),
        /// Position stored in the header.
        found: (i32, i32),
    },
    /// A chunk file holds a block id this build does not know.
    UnknownBlock,
    /// `world.meta` is missing a key or holds an unparsable value.
    CorruptMetadata {
        /// One-based line number, `0` for a missing key.
        line: usize,
        /// What was wrong.
        reason: String,
    },
    /// `player.dat` has the wrong length.
    CorruptPlayer(usize),
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(err) => write!(f, "I/O error: {}", err),
            PersistenceError::BadMagic(magic) => {
                write!(f, "Bad chunk magic: {:#010x}", magic)
            }
            PersistenceError::UnsupportedVersion(version) => {
                write!(f, "Unsupported chunk version: {}", version)
            }
            PersistenceError::SizeMismatch { expected, found } => {
                write!(f, "Chunk size mismatch: expected {}, found {}", expected, found)
            }
            PersistenceError::PositionMismatch { expected, found } => write!(
                f,
                "Chunk file for {:?} holds chunk {:?}",
                expected, found
            ),
            PersistenceError::UnknownBlock => write!(f, "Chunk file holds an unknown block id"),
            PersistenceError::CorruptMetadata { line, reason } => {
                write!(f, "Corrupt world metadata (line {}): {}", line, reason)
            }
            PersistenceError::CorruptPlayer(len) => {
                write!(f, "Corrupt player file: {} bytes", len)
            }
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PersistenceError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistenceError {
    fn from(err: io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

/// A world could not be created or opened. Displayed to the user as-is.
#[derive(Debug)]
pub enum WorldOpenError {
    /// The configuration was rejected.
    Config(ConfigError),
    /// The save directory was unreadable or corrupt.
    Persistence(PersistenceError),
}

impl Display for WorldOpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorldOpenError::Config(err) => write!(f, "Cannot create world: {}", err),
            WorldOpenError::Persistence(err) => write!(f, "Cannot open world: {}", err),
        }
    }
}

impl Error for WorldOpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorldOpenError::Config(err) => Some(err),
            WorldOpenError::Persistence(err) => Some(err),
        }
    }
}

impl From<ConfigError> for WorldOpenError {
    fn from(err: ConfigError) -> Self {
        WorldOpenError::Config(err)
    }
}

impl From<EquationError> for WorldOpenError {
    fn from(err: EquationError) -> Self {
        WorldOpenError::Config(ConfigError::Equation(err))
    }
}

impl From<PersistenceError> for WorldOpenError {
    fn from(err: PersistenceError) -> Self {
        WorldOpenError::Persistence(err)
    }
}

/// The renderer refused a buffer upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError(pub String);

impl Display for UploadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer upload failed: {}", self.0)
    }
}

impl Error for UploadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equation_error_pinpoints_the_token() {
        let err = EquationError {
            position: 11,
            token: ")".to_string(),
            expected: "expression".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid equation at column 12 near ')': expected expression"
        );
        let open: WorldOpenError = err.into();
        assert!(open.to_string().starts_with("Cannot create world: Invalid equation"));
    }
}
