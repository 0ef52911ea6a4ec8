//! `world.meta`: one `key=value` pair per line.

use std::fmt::Write;

use web_time::{SystemTime, UNIX_EPOCH};

use crate::engine_state::{config::GenerationType, error::PersistenceError};

/// Everything `world.meta` records about a world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldMetadata {
    /// Display name.
    pub name: String,
    /// World seed.
    pub seed: u64,
    /// Terrain mode.
    pub generation_type: GenerationType,
    /// Height cap the world was created with.
    pub max_height: i32,
    /// Seconds since the Unix epoch at the last save.
    pub last_played: u64,
    /// Custom terrain expression, for custom-equation worlds.
    pub custom_equation: Option<String>,
    /// Sea level, when recorded.
    pub sea_level: Option<i32>,
}

/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl WorldMetadata {
    /// Renders the file contents, LF-terminated.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "name={}", self.name);
        let _ = writeln!(text, "seed={}", self.seed);
        let _ = writeln!(text, "generationType={}", self.generation_type.as_str());
        let _ = writeln!(text, "maxHeight={}", self.max_height);
        let _ = writeln!(text, "lastPlayed={}", self.last_played);
        if let Some(equation) = &self.custom_equation {
            let _ = writeln!(text, "customEquation={}", equation);
        }
        if let Some(sea_level) = self.sea_level {
            let _ = writeln!(text, "seaLevel={}", sea_level);
        }
        text
    }

    /// Parses the file contents. Unknown keys are ignored.
    ///
    /// # Errors
    /// [`PersistenceError::CorruptMetadata`] for a line without `=`, an
    /// unparsable value, or a missing required key (reported as line 0).
    pub fn parse(text: &str) -> Result<Self, PersistenceError> {
        let mut name = None;
        let mut seed = None;
        let mut generation_type = None;
        let mut max_height = None;
        let mut last_played = None;
        let mut custom_equation = None;
        let mut sea_level = None;

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let corrupt = |reason: String| PersistenceError::CorruptMetadata {
                line: line_number,
                reason,
            };
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(corrupt(format!("expected key=value, found '{}'", line)));
            };
            let number = |what: &str| corrupt(format!("invalid {} '{}'", what, value));
            match key.trim() {
                "name" => name = Some(value.to_string()),
                "seed" => seed = Some(value.trim().parse::<u64>().map_err(|_| number("seed"))?),
                "generationType" => {
                    generation_type = Some(
                        GenerationType::parse(value.trim()).ok_or_else(|| number("generationType"))?,
                    )
                }
                "maxHeight" => {
                    max_height = Some(value.trim().parse::<i32>().map_err(|_| number("maxHeight"))?)
                }
                "lastPlayed" => {
                    last_played = Some(value.trim().parse::<u64>().map_err(|_| number("lastPlayed"))?)
                }
                "customEquation" => custom_equation = Some(value.to_string()),
                "seaLevel" => {
                    sea_level = Some(value.trim().parse::<i32>().map_err(|_| number("seaLevel"))?)
                }
                _ => {}
            }
        }

        let missing = |key: &str| PersistenceError::CorruptMetadata {
            line: 0,
            reason: format!("missing key '{}'", key),
        };
        Ok(WorldMetadata {
            name: name.ok_or_else(|| missing("name"))?,
            seed: seed.ok_or_else(|| missing("seed"))?,
            generation_type: generation_type.ok_or_else(|| missing("generationType"))?,
            max_height: max_height.ok_or_else(|| missing("maxHeight"))?,
            last_played: last_played.ok_or_else(|| missing("lastPlayed"))?,
            custom_equation,
            sea_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorldMetadata {
        WorldMetadata {
            name: "Test = World".to_string(),
            seed: 12345,
            generation_type: GenerationType::CustomEquation,
            max_height: 256,
            last_played: 1_700_000_000,
            custom_equation: Some("64 + continent * 20".to_string()),
            sea_level: Some(62),
        }
    }

    #[test]
    fn text_round_trips() {
        let text = sample().to_text();
        assert!(text.starts_with("name=Test = World\nseed=12345\ngenerationType=custom-equation\n"));
        assert!(text.ends_with("seaLevel=62\n"));
        assert_eq!(WorldMetadata::parse(&text).unwrap(), sample());
    }

    #[test]
    fn unknown_keys_are_ignored_and_bad_values_are_not() {
        let text = "name=a\nseed=1\ngenerationType=superflat\nmaxHeight=128\nlastPlayed=0\nfavouriteColour=blue\n";
        let parsed = WorldMetadata::parse(text).unwrap();
        assert_eq!(parsed.generation_type, GenerationType::Superflat);
        assert_eq!(parsed.custom_equation, None);

        let bad = text.replace("seed=1", "seed=one");
        assert!(matches!(
            WorldMetadata::parse(&bad),
            Err(PersistenceError::CorruptMetadata { line: 2, .. })
        ));
        let missing = text.replace("maxHeight=128\n", "");
        assert!(matches!(
            WorldMetadata::parse(&missing),
            Err(PersistenceError::CorruptMetadata { line: 0, .. })
        ));
        assert!(WorldMetadata::parse("garbage").is_err());
    }
}
