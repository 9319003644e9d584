use std::{fmt, time::Duration};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::{gateway::Light, settings::ScanSettings};

/// Set of lights that are on during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightPattern(u8);

fn bit(light: Light) -> u8 {
    match light {
        Light::Top => 0b0001,
        Light::Right => 0b0010,
        Light::Bottom => 0b0100,
        Light::Left => 0b1000,
    }
}

impl LightPattern {
    pub const NONE: LightPattern = LightPattern(0);
    pub const ALL: LightPattern = LightPattern(0b1111);

    pub fn single(light: Light) -> Self {
        LightPattern(bit(light))
    }

    pub fn with(self, light: Light) -> Self {
        LightPattern(self.0 | bit(light))
    }

    pub fn contains(self, light: Light) -> bool {
        self.0 & bit(light) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Active lights in T, R, B, L order.
    pub fn lights(self) -> impl Iterator<Item = Light> {
        Light::ALL.into_iter().filter(move |light| self.contains(*light))
    }

    /// Initials of the active lights, e.g. `"T"` or `"TB"`.
    pub fn file_tag(self) -> String {
        self.lights().map(Light::initial).collect()
    }

    /// Parses a run of light initials. Order and duplicates don't matter;
    /// the tag is always rebuilt in fixed order.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            bail!("light pattern must name at least one light");
        }

        value.chars().try_fold(LightPattern::NONE, |pattern, initial| {
            Light::from_initial(initial)
                .map(|light| pattern.with(light))
                .ok_or_else(|| anyhow!("unknown light '{initial}' in pattern \"{value}\""))
        })
    }
}

impl fmt::Display for LightPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&self.file_tag())
        }
    }
}

impl Serialize for LightPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.file_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingStep {
    pub pattern: LightPattern,
    #[serde(serialize_with = "serialize_millis")]
    pub settle_delay: Duration,
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

impl LightingStep {
    pub fn new(pattern: LightPattern, settle_delay: Duration) -> Self {
        Self {
            pattern,
            settle_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    pub steps: Vec<LightingStep>,
    pub image_extension: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        let settle_delay = Duration::from_millis(150);
        Self {
            steps: Light::ALL
                .into_iter()
                .map(|light| LightingStep::new(LightPattern::single(light), settle_delay))
                .collect(),
            image_extension: "bmp".into(),
        }
    }
}

impl SequencerConfig {
    pub fn from_settings(settings: &ScanSettings) -> Result<Self> {
        if settings.patterns.is_empty() {
            bail!("scan needs at least one lighting step");
        }

        let settle_delay = settings.settle_delay();
        let steps = settings
            .patterns
            .iter()
            .map(|raw| LightPattern::parse(raw).map(|p| LightingStep::new(p, settle_delay)))
            .collect::<Result<Vec<_>>>()?;

        let image_extension = settings.image_extension.trim().trim_start_matches('.');
        if image_extension.is_empty() {
            bail!("image extension must not be empty");
        }

        Ok(Self {
            steps,
            image_extension: image_extension.to_string(),
        })
    }
}

/// `T_20240131_142501_123.bmp`: tag first so files sort by light, then time.
pub fn capture_filename(tag: &str, at: DateTime<Local>, extension: &str) -> String {
    format!("{tag}_{}.{extension}", at.format("%Y%m%d_%H%M%S_%3f"))
}
