// Hidden capacity regions on ATA drives
//
// A Host Protected Area (HPA) or Device Configuration Overlay (DCO) lowers the
// capacity a drive reports, so an overwrite never reaches the sectors behind
// it. The descriptor flags them; the engine asks the eraser to
// restore native capacity before sanitizing and records what happened.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HiddenArea {
    Hpa,
    Dco,
}

impl HiddenArea {
    pub fn description(&self) -> &'static str {
        match self {
            HiddenArea::Hpa => "Host Protected Area",
            HiddenArea::Dco => "Device Configuration Overlay",
        }
    }
}

impl fmt::Display for HiddenArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HiddenArea::Hpa => write!(f, "HPA"),
            HiddenArea::Dco => write!(f, "DCO"),
        }
    }
}

/// Outcome of restoring one hidden area before sanitization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HiddenAreaRecord {
    pub area: HiddenArea,
    pub removed: bool,
    pub detail: String,
}

impl HiddenAreaRecord {
    pub fn removed(area: HiddenArea) -> Self {
        Self {
            area,
            removed: true,
            detail: format!("{} removed, native capacity restored", area.description()),
        }
    }

    pub fn retained(area: HiddenArea, reason: impl fmt::Display) -> Self {
        Self {
            area,
            removed: false,
            detail: format!(
                "{} could not be removed ({}); sectors behind it were not sanitized",
                area.description(),
                reason
            ),
        }
    }
}

/// Current and native max sectors from `hdparm -N`, e.g.
/// ` max sectors   = 976771055/976773168, HPA is enabled`
pub fn parse_max_sectors(output: &str) -> Option<(u64, u64)> {
    let line = output.lines().find(|l| l.contains("max sectors"))?;
    let (_, values) = line.split_once('=')?;
    let values = values.split(',').next()?.trim();
    let (current, native) = values.split_once('/')?;
    Some((current.trim().parse().ok()?, native.trim().parse().ok()?))
}
