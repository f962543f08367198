//! Turn indicators extracted from routing maneuver steps

use serde::{Deserialize, Serialize};

/// Kind of maneuver at a routing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverKind {
    Depart,
    Arrive,
    Turn,
    Ramp,
    Merge,
    Fork,
    Roundabout,
    Continue,
    Other,
}

impl ManeuverKind {
    /// Kinds worth drawing as an indicator on the map
    pub fn is_significant(self) -> bool {
        matches!(
            self,
            ManeuverKind::Turn | ManeuverKind::Ramp | ManeuverKind::Merge | ManeuverKind::Fork
        )
    }
}

/// One routing step as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManeuverStep {
    /// Position in provider order: `[lon, lat]`
    pub location: [f64; 2],
    pub kind: ManeuverKind,
    /// Human-readable instruction, possibly empty
    pub instruction: String,
}

/// A turn marker ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnIndicator {
    /// Position in display order: `[lat, lon]`
    pub coordinates: [f64; 2],
    pub kind: ManeuverKind,
    pub instruction_text: String,
    /// Index of the originating step
    pub step_index: usize,
}

/// Keeps the significant steps and swaps their axes to `[lat, lon]`
///
/// Steps whose location is not a finite, in-range coordinate are skipped.
pub fn extract_turns(steps: &[ManeuverStep]) -> Vec<TurnIndicator> {
    steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.kind.is_significant())
        .filter_map(|(step_index, step)| {
            let [lon, lat] = step.location;
            super::is_valid(lat, lon).then(|| TurnIndicator {
                coordinates: [lat, lon],
                kind: step.kind,
                instruction_text: step.instruction.clone(),
                step_index,
            })
        })
        .collect()
}
