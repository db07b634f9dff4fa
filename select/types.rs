// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types used by more than one module. Anything private to a single module stays there.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known datasets and the width of their feature space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetPreset {
    /// UCI Internet Advertisements.
    Ads,
    /// NIPS 2003 Dorothea.
    Dorothea,
}

impl DatasetPreset {
    pub const fn dimension(self) -> usize {
        match self {
            Self::Ads => 1_558,
            Self::Dorothea => 100_000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ads => "ads",
            Self::Dorothea => "dorothea",
        }
    }
}

impl fmt::Display for DatasetPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetPreset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        if lowered.contains("dorothea") {
            return Ok(Self::Dorothea);
        }
        match lowered.as_str() {
            "ads" | "ad" | "internet-ads" | "internet_ads" => Ok(Self::Ads),
            _ => Err(format!(
                "Unknown dataset '{}'. Expected 'ads' or 'dorothea', or pass an explicit feature count.",
                value.trim()
            )),
        }
    }
}

/// Column split broadcast to every partition for one selection round.
///
/// `selected` keeps selection order; `unselected` is ascending. Together they
/// cover `0..dimension` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSplit {
    pub selected: Vec<usize>,
    pub unselected: Vec<usize>,
}

/// Ordered history of the features chosen so far, with constant-time membership.
#[derive(Debug, Clone, Default)]
pub struct SelectedSet {
    order: Vec<usize>,
    members: AHashSet<usize>,
}

impl SelectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `feature` unless it is already present. Returns whether the set grew.
    pub fn insert(&mut self, feature: usize) -> bool {
        if !self.members.insert(feature) {
            return false;
        }
        self.order.push(feature);
        true
    }

    pub fn contains(&self, feature: usize) -> bool {
        self.members.contains(&feature)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Features in the order they were selected.
    pub fn in_selection_order(&self) -> &[usize] {
        &self.order
    }

    /// Features in ascending index order, as used for the written projection.
    pub fn sorted(&self) -> Vec<usize> {
        let mut sorted = self.order.clone();
        sorted.sort_unstable();
        sorted
    }

    /// Splits `0..dimension` into the selected columns and their complement.
    pub fn split(&self, dimension: usize) -> FeatureSplit {
        let unselected = (0..dimension).filter(|idx| !self.contains(*idx)).collect();
        FeatureSplit {
            selected: self.order.clone(),
            unselected,
        }
    }
}

impl FromIterator<usize> for SelectedSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}
