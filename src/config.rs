use serde::{Deserialize, Serialize};

use crate::error::{Result, SuperParcelError};

/// How the DBSCAN radius is chosen for each owner group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EpsilonStrategy {
    /// One or more candidate radii. With several candidates and an
    /// `area_ratio_gate`, they are tried in increasing order until the gate passes.
    Fixed { thresholds: Vec<f64> },
    /// Estimate once per tile from the tile's parcel centroids.
    AdaptivePerTile,
    /// Estimate per owner from that owner's distance matrix.
    AdaptivePerOwner,
}

impl Default for EpsilonStrategy {
    fn default() -> Self {
        EpsilonStrategy::Fixed {
            thresholds: vec![200.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceClamp {
    pub min: f64,
    pub max: f64,
}

impl DistanceClamp {
    pub fn apply(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    pub k_neighbors: usize,
    /// Moving-average window as a fraction of the sample count.
    pub smoothing_window: f64,
    /// Unset means the raw elbow value is used unclamped.
    pub clamp: Option<DistanceClamp>,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 4,
            smoothing_window: 0.5,
            clamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub enabled: bool,
    pub max_parcels_per_tile: usize,
    pub min_tile_size: usize,
    pub max_iterations: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_parcels_per_tile: 500,
            min_tile_size: 50,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperParcelConfig {
    pub min_samples: usize,
    pub epsilon: EpsilonStrategy,
    pub knn: KnnConfig,
    pub area_ratio_gate: Option<f64>,
    pub min_area: Option<f64>,
    pub tiling: TilingConfig,
    pub max_merge_distance: Option<f64>,
    pub max_workers: usize,
}

impl Default for SuperParcelConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            epsilon: EpsilonStrategy::default(),
            knn: KnnConfig::default(),
            area_ratio_gate: None,
            min_area: None,
            tiling: TilingConfig::default(),
            max_merge_distance: Some(4.0),
            max_workers: 10,
        }
    }
}

impl SuperParcelConfig {
    pub fn with_fixed_threshold(mut self, threshold: f64) -> Self {
        self.epsilon = EpsilonStrategy::Fixed {
            thresholds: vec![threshold],
        };
        self
    }

    pub fn with_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.epsilon = EpsilonStrategy::Fixed { thresholds };
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Candidate radii in the order they should be tried, or `None` for the adaptive strategies.
    pub fn sorted_thresholds(&self) -> Option<Vec<f64>> {
        match &self.epsilon {
            EpsilonStrategy::Fixed { thresholds } => {
                let mut sorted = thresholds.clone();
                sorted.sort_by(f64::total_cmp);
                sorted.dedup();
                Some(sorted)
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_samples < 1 {
            return Err(SuperParcelError::Config(
                "min_samples must be at least 1".into(),
            ));
        }

        if let EpsilonStrategy::Fixed { thresholds } = &self.epsilon {
            if thresholds.is_empty() {
                return Err(SuperParcelError::Config(
                    "fixed epsilon strategy needs at least one threshold".into(),
                ));
            }
            if let Some(bad) = thresholds.iter().find(|t| !t.is_finite() || **t <= 0.0) {
                return Err(SuperParcelError::Config(format!(
                    "distance threshold {} must be finite and positive",
                    bad
                )));
            }
        }

        if self.knn.k_neighbors == 0 {
            return Err(SuperParcelError::Config(
                "k_neighbors must be at least 1".into(),
            ));
        }
        let window = self.knn.smoothing_window;
        if !(window > 0.0 && window <= 1.0) {
            return Err(SuperParcelError::Config(format!(
                "smoothing_window {} must be in (0, 1]",
                window
            )));
        }
        if let Some(clamp) = self.knn.clamp {
            if !(clamp.min.is_finite() && clamp.max.is_finite()) || clamp.min > clamp.max {
                return Err(SuperParcelError::Config(format!(
                    "invalid distance clamp [{}, {}]",
                    clamp.min, clamp.max
                )));
            }
        }

        for (name, value) in [
            ("area_ratio_gate", self.area_ratio_gate),
            ("min_area", self.min_area),
            ("max_merge_distance", self.max_merge_distance),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(SuperParcelError::Config(format!(
                        "{} must be finite and positive, got {}",
                        name, v
                    )));
                }
            }
        }

        if self.tiling.max_parcels_per_tile == 0 {
            return Err(SuperParcelError::Config(
                "max_parcels_per_tile must be positive".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(SuperParcelError::Config(
                "max_workers must be positive".into(),
            ));
        }

        Ok(())
    }
}
