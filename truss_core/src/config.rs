//! # Pipeline Configuration
//!
//! An immutable [`PipelineConfig`] is built once (defaults or a JSON file)
//! and passed by reference into every stage. Nothing in the pipeline reads
//! configuration from global state.
//!
//! ## Bearing Capacity Chain
//!
//! ```text
//! F_perp' = F_perp × C_D × C_M × C_t × C_F
//! P_rod   = F_perp' × (d × l_p)
//! ```
//!
//! | Factor | Description        | Default (humid pine) |
//! |--------|--------------------|----------------------|
//! | C_D    | Load duration      | 1.00 (long-term)     |
//! | C_M    | Moisture condition | 0.90 (humid)         |
//! | C_t    | Temperature        | 1.00 (normal)        |
//! | C_F    | Size factor        | 1.00                 |
//!
//! ## Example
//!
//! ```rust
//! use truss_core::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! config.validate().unwrap();
//!
//! // 3.1 MPa × 0.90 × 480 mm² ≈ 1339 N per 8mm rod
//! let per_rod = config.fastener.capacity_per_rod_n(&config.material);
//! assert!((per_rod - 1339.2).abs() < 0.01);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{TrussError, TrussResult};

/// Standard plywood block sizes (mm), ascending
pub const STANDARD_BLOCK_SIZES_MM: [f64; 6] = [100.0, 120.0, 150.0, 180.0, 200.0, 250.0];

/// Load duration condition (C_D)
///
/// Long-term loading is the reference; shorter durations allow more stress,
/// so `MediumTerm` and `ShortTerm` raise the bearing stress above the
/// reference value. Only the size factor is bounded to (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoadDuration {
    /// Permanent (> 10 years): C_D = 0.9
    Permanent,
    /// Long-term reference: C_D = 1.0
    #[default]
    LongTerm,
    /// Medium-term (weeks to months): C_D = 1.15
    MediumTerm,
    /// Short-term (wind gust, minutes): C_D = 1.6
    ShortTerm,
}

impl LoadDuration {
    /// All variants for selection lists
    pub const ALL: [LoadDuration; 4] = [
        LoadDuration::Permanent,
        LoadDuration::LongTerm,
        LoadDuration::MediumTerm,
        LoadDuration::ShortTerm,
    ];

    pub fn factor(&self) -> f64 {
        match self {
            LoadDuration::Permanent => 0.9,
            LoadDuration::LongTerm => 1.0,
            LoadDuration::MediumTerm => 1.15,
            LoadDuration::ShortTerm => 1.6,
        }
    }
}

/// Moisture / service condition (C_M)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MoistureCondition {
    /// Dry interior: C_M = 1.0
    Dry,
    /// Humid, under roof: C_M = 0.90
    #[default]
    Humid,
    /// Wet / exposed: C_M = 0.67 (compression perpendicular)
    Wet,
}

impl MoistureCondition {
    pub const ALL: [MoistureCondition; 3] = [
        MoistureCondition::Dry,
        MoistureCondition::Humid,
        MoistureCondition::Wet,
    ];

    pub fn factor(&self) -> f64 {
        match self {
            MoistureCondition::Dry => 1.0,
            MoistureCondition::Humid => 0.90,
            MoistureCondition::Wet => 0.67,
        }
    }
}

/// Service temperature (C_t)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TemperatureCondition {
    /// T ≤ 38°C: C_t = 1.0
    #[default]
    Normal,
    /// 38°C < T ≤ 52°C: C_t = 0.8
    Elevated,
    /// 52°C < T ≤ 65°C: C_t = 0.7
    High,
}

impl TemperatureCondition {
    pub const ALL: [TemperatureCondition; 3] = [
        TemperatureCondition::Normal,
        TemperatureCondition::Elevated,
        TemperatureCondition::High,
    ];

    pub fn factor(&self) -> f64 {
        match self {
            TemperatureCondition::Normal => 1.0,
            TemperatureCondition::Elevated => 0.8,
            TemperatureCondition::High => 0.7,
        }
    }
}

/// Timber material and its environmental derating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    /// Display name (e.g. "Pine (Structural Grade)")
    pub name: String,
    /// Reference compression perpendicular to grain (MPa = N/mm²)
    pub compression_perpendicular_mpa: f64,
    pub load_duration: LoadDuration,
    pub moisture: MoistureCondition,
    pub temperature: TemperatureCondition,
    /// Size factor C_F, in (0, 1]
    pub size_factor: f64,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        MaterialConfig {
            name: "Pine (Structural Grade, Pinus taeda)".to_string(),
            compression_perpendicular_mpa: 3.1,
            load_duration: LoadDuration::LongTerm,
            moisture: MoistureCondition::Humid,
            temperature: TemperatureCondition::Normal,
            size_factor: 1.0,
        }
    }
}

impl MaterialConfig {
    /// Combined environmental factor C_D × C_M × C_t × C_F
    pub fn environmental_factor(&self) -> f64 {
        self.load_duration.factor() * self.moisture.factor() * self.temperature.factor() * self.size_factor
    }

    /// Adjusted bearing stress F_perp' (MPa)
    pub fn bearing_stress_mpa(&self) -> f64 {
        self.compression_perpendicular_mpa * self.environmental_factor()
    }
}

/// Threaded-rod fastener definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastenerConfig {
    pub description: String,
    pub diameter_mm: f64,
    /// Embedment depth in the timber (mm)
    pub penetration_depth_mm: f64,
}

impl Default for FastenerConfig {
    fn default() -> Self {
        FastenerConfig {
            description: "8mm Steel Threaded Rod (A4-70 Stainless)".to_string(),
            diameter_mm: 8.0,
            penetration_depth_mm: 60.0,
        }
    }
}

impl FastenerConfig {
    /// Projected bearing area d × l_p (mm²)
    pub fn bearing_area_mm2(&self) -> f64 {
        self.diameter_mm * self.penetration_depth_mm
    }

    /// Per-rod capacity limited by timber bearing (N)
    pub fn capacity_per_rod_n(&self, material: &MaterialConfig) -> f64 {
        material.bearing_stress_mpa() * self.bearing_area_mm2()
    }
}

/// How the exact rod count is turned into a whole number.
///
/// The rod-count step of the capacity chain, `rods = int(exact + 0.5)`,
/// is [`RodRounding::HalfUp`]. It can round 3.4 rods down to 3 and leave
/// the connector flagged `OVER`. [`RodRounding::Ceiling`] is the default,
/// which keeps utilization at or below 100% for every connector; select
/// `half_up` in the config to reproduce the half-up counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RodRounding {
    /// Always round up; utilization can never exceed 100%
    #[default]
    Ceiling,
    /// `int(exact + 0.5)`: add 0.5 then truncate; can leave a connector over capacity
    HalfUp,
}

impl RodRounding {
    pub fn apply(&self, exact: f64) -> usize {
        let rounded = match self {
            RodRounding::Ceiling => exact.ceil(),
            RodRounding::HalfUp => (exact + 0.5).trunc(),
        };
        if rounded.is_finite() && rounded > 0.0 {
            rounded as usize
        } else {
            0
        }
    }
}

/// Load and capacity safety settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Multiplier from combined load to design load
    pub load_factor: f64,
    /// Target utilization ratio (diagnostic only)
    pub utilization_target: f64,
    /// Never fewer rods than this per connector
    pub minimum_rods: usize,
    /// Flat margin on required block bearing area
    pub block_area_margin: f64,
    pub rounding: RodRounding,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            load_factor: 1.25,
            utilization_target: 0.85,
            minimum_rods: 2,
            block_area_margin: 1.5,
            rounding: RodRounding::Ceiling,
        }
    }
}

/// Beam cross-section (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSection {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Default for BeamSection {
    fn default() -> Self {
        BeamSection {
            width_mm: 46.0,
            height_mm: 97.0,
        }
    }
}

/// Half-lap sizing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfLapConfig {
    /// Minimum cut length as a multiple of beam width
    pub min_length_factor: f64,
    /// Lower clamp as a multiple of beam width
    pub clamp_min_factor: f64,
    /// Upper clamp (mm)
    pub max_cut_length_mm: f64,
    /// Length used below the minimum angle (mm)
    pub parallel_fallback_mm: f64,
    /// Angles below this are treated as near-parallel (degrees)
    pub min_angle_deg: f64,
    /// Overlaps at or below this volume are contact, not intersection (mm³)
    pub overlap_volume_tolerance_mm3: f64,
}

impl Default for HalfLapConfig {
    fn default() -> Self {
        HalfLapConfig {
            min_length_factor: 3.0,
            clamp_min_factor: 2.0,
            max_cut_length_mm: 300.0,
            parallel_fallback_mm: 200.0,
            min_angle_deg: 5.0,
            overlap_volume_tolerance_mm3: 1.0e-3,
        }
    }
}

/// Where a merged node sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionPolicy {
    /// Coordinate of the first endpoint that created the node
    #[default]
    FirstPoint,
    /// Running average of every endpoint merged into the node
    RunningAverage,
}

/// Network extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Endpoints closer than this merge into one node (mm, strict <)
    pub merge_tolerance_mm: f64,
    pub position_policy: PositionPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            merge_tolerance_mm: 0.1,
            position_policy: PositionPolicy::FirstPoint,
        }
    }
}

/// Connector plate geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorGeometryConfig {
    pub plywood_thickness_mm: f64,
    pub rod_diameter_mm: f64,
}

impl Default for ConnectorGeometryConfig {
    fn default() -> Self {
        ConnectorGeometryConfig {
            plywood_thickness_mm: 18.0,
            rod_diameter_mm: 8.0,
        }
    }
}

/// Plywood connector panels cut for each node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub material: String,
    pub thickness_mm: f64,
    /// Depth of the pocket each beam end sits in (mm)
    pub pocket_depth_mm: f64,
    /// Rod hole centre to panel edge (mm)
    pub rod_edge_distance_mm: f64,
    /// Side of a panel joining a single beam (mm)
    pub base_size_mm: f64,
    /// Added per additional beam (mm)
    pub size_increment_mm: f64,
    /// Sizes round up to a multiple of this (mm)
    pub size_step_mm: f64,
    pub max_size_mm: f64,
    pub corner_radius_mm: f64,
    pub sheet_width_mm: f64,
    pub sheet_height_mm: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            material: "Birch Plywood 18mm".to_string(),
            thickness_mm: 18.0,
            pocket_depth_mm: 30.0,
            rod_edge_distance_mm: 25.0,
            base_size_mm: 150.0,
            size_increment_mm: 50.0,
            size_step_mm: 10.0,
            max_size_mm: 400.0,
            corner_radius_mm: 5.0,
            sheet_width_mm: 1220.0,
            sheet_height_mm: 2440.0,
        }
    }
}

/// Root configuration passed to every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub network: NetworkConfig,
    pub material: MaterialConfig,
    pub fastener: FastenerConfig,
    pub safety: SafetyConfig,
    pub beam: BeamSection,
    pub half_lap: HalfLapConfig,
    pub connector_geometry: ConnectorGeometryConfig,
    pub panels: PanelConfig,
    /// Ascending standard block sizes (mm)
    pub standard_block_sizes_mm: Vec<f64>,
}

impl PipelineConfig {
    /// Read a JSON configuration file; missing sections take defaults.
    pub fn from_file(path: &Path) -> TrussResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            TrussError::file_error("read config", path.display().to_string(), e.to_string())
        })?;
        let config: PipelineConfig = serde_json::from_str(&contents)
            .map_err(|e| TrussError::serialization(format!("Invalid config in {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the formulas cannot work with.
    pub fn validate(&self) -> TrussResult<()> {
        let positive = [
            ("network.merge_tolerance_mm", self.network.merge_tolerance_mm),
            ("material.compression_perpendicular_mpa", self.material.compression_perpendicular_mpa),
            ("fastener.diameter_mm", self.fastener.diameter_mm),
            ("fastener.penetration_depth_mm", self.fastener.penetration_depth_mm),
            ("safety.load_factor", self.safety.load_factor),
            ("safety.utilization_target", self.safety.utilization_target),
            ("safety.block_area_margin", self.safety.block_area_margin),
            ("beam.width_mm", self.beam.width_mm),
            ("beam.height_mm", self.beam.height_mm),
            ("half_lap.min_length_factor", self.half_lap.min_length_factor),
            ("half_lap.max_cut_length_mm", self.half_lap.max_cut_length_mm),
            ("half_lap.parallel_fallback_mm", self.half_lap.parallel_fallback_mm),
            ("connector_geometry.plywood_thickness_mm", self.connector_geometry.plywood_thickness_mm),
            ("connector_geometry.rod_diameter_mm", self.connector_geometry.rod_diameter_mm),
            ("panels.thickness_mm", self.panels.thickness_mm),
            ("panels.pocket_depth_mm", self.panels.pocket_depth_mm),
            ("panels.rod_edge_distance_mm", self.panels.rod_edge_distance_mm),
            ("panels.base_size_mm", self.panels.base_size_mm),
            ("panels.size_step_mm", self.panels.size_step_mm),
            ("panels.max_size_mm", self.panels.max_size_mm),
            ("panels.sheet_width_mm", self.panels.sheet_width_mm),
            ("panels.sheet_height_mm", self.panels.sheet_height_mm),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrussError::invalid_input(field, value.to_string(), "Must be positive"));
            }
        }

        if self.safety.minimum_rods < 1 {
            return Err(TrussError::invalid_input(
                "safety.minimum_rods",
                self.safety.minimum_rods.to_string(),
                "At least one rod per connector is required",
            ));
        }

        if !(self.panels.size_increment_mm.is_finite() && self.panels.size_increment_mm >= 0.0) {
            return Err(TrussError::invalid_input(
                "panels.size_increment_mm",
                self.panels.size_increment_mm.to_string(),
                "Must be zero or positive",
            ));
        }
        if 2.0 * self.panels.rod_edge_distance_mm >= self.panels.max_size_mm {
            return Err(TrussError::invalid_input(
                "panels.rod_edge_distance_mm",
                self.panels.rod_edge_distance_mm.to_string(),
                "Edge distance leaves no room for rods on the largest panel",
            ));
        }

        let factor = self.material.size_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(TrussError::invalid_input(
                "material.size_factor",
                factor.to_string(),
                "Size factor must be in (0, 1]",
            ));
        }

        let environmental = self.material.environmental_factor();
        if !(environmental.is_finite() && environmental > 0.0) {
            return Err(TrussError::invalid_input(
                "material",
                environmental.to_string(),
                "Combined derating factor must be positive",
            ));
        }

        if !(self.half_lap.clamp_min_factor.is_finite() && self.half_lap.clamp_min_factor >= 0.0) {
            return Err(TrussError::invalid_input(
                "half_lap.clamp_min_factor",
                self.half_lap.clamp_min_factor.to_string(),
                "Must be zero or positive",
            ));
        }
        if self.half_lap.clamp_min_factor * self.beam.width_mm > self.half_lap.max_cut_length_mm {
            return Err(TrussError::invalid_input(
                "half_lap.max_cut_length_mm",
                self.half_lap.max_cut_length_mm.to_string(),
                "Upper clamp is below clamp_min_factor × beam width",
            ));
        }

        if !(0.0..90.0).contains(&self.half_lap.min_angle_deg) {
            return Err(TrussError::invalid_input(
                "half_lap.min_angle_deg",
                self.half_lap.min_angle_deg.to_string(),
                "Angle floor must be in [0, 90)",
            ));
        }

        if self.standard_block_sizes_mm.is_empty() {
            return Err(TrussError::invalid_input(
                "standard_block_sizes_mm",
                "[]",
                "At least one standard block size is required",
            ));
        }
        if self.standard_block_sizes_mm.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TrussError::invalid_input(
                "standard_block_sizes_mm",
                format!("{:?}", self.standard_block_sizes_mm),
                "Sizes must be strictly ascending",
            ));
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            network: NetworkConfig::default(),
            material: MaterialConfig::default(),
            fastener: FastenerConfig::default(),
            safety: SafetyConfig::default(),
            beam: BeamSection::default(),
            half_lap: HalfLapConfig::default(),
            connector_geometry: ConnectorGeometryConfig::default(),
            panels: PanelConfig::default(),
            standard_block_sizes_mm: STANDARD_BLOCK_SIZES_MM.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_bearing_chain() {
        let config = PipelineConfig::default();
        assert_relative_eq!(config.material.environmental_factor(), 0.90, epsilon = 1e-12);
        assert_relative_eq!(config.material.bearing_stress_mpa(), 2.79, epsilon = 1e-12);
        assert_relative_eq!(config.fastener.bearing_area_mm2(), 480.0);
        assert_relative_eq!(config.fastener.capacity_per_rod_n(&config.material), 1339.2, epsilon = 1e-9);
    }

    #[test]
    fn test_factor_tables() {
        assert_eq!(LoadDuration::default().factor(), 1.0);
        assert!(LoadDuration::ALL.iter().all(|d| d.factor() > 0.0));
        assert_eq!(MoistureCondition::Dry.factor(), 1.0);
        assert_eq!(TemperatureCondition::High.factor(), 0.7);
    }

    #[test]
    fn test_rod_rounding_modes() {
        assert_eq!(RodRounding::Ceiling.apply(3.077), 4);
        assert_eq!(RodRounding::HalfUp.apply(3.077), 3);
        assert_eq!(RodRounding::HalfUp.apply(3.846), 4);
        assert_eq!(RodRounding::Ceiling.apply(0.0), 0);
        assert_eq!(RodRounding::Ceiling.apply(f64::NAN), 0);
    }

    #[test]
    fn test_half_up_matches_int_plus_half() {
        assert_eq!(SafetyConfig::default().rounding, RodRounding::Ceiling);
        for exact in [0.4, 2.5, 3.49, 4.7, 11.0] {
            assert_eq!(RodRounding::HalfUp.apply(exact), (exact + 0.5) as usize);
            assert!(RodRounding::Ceiling.apply(exact) as f64 >= exact);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.safety.load_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.material.size_factor = 1.2;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.standard_block_sizes_mm = vec![150.0, 120.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_a_rod() {
        let mut config = PipelineConfig::default();
        config.safety.minimum_rods = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TrussError::InvalidInput { ref field, .. } if field == "safety.minimum_rods"));

        config.safety.minimum_rods = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_term_duration_raises_stress() {
        let mut config = PipelineConfig::default();
        config.material.load_duration = LoadDuration::ShortTerm;
        config.validate().unwrap();
        // 1.6 × 0.90
        assert_relative_eq!(config.material.environmental_factor(), 1.44, epsilon = 1e-12);
        assert!(config.material.bearing_stress_mpa() > config.material.compression_perpendicular_mpa);
    }

    #[test]
    fn test_validate_rejects_bad_panel_values() {
        let mut config = PipelineConfig::default();
        config.panels.rod_edge_distance_mm = 200.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.panels.size_increment_mm = -10.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.half_lap.clamp_min_factor = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{ "safety": { "load_factor": 1.5, "utilization_target": 0.85,
            "minimum_rods": 3, "block_area_margin": 1.5, "rounding": "half_up" } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.safety.minimum_rods, 3);
        assert_eq!(config.safety.rounding, RodRounding::HalfUp);
        assert_eq!(config.beam, BeamSection::default());
        assert_eq!(config.standard_block_sizes_mm, STANDARD_BLOCK_SIZES_MM.to_vec());
    }

    #[test]
    fn test_from_file_missing() {
        let path = std::env::temp_dir().join("truss_test_no_such_config.json");
        let result = PipelineConfig::from_file(&path);
        assert!(matches!(result, Err(TrussError::FileError { .. })));
    }
}
