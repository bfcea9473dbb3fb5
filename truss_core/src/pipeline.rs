//! # In-Process Pipeline
//!
//! Runs every stage in order on one set of lines and hands back the typed
//! result of each, without going through artifact files.
//!
//! ```text
//! lines ──► Network ──► ConnectorSpecs ──► EngineeredConnectors (if loads)
//!              │              │                     │
//!              ├──► HalfLapAnalysis                 │
//!              ├──────────────┴──► ConnectorVoids ◄─┤
//!              └──────────────┴──► ConnectorPanels ◄┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use truss_core::config::PipelineConfig;
//! use truss_core::fixtures::{spider_truss_lines, spider_truss_loads};
//! use truss_core::pipeline::run_pipeline;
//!
//! let loads = spider_truss_loads();
//! let outputs = run_pipeline(&spider_truss_lines(), Some(&loads), &PipelineConfig::default()).unwrap();
//! assert_eq!(outputs.network.node_count(), 13);
//! ```

use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use crate::artifacts::{
    ConnectorSpecArtifact, ConnectorVoidArtifact, EngineeredConnectorArtifact, HalfLapArtifact, NestingProfileArtifact,
    NetworkArtifact, PanelArtifact,
};
use crate::config::PipelineConfig;
use crate::emitter::GeometryInputs;
use crate::engineering::{engineer_connectors, EngineeredConnectors, LoadSchedule};
use crate::errors::TrussResult;
use crate::export::ExportTables;
use crate::file_io::save_artifact;
use crate::half_lap::{analyze_half_laps, HalfLapAnalysis};
use crate::joints::{specify_connectors, ConnectorSpecs};
use crate::network::{build_network, LineSegment, Network};
use crate::panels::{design_panels, ConnectorPanels};
use crate::report::StageReport;
use crate::voids::{compute_voids, ConnectorVoids};

/// Typed result of every stage of one run
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub run_id: Uuid,
    pub network: Network,
    pub connectors: ConnectorSpecs,
    /// Present when a load schedule was supplied
    pub engineered: Option<EngineeredConnectors>,
    pub half_laps: HalfLapAnalysis,
    pub voids: ConnectorVoids,
    pub panels: ConnectorPanels,
    /// One per stage, in run order
    pub reports: Vec<StageReport>,
}

impl PipelineOutputs {
    pub fn geometry_inputs(&self) -> GeometryInputs<'_> {
        let inputs = GeometryInputs::new(&self.network, &self.connectors)
            .with_half_laps(&self.half_laps)
            .with_voids(&self.voids);
        match &self.engineered {
            Some(engineered) => inputs.with_engineered(engineered),
            None => inputs,
        }
    }

    pub fn export_tables(&self) -> ExportTables<'_> {
        ExportTables {
            connectors: &self.connectors,
            engineered: self.engineered.as_ref(),
            half_laps: Some(&self.half_laps),
            voids: Some(&self.voids),
            panels: Some(&self.panels),
        }
    }

    /// Items skipped across all stages
    pub fn skipped_total(&self) -> usize {
        self.reports.iter().map(StageReport::skipped_count).sum()
    }

    /// Write one artifact per stage into `dir`.
    pub fn save_artifacts(&self, dir: &Path, config: &PipelineConfig) -> TrussResult<Vec<PathBuf>> {
        let mut paths = vec![
            save_artifact(&NetworkArtifact::from_network(&self.network, self.run_id), dir)?,
            save_artifact(&ConnectorSpecArtifact::new(&self.connectors, self.run_id), dir)?,
        ];
        if let Some(engineered) = &self.engineered {
            paths.push(save_artifact(
                &EngineeredConnectorArtifact::new(engineered, config, self.run_id),
                dir,
            )?);
        }
        paths.push(save_artifact(&HalfLapArtifact::new(&self.half_laps, self.run_id), dir)?);
        paths.push(save_artifact(&ConnectorVoidArtifact::new(&self.voids, self.run_id), dir)?);
        paths.push(save_artifact(&PanelArtifact::new(&self.panels, config, self.run_id), dir)?);
        paths.push(save_artifact(
            &NestingProfileArtifact::new(&self.panels, &config.panels, self.run_id),
            dir,
        )?);
        Ok(paths)
    }
}

/// Run all stages. Fails only on stage-level errors (empty input, invalid
/// configuration); per-item failures land in the reports.
pub fn run_pipeline(
    lines: &[LineSegment],
    loads: Option<&LoadSchedule>,
    config: &PipelineConfig,
) -> TrussResult<PipelineOutputs> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    info!(%run_id, lines = lines.len(), engineered = loads.is_some(), "Pipeline started");

    let mut reports = Vec::new();

    let (network, report) = build_network(lines, &config.network)?;
    reports.push(report);

    let (connectors, report) = specify_connectors(&network);
    reports.push(report);

    let engineered = match loads {
        Some(schedule) => {
            let (engineered, report) = engineer_connectors(&connectors, schedule, config);
            reports.push(report);
            Some(engineered)
        }
        None => None,
    };

    let (half_laps, report) = analyze_half_laps(&network, config);
    reports.push(report);

    let (voids, report) = compute_voids(&network, &connectors, engineered.as_ref(), config);
    reports.push(report);

    let (panels, report) = design_panels(&network, &connectors, engineered.as_ref(), config);
    reports.push(report);

    let outputs = PipelineOutputs {
        run_id,
        network,
        connectors,
        engineered,
        half_laps,
        voids,
        panels,
        reports,
    };
    info!(
        %run_id,
        nodes = outputs.network.node_count(),
        beams = outputs.network.edge_count(),
        panels = outputs.panels.summary().total_panels,
        intersections = outputs.half_laps.joints.len(),
        skipped = outputs.skipped_total(),
        "Pipeline finished"
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Artifact;
    use crate::emitter::{emit_geometry, RecordingSink, SolidRole};
    use crate::errors::TrussError;
    use crate::file_io::load_artifact;
    use crate::fixtures::{spider_truss_lines, spider_truss_loads};
    use crate::joints::JointClass;
    use crate::report::Stage;

    #[test]
    fn test_spider_truss_end_to_end() {
        let config = PipelineConfig::default();
        let loads = spider_truss_loads();
        let outputs = run_pipeline(&spider_truss_lines(), Some(&loads), &config).unwrap();

        assert_eq!(outputs.network.node_count(), 13);
        assert_eq!(outputs.network.edge_count(), 12);
        let summary = outputs.network.joint_summary();
        assert_eq!((summary.end, summary.two_way, summary.multi_way), (6, 4, 3));

        assert_eq!(outputs.connectors.count_of(JointClass::EndConnector), 6);
        assert_eq!(outputs.connectors.count_of(JointClass::ComplexJoint), 1);
        assert_eq!(outputs.connectors.total_rods(), 38);

        let engineered = outputs.engineered.as_ref().unwrap();
        assert_eq!(engineered.connectors.len(), 13);
        assert!(engineered.summary.unloaded_nodes.is_empty());
        assert_eq!(outputs.voids.voids.len(), 13);
        assert_eq!(outputs.panels.summary().total_panels, 26);
        assert_eq!(outputs.panels.summary().total_rods, engineered.summary.total_rods);

        let stages: Vec<Stage> = outputs.reports.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Network,
                Stage::Connectors,
                Stage::Engineering,
                Stage::HalfLap,
                Stage::Voids,
                Stage::Panels
            ]
        );
        // The stray line at the apex is the only skip
        assert_eq!(outputs.skipped_total(), 1);
    }

    #[test]
    fn test_topological_run_skips_engineering() {
        let outputs = run_pipeline(&spider_truss_lines(), None, &PipelineConfig::default()).unwrap();
        assert!(outputs.engineered.is_none());
        assert_eq!(outputs.reports.len(), 5);
        let apex = outputs.voids.get(0).unwrap();
        assert_eq!(apex.plate_size_mm, 180.0);
        assert_eq!(outputs.panels.get(0).unwrap().size_mm, 300.0);
    }

    #[test]
    fn test_empty_input_aborts() {
        let err = run_pipeline(&[], None, &PipelineConfig::default()).unwrap_err();
        assert_eq!(err, TrussError::EmptyInput);
    }

    #[test]
    fn test_geometry_from_outputs() {
        let config = PipelineConfig::default();
        let loads = spider_truss_loads();
        let outputs = run_pipeline(&spider_truss_lines(), Some(&loads), &config).unwrap();

        let mut sink = RecordingSink::default();
        let report = emit_geometry(&mut sink, &outputs.geometry_inputs(), &config);

        assert!(report.is_clean());
        assert_eq!(sink.count(SolidRole::Beam), 12);
        assert_eq!(sink.count(SolidRole::ConnectorPlate), 13);
        assert_eq!(sink.count(SolidRole::ConnectorVoid), 13);
        assert_eq!(sink.count(SolidRole::HalfLapCut), 2 * outputs.half_laps.joints.len());
        assert_eq!(sink.count(SolidRole::RodHole), engineered_rods(&outputs));
    }

    fn engineered_rods(outputs: &PipelineOutputs) -> usize {
        outputs.engineered.as_ref().map(|e| e.summary.total_rods).unwrap_or(0)
    }

    #[test]
    fn test_artifacts_written_per_stage() {
        let config = PipelineConfig::default();
        let loads = spider_truss_loads();
        let outputs = run_pipeline(&spider_truss_lines(), Some(&loads), &config).unwrap();

        let dir = std::env::temp_dir().join(format!("truss_pipeline_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let paths = outputs.save_artifacts(&dir, &config).unwrap();
        assert_eq!(paths.len(), 7);
        assert!(dir.join(NetworkArtifact::FILE_NAME).exists());
        assert!(dir.join(NestingProfileArtifact::FILE_NAME).exists());

        let panels = load_artifact::<PanelArtifact>(&dir).unwrap();
        assert_eq!(panels.panels, outputs.panels);

        let network = load_artifact::<NetworkArtifact>(&dir).unwrap();
        assert_eq!(network.meta.run_id, outputs.run_id);
        assert_eq!(network.to_network().unwrap(), outputs.network);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
