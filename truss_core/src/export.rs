//! # Tabular Export
//!
//! Flat CSV tables mirroring the JSON artifacts, for the workshop and for
//! spreadsheets. Values are rounded here and only here: positions to
//! 2 decimals, lengths and angles to 1, utilization to 1 with a `%` sign.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::PipelineConfig;
use crate::engineering::{CapacityStatus, EngineeredConnectors};
use crate::errors::{TrussError, TrussResult};
use crate::half_lap::{CutSide, HalfLapAnalysis};
use crate::joints::{BillOfMaterials, ConnectorSpecs};
use crate::panels::ConnectorPanels;
use crate::report::{Stage, StageReport};
use crate::voids::ConnectorVoids;

pub const CONNECTOR_DETAIL_CSV: &str = "truss_connectors_detail.csv";
pub const MATERIAL_SUMMARY_CSV: &str = "truss_material_summary.csv";
pub const CONNECTOR_TYPES_CSV: &str = "truss_connector_types.csv";
pub const ENGINEERING_REPORT_CSV: &str = "connector_engineering_report.csv";
pub const HALF_LAP_CSV: &str = "half_lap_specifications.csv";
pub const VOIDS_CSV: &str = "connector_void_specifications.csv";
pub const PANELS_CSV: &str = "panel_specifications.csv";

/// Quote a field if it contains a comma, quote or line break.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One row per connector
pub fn write_connector_detail<W: Write>(w: &mut W, specs: &ConnectorSpecs) -> io::Result<()> {
    writeln!(w, "Connector_ID,Node_ID,Type,Degree,Members,Rods_Required,Position_X,Position_Y,Position_Z")?;
    for c in &specs.connectors {
        writeln!(
            w,
            "C{},{},{},{},{},{},{:.2},{:.2},{:.2}",
            c.node_id,
            c.node_id,
            c.class,
            c.degree,
            c.neighbors.len(),
            c.rods,
            c.position.x,
            c.position.y,
            c.position.z
        )?;
    }
    Ok(())
}

/// Hardware shopping list
pub fn write_material_summary<W: Write>(w: &mut W, bom: &BillOfMaterials, config: &PipelineConfig) -> io::Result<()> {
    let diameter = config.fastener.diameter_mm;
    writeln!(w, "Item,Quantity,Unit")?;
    writeln!(w, "{},{},pieces", escape_csv(&config.fastener.description), bom.rods)?;
    writeln!(w, "{}mm Hex Nuts,{},pieces", diameter, bom.nuts)?;
    writeln!(w, "Washers (Diameter {}mm),{},pieces", diameter, bom.washers)?;
    writeln!(w, "Connector blocks,{},pieces", bom.blocks)?;
    Ok(())
}

/// Counts per archetype
pub fn write_connector_types<W: Write>(w: &mut W, specs: &ConnectorSpecs) -> io::Result<()> {
    writeln!(w, "Connector_Type,Count,Rods_Per_Connector,Total_Rods,Description")?;
    for row in specs.type_summary() {
        writeln!(
            w,
            "{},{},{},{},{}",
            row.class,
            row.count,
            row.rods_per_connector,
            row.total_rods,
            escape_csv(&row.description)
        )?;
    }
    Ok(())
}

pub fn write_engineering_report<W: Write>(w: &mut W, engineered: &EngineeredConnectors) -> io::Result<()> {
    writeln!(
        w,
        "Node_ID,Type,Vertical_Load_N,Lateral_Load_N,Tension_Load_N,Combined_Load_N,Combined_Load_kN,\
         Design_Load_N,Design_Load_kN,Rod_Capacity_kN,Rods_Required,Actual_Capacity_N,Actual_Capacity_kN,\
         Utilization_Percent,Status,Block_Size_mm,Block_Area_mm2,Note"
    )?;
    for c in &engineered.connectors {
        let r = &c.result;
        writeln!(
            w,
            "{},{},{:.1},{:.1},{:.1},{:.1},{:.2},{:.1},{:.2},{:.2},{},{:.1},{:.2},{:.1}%,{},{},{:.0},{}",
            escape_csv(&c.name),
            c.kind.display_name(),
            c.vertical_n,
            c.lateral_n,
            c.tension_n,
            r.combined_load_n,
            r.combined_load_n / 1000.0,
            r.design_load_n,
            r.design_load_n / 1000.0,
            r.capacity_per_rod_n / 1000.0,
            r.rods,
            r.actual_capacity_n,
            r.actual_capacity_n / 1000.0,
            r.utilization_percent,
            match r.status {
                CapacityStatus::Ok => "OK",
                CapacityStatus::Over => "OVER",
            },
            r.block.size_mm,
            r.block.design_area_mm2,
            escape_csv(&c.note)
        )?;
    }
    Ok(())
}

pub fn write_half_laps<W: Write>(w: &mut W, analysis: &HalfLapAnalysis) -> io::Result<()> {
    writeln!(
        w,
        "Intersection_ID,Beam1_Start_Node,Beam1_End_Node,Beam2_Start_Node,Beam2_End_Node,\
         Intersection_X_mm,Intersection_Y_mm,Intersection_Z_mm,Angle_Between_Beams_Degrees,\
         Centerline_Distance_mm,Overlap_Volume_mm3,Cut_Length_mm,Cut_Width_mm,\
         Beam1_Cut_Depth_mm,Beam2_Cut_Depth_mm,Beam1_Side,Beam2_Side"
    )?;
    for (i, j) in analysis.joints.iter().enumerate() {
        writeln!(
            w,
            "HL{},{},{},{},{},{:.2},{:.2},{:.2},{:.1},{:.2},{:.0},{:.1},{:.1},{:.1},{:.1},{},{}",
            i + 1,
            j.beam1.start,
            j.beam1.end,
            j.beam2.start,
            j.beam2.end,
            j.point.x,
            j.point.y,
            j.point.z,
            j.angle_deg,
            j.centerline_distance_mm,
            j.overlap_volume_mm3,
            j.cut.length_mm,
            j.cut.width_mm,
            j.cut.depth_mm,
            j.cut.depth_mm,
            side_name(j.beam1_side),
            side_name(j.beam2_side)
        )?;
    }
    Ok(())
}

fn side_name(side: CutSide) -> &'static str {
    match side {
        CutSide::Positive => "positive",
        CutSide::Negative => "negative",
    }
}

pub fn write_voids<W: Write>(w: &mut W, voids: &ConnectorVoids) -> io::Result<()> {
    writeln!(
        w,
        "Node_ID,Connector_Type,Connector_Degree,Plate_Size_Length_mm,Plate_Size_Width_mm,\
         Void_Length_mm,Void_Width_mm,Void_Depth_mm,Node_X_mm,Node_Y_mm,Node_Z_mm,\
         Avg_Beam_Dir_X,Avg_Beam_Dir_Y,Avg_Beam_Dir_Z,Connected_Beams,Engineered"
    )?;
    for v in &voids.voids {
        writeln!(
            w,
            "{},{},{},{:.1},{:.1},{:.1},{:.1},{:.1},{:.2},{:.2},{:.2},{:.3},{:.3},{:.3},{},{}",
            v.node_id,
            v.class,
            v.degree,
            v.plate_size_mm,
            v.plate_size_mm,
            v.length_mm(),
            v.width_mm(),
            v.void_depth_mm,
            v.position.x,
            v.position.y,
            v.position.z,
            v.direction.x,
            v.direction.y,
            v.direction.z,
            v.connected_beams,
            v.engineered
        )?;
    }
    Ok(())
}

/// One row per node: the panel pair and what is cut into it
pub fn write_panels<W: Write>(w: &mut W, panels: &ConnectorPanels) -> io::Result<()> {
    writeln!(
        w,
        "Node_Name,Connector_Type,Beams,Rods,Panel_Size_mm,Panel_Thickness_mm,Panels,\
         Rod_Holes,Beam_Pockets,Node_X_mm,Node_Y_mm,Node_Z_mm,Engineered"
    )?;
    for p in &panels.panels {
        writeln!(
            w,
            "{},{},{},{},{:.0},{:.1},2,{},{},{:.2},{:.2},{:.2},{}",
            p.name(),
            p.class,
            p.beams,
            p.rods,
            p.size_mm,
            p.thickness_mm,
            p.rod_holes.len(),
            p.pockets.len(),
            p.position.x,
            p.position.y,
            p.position.z,
            p.engineered
        )?;
    }
    Ok(())
}

/// Write one table to `path`
pub fn write_csv_file<F>(path: &Path, write: F) -> TrussResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).map_err(|e| TrussError::file_error("create", path.display().to_string(), e.to_string()))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| TrussError::file_error("write", path.display().to_string(), e.to_string()))
}

/// Tables available for export; absent stages are skipped.
#[derive(Debug, Clone, Copy)]
pub struct ExportTables<'a> {
    pub connectors: &'a ConnectorSpecs,
    pub engineered: Option<&'a EngineeredConnectors>,
    pub half_laps: Option<&'a HalfLapAnalysis>,
    pub voids: Option<&'a ConnectorVoids>,
    pub panels: Option<&'a ConnectorPanels>,
}

/// Write every available table into `dir`.
///
/// The material summary uses engineered rod counts when present.
pub fn export_tables(dir: &Path, tables: &ExportTables<'_>, config: &PipelineConfig) -> TrussResult<(Vec<PathBuf>, StageReport)> {
    let mut report = StageReport::new(Stage::Export);
    let mut written = Vec::new();

    let mut emit = |name: &str, result: TrussResult<()>| -> TrussResult<()> {
        result?;
        written.push(dir.join(name));
        report.record_success();
        Ok(())
    };

    let bom = match tables.engineered {
        Some(e) => e.bill_of_materials(),
        None => tables.connectors.bill_of_materials(),
    };

    emit(
        CONNECTOR_DETAIL_CSV,
        write_csv_file(&dir.join(CONNECTOR_DETAIL_CSV), |w| write_connector_detail(w, tables.connectors)),
    )?;
    emit(
        MATERIAL_SUMMARY_CSV,
        write_csv_file(&dir.join(MATERIAL_SUMMARY_CSV), |w| write_material_summary(w, &bom, config)),
    )?;
    emit(
        CONNECTOR_TYPES_CSV,
        write_csv_file(&dir.join(CONNECTOR_TYPES_CSV), |w| write_connector_types(w, tables.connectors)),
    )?;
    if let Some(engineered) = tables.engineered {
        emit(
            ENGINEERING_REPORT_CSV,
            write_csv_file(&dir.join(ENGINEERING_REPORT_CSV), |w| write_engineering_report(w, engineered)),
        )?;
    }
    if let Some(half_laps) = tables.half_laps {
        emit(HALF_LAP_CSV, write_csv_file(&dir.join(HALF_LAP_CSV), |w| write_half_laps(w, half_laps)))?;
    }
    if let Some(voids) = tables.voids {
        emit(VOIDS_CSV, write_csv_file(&dir.join(VOIDS_CSV), |w| write_voids(w, voids)))?;
    }
    if let Some(panels) = tables.panels {
        emit(PANELS_CSV, write_csv_file(&dir.join(PANELS_CSV), |w| write_panels(w, panels)))?;
    }

    info!(files = written.len(), dir = %dir.display(), "Tables exported");
    report.log_summary();
    Ok((written, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::engineering::engineer_connectors;
    use crate::fixtures::{spider_truss_lines, spider_truss_loads};
    use crate::half_lap::analyze_half_laps;
    use crate::joints::specify_connectors;
    use crate::network::{build_network, Network};
    use crate::panels::design_panels;
    use crate::voids::compute_voids;

    fn spider() -> (Network, ConnectorSpecs) {
        let (network, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (specs, _) = specify_connectors(&network);
        (network, specs)
    }

    fn to_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_connector_detail_rows() {
        let (_, specs) = spider();
        let mut buf = Vec::new();
        write_connector_detail(&mut buf, &specs).unwrap();
        let text = to_string(buf);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 14);
        assert!(lines[0].starts_with("Connector_ID,Node_ID,Type"));
        assert_eq!(lines[1], "C0,0,COMPLEX_JOINT,4,4,6,0.00,0.00,3000.00");
    }

    #[test]
    fn test_material_summary() {
        let config = PipelineConfig::default();
        let mut buf = Vec::new();
        write_material_summary(&mut buf, &BillOfMaterials::for_rods(38, 13), &config).unwrap();
        let text = to_string(buf);
        assert!(text.contains("8mm Hex Nuts,76,pieces"));
        assert!(text.contains("Connector blocks,13,pieces"));
    }

    #[test]
    fn test_connector_types_description_quoted() {
        let (_, specs) = spider();
        let mut buf = Vec::new();
        write_connector_types(&mut buf, &specs).unwrap();
        let text = to_string(buf);
        assert!(text.contains("END_CONNECTOR,6,2,12,End plate connector"));
        assert!(text.contains("Y_JOINT,2,4,8,Y-shaped junction (3 members)"));
    }

    #[test]
    fn test_engineering_report_formatting() {
        let config = PipelineConfig::default();
        let (_, specs) = spider();
        let (engineered, _) = engineer_connectors(&specs, &spider_truss_loads(), &config);
        let mut buf = Vec::new();
        write_engineering_report(&mut buf, &engineered).unwrap();
        let text = to_string(buf);
        let apex = text.lines().nth(1).unwrap();
        assert!(apex.starts_with("N0,apex_concentrate,4000.0,0.0,0.0,4000.0,4.00,5000.0,5.00"));
        assert!(apex.contains(",OK,"));
        assert!(apex.contains('%'));
    }

    #[test]
    fn test_panel_rows() {
        let config = PipelineConfig::default();
        let (network, specs) = spider();
        let (panels, _) = design_panels(&network, &specs, None, &config);
        let mut buf = Vec::new();
        write_panels(&mut buf, &panels).unwrap();
        let text = to_string(buf);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 14);
        assert!(lines[0].starts_with("Node_Name,Connector_Type,Beams,Rods,Panel_Size_mm"));
        assert_eq!(lines[1], "N0,COMPLEX_JOINT,4,6,300,18.0,2,6,8,0.00,0.00,3000.00,false");
    }

    #[test]
    fn test_export_all_tables() {
        let config = PipelineConfig::default();
        let (network, specs) = spider();
        let (engineered, _) = engineer_connectors(&specs, &spider_truss_loads(), &config);
        let (half_laps, _) = analyze_half_laps(&network, &config);
        let (voids, _) = compute_voids(&network, &specs, Some(&engineered), &config);
        let (panels, _) = design_panels(&network, &specs, Some(&engineered), &config);

        let dir = std::env::temp_dir().join(format!("truss_export_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let tables = ExportTables {
            connectors: &specs,
            engineered: Some(&engineered),
            half_laps: Some(&half_laps),
            voids: Some(&voids),
            panels: Some(&panels),
        };
        let (files, report) = export_tables(&dir, &tables, &config).unwrap();

        assert_eq!(files.len(), 7);
        assert_eq!(report.succeeded, 7);
        assert!(files.iter().all(|f| f.exists()));

        let voids_csv = std::fs::read_to_string(dir.join(VOIDS_CSV)).unwrap();
        assert_eq!(voids_csv.lines().count(), 14);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_export_topological_only() {
        let config = PipelineConfig::default();
        let (_, specs) = spider();
        let dir = std::env::temp_dir().join(format!("truss_export_topo_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let tables = ExportTables {
            connectors: &specs,
            engineered: None,
            half_laps: None,
            voids: None,
            panels: None,
        };
        let (files, _) = export_tables(&dir, &tables, &config).unwrap();
        assert_eq!(files.len(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
