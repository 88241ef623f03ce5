use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;

use crate::errors::Result;
use crate::watershed::{Label, Segmentation};

/// Per-image result written as JSON and collected into the batch CSV
#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub filename: String,
    pub width: usize,
    pub height: usize,
    pub bit_depth: u32,
    pub plane: usize,
    pub stages: Vec<String>,
    pub mean_intensity: f32,
    pub foreground_fraction: Option<f64>,
    pub edge_pixels: Option<usize>,
    pub region_count: Option<u32>,
    pub boundary_pixels: Option<usize>,
    pub circle_centres: Vec<CircleCentre>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CircleCentre {
    pub x: usize,
    pub y: usize,
    pub votes: f32,
}

/// Geometry of one watershed basin
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStats {
    pub id: u32,
    pub area: usize,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

/// Area, centroid and bounding box for every region, ordered by id
pub fn region_statistics(segmentation: &Segmentation) -> Vec<RegionStats> {
    let count = segmentation.region_count() as usize;
    let mut stats: Vec<RegionStats> = (1..=count as u32)
        .map(|id| RegionStats {
            id,
            area: 0,
            centroid_x: 0.0,
            centroid_y: 0.0,
            min_x: usize::MAX,
            min_y: usize::MAX,
            max_x: 0,
            max_y: 0,
        })
        .collect();

    let width = segmentation.width();
    for (i, label) in segmentation.labels().iter().enumerate() {
        if let Label::Region(id) = *label {
            let (x, y) = (i % width, i / width);
            let s = &mut stats[(id - 1) as usize];
            s.area += 1;
            s.centroid_x += x as f64;
            s.centroid_y += y as f64;
            s.min_x = s.min_x.min(x);
            s.min_y = s.min_y.min(y);
            s.max_x = s.max_x.max(x);
            s.max_y = s.max_y.max(y);
        }
    }

    for s in stats.iter_mut().filter(|s| s.area > 0) {
        s.centroid_x /= s.area as f64;
        s.centroid_y /= s.area as f64;
    }

    stats
}

fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write the per-region report to `<output_dir>/regions/<filename>.csv`
pub fn write_region_csv<P: AsRef<Path>>(
    segmentation: &Segmentation,
    output_dir: P,
    filename: &str,
) -> Result<PathBuf> {
    let output_path = output_dir
        .as_ref()
        .join("regions")
        .join(format!("{}.csv", filename));
    prepare(&output_path)?;

    let total = (segmentation.width() * segmentation.height()).max(1) as f64;
    let mut writer = Writer::from_path(&output_path)?;

    writer.write_record([
        "Region_Id",
        "Area_Pixels",
        "Area_Fraction",
        "Centroid_X",
        "Centroid_Y",
        "BBox_Min_X",
        "BBox_Min_Y",
        "BBox_Max_X",
        "BBox_Max_Y",
    ])?;

    for s in region_statistics(segmentation) {
        writer.write_record(&[
            s.id.to_string(),
            s.area.to_string(),
            format!("{:.6}", s.area as f64 / total),
            format!("{:.3}", s.centroid_x),
            format!("{:.3}", s.centroid_y),
            s.min_x.to_string(),
            s.min_y.to_string(),
            s.max_x.to_string(),
            s.max_y.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(output_path)
}

/// Write `<output_dir>/summary/<filename>.json`
pub fn write_summary_json<P: AsRef<Path>>(summary: &ImageSummary, output_dir: P) -> Result<PathBuf> {
    let output_path = output_dir
        .as_ref()
        .join("summary")
        .join(format!("{}.json", summary.filename));
    prepare(&output_path)?;

    let writer = BufWriter::new(File::create(&output_path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(output_path)
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One row per processed image in `<output_dir>/batch_summary.csv`
pub fn write_batch_csv<P: AsRef<Path>>(summaries: &[ImageSummary], output_dir: P) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join("batch_summary.csv");
    prepare(&output_path)?;

    let mut writer = Writer::from_path(&output_path)?;
    writer.write_record([
        "Filename",
        "Width",
        "Height",
        "Bit_Depth",
        "Stages",
        "Mean_Intensity",
        "Foreground_Fraction",
        "Edge_Pixels",
        "Region_Count",
        "Boundary_Pixels",
        "Circles",
        "Elapsed_Ms",
    ])?;

    for s in summaries {
        writer.write_record(&[
            s.filename.clone(),
            s.width.to_string(),
            s.height.to_string(),
            s.bit_depth.to_string(),
            s.stages.join("+"),
            format!("{:.3}", s.mean_intensity),
            optional(s.foreground_fraction.map(|f| format!("{:.6}", f))),
            optional(s.edge_pixels),
            optional(s.region_count),
            optional(s.boundary_pixels),
            s.circle_centres.len().to_string(),
            s.elapsed_ms.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(output_path)
}
