use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};

use crate::accel::dispatcher;
use crate::config::Config;
use crate::edges::canny;
use crate::errors::{Result, VisionError};
use crate::field::ScalarField;
use crate::hough::{circle_centres, hough_circles};
use crate::image_io::{save_planes, InputRaster, PlaneSet, RasterFormat};
use crate::image_utils::mark_points;
use crate::kernel::rescale_to_u8;
use crate::morphology::MorphologyOp;
use crate::output::{write_region_csv, write_summary_json, CircleCentre, ImageSummary};
use crate::threshold::{auto_contrast, auto_gamma, level_max, phansalkar, PhansalkarParams};
use crate::watershed::segment;

/// Number of strongest Hough centres kept in the summary and overlay
const MAX_REPORTED_CIRCLES: usize = 16;

/// Where stage images for one input go
struct StageWriter<'a> {
    dir: PathBuf,
    debug_dir: PathBuf,
    filename: &'a str,
    format: RasterFormat,
    template: &'a PlaneSet,
}

impl StageWriter<'_> {
    fn path(&self, dir: &Path, stage: &str) -> PathBuf {
        dir.join(format!("{}_{}.{}", self.filename, stage, self.format.extension()))
    }

    /// Save an 8-bit stage image
    fn save(&self, field: &ScalarField, stage: &str) -> Result<()> {
        self.save_to(&self.dir, field, stage)
    }

    fn save_debug(&self, field: &ScalarField, stage: &str) -> Result<()> {
        std::fs::create_dir_all(&self.debug_dir)?;
        self.save_to(&self.debug_dir, field, stage)
    }

    fn save_to(&self, dir: &Path, field: &ScalarField, stage: &str) -> Result<()> {
        let mut set = PlaneSet::gray(field.clone());
        set.dpi_x = self.template.dpi_x;
        set.dpi_y = self.template.dpi_y;
        let path = self.path(dir, stage);
        save_planes(&set, &path, self.format)?;
        debug!("wrote {}", path.display());
        Ok(())
    }

    /// Stretch to 8 bits and save under debug/. A flat field has nothing to
    /// show, so it is reported and skipped.
    fn save_debug_rescaled(&self, field: &ScalarField, stage: &str) -> Result<()> {
        match rescale_to_u8(field) {
            Ok(stretched) => self.save_debug(&stretched, stage),
            Err(e) => {
                warn!("{}: debug {} image not saved ({})", self.filename, stage, e);
                Ok(())
            }
        }
    }

    /// Save at the source depth when it is 16-bit
    fn save_native(&self, field: &ScalarField, stage: &str) -> Result<()> {
        if self.template.bit_depth() == 16 {
            let set = self.template.with_planes(vec![field.clone()])?;
            save_planes(&set, self.path(&self.dir, stage), self.format)
        } else {
            self.save(field, stage)
        }
    }
}

/// Keep `field` when a correction step reports a degenerate histogram
fn tolerate_degenerate(result: Result<ScalarField>, field: ScalarField, step: &str, filename: &str) -> Result<(ScalarField, bool)> {
    match result {
        Ok(corrected) => Ok((corrected, true)),
        Err(VisionError::DegenerateRange(reason)) => {
            warn!("{}: skipping {} ({})", filename, step, reason);
            Ok((field, false))
        }
        Err(e) => Err(e),
    }
}

/// Run the configured stages on one input and write its outputs
pub fn process_image(input: InputRaster, config: &Config, debug: bool) -> Result<ImageSummary> {
    let started = Instant::now();
    let InputRaster { planes, path, filename } = input;

    let field = planes
        .plane(config.plane)
        .cloned()
        .ok_or_else(|| {
            VisionError::InvalidParameter(format!(
                "{} has {} planes, plane {} requested",
                path.display(),
                planes.plane_count(),
                config.plane
            ))
        })?;

    info!(
        "Processing {} ({}x{}, {} planes, {} bit)",
        filename,
        planes.width(),
        planes.height(),
        planes.plane_count(),
        planes.bit_depth()
    );

    let base_dir = PathBuf::from(&config.output_base_dir);
    let writer = StageWriter {
        dir: base_dir.join("images"),
        debug_dir: base_dir.join("debug"),
        filename: &filename,
        format: config.raster_format()?,
        template: &planes,
    };
    std::fs::create_dir_all(&writer.dir)?;

    let mut stages = Vec::new();

    // Step 1: histogram corrections
    let mut enhanced = field;
    if config.auto_contrast {
        let result = auto_contrast(&enhanced, config.bit_depth);
        let (next, applied) = tolerate_degenerate(result, enhanced, "auto contrast", &filename)?;
        enhanced = next;
        if applied {
            stages.push("contrast".to_string());
        }
    }
    if config.auto_gamma {
        let result = auto_gamma(&enhanced, config.bit_depth);
        let (next, applied) = tolerate_degenerate(result, enhanced, "auto gamma", &filename)?;
        enhanced = next;
        if applied {
            stages.push("gamma".to_string());
        }
    }
    writer.save_native(&enhanced, "enhanced")?;

    // Step 2: local threshold and morphology on the binary mask
    let mut foreground_fraction = None;
    let mut mask = None;
    if let Some(radius) = config.phansalkar_radius {
        let rows = dispatcher(config.use_parallel);
        // Phansalkar normalises by 255
        let source = if config.bit_depth > 8 {
            let scale = 255.0 / level_max(config.bit_depth)? as f32;
            &enhanced * scale
        } else {
            enhanced.clone()
        };
        let binary = phansalkar(&source, radius, &PhansalkarParams::default(), rows.as_ref())?;
        stages.push("phansalkar".to_string());

        let binary = if config.morphology != MorphologyOp::None {
            stages.push(format!("{:?}", config.morphology).to_lowercase());
            config.morphology.apply(&binary, config.morphology_size)?
        } else {
            binary
        };

        let fraction = binary.count_nonzero() as f64 / binary.len().max(1) as f64;
        debug!("{}: foreground fraction {:.4}", filename, fraction);
        foreground_fraction = Some(fraction);
        writer.save(&binary, "binary")?;
        mask = Some(binary);
    } else if config.morphology != MorphologyOp::None {
        enhanced = config.morphology.apply(&enhanced, config.morphology_size)?;
        stages.push(format!("{:?}", config.morphology).to_lowercase());
        writer.save_native(&enhanced, "morphology")?;
    }

    // Step 3: edges
    let edge_map = if config.edges.enabled {
        let map = canny(&enhanced, &config.edges.to_options())?;
        stages.push("edges".to_string());
        writer.save(map.edges(), "edges")?;
        if debug {
            writer.save_debug_rescaled(&map.gradient.magnitude, "gradient")?;
        }
        Some(map)
    } else {
        None
    };

    // Step 4: circle search on the edge map
    let mut circles = Vec::new();
    if let (Some(hough), Some(map)) = (&config.hough, &edge_map) {
        let accumulator = hough_circles(map.edges(), hough.radius, hough.increment, hough.threshold_percent)?;
        stages.push("hough".to_string());
        circles = circle_centres(&accumulator)
            .into_iter()
            .take(MAX_REPORTED_CIRCLES)
            .map(|(x, y, votes)| CircleCentre { x, y, votes })
            .collect();

        let points: Vec<(usize, usize)> = circles.iter().map(|c| (c.x, c.y)).collect();
        writer.save(&mark_points(&enhanced, &points, 255.0, 5), "circles")?;
        if debug {
            writer.save_debug_rescaled(&accumulator, "hough")?;
        }
        info!("{}: {} circle centres of radius {}", filename, circles.len(), hough.radius);
    }

    // Step 5: watershed
    let mut region_count = None;
    let mut boundary_pixels = None;
    if config.watershed.enabled {
        let relief = match (&edge_map, config.watershed.on_gradient) {
            (Some(map), true) => &map.gradient.magnitude,
            _ => mask.as_ref().unwrap_or(&enhanced),
        };
        let segmentation = segment(relief);
        stages.push("watershed".to_string());
        writer.save(&segmentation.boundary_field(config.watershed.color), "watershed")?;

        if config.write_region_report {
            let csv_path = write_region_csv(&segmentation, &base_dir, &filename)?;
            debug!("region report: {}", csv_path.display());
        }
        info!(
            "{}: {} regions, {} boundary pixels",
            filename,
            segmentation.region_count(),
            segmentation.boundary_count()
        );
        region_count = Some(segmentation.region_count());
        boundary_pixels = Some(segmentation.boundary_count());
    }

    let summary = ImageSummary {
        filename: filename.clone(),
        width: planes.width(),
        height: planes.height(),
        bit_depth: planes.bit_depth(),
        plane: config.plane,
        stages,
        mean_intensity: enhanced.mean(),
        foreground_fraction,
        edge_pixels: edge_map.as_ref().map(|m| m.edges().count_nonzero()),
        region_count,
        boundary_pixels,
        circle_centres: circles,
        elapsed_ms: started.elapsed().as_millis(),
    };
    write_summary_json(&summary, &base_dir)?;

    info!("{} done in {} ms", filename, summary.elapsed_ms);
    Ok(summary)
}
