use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::edges::{BlurOptions, EdgeOptions, GradientNorm, HysteresisOptions};
use crate::errors::{Result, VisionError};
use crate::image_io::RasterFormat;
use crate::morphology::MorphologyOp;
use crate::threshold::level_max;

/// Configuration for a scalar_vision run
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    /// bmp | png | jpeg | tiff
    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    /// Which decoded plane to analyse (0 = grey / red)
    #[serde(default)]
    pub plane: usize,

    /// Bit depth assumed by contrast and gamma correction
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u32,

    #[serde(default = "default_true")]
    pub auto_contrast: bool,

    #[serde(default)]
    pub auto_gamma: bool,

    /// Window radius for Phansalkar thresholding; disabled when absent
    #[serde(default)]
    pub phansalkar_radius: Option<usize>,

    #[serde(default)]
    pub morphology: MorphologyOp,

    #[serde(default = "default_morphology_size")]
    pub morphology_size: u32,

    #[serde(default = "default_true")]
    pub write_region_report: bool,

    #[serde(default)]
    pub edges: EdgeConfig,

    #[serde(default)]
    pub watershed: WatershedConfig,

    /// Fixed-radius circle search on the edge map; disabled when absent
    #[serde(default)]
    pub hough: Option<HoughConfig>,
}

/// `[edges]` table
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EdgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub norm: GradientNorm,

    #[serde(default = "default_true")]
    pub blur: bool,

    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    #[serde(default = "default_blur_size")]
    pub blur_size: usize,

    /// Link edges with hysteresis; otherwise keep the thinned magnitude
    #[serde(default = "default_true")]
    pub hysteresis: bool,

    #[serde(default = "default_low_threshold")]
    pub low: f32,

    #[serde(default = "default_high_threshold")]
    pub high: f32,
}

/// `[watershed]` table
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatershedConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_marker_value")]
    pub color: f32,

    /// Flood the gradient magnitude instead of the intensities
    #[serde(default = "default_true")]
    pub on_gradient: bool,
}

/// `[hough]` table
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HoughConfig {
    pub radius: u32,

    #[serde(default = "default_hough_increment")]
    pub increment: u32,

    #[serde(default = "default_hough_threshold")]
    pub threshold_percent: f32,
}

fn default_output_format() -> String {
    "png".to_string()
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_parallel() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_bit_depth() -> u32 {
    8
}

fn default_morphology_size() -> u32 {
    5
}

fn default_blur_sigma() -> f32 {
    0.6
}

fn default_blur_size() -> usize {
    5
}

fn default_low_threshold() -> f32 {
    20.0
}

fn default_high_threshold() -> f32 {
    60.0
}

fn default_marker_value() -> f32 {
    255.0
}

fn default_hough_increment() -> u32 {
    5
}

fn default_hough_threshold() -> f32 {
    30.0
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            norm: GradientNorm::default(),
            blur: true,
            blur_sigma: default_blur_sigma(),
            blur_size: default_blur_size(),
            hysteresis: true,
            low: default_low_threshold(),
            high: default_high_threshold(),
        }
    }
}

impl Default for WatershedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            color: default_marker_value(),
            on_gradient: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "./input".to_string(),
            output_base_dir: "./output".to_string(),
            output_format: default_output_format(),
            jpeg_quality: default_jpeg_quality(),
            use_parallel: true,
            plane: 0,
            bit_depth: default_bit_depth(),
            auto_contrast: true,
            auto_gamma: false,
            phansalkar_radius: None,
            morphology: MorphologyOp::None,
            morphology_size: default_morphology_size(),
            write_region_report: true,
            edges: EdgeConfig::default(),
            watershed: WatershedConfig::default(),
            hough: None,
        }
    }
}

impl EdgeConfig {
    /// Options for [`crate::edges::canny`]; the edge marker is the top of the 8-bit range.
    pub fn to_options(&self) -> EdgeOptions {
        EdgeOptions {
            norm: self.norm,
            blur: self.blur.then_some(BlurOptions {
                sigma: self.blur_sigma,
                size: self.blur_size,
            }),
            hysteresis: self.hysteresis.then_some(HysteresisOptions {
                low: self.low,
                high: self.high,
                edge_value: 255.0,
            }),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            VisionError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| VisionError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Output container selected by `output_format` / `jpeg_quality`
    pub fn raster_format(&self) -> Result<RasterFormat> {
        RasterFormat::from_name(&self.output_format, self.jpeg_quality)
    }

    /// Validate configuration and create the output directory
    pub fn validate(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(VisionError::InvalidPath(input_path));
        }

        self.validate_parameters()?;

        let base_dir = PathBuf::from(&self.output_base_dir);
        fs::create_dir_all(&base_dir).map_err(|e| {
            VisionError::Io(io::Error::new(
                ErrorKind::Other,
                format!("Failed to create output directory {}: {}", base_dir.display(), e),
            ))
        })?;

        Ok(())
    }

    /// Parameter checks that do not touch the filesystem
    pub fn validate_parameters(&self) -> Result<()> {
        level_max(self.bit_depth).map_err(|_| {
            VisionError::Config(format!("bit_depth must be within 1..=16, got {}", self.bit_depth))
        })?;

        self.raster_format()?;
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(VisionError::Config(
                "jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.morphology != MorphologyOp::None && self.morphology_size == 0 {
            return Err(VisionError::Config(
                "morphology_size must be > 0".to_string(),
            ));
        }

        if self.edges.enabled {
            if self.edges.blur && (self.edges.blur_sigma <= 0.0 || self.edges.blur_size == 0) {
                return Err(VisionError::Config(
                    "edges.blur_sigma and edges.blur_size must be > 0".to_string(),
                ));
            }
            if self.edges.hysteresis && self.edges.low > self.edges.high {
                return Err(VisionError::Config(format!(
                    "edges.low ({}) must not exceed edges.high ({})",
                    self.edges.low, self.edges.high
                )));
            }
        }

        if let Some(hough) = &self.hough {
            if hough.radius == 0 || hough.increment == 0 {
                return Err(VisionError::Config(
                    "hough.radius and hough.increment must be > 0".to_string(),
                ));
            }
            if !self.edges.enabled {
                return Err(VisionError::Config(
                    "hough requires edges.enabled".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            VisionError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}
