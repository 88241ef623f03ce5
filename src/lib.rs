// src/lib.rs - Library interface for scalar_vision

pub mod accel;
pub mod config;
pub mod edges;
pub mod errors;
pub mod field;
pub mod histogram;
pub mod hough;
pub mod image_io;
pub mod image_utils;
pub mod kernel;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod threshold;
pub mod watershed;

// Re-export commonly used types and functions
pub use config::Config;
pub use errors::{Result, VisionError};
pub use field::ScalarField;
pub use histogram::Histogram;
pub use image_io::{decode_planes, encode_planes, load_planes, save_planes, PlaneSet, RasterFormat};
pub use pipeline::process_image;

// Re-export the processing operations
pub use accel::{dispatcher, lane_count, RayonDispatcher, RowDispatcher, SerialDispatcher};
pub use edges::{canny, hysteresis, non_max_suppression, sobel_gradient, EdgeOptions, Gradient, GradientNorm};
pub use hough::hough_circles;
pub use kernel::{convolve, gaussian, mexican_hat, scale};
pub use morphology::{close, dilate, erode, open};
pub use threshold::{auto_contrast, auto_gamma, invert, phansalkar, PhansalkarParams};
pub use watershed::{segment, watershed, Segmentation};
