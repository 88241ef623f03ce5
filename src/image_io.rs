use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, ImageOutputFormat, Luma, LumaA, Rgb, Rgba};
use log::debug;
use png::{BitDepth, ColorType, PixelDimensions, Unit};
use rayon::prelude::*;
use tiff::decoder::ifd::Value;
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::{ResolutionUnit, Tag};

use crate::errors::{Result, VisionError};
use crate::field::ScalarField;

/// Resolution assumed when the source carries none.
pub const DEFAULT_DPI: f64 = 72.0;

const METRES_PER_INCH: f64 = 0.0254;

/// File extensions picked up by directory scans.
pub const RASTER_EXTENSIONS: [&str; 6] = ["png", "bmp", "jpg", "jpeg", "tif", "tiff"];

/// Decoded raster split into one [`ScalarField`] per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneSet {
    width: usize,
    height: usize,
    bit_depth: u32,
    pub dpi_x: f64,
    pub dpi_y: f64,
    planes: Vec<ScalarField>,
}

impl PlaneSet {
    /// Assemble from same-sized planes. `bit_depth` must be 8 or 16, and
    /// 16-bit sets hold exactly one plane.
    pub fn new(planes: Vec<ScalarField>, bit_depth: u32) -> Result<Self> {
        let (width, height) = planes
            .first()
            .map(|p| p.dimensions())
            .ok_or_else(|| VisionError::InvalidParameter("plane set needs at least one plane".to_string()))?;

        for plane in &planes {
            if plane.dimensions() != (width, height) {
                return Err(VisionError::mismatch((width, height), plane.dimensions()));
            }
        }
        if planes.len() > 4 {
            return Err(VisionError::UnsupportedFormat(format!(
                "{} planes per pixel",
                planes.len()
            )));
        }
        match (bit_depth, planes.len()) {
            (8, _) | (16, 1) => {}
            _ => {
                return Err(VisionError::UnsupportedFormat(format!(
                    "{}-bit samples with {} planes",
                    bit_depth,
                    planes.len()
                )))
            }
        }

        Ok(Self {
            width,
            height,
            bit_depth,
            dpi_x: DEFAULT_DPI,
            dpi_y: DEFAULT_DPI,
            planes,
        })
    }

    /// Single 8-bit grey plane.
    pub fn gray(plane: ScalarField) -> Self {
        let (width, height) = plane.dimensions();
        Self {
            width,
            height,
            bit_depth: 8,
            dpi_x: DEFAULT_DPI,
            dpi_y: DEFAULT_DPI,
            planes: vec![plane],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Bits per sample of every plane.
    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> Option<&ScalarField> {
        self.planes.get(index)
    }

    pub fn planes(&self) -> &[ScalarField] {
        &self.planes
    }

    /// Same metadata, different samples.
    pub fn with_planes(&self, planes: Vec<ScalarField>) -> Result<Self> {
        let mut set = Self::new(planes, self.bit_depth)?;
        set.dpi_x = self.dpi_x;
        set.dpi_y = self.dpi_y;
        Ok(set)
    }
}

/// Output container for [`encode_planes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Bmp,
    Png,
    Jpeg { quality: u8 },
    Tiff,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Bmp => "bmp",
            RasterFormat::Png => "png",
            RasterFormat::Jpeg { .. } => "jpg",
            RasterFormat::Tiff => "tiff",
        }
    }

    /// Parse a format name (`bmp`, `png`, `jpeg`/`jpg`, `tiff`/`tif`).
    pub fn from_name(name: &str, jpeg_quality: u8) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bmp" => Ok(RasterFormat::Bmp),
            "png" => Ok(RasterFormat::Png),
            "jpg" | "jpeg" => Ok(RasterFormat::Jpeg {
                quality: jpeg_quality,
            }),
            "tif" | "tiff" => Ok(RasterFormat::Tiff),
            other => Err(VisionError::UnsupportedFormat(other.to_string())),
        }
    }

    fn output_format(self) -> ImageOutputFormat {
        match self {
            RasterFormat::Bmp => ImageOutputFormat::Bmp,
            RasterFormat::Png => ImageOutputFormat::Png,
            RasterFormat::Jpeg { quality } => ImageOutputFormat::Jpeg(quality),
            RasterFormat::Tiff => ImageOutputFormat::Tiff,
        }
    }
}

/// Split interleaved samples into planes.
fn unpack<T>(raw: &[T], width: usize, height: usize, channels: usize) -> Vec<ScalarField>
where
    T: Copy + Into<f32> + Sync,
{
    (0..channels)
        .into_par_iter()
        .map(|c| {
            let data = raw.iter().skip(c).step_by(channels).map(|&v| v.into()).collect();
            ScalarField::from_raw(width, height, data)
        })
        .collect()
}

/// Interleave planes, clamping into `[0, max]` and truncating.
fn pack<T, F>(planes: &[ScalarField], max: f32, convert: F) -> Vec<T>
where
    T: Copy + Default + Send,
    F: Fn(f32) -> T + Sync,
{
    let channels = planes.len();
    let pixels = planes.first().map(|p| p.len()).unwrap_or(0);
    let mut out = vec![T::default(); pixels * channels];

    out.par_chunks_mut(channels).enumerate().for_each(|(i, px)| {
        for (sample, plane) in px.iter_mut().zip(planes) {
            *sample = convert(plane[i].clamp(0.0, max));
        }
    });
    out
}

fn from_dynamic(img: DynamicImage) -> Result<PlaneSet> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let (planes, depth) = match img {
        DynamicImage::ImageLuma16(buf) => (unpack(buf.as_raw(), w, h, 1), 16),
        DynamicImage::ImageLuma8(buf) => (unpack(buf.as_raw(), w, h, 1), 8),
        DynamicImage::ImageLumaA8(buf) => (unpack(buf.as_raw(), w, h, 2), 8),
        DynamicImage::ImageRgb8(buf) => (unpack(buf.as_raw(), w, h, 3), 8),
        DynamicImage::ImageRgba8(buf) => (unpack(buf.as_raw(), w, h, 4), 8),
        other if other.color().has_alpha() => (unpack(other.to_rgba8().as_raw(), w, h, 4), 8),
        other => (unpack(other.to_rgb8().as_raw(), w, h, 3), 8),
    };
    debug!("decoded {}x{} raster: {} planes at {} bits", w, h, planes.len(), depth);
    PlaneSet::new(planes, depth)
}

fn to_dynamic(set: &PlaneSet) -> Result<DynamicImage> {
    let (w, h) = (set.width as u32, set.height as u32);
    let bad_buffer = || VisionError::InvalidParameter("sample buffer does not match raster size".to_string());

    if set.bit_depth == 16 {
        let raw = pack(&set.planes, u16::MAX as f32, |v| v as u16);
        let buf = ImageBuffer::<Luma<u16>, _>::from_raw(w, h, raw).ok_or_else(bad_buffer)?;
        return Ok(DynamicImage::ImageLuma16(buf));
    }

    let raw = pack(&set.planes, u8::MAX as f32, |v| v as u8);
    let img = match set.planes.len() {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, raw).ok_or_else(bad_buffer)?),
        2 => DynamicImage::ImageLumaA8(ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, raw).ok_or_else(bad_buffer)?),
        3 => DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, raw).ok_or_else(bad_buffer)?),
        4 => DynamicImage::ImageRgba8(ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, raw).ok_or_else(bad_buffer)?),
        n => return Err(VisionError::UnsupportedFormat(format!("{} planes per pixel", n))),
    };
    Ok(img)
}

/// A decoded input file with its naming metadata
#[derive(Debug, Clone)]
pub struct InputRaster {
    pub planes: PlaneSet,
    pub path: PathBuf,
    pub filename: String,
}

/// Load a raster and remember where it came from
pub fn load_input<P: AsRef<Path>>(path: P) -> Result<InputRaster> {
    let path = path.as_ref();

    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| VisionError::InvalidPath(path.to_path_buf()))?
        .to_string();

    Ok(InputRaster {
        planes: load_planes(path)?,
        path: path.to_path_buf(),
        filename,
    })
}

/// Decode an in-memory raster.
///
/// PNG `pHYs` and TIFF resolution tags set `dpi_x`/`dpi_y`; other sources
/// keep [`DEFAULT_DPI`].
pub fn decode_planes(bytes: &[u8]) -> Result<PlaneSet> {
    let mut set = from_dynamic(image::load_from_memory(bytes)?)?;
    if let Some((dpi_x, dpi_y)) = read_resolution(bytes) {
        set.dpi_x = dpi_x;
        set.dpi_y = dpi_y;
    }
    Ok(set)
}

/// Load a raster file from disk.
pub fn load_planes<P: AsRef<Path>>(path: P) -> Result<PlaneSet> {
    decode_planes(&fs::read(path)?)
}

fn read_resolution(bytes: &[u8]) -> Option<(f64, f64)> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => png_resolution(bytes),
        ImageFormat::Tiff => tiff_resolution(bytes),
        _ => None,
    }
}

fn png_resolution(bytes: &[u8]) -> Option<(f64, f64)> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    match dims.unit {
        Unit::Meter => Some((
            dims.xppu as f64 * METRES_PER_INCH,
            dims.yppu as f64 * METRES_PER_INCH,
        )),
        // aspect ratio only
        Unit::Unspecified => None,
    }
}

fn rational(value: Value) -> Option<f64> {
    match value {
        Value::Rational(n, d) if d != 0 => Some(n as f64 / d as f64),
        Value::Float(v) => Some(v as f64),
        Value::Double(v) => Some(v),
        _ => None,
    }
}

fn tiff_resolution(bytes: &[u8]) -> Option<(f64, f64)> {
    let mut decoder = tiff::decoder::Decoder::new(Cursor::new(bytes)).ok()?;
    // ResolutionUnit defaults to inches when absent
    let per_inch = match decoder.get_tag_u32(Tag::ResolutionUnit).unwrap_or(2) {
        2 => 1.0,
        3 => 2.54,
        _ => return None,
    };
    let x = rational(decoder.get_tag(Tag::XResolution).ok()?)?;
    let y = decoder.get_tag(Tag::YResolution).ok().and_then(rational).unwrap_or(x);
    Some((x * per_inch, y * per_inch))
}

/// Dots per inch as a TIFF rational with two decimals.
fn dpi_rational(dpi: f64) -> Rational {
    Rational {
        n: (dpi * 100.0).round().max(0.0) as u32,
        d: 100,
    }
}

fn encode_png(set: &PlaneSet) -> Result<Vec<u8>> {
    let color = match set.planes.len() {
        1 => ColorType::Grayscale,
        2 => ColorType::GrayscaleAlpha,
        3 => ColorType::Rgb,
        4 => ColorType::Rgba,
        n => return Err(VisionError::UnsupportedFormat(format!("{} planes per pixel", n))),
    };
    let (depth, samples): (BitDepth, Vec<u8>) = if set.bit_depth == 16 {
        let raw: Vec<u16> = pack(&set.planes, u16::MAX as f32, |v| v as u16);
        (BitDepth::Sixteen, raw.iter().flat_map(|v| v.to_be_bytes()).collect())
    } else {
        (BitDepth::Eight, pack(&set.planes, u8::MAX as f32, |v| v as u8))
    };

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, set.width as u32, set.height as u32);
    encoder.set_color(color);
    encoder.set_depth(depth);
    encoder.set_pixel_dims(Some(PixelDimensions {
        xppu: (set.dpi_x / METRES_PER_INCH).round().max(0.0) as u32,
        yppu: (set.dpi_y / METRES_PER_INCH).round().max(0.0) as u32,
        unit: Unit::Meter,
    }));

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&samples)?;
    writer.finish()?;
    Ok(out)
}

fn encode_tiff(set: &PlaneSet) -> Result<Vec<u8>> {
    let (w, h) = (set.width as u32, set.height as u32);
    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = TiffEncoder::new(&mut cursor)?;

    macro_rules! write_image {
        ($color:ty, $data:expr) => {{
            let mut image = encoder.new_image::<$color>(w, h)?;
            image.resolution_unit(ResolutionUnit::Inch);
            image.x_resolution(dpi_rational(set.dpi_x));
            image.y_resolution(dpi_rational(set.dpi_y));
            image.write_data(&$data)?;
        }};
    }

    match (set.bit_depth, set.planes.len()) {
        (16, _) => write_image!(colortype::Gray16, pack(&set.planes, u16::MAX as f32, |v| v as u16)),
        (_, 1) => write_image!(colortype::Gray8, pack(&set.planes, u8::MAX as f32, |v| v as u8)),
        (_, 3) => write_image!(colortype::RGB8, pack(&set.planes, u8::MAX as f32, |v| v as u8)),
        (_, 4) => write_image!(colortype::RGBA8, pack(&set.planes, u8::MAX as f32, |v| v as u8)),
        (_, n) => {
            return Err(VisionError::UnsupportedFormat(format!(
                "{} planes per pixel in TIFF",
                n
            )))
        }
    }

    Ok(cursor.into_inner())
}

/// Encode planes into `format`.
///
/// PNG and TIFF carry the set's resolution. Formats without alpha or 16-bit
/// support get a reduced copy: JPEG drops alpha, BMP and JPEG fall back to
/// 8-bit samples.
pub fn encode_planes(set: &PlaneSet, format: RasterFormat) -> Result<Vec<u8>> {
    match format {
        RasterFormat::Png => return encode_png(set),
        RasterFormat::Tiff => return encode_tiff(set),
        _ => {}
    }

    let mut img = to_dynamic(set)?;

    img = match format {
        RasterFormat::Jpeg { .. } if img.color().has_alpha() || set.bit_depth == 16 => {
            if img.color().has_color() {
                DynamicImage::ImageRgb8(img.to_rgb8())
            } else {
                DynamicImage::ImageLuma8(img.to_luma8())
            }
        }
        RasterFormat::Bmp if set.bit_depth == 16 => DynamicImage::ImageLuma8(img.to_luma8()),
        _ => img,
    };

    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format.output_format())?;
    Ok(cursor.into_inner())
}

/// Encode and write to `path`.
pub fn save_planes<P: AsRef<Path>>(set: &PlaneSet, path: P, format: RasterFormat) -> Result<()> {
    let bytes = encode_planes(set, format)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Get all raster files from a directory (recursively), sorted
pub fn get_raster_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(VisionError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(VisionError::Config(format!(
            "{} is not a directory",
            dir_path.display()
        )));
    }

    let mut files = Vec::new();
    find_raster_files_recursive(dir_path, &mut files)?;
    files.sort();

    Ok(files)
}

fn find_raster_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_raster_files_recursive(&path, result)?;
        } else if path.is_file() && is_raster_file(&path) {
            result.push(path);
        }
    }

    Ok(())
}

/// Whether the extension is one of [`RASTER_EXTENSIONS`].
pub fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RASTER_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
