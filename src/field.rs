//! Dense single-plane `f32` field in row-major layout.
//!
//! Every image plane flowing through the library is a [`ScalarField`].
//! Pixels are addressed either by `(x, y)` or by the linear index
//! `y * width + x`. Arithmetic never mutates its operands; binary
//! operations check shapes up front and report [`VisionError::DimensionMismatch`].

use std::ops::{Add, Div, Index, IndexMut, Mul, Sub};

use rayon::prelude::*;

use crate::errors::{Result, VisionError};

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl ScalarField {
    /// Zero-filled field of `width × height`.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Square zero-filled field, mostly useful for kernels.
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing row-major buffer.
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(VisionError::InvalidParameter(format!(
                "buffer of {} values cannot back a {}x{} field",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Crate-internal constructor for buffers whose length is known to match.
    pub(crate) fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self { width, height, data }
    }

    /// Build from a slice of rows (`rows[y][x]`). All rows must have the same length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(VisionError::InvalidParameter(format!(
                    "row {} has {} values, expected {}",
                    y,
                    row.len(),
                    width
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { width, height, data })
    }

    /// Copy out as nested rows (`rows[y][x]`).
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.rows().map(|r| r.to_vec()).collect()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear index of `(x, y)`.
    #[inline]
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.index_of(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let i = self.index_of(x, y);
        self.data[i] = value;
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks(0) panics; a zero-width field simply has no rows to yield
        let width = self.width.max(1);
        self.data.chunks(width).take(self.height)
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Fails with `DimensionMismatch` unless `other` has the same shape.
    pub fn ensure_same_shape(&self, other: &ScalarField) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(VisionError::mismatch(self.dimensions(), other.dimensions()));
        }
        Ok(())
    }

    fn zip_with<F>(&self, other: &ScalarField, op: F) -> Result<ScalarField>
    where
        F: Fn(f32, f32) -> f32,
    {
        self.ensure_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| op(a, b))
            .collect();
        Ok(ScalarField {
            width: self.width,
            height: self.height,
            data,
        })
    }

    pub fn add(&self, other: &ScalarField) -> Result<ScalarField> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &ScalarField) -> Result<ScalarField> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn multiply(&self, other: &ScalarField) -> Result<ScalarField> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Elementwise division. Division by a zero element follows IEEE-754.
    pub fn divide(&self, other: &ScalarField) -> Result<ScalarField> {
        self.zip_with(other, |a, b| a / b)
    }

    /// Elementwise average of two fields, used to overlay a mask on an image.
    pub fn overlay(&self, other: &ScalarField) -> Result<ScalarField> {
        self.zip_with(other, |a, b| (a + b) / 2.0)
    }

    pub fn map<F>(&self, op: F) -> ScalarField
    where
        F: Fn(f32) -> f32,
    {
        ScalarField {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| op(v)).collect(),
        }
    }

    /// Same as [`ScalarField::map`] but spread over the rayon pool.
    pub fn par_map<F>(&self, op: F) -> ScalarField
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        ScalarField {
            width: self.width,
            height: self.height,
            data: self.data.par_iter().map(|&v| op(v)).collect(),
        }
    }

    pub fn sqrt(&self) -> ScalarField {
        self.map(f32::sqrt)
    }

    pub fn abs(&self) -> ScalarField {
        self.map(f32::abs)
    }

    pub fn powf(&self, exponent: f32) -> ScalarField {
        self.map(|v| v.powf(exponent))
    }

    /// Rectangular sub-field starting at `(x, y)`.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Result<ScalarField> {
        if x + width > self.width || y + height > self.height {
            return Err(VisionError::InvalidParameter(format!(
                "crop {}x{} at ({}, {}) leaves a {}x{} field",
                width, height, x, y, self.width, self.height
            )));
        }
        let mut data = Vec::with_capacity(width * height);
        for row in y..y + height {
            data.extend_from_slice(&self.row(row)[x..x + width]);
        }
        Ok(ScalarField { width, height, data })
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    pub fn mean(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        (self.sum() / self.len() as f64) as f32
    }

    /// Mean squared deviation from the mean (population variance).
    pub fn variance(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.sum() / self.len() as f64;
        let sq: f64 = self
            .data
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum();
        (sq / self.len() as f64) as f32
    }

    pub fn std_dev(&self) -> f32 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Number of elements that are not zero.
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }
}

impl Index<usize> for ScalarField {
    type Output = f32;

    #[inline]
    fn index(&self, index: usize) -> &f32 {
        &self.data[index]
    }
}

impl IndexMut<usize> for ScalarField {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.data[index]
    }
}

impl Index<(usize, usize)> for ScalarField {
    type Output = f32;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &f32 {
        &self.data[y * self.width + x]
    }
}

impl IndexMut<(usize, usize)> for ScalarField {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut f32 {
        let w = self.width;
        &mut self.data[y * w + x]
    }
}

// Scalar broadcast operators. Shapes cannot disagree, so these are infallible.

impl Add<f32> for &ScalarField {
    type Output = ScalarField;

    fn add(self, rhs: f32) -> ScalarField {
        self.map(|v| v + rhs)
    }
}

impl Sub<f32> for &ScalarField {
    type Output = ScalarField;

    fn sub(self, rhs: f32) -> ScalarField {
        self.map(|v| v - rhs)
    }
}

impl Mul<f32> for &ScalarField {
    type Output = ScalarField;

    fn mul(self, rhs: f32) -> ScalarField {
        self.map(|v| v * rhs)
    }
}

impl Div<f32> for &ScalarField {
    type Output = ScalarField;

    fn div(self, rhs: f32) -> ScalarField {
        self.map(|v| v / rhs)
    }
}
