use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use rand::Rng;

use crate::{config::ComputeShape, error::ConfigError};

/// Matrix element type together with the type its dot products accumulate in.
pub trait Element: Copy + Send + Sync + 'static {
    type Acc: Copy + Default + Send + Sync + PartialEq + Debug + Display + 'static;

    fn random(rng: &mut impl Rng) -> Self;
    fn one() -> Self;
    fn mul_add(acc: Self::Acc, a: Self, b: Self) -> Self::Acc;
}

impl Element for f32 {
    type Acc = f32;

    fn random(rng: &mut impl Rng) -> Self {
        rng.gen()
    }

    fn one() -> Self {
        1.0
    }

    #[inline(always)]
    fn mul_add(acc: f32, a: f32, b: f32) -> f32 {
        acc + a * b
    }
}

impl Element for i8 {
    type Acc = i32;

    fn random(rng: &mut impl Rng) -> Self {
        rng.gen()
    }

    fn one() -> Self {
        1
    }

    #[inline(always)]
    fn mul_add(acc: i32, a: i8, b: i8) -> i32 {
        acc.wrapping_add(i32::from(a) * i32::from(b))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Precision {
    #[default]
    Fp32,
    Int8,
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fp32" => Ok(Self::Fp32),
            "int8" => Ok(Self::Int8),
            other => Err(ConfigError::UnknownValue {
                what: "precision",
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Fp32 => write!(f, "fp32"),
            Precision::Int8 => write!(f, "int8"),
        }
    }
}

/// `C = A x B` with `A: rows x cols` and `B: cols x b_cols`, row-major.
pub struct Workload<T: Element> {
    shape: ComputeShape,
    a: Vec<T>,
    b: Vec<T>,
}

impl<T: Element> Workload<T> {
    pub fn random(shape: ComputeShape, rng: &mut impl Rng) -> Self {
        let a = (0..shape.rows * shape.cols).map(|_| T::random(rng)).collect();
        let b = (0..shape.cols * shape.b_cols).map(|_| T::random(rng)).collect();
        Self { shape, a, b }
    }

    /// Every output element equals `cols`, which makes results checkable.
    pub fn ones(shape: ComputeShape) -> Self {
        Self {
            shape,
            a: vec![T::one(); shape.rows * shape.cols],
            b: vec![T::one(); shape.cols * shape.b_cols],
        }
    }

    pub fn shape(&self) -> ComputeShape {
        self.shape
    }

    pub fn output(&self) -> Vec<T::Acc> {
        vec![T::Acc::default(); self.shape.rows * self.shape.b_cols]
    }

    /// Computes one row of `C` into `out`, which holds `b_cols` elements.
    #[inline]
    pub fn compute_row(&self, row: usize, out: &mut [T::Acc]) {
        let ComputeShape { cols, b_cols, .. } = self.shape;
        let a_row = &self.a[row * cols..(row + 1) * cols];

        for (j, slot) in out.iter_mut().enumerate().take(b_cols) {
            let mut sum = T::Acc::default();
            for (k, &a) in a_row.iter().enumerate() {
                sum = T::mul_add(sum, a, self.b[k * b_cols + j]);
            }
            *slot = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ones_produce_column_count() {
        let shape = ComputeShape {
            rows: 8,
            cols: 64,
            b_cols: 2,
        };
        let workload = Workload::<i8>::ones(shape);
        let mut out = workload.output();
        for row in 0..shape.rows {
            workload.compute_row(row, &mut out[row * 2..row * 2 + 2]);
        }
        assert!(out.iter().all(|&v| v == 64));
    }

    #[test]
    fn int8_accumulates_without_overflow() {
        assert_eq!(i8::mul_add(0, -128, -128), 16384);
        assert_eq!(<f32 as Element>::mul_add(1.0, 2.0, 3.0), 7.0);
    }
}
