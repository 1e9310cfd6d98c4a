use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};

/// Complex scalar split into real and imaginary parts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// Flat element storage of an [`NdArray`]
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Complex(Vec<Complex>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            ArrayData::Bool(_) => "bool",
            ArrayData::Int(_) => "int64",
            ArrayData::Float(_) => "float64",
            ArrayData::Complex(_) => "complex128",
        }
    }
}

/// Row-major numeric array: shape plus flat data
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Build an array, the element count has to match the shape
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |count, &dim| count.checked_mul(dim))
            .ok_or_else(|| {
                Error::unknown_data_format(format!("array shape {shape:?} is too large"))
            })?;
        if expected != data.len() {
            return Err(Error::unknown_data_format(format!(
                "array of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One dimensional float array
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Float(values),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn dtype(&self) -> &'static str {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_data() {
        assert!(NdArray::new(vec![2, 3], ArrayData::Int(vec![1, 2, 3, 4, 5, 6])).is_ok());
        assert!(NdArray::new(vec![2, 3], ArrayData::Int(vec![1, 2, 3])).is_err());
    }

    #[test]
    fn test_overflowing_shape_is_rejected() {
        let huge = 1usize << (usize::BITS / 2);
        let err = NdArray::new(vec![huge, huge, huge], ArrayData::Int(vec![])).unwrap_err();
        assert!(matches!(err, Error::UnknownDataFormat { .. }));
    }

    #[test]
    fn test_scalar_shape() {
        let scalar = NdArray::new(vec![], ArrayData::Float(vec![1.5])).unwrap();
        assert_eq!(scalar.len(), 1);
        assert_eq!(scalar.dtype(), "float64");
    }
}
