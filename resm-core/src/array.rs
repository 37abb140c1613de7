//! Labelled numeric fields.
//!
//! A [`DataArray`] is an n-dimensional `f64` buffer tagged with one name per
//! axis and a unit string. The buffer lives behind a [`SharedArray`] handle:
//! cloning a `DataArray` shares the buffer, so an in-place write through one
//! handle is visible through every other. Use [`DataArray::deep_copy`] for a
//! caller-owned copy.

use crate::errors::{RESMError, RESMResult};
use crate::units::{self, Conversion};
use ndarray::{ArrayD, IxDyn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

pub type FloatValue = f64;

/// Reference-counted handle to a numeric buffer.
///
/// `Clone` shares the buffer. Writes go through [`SharedArray::write`] and are
/// observed by every handle to the same buffer.
#[derive(Clone, Default)]
pub struct SharedArray(Arc<RwLock<ArrayD<FloatValue>>>);

impl SharedArray {
    pub fn new(values: ArrayD<FloatValue>) -> Self {
        Self(Arc::new(RwLock::new(values)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ArrayD<FloatValue>> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ArrayD<FloatValue>> {
        self.0.write()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.read().shape().to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.read().ndim()
    }

    /// Copy of the current contents.
    pub fn to_owned_array(&self) -> ArrayD<FloatValue> {
        self.read().clone()
    }

    /// A new handle to a copy of the buffer.
    pub fn deep_copy(&self) -> Self {
        Self::new(self.to_owned_array())
    }

    /// True when both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<ArrayD<FloatValue>> for SharedArray {
    fn from(values: ArrayD<FloatValue>) -> Self {
        Self::new(values)
    }
}

impl fmt::Debug for SharedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedArray({:?})", self.read())
    }
}

/// A tagged array: buffer, dimension names and units.
#[derive(Debug, Clone)]
pub struct DataArray {
    data: SharedArray,
    dims: Vec<String>,
    units: String,
}

impl DataArray {
    /// Wraps `values` in a new buffer.
    pub fn new<I, S>(values: ArrayD<FloatValue>, dims: I, units: &str) -> RESMResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_shared(SharedArray::new(values), dims, units)
    }

    /// Tags an existing buffer without copying it.
    pub fn from_shared<I, S>(data: SharedArray, dims: I, units: &str) -> RESMResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        let ndim = data.ndim();
        if dims.len() != ndim {
            return Err(RESMError::InvalidState(format!(
                "{} dimension names given for a {ndim}-dimensional array",
                dims.len()
            )));
        }
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(RESMError::InvalidState(format!(
                    "dimension '{dim}' appears more than once"
                )));
            }
        }
        units::parse_unit(units)?;
        Ok(Self {
            data,
            dims,
            units: units.to_string(),
        })
    }

    /// A zero-dimensional array holding `value`.
    pub fn scalar(value: FloatValue, units: &str) -> RESMResult<Self> {
        Self::new(
            ArrayD::from_elem(IxDyn(&[]), value),
            Vec::<String>::new(),
            units,
        )
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Length of the named dimension, if present.
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        let i = self.dims.iter().position(|d| d == dim)?;
        Some(self.data.read().shape()[i])
    }

    /// The shared buffer behind this array.
    pub fn data(&self) -> &SharedArray {
        &self.data
    }

    /// Copy of the values.
    pub fn values(&self) -> ArrayD<FloatValue> {
        self.data.to_owned_array()
    }

    /// Value of a zero-dimensional or single-element array.
    pub fn item(&self) -> RESMResult<FloatValue> {
        let data = self.data.read();
        match data.len() {
            1 => Ok(data.iter().copied().next().unwrap_or_default()),
            n => Err(RESMError::InvalidState(format!(
                "expected a single value, found {n}"
            ))),
        }
    }

    pub fn deep_copy(&self) -> Self {
        Self {
            data: self.data.deep_copy(),
            dims: self.dims.clone(),
            units: self.units.clone(),
        }
    }

    /// Same values expressed in `units`.
    ///
    /// When no conversion is needed the result shares this array's buffer.
    pub fn to_units(&self, units: &str) -> RESMResult<Self> {
        self.to_units_for("array", units)
    }

    pub(crate) fn to_units_for(&self, name: &str, units: &str) -> RESMResult<Self> {
        let conversion = units::conversion_for(name, &self.units, units)?;
        let data = if conversion.is_identity() {
            self.data.clone()
        } else {
            SharedArray::new(conversion.apply_array(&self.data.read()))
        };
        Ok(Self {
            data,
            dims: self.dims.clone(),
            units: units.to_string(),
        })
    }

    /// Values laid out in `dims` order and converted into `units`.
    ///
    /// `dims` must name the same set of dimensions as this array.
    pub fn values_as(&self, dims: &[String], units: &str) -> RESMResult<ArrayD<FloatValue>> {
        let conversion = units::conversion_for("array", &self.units, units)?;
        self.aligned(dims, conversion)
    }

    fn aligned(&self, dims: &[String], conversion: Conversion) -> RESMResult<ArrayD<FloatValue>> {
        let permutation = dims
            .iter()
            .map(|d| self.dims.iter().position(|own| own == d))
            .collect::<Option<Vec<usize>>>()
            .filter(|p| p.len() == self.dims.len())
            .ok_or_else(|| {
                RESMError::dimension_mismatch(
                    "array",
                    format!(
                        "cannot align dimensions {:?} with {:?}",
                        self.dims, dims
                    ),
                )
            })?;
        let data = self.data.read();
        let view = data.view().permuted_axes(permutation);
        Ok(if conversion.is_identity() {
            view.to_owned()
        } else {
            view.mapv(|v| conversion.apply(v))
        })
    }

    fn combine(
        &self,
        other: &Self,
        op: impl Fn(FloatValue, FloatValue) -> FloatValue,
    ) -> RESMResult<Self> {
        let rhs = other.values_as(&self.dims, &self.units)?;
        let lhs = self.data.read();
        if lhs.shape() != rhs.shape() {
            return Err(RESMError::dimension_mismatch(
                "array",
                format!(
                    "shapes {:?} and {:?} differ along {:?}",
                    lhs.shape(),
                    rhs.shape(),
                    self.dims
                ),
            ));
        }
        let mut out = lhs.to_owned();
        out.zip_mut_with(&rhs, |a, &b| *a = op(*a, b));
        Ok(Self {
            data: SharedArray::new(out),
            dims: self.dims.clone(),
            units: self.units.clone(),
        })
    }

    /// Element-wise sum in a new buffer.
    ///
    /// `other` is converted to this array's units and aligned to its
    /// dimension order; the result keeps this array's dims and units.
    pub fn add(&self, other: &Self) -> RESMResult<Self> {
        self.combine(other, |a, b| a + b)
    }

    /// Element-wise difference in a new buffer, aligned as in [`DataArray::add`].
    pub fn sub(&self, other: &Self) -> RESMResult<Self> {
        self.combine(other, |a, b| a - b)
    }

    /// Values multiplied by `factor`, in a new buffer.
    pub fn scale(&self, factor: FloatValue) -> Self {
        self.map_values(|v| v * factor)
    }

    /// Applies `f` element-wise into a new buffer with the same dims and units.
    pub fn map_values(&self, f: impl Fn(FloatValue) -> FloatValue) -> Self {
        Self {
            data: SharedArray::new(self.data.read().mapv(f)),
            dims: self.dims.clone(),
            units: self.units.clone(),
        }
    }

    /// The same buffer and dims relabelled with `units`, without conversion.
    pub fn with_units(&self, units: &str) -> RESMResult<Self> {
        Self::from_shared(self.data.clone(), self.dims.clone(), units)
    }

    /// Overwrites this array's buffer in place with `other`.
    ///
    /// Every handle sharing the buffer observes the new values.
    pub fn assign(&self, other: &Self) -> RESMResult<()> {
        let values = other.values_as(&self.dims, &self.units)?;
        let mut data = self.data.write();
        if data.shape() != values.shape() {
            return Err(RESMError::dimension_mismatch(
                "array",
                format!("cannot assign shape {:?} into {:?}", values.shape(), data.shape()),
            ));
        }
        data.assign(&values);
        Ok(())
    }
}
