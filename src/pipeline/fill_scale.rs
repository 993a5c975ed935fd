//! Scale-factor and no-data resolution plus the masking/rescaling arithmetic.
//!
//! Resolution is an ordered list of candidate sources; the first present value wins.
//! Nothing here touches files, so the precedence rules are testable in isolation.

use std::collections::HashMap;

use crate::ProductSpec;

/// Where a resolved packing value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSource {
    /// A numeric attribute on the variable.
    Attribute(&'static str),
    /// The storage-level fill reported by the array library.
    Encoding,
    /// Product constant.
    Fallback,
}

/// Scale: `scale_factor` attribute, then the product constant.
pub const SCALE_SOURCES: [ValueSource; 2] =
    [ValueSource::Attribute("scale_factor"), ValueSource::Fallback];

/// No-data: `_FillValue`, legacy `missing_value`, storage-level fill, then the product constant.
pub const FILL_SOURCES: [ValueSource; 4] = [
    ValueSource::Attribute("_FillValue"),
    ValueSource::Attribute("missing_value"),
    ValueSource::Encoding,
    ValueSource::Fallback,
];

/// Packing-related values read from the reprojected variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackingInfo {
    /// Numeric attributes by name (array attributes contribute their first element).
    pub attributes: HashMap<String, f64>,
    /// Storage-level fill value, if the library reports one.
    pub encoding_fill: Option<f64>,
}

impl PackingInfo {
    pub fn with_attribute(mut self, name: &str, value: f64) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_encoding_fill(mut self, value: f64) -> Self {
        self.encoding_fill = Some(value);
        self
    }

    fn lookup(&self, source: ValueSource, fallback: f64) -> Option<f64> {
        match source {
            ValueSource::Attribute(name) => self.attributes.get(name).copied(),
            ValueSource::Encoding => self.encoding_fill,
            ValueSource::Fallback => Some(fallback),
        }
    }
}

/// First present value among `sources`, with the source that supplied it.
/// `fallback` is only used when `sources` contains [`ValueSource::Fallback`].
pub fn resolve(sources: &[ValueSource], info: &PackingInfo, fallback: f64) -> (f64, ValueSource) {
    sources
        .iter()
        .find_map(|s| info.lookup(*s, fallback).map(|v| (v, *s)))
        .unwrap_or((fallback, ValueSource::Fallback))
}

/// Scale and no-data for one variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub scale: f64,
    pub scale_source: ValueSource,
    pub fill: f64,
    pub fill_source: ValueSource,
}

pub fn resolve_packing(info: &PackingInfo, product: &ProductSpec) -> Resolved {
    let (scale, scale_source) = resolve(&SCALE_SOURCES, info, product.fallback_scale);
    let (fill, fill_source) = resolve(&FILL_SOURCES, info, product.fallback_fill);
    Resolved {
        scale,
        scale_source,
        fill,
        fill_source,
    }
}

/// Replace `fill` with NaN and multiply everything else by `scale`.
pub fn apply_fill_and_scale(raw: &[f32], fill: f64, scale: f64) -> Vec<f32> {
    raw.iter()
        .map(|&v| {
            if v.is_nan() || f64::from(v) == fill {
                f32::NAN
            } else {
                (f64::from(v) * scale) as f32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_attributes_win() {
        let info = PackingInfo::default()
            .with_attribute("scale_factor", 0.01)
            .with_attribute("_FillValue", -1.0)
            .with_attribute("missing_value", 255.0)
            .with_encoding_fill(9.0);
        let r = resolve_packing(&info, &ProductSpec::default());
        assert_eq!(r.scale, 0.01);
        assert_eq!(r.scale_source, ValueSource::Attribute("scale_factor"));
        assert_eq!(r.fill, -1.0);
        assert_eq!(r.fill_source, ValueSource::Attribute("_FillValue"));
    }

    #[test]
    fn encoding_fill_before_fallback() {
        let info = PackingInfo::default().with_encoding_fill(-9999.0);
        let r = resolve_packing(&info, &ProductSpec::default());
        assert_eq!(r.fill, -9999.0);
        assert_eq!(r.fill_source, ValueSource::Encoding);
    }

    #[test]
    fn empty_info_uses_product_constants() {
        let r = resolve_packing(&PackingInfo::default(), &ProductSpec::default());
        assert_eq!(r.scale, 0.1);
        assert_eq!(r.fill, 32767.0);
        assert_eq!(r.scale_source, ValueSource::Fallback);
        assert_eq!(r.fill_source, ValueSource::Fallback);
    }

    #[test]
    fn nan_input_stays_missing() {
        let out = apply_fill_and_scale(&[f32::NAN, 10.0], 32767.0, 0.1);
        assert!(out[0].is_nan());
        assert!((out[1] - 1.0).abs() < 1e-6);
    }
}
