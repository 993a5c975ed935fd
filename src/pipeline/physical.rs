//! Physical-value pass: read the reprojected raw NetCDF, mask no-data, apply the scale factor and
//! write a compact float32 NetCDF-4 file with packing attributes replaced by descriptive ones.

use log::debug;
use std::collections::HashMap;
use std::path::Path;

use crate::ProductSpec;
use crate::pipeline::error_handler::PipelineError;
use crate::pipeline::fill_scale::{PackingInfo, Resolved, apply_fill_and_scale, resolve_packing};
use crate::utils::config::PACKING_ATTRIBUTES;

/// Result of one physical pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalReport {
    pub resolved: Resolved,
    pub total_pixels: usize,
    pub valid_pixels: usize,
}

/// Turns a raw reprojected file into the physical output. `out` is written in full or not at all
/// from the caller's point of view (callers pass a partial path and rename).
pub trait PhysicalPass: Send + Sync {
    fn apply(
        &self,
        raw: &Path,
        out: &Path,
        product: &ProductSpec,
        deflate_level: u8,
    ) -> Result<PhysicalReport, PipelineError>;
}

/// [`PhysicalPass`] backed by the NetCDF C library.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetcdfPhysicalPass;

impl PhysicalPass for NetcdfPhysicalPass {
    fn apply(
        &self,
        raw: &Path,
        out: &Path,
        product: &ProductSpec,
        deflate_level: u8,
    ) -> Result<PhysicalReport, PipelineError> {
        let src = netcdf::open(raw).map_err(|e| PipelineError::netcdf(raw, e))?;
        let var = find_variable(&src, raw, &product.variable)?;

        let info = packing_info(&var);
        let resolved = resolve_packing(&info, product);
        debug!(
            "{}: scale {} ({:?}), fill {} ({:?})",
            raw.display(),
            resolved.scale,
            resolved.scale_source,
            resolved.fill,
            resolved.fill_source
        );

        let values: Vec<f32> = var
            .get_values::<f32, _>(..)
            .map_err(|e| PipelineError::netcdf(raw, e))?;
        let physical = apply_fill_and_scale(&values, resolved.fill, resolved.scale);
        let valid_pixels = physical.iter().filter(|v| !v.is_nan()).count();

        let mut dst = netcdf::create_with(out, netcdf::Options::NETCDF4)
            .map_err(|e| PipelineError::netcdf(out, e))?;
        copy_structure(&src, &mut dst, &product.variable, out)?;
        append_history(
            &src,
            &mut dst,
            &format!(
                "masked {} and applied scale {} to {}",
                resolved.fill, resolved.scale, product.variable
            ),
        )
        .map_err(|e| PipelineError::netcdf(out, e))?;

        let dims = dimension_names(&var);
        let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
        let mut out_var = dst
            .add_variable::<f32>(&product.variable, &dim_refs)
            .map_err(|e| PipelineError::netcdf(out, e))?;
        out_var
            .set_compression(i32::from(deflate_level), false)
            .map_err(|e| PipelineError::netcdf(out, e))?;
        out_var
            .set_fill_value(f32::NAN)
            .map_err(|e| PipelineError::netcdf(out, e))?;
        for attr in var.attributes() {
            let name = attr.name().to_string();
            if PACKING_ATTRIBUTES.contains(&name.as_str()) {
                continue;
            }
            if let Ok(value) = attr.value() {
                out_var
                    .put_attribute(&name, value)
                    .map_err(|e| PipelineError::netcdf(out, e))?;
            }
        }
        write_descriptive_attributes(&mut out_var, product, &resolved)
            .map_err(|e| PipelineError::netcdf(out, e))?;
        out_var
            .put_values(&physical, ..)
            .map_err(|e| PipelineError::netcdf(out, e))?;

        Ok(PhysicalReport {
            resolved,
            total_pixels: physical.len(),
            valid_pixels,
        })
    }
}

fn find_variable<'f>(
    file: &'f netcdf::File,
    path: &Path,
    name: &str,
) -> Result<netcdf::Variable<'f>, PipelineError> {
    file.variable(name)
        .ok_or_else(|| PipelineError::MissingVariable {
            variable: name.to_string(),
            path: path.to_path_buf(),
            available: file.variables().map(|v| v.name().to_string()).collect(),
        })
}

/// Numeric variable attributes plus the library-reported fill.
pub fn packing_info(var: &netcdf::Variable) -> PackingInfo {
    let mut attributes = HashMap::new();
    for attr in var.attributes() {
        if let Some(v) = attr.value().ok().and_then(attribute_as_f64) {
            attributes.insert(attr.name().to_string(), v);
        }
    }
    let encoding_fill = declared_fill(var.fill_value::<f32>().ok().flatten()).map(f64::from);
    PackingInfo {
        attributes,
        encoding_fill,
    }
}

/// netCDF's default float fill, reported by the library when a variable declares none.
pub const NC_DEFAULT_FILL_F32: f32 = f32::from_bits(0x7cf0_0000);

/// A fill the file actually carries: the library default and NaN are treated as absent.
pub fn declared_fill(reported: Option<f32>) -> Option<f32> {
    reported.filter(|v| !v.is_nan() && *v != NC_DEFAULT_FILL_F32)
}

/// Scalar numeric attribute, or the first element of a numeric array attribute.
fn attribute_as_f64(value: netcdf::AttributeValue) -> Option<f64> {
    use netcdf::AttributeValue as A;
    match value {
        A::Schars(v) => v.first().map(|x| f64::from(*x)),
        A::Uchars(v) => v.first().map(|x| f64::from(*x)),
        A::Shorts(v) => v.first().map(|x| f64::from(*x)),
        A::Ushorts(v) => v.first().map(|x| f64::from(*x)),
        A::Ints(v) => v.first().map(|x| f64::from(*x)),
        A::Uints(v) => v.first().map(|x| f64::from(*x)),
        A::Longlongs(v) => v.first().map(|x| *x as f64),
        A::Ulonglongs(v) => v.first().map(|x| *x as f64),
        A::Floats(v) => v.first().map(|x| f64::from(*x)),
        A::Doubles(v) => v.first().copied(),
        other => f64::try_from(other).ok(),
    }
}

fn dimension_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name().to_string()).collect()
}

/// Copy global attributes, dimensions and every variable except `skip` into `dst`.
/// Data variables are copied as f64; scalar variables (grid mappings) keep only their attributes.
pub fn copy_structure(
    src: &netcdf::File,
    dst: &mut netcdf::FileMut,
    skip: &str,
    out: &Path,
) -> Result<(), PipelineError> {
    for attr in src.attributes() {
        if let Ok(value) = attr.value() {
            dst.add_attribute(&attr.name().to_string(), value)
                .map_err(|e| PipelineError::netcdf(out, e))?;
        }
    }
    for dim in src.dimensions() {
        let name = dim.name().to_string();
        let added = if dim.is_unlimited() {
            dst.add_unlimited_dimension(&name)
        } else {
            dst.add_dimension(&name, dim.len())
        };
        added.map_err(|e| PipelineError::netcdf(out, e))?;
    }
    for var in src.variables() {
        let name = var.name().to_string();
        if name == skip {
            continue;
        }
        let dims = dimension_names(&var);
        if dims.is_empty() {
            let mut holder = dst
                .add_variable::<i8>(&name, &[])
                .map_err(|e| PipelineError::netcdf(out, e))?;
            copy_attributes(&var, &mut holder, out)?;
            continue;
        }
        let values = match var.get_values::<f64, _>(..) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Not copying non-numeric variable {}: {}", name, e);
                continue;
            }
        };
        let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
        let mut copy = dst
            .add_variable::<f64>(&name, &dim_refs)
            .map_err(|e| PipelineError::netcdf(out, e))?;
        copy_attributes(&var, &mut copy, out)?;
        copy.put_values(&values, ..)
            .map_err(|e| PipelineError::netcdf(out, e))?;
    }
    Ok(())
}

/// Copy attributes except `_FillValue`, whose type must match the (possibly changed) variable type.
fn copy_attributes(
    src: &netcdf::Variable,
    dst: &mut netcdf::VariableMut,
    out: &Path,
) -> Result<(), PipelineError> {
    for attr in src.attributes() {
        let name = attr.name().to_string();
        if name == "_FillValue" {
            continue;
        }
        if let Ok(value) = attr.value() {
            dst.put_attribute(&name, value)
                .map_err(|e| PipelineError::netcdf(out, e))?;
        }
    }
    Ok(())
}

fn write_descriptive_attributes(
    var: &mut netcdf::VariableMut,
    product: &ProductSpec,
    resolved: &Resolved,
) -> Result<(), netcdf::Error> {
    var.put_attribute("units", product.units.as_str())?;
    var.put_attribute("long_name", product.long_name.as_str())?;
    var.put_attribute("source_product", product.source_product.as_str())?;
    var.put_attribute("scale_applied", resolved.scale)?;
    if resolved.fill.fract() == 0.0 && resolved.fill.abs() <= f64::from(i32::MAX) {
        var.put_attribute("fillvalue_masked", resolved.fill as i32)?;
    } else {
        var.put_attribute("fillvalue_masked", resolved.fill)?;
    }
    Ok(())
}

/// Append a dated line to the global `history` attribute (CF lineage convention).
pub fn append_history(
    src: &netcdf::File,
    dst: &mut netcdf::FileMut,
    line: &str,
) -> Result<(), netcdf::Error> {
    let previous = src
        .attribute("history")
        .and_then(|a| a.value().ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Str(s) => Some(s),
            _ => None,
        });
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let entry = format!("{stamp} {}: {line}", env!("CARGO_PKG_NAME"));
    let history = match previous {
        Some(p) if !p.is_empty() => format!("{entry}\n{p}"),
        _ => entry,
    };
    dst.add_attribute("history", history)?;
    Ok(())
}

/// Copy `input` to NetCDF-4 `out` with `variable` stored as float32 (deflate `deflate_level`) and
/// the given string attributes set on it. Values are copied unchanged.
pub fn set_attributes(
    input: &Path,
    out: &Path,
    variable: &str,
    attrs: &[(String, String)],
    deflate_level: u8,
) -> Result<(), PipelineError> {
    let src = netcdf::open(input).map_err(|e| PipelineError::netcdf(input, e))?;
    let var = find_variable(&src, input, variable)?;
    let values: Vec<f32> = var
        .get_values::<f32, _>(..)
        .map_err(|e| PipelineError::netcdf(input, e))?;
    let fill = declared_fill(var.fill_value::<f32>().ok().flatten());

    let mut dst = netcdf::create_with(out, netcdf::Options::NETCDF4)
        .map_err(|e| PipelineError::netcdf(out, e))?;
    copy_structure(&src, &mut dst, variable, out)?;
    let changed: Vec<&str> = attrs.iter().map(|(k, _)| k.as_str()).collect();
    append_history(
        &src,
        &mut dst,
        &format!("set {} on {}", changed.join(","), variable),
    )
    .map_err(|e| PipelineError::netcdf(out, e))?;

    let dims = dimension_names(&var);
    let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
    let mut out_var = dst
        .add_variable::<f32>(variable, &dim_refs)
        .map_err(|e| PipelineError::netcdf(out, e))?;
    if !dims.is_empty() {
        out_var
            .set_compression(i32::from(deflate_level), false)
            .map_err(|e| PipelineError::netcdf(out, e))?;
    }
    if let Some(fill) = fill {
        out_var
            .set_fill_value(fill)
            .map_err(|e| PipelineError::netcdf(out, e))?;
    }
    copy_attributes(&var, &mut out_var, out)?;
    for (key, value) in attrs {
        out_var
            .put_attribute(key, value.as_str())
            .map_err(|e| PipelineError::netcdf(out, e))?;
    }
    out_var
        .put_values(&values, ..)
        .map_err(|e| PipelineError::netcdf(out, e))?;
    Ok(())
}

/// Parse `key=value`; the value may itself contain `=`.
pub fn parse_attr_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}
