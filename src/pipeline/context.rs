//! Per-unit path layout: every file one Work Unit touches, derived once from [`Opts`].
//!
//! Scratch files live under `<scratch>/<key>/`, so concurrent units never share a path.

use std::path::{Path, PathBuf};

use crate::Opts;
use crate::utils::partial_path_for;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitPaths {
    /// Unit-owned scratch directory.
    pub tmp_dir: PathBuf,
    /// Subdataset references fed to the mosaic tool, one per line.
    pub file_list: PathBuf,
    pub vrt: PathBuf,
    /// Materialized mosaic in the source projection.
    pub sinu_nc: PathBuf,
    /// Reprojected, still packed.
    pub raw_nc: PathBuf,
    pub final_nc: PathBuf,
    /// Where the physical pass writes before the closing rename.
    pub partial_nc: PathBuf,
}

impl UnitPaths {
    /// `output_dir` and `scratch_dir` are expected to be absolute already.
    pub fn new(key: &str, opts: &Opts) -> Self {
        let var = &opts.product.variable;
        let tmp_dir = opts.scratch_dir.join(key);
        let final_nc = opts.output_dir.join(format!(
            "{}_{}_{}_{}_phys.nc",
            opts.product.code,
            key,
            var,
            opts.grid_label()
        ));
        let raw_name = format!(
            "{}_{}_{}_{}_raw.nc",
            opts.product.code,
            key,
            var,
            opts.grid_label()
        );
        let raw_nc = if opts.keep_raw {
            opts.output_dir.join(raw_name)
        } else {
            tmp_dir.join(raw_name)
        };
        Self {
            file_list: tmp_dir.join("file_list.txt"),
            vrt: tmp_dir.join(format!("{key}_{var}_sinu.vrt")),
            sinu_nc: tmp_dir.join(format!("{key}_{var}_sinu.nc")),
            partial_nc: partial_path_for(&final_nc),
            raw_nc,
            final_nc,
            tmp_dir,
        }
    }

    /// Input to the reprojection stage: the materialized mosaic, or the VRT itself.
    pub fn warp_source(&self, materialize: bool) -> &Path {
        if materialize { &self.sinu_nc } else { &self.vrt }
    }

    /// Scratch files removed after the unit, success or failure. The raw file is
    /// scratch unless it was placed in the output directory.
    pub fn scratch_files(&self, keep_raw: bool) -> Vec<PathBuf> {
        let mut files = vec![self.file_list.clone(), self.vrt.clone(), self.sinu_nc.clone()];
        if !keep_raw {
            files.push(self.raw_nc.clone());
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> Opts {
        Opts {
            output_dir: PathBuf::from("/data/out"),
            scratch_dir: PathBuf::from("/data/_tmp"),
            ..Default::default()
        }
    }

    #[test]
    fn names_follow_product_and_grid() {
        let p = UnitPaths::new("A2021001", &opts());
        assert_eq!(p.tmp_dir, PathBuf::from("/data/_tmp/A2021001"));
        assert_eq!(
            p.final_nc,
            PathBuf::from("/data/out/MOD16A2GF_A2021001_ET_500m_global_epsg4326_0p005deg_phys.nc")
        );
        assert_eq!(
            p.partial_nc,
            PathBuf::from("/data/out/.MOD16A2GF_A2021001_ET_500m_global_epsg4326_0p005deg_phys.nc.part")
        );
        assert!(p.raw_nc.starts_with("/data/_tmp/A2021001"));
        assert_eq!(p.warp_source(true), p.sinu_nc.as_path());
        assert_eq!(p.warp_source(false), p.vrt.as_path());
    }

    #[test]
    fn grid_label_reproduces_existing_output_names() {
        let o = Opts {
            grid_label: Some("global_epsg4326".into()),
            ..opts()
        };
        let p = UnitPaths::new("A2021001", &o);
        assert_eq!(
            p.final_nc,
            PathBuf::from("/data/out/MOD16A2GF_A2021001_ET_500m_global_epsg4326_phys.nc")
        );

        let coarse = Opts {
            resolution: 0.05,
            grid_label: Some("0p05deg".into()),
            ..opts()
        };
        let p = UnitPaths::new("A2021001", &coarse);
        assert_eq!(
            p.final_nc,
            PathBuf::from("/data/out/MOD16A2GF_A2021001_ET_500m_0p05deg_phys.nc")
        );
    }

    #[test]
    fn keep_raw_moves_raw_to_output_dir() {
        let o = Opts {
            keep_raw: true,
            ..opts()
        };
        let p = UnitPaths::new("A2021009", &o);
        assert!(p.raw_nc.starts_with("/data/out"));
        assert!(!p.scratch_files(true).contains(&p.raw_nc));
    }
}
