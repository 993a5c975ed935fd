use chrono::NaiveDate;
use gridmosaic::engine::gdal::{GdalTools, WarpParams, netcdf_creation_options, subdataset_ref};
use gridmosaic::group::{group_work_units, supersedes};
use gridmosaic::index::{
    ScanError, derive_date, ensure_index, load_index, scan_granules, timestamp_key, write_index,
};
use gridmosaic::pipeline::fill_scale::{
    FILL_SOURCES, PackingInfo, ValueSource, apply_fill_and_scale, resolve, resolve_packing,
};
use gridmosaic::{Granule, Opts, ProductSpec, ResampleMethod};
use std::fs;
use std::path::{Path, PathBuf};

fn granule(year: i32, doy: u32, tile: &str, col: &str, prod: &str) -> Granule {
    Granule {
        path: PathBuf::from(format!(
            "/raw/MOD16A2GF.A{year:04}{doy:03}.{tile}.{col}.{prod}.hdf"
        )),
        year,
        day_of_year: doy,
        date: derive_date(year, doy).unwrap(),
        timestamp_key: timestamp_key(year, doy),
        tile: tile.to_string(),
        collection: col.to_string(),
        production: prod.to_string(),
    }
}

fn touch(root: &Path, rel: &str) {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, b"").unwrap();
}

// --- date derivation ---

#[test]
fn test_derive_date_first_day() {
    assert_eq!(
        derive_date(2021, 1),
        Some(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
    );
}

#[test]
fn test_derive_date_leap_year_last_day() {
    assert_eq!(
        derive_date(2020, 366),
        Some(NaiveDate::from_ymd_opt(2020, 12, 31).unwrap())
    );
    assert_eq!(derive_date(2021, 366), None);
    assert_eq!(derive_date(2021, 0), None);
}

#[test]
fn test_timestamp_key_is_zero_padded() {
    assert_eq!(timestamp_key(2021, 9), "A2021009");
    assert_eq!(timestamp_key(2020, 361), "A2020361");
}

// --- grouping ---

#[test]
fn test_grouping_four_tiles_two_keys() {
    let tiles = ["h08v05", "h09v05", "h10v05", "h11v05"];
    let mut granules: Vec<Granule> = Vec::new();
    for doy in [1, 9] {
        for t in tiles {
            granules.push(granule(2021, doy, t, "061", "2022293211312"));
        }
    }
    let units = group_work_units(&granules, None);
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].timestamp_key, "A2021001");
    assert_eq!(units[1].timestamp_key, "A2021009");
    for u in &units {
        assert_eq!(u.granules.len(), 4);
        assert!(u.granules.iter().all(|g| g.timestamp_key == u.timestamp_key));
    }

    // Discovery order must not matter.
    let mut shuffled = granules.clone();
    shuffled.reverse();
    shuffled.swap(1, 6);
    assert_eq!(group_work_units(&shuffled, None), units);
}

#[test]
fn test_grouping_limit_keeps_first_keys() {
    let granules: Vec<Granule> = [17, 1, 9]
        .into_iter()
        .map(|d| granule(2021, d, "h10v05", "061", "1"))
        .collect();
    let units = group_work_units(&granules, Some(2));
    let keys: Vec<&str> = units.iter().map(|u| u.timestamp_key.as_str()).collect();
    assert_eq!(keys, ["A2021001", "A2021009"]);
}

#[test]
fn test_duplicate_tile_keeps_latest_production() {
    let old = granule(2021, 1, "h10v05", "061", "2021010101010");
    let new = granule(2021, 1, "h10v05", "061", "2022293211312");
    assert!(supersedes(&new, &old));
    for input in [vec![old.clone(), new.clone()], vec![new.clone(), old.clone()]] {
        let units = group_work_units(&input, None);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].granules, vec![new.clone()]);
    }
}

#[test]
fn test_duplicate_tile_prefers_higher_collection() {
    let c6 = granule(2021, 1, "h10v05", "006", "2099000000000");
    let c61 = granule(2021, 1, "h10v05", "061", "2022000000000");
    let units = group_work_units(&[c6, c61.clone()], None);
    assert_eq!(units[0].granules, vec![c61]);
}

// --- scale / no-data resolution ---

#[test]
fn test_missing_value_used_when_fill_absent() {
    let info = PackingInfo::default().with_attribute("missing_value", -9999.0);
    let r = resolve_packing(&info, &ProductSpec::default());
    assert_eq!(r.fill, -9999.0);
    assert_eq!(r.fill_source, ValueSource::Attribute("missing_value"));
    assert_eq!(r.scale, 0.1);
}

#[test]
fn test_fill_value_beats_missing_value() {
    let info = PackingInfo::default()
        .with_attribute("missing_value", -9999.0)
        .with_attribute("_FillValue", 32761.0);
    let (fill, source) = resolve(&FILL_SOURCES, &info, 32767.0);
    assert_eq!(fill, 32761.0);
    assert_eq!(source, ValueSource::Attribute("_FillValue"));
}

#[test]
fn test_scale_application_and_masking() {
    let out = apply_fill_and_scale(&[500.0, 32767.0, 0.0], 32767.0, 0.1);
    assert!((out[0] - 50.0).abs() < 1e-4);
    assert!(out[1].is_nan(), "fill must become NaN, never 3276.7");
    assert_eq!(out[2], 0.0);
}

// --- command construction ---

#[test]
fn test_build_vrt_args() {
    let cmd = GdalTools::default().build_vrt(Path::new("/t/list.txt"), Path::new("/t/m.vrt"));
    assert_eq!(cmd.program, PathBuf::from("gdalbuildvrt"));
    assert_eq!(
        cmd.args,
        [
            "-overwrite",
            "-resolution",
            "highest",
            "-input_file_list",
            "/t/list.txt",
            "/t/m.vrt"
        ]
    );
}

#[test]
fn test_translate_args() {
    let cmd = GdalTools::default().translate(Path::new("/t/m.vrt"), Path::new("/t/s.nc"), 3);
    assert_eq!(
        cmd.args,
        [
            "-of",
            "netCDF",
            "-ot",
            "Float32",
            "-co",
            "FORMAT=NC4",
            "-co",
            "COMPRESS=DEFLATE",
            "-co",
            "ZLEVEL=3",
            "/t/m.vrt",
            "/t/s.nc"
        ]
    );
}

#[test]
fn test_warp_args() {
    let params = WarpParams {
        resolution: 0.005,
        resample: ResampleMethod::Bilinear,
        threads: 4,
        zlevel: 1,
    };
    let cmd = GdalTools::default().warp(Path::new("/t/s.nc"), Path::new("/t/r.nc"), &params);
    let mut expected: Vec<String> = [
        "-overwrite",
        "-t_srs",
        "EPSG:4326",
        "-te",
        "-180",
        "-90",
        "180",
        "90",
        "-tr",
        "0.005",
        "0.005",
        "-tap",
        "-r",
        "bilinear",
        "-multi",
        "-wo",
        "NUM_THREADS=4",
        "-ot",
        "Float32",
        "-of",
        "netCDF",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    expected.extend(netcdf_creation_options(1));
    expected.push("/t/s.nc".into());
    expected.push("/t/r.nc".into());
    assert_eq!(cmd.args, expected);
    assert_eq!(cmd.arg_after("-r"), Some("bilinear"));
}

#[test]
fn test_average_resampling_for_coarse_grid() {
    let params = WarpParams {
        resolution: 0.05,
        resample: ResampleMethod::Average,
        threads: 2,
        zlevel: 3,
    };
    let cmd = GdalTools::default().warp(Path::new("/t/m.vrt"), Path::new("/t/r.nc"), &params);
    assert_eq!(cmd.arg_after("-r"), Some("average"));
    assert_eq!(cmd.arg_after("-tr"), Some("0.05"));
    assert_eq!(cmd.arg_after("-wo"), Some("NUM_THREADS=2"));
}

#[test]
fn test_subdataset_reference_format() {
    assert_eq!(
        subdataset_ref(Path::new("/r/g.hdf"), "MOD_Grid_MOD16A2", "ET_500m"),
        "HDF4_EOS:EOS_GRID:\"/r/g.hdf\":MOD_Grid_MOD16A2:ET_500m"
    );
}

#[test]
fn test_grid_label_from_resolution() {
    let opts = Opts {
        resolution: 0.05,
        ..Default::default()
    };
    assert_eq!(opts.grid_label(), "global_epsg4326_0p05deg");
    let named = Opts {
        grid_label: Some("global_0p05deg".into()),
        ..Default::default()
    };
    assert_eq!(named.grid_label(), "global_0p05deg");
}

// --- scanning and index persistence ---

#[test]
fn test_scan_missing_root_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let err = scan_granules(&tmp.path().join("nope"), "MOD16A2GF").unwrap_err();
    assert!(matches!(err, ScanError::NotFound(_)));
}

#[test]
fn test_scan_file_root_is_not_a_directory() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), "granules.txt");
    let err = scan_granules(&tmp.path().join("granules.txt"), "MOD16A2GF").unwrap_err();
    assert!(matches!(err, ScanError::NotADirectory(_)));
}

#[test]
fn test_scan_without_granules_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), "2021/readme.txt");
    let err = scan_granules(tmp.path(), "MOD16A2GF").unwrap_err();
    assert!(matches!(err, ScanError::Empty { .. }));
}

#[test]
fn test_scan_finds_nested_granules_and_skips_others() {
    let tmp = tempfile::tempdir().unwrap();
    touch(tmp.path(), "2021/001/MOD16A2GF.A2021001.h10v05.061.2022293211312.hdf");
    touch(tmp.path(), "2021/001/MOD16A2GF.A2021001.h11v05.061.2022293211312.hdf");
    touch(tmp.path(), "2021/009/MOD16A2GF.A2021009.h10v05.061.2022293211400.hdf");
    touch(tmp.path(), "2021/009/MOD16A2GF.A2021009.h10v05.061.2022293211400.hdf.xml");
    touch(tmp.path(), "2021/009/MOD13Q1.A2021009.h10v05.061.2022293211400.hdf");
    let granules = scan_granules(tmp.path(), "MOD16A2GF").unwrap();
    assert_eq!(granules.len(), 3);
    assert_eq!(granules[0].timestamp_key, "A2021001");
    assert_eq!(granules[0].tile, "h10v05");
    assert_eq!(granules[2].timestamp_key, "A2021009");
}

#[test]
fn test_index_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("idx").join("granule_index.csv");
    let granules = vec![
        granule(2020, 366, "h10v05", "061", "2021000000000"),
        granule(2021, 1, "h10v05", "061", "2022293211312"),
    ];
    write_index(&index, &granules).unwrap();
    assert_eq!(load_index(&index).unwrap(), granules);
}

#[test]
fn test_index_with_doy_datestr_headers_loads() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("mod16a2gf_index.csv");
    fs::write(
        &index,
        "path,year,doy,date,datestr,tile,collection,production\n\
         /raw/MOD16A2GF.A2021001.h10v05.061.2022293211312.hdf,2021,1,2021-01-01,A2021001,h10v05,061,2022293211312\n",
    )
    .unwrap();
    let granules = load_index(&index).unwrap();
    assert_eq!(
        granules,
        vec![granule(2021, 1, "h10v05", "061", "2022293211312")]
    );
}

#[test]
fn test_index_is_rebuilt_only_when_absent() {
    let tmp = tempfile::tempdir().unwrap();
    let raw = tmp.path().join("raw");
    touch(&raw, "MOD16A2GF.A2021001.h10v05.061.1.hdf");
    let mut opts = Opts {
        input_root: raw.clone(),
        index_path: tmp.path().join("granule_index.csv"),
        ..Default::default()
    };
    assert_eq!(ensure_index(&opts).unwrap().len(), 1);

    touch(&raw, "MOD16A2GF.A2021009.h10v05.061.1.hdf");
    assert_eq!(ensure_index(&opts).unwrap().len(), 1, "existing index is reused");

    opts.reindex = true;
    assert_eq!(ensure_index(&opts).unwrap().len(), 2);
}
