//! Granule indexing: scan a tree for granule files, derive acquisition dates and timestamp keys,
//! and persist the result as a flat CSV index.
//!
//! The index is a cache with a "rebuild if absent" policy: [`ensure_index`] scans only when the
//! index file is missing (or a rebuild is forced). It is never reconciled against the tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::engine::tools::path_relative_to;
use crate::utils::{remove_stale, rename_temp_to_final, temp_path_for};
use crate::{Granule, Opts};

/// Fatal indexing failures.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input root does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("input root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("no {product} granules found under {}", .root.display())]
    Empty { root: PathBuf, product: String },

    #[error("cannot read input root {}: {source}", .root.display())]
    Io {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid granule pattern for product '{0}'")]
    Pattern(String),
}

/// Matches granule file names for one product:
/// `<CODE>.A<YYYY><DDD>.<hHHvVV>.<CCC>.<PROD>.hdf`.
pub struct GranuleMatcher {
    re: Regex,
}

impl GranuleMatcher {
    pub fn new(product_code: &str) -> Result<Self, ScanError> {
        let pattern = format!(
            r"^{}\.A(?P<year>\d{{4}})(?P<doy>\d{{3}})\.(?P<tile>h\d{{2}}v\d{{2}})\.(?P<col>\d{{3}})\.(?P<prod>\d+)\.hdf$",
            regex::escape(product_code)
        );
        let re = Regex::new(&pattern).map_err(|_| ScanError::Pattern(product_code.to_string()))?;
        Ok(Self { re })
    }

    /// True when the file name has the granule shape (date may still be invalid).
    pub fn is_match(&self, file_name: &str) -> bool {
        self.re.is_match(file_name)
    }

    /// Parse a granule from its path. `None` for non-matching names and impossible dates.
    pub fn parse(&self, path: &Path) -> Option<Granule> {
        let name = path.file_name()?.to_str()?;
        let caps = self.re.captures(name)?;
        let year: i32 = caps["year"].parse().ok()?;
        let day_of_year: u32 = caps["doy"].parse().ok()?;
        let date = derive_date(year, day_of_year)?;
        Some(Granule {
            path: path.to_path_buf(),
            year,
            day_of_year,
            date,
            timestamp_key: timestamp_key(year, day_of_year),
            tile: caps["tile"].to_string(),
            collection: caps["col"].to_string(),
            production: caps["prod"].to_string(),
        })
    }
}

/// Acquisition date: Jan 1 of `year` plus `day_of_year - 1` days. Day-of-year is 1-indexed;
/// `None` when it is 0 or past the end of that year.
pub fn derive_date(year: i32, day_of_year: u32) -> Option<NaiveDate> {
    NaiveDate::from_yo_opt(year, day_of_year)
}

/// Canonical per-timestamp key: `A` + 4-digit year + 3-digit day-of-year.
pub fn timestamp_key(year: i32, day_of_year: u32) -> String {
    format!("A{year:04}{day_of_year:03}")
}

/// Deterministic index order: (timestamp key, tile), then collection, production, path.
pub fn sort_granules(granules: &mut [Granule]) {
    granules.sort_by(|a, b| {
        (&a.timestamp_key, &a.tile, &a.collection, &a.production, &a.path).cmp(&(
            &b.timestamp_key,
            &b.tile,
            &b.collection,
            &b.production,
            &b.path,
        ))
    });
}

/// Recursively scan `root` for granules of `product_code`. Non-matching files are skipped silently;
/// unreadable entries are logged and skipped. Output is sorted and has at most one row per
/// (timestamp key, tile, collection, production).
pub fn scan_granules(root: &Path, product_code: &str) -> Result<Vec<Granule>, ScanError> {
    if !root.exists() {
        return Err(ScanError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|source| ScanError::Io {
        root: root.to_path_buf(),
        source,
    })?;
    let matcher = GranuleMatcher::new(product_code)?;

    let mut granules = Vec::new();
    let mut skipped: Vec<(PathBuf, String)> = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let p = err.path().map(PathBuf::from).unwrap_or_else(|| root.to_path_buf());
                skipped.push((p, err.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        match matcher.parse(path) {
            Some(g) => granules.push(g),
            None => {
                let name = entry.file_name().to_string_lossy();
                if matcher.is_match(&name) {
                    let rel = path_relative_to(path, root).unwrap_or_else(|| path.to_path_buf());
                    warn!("Skipping {}: day-of-year out of range", rel.display());
                }
            }
        }
    }

    if !skipped.is_empty() {
        warn!(
            "Skipped {} paths due to permission errors or access issues",
            skipped.len()
        );
        for (p, msg) in &skipped {
            debug!("  skipped: {} ({})", p.display(), msg);
        }
    }
    if granules.is_empty() {
        return Err(ScanError::Empty {
            root: root.to_path_buf(),
            product: product_code.to_string(),
        });
    }

    sort_granules(&mut granules);
    let before = granules.len();
    granules.dedup_by(|b, a| {
        a.timestamp_key == b.timestamp_key
            && a.tile == b.tile
            && a.collection == b.collection
            && a.production == b.production
    });
    if granules.len() < before {
        warn!(
            "Dropped {} duplicate granule files (same name in several directories)",
            before - granules.len()
        );
    }
    Ok(granules)
}

/// One CSV row of the index. Older indexes name two columns `doy` and `datestr`.
#[derive(Debug, Serialize, Deserialize)]
struct IndexRow {
    path: String,
    year: i32,
    #[serde(alias = "doy")]
    day_of_year: u32,
    date: String,
    #[serde(alias = "datestr")]
    timestamp_key: String,
    tile: String,
    collection: String,
    production: String,
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl From<&Granule> for IndexRow {
    fn from(g: &Granule) -> Self {
        IndexRow {
            path: g.path.to_string_lossy().into_owned(),
            year: g.year,
            day_of_year: g.day_of_year,
            date: g.date.format(DATE_FORMAT).to_string(),
            timestamp_key: g.timestamp_key.clone(),
            tile: g.tile.clone(),
            collection: g.collection.clone(),
            production: g.production.clone(),
        }
    }
}

impl TryFrom<IndexRow> for Granule {
    type Error = anyhow::Error;

    fn try_from(row: IndexRow) -> Result<Self> {
        let date = NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
            .with_context(|| format!("bad date '{}' for {}", row.date, row.path))?;
        if derive_date(row.year, row.day_of_year) != Some(date) {
            anyhow::bail!(
                "date {} does not match year {} day {} for {}",
                row.date,
                row.year,
                row.day_of_year,
                row.path
            );
        }
        Ok(Granule {
            path: PathBuf::from(row.path),
            year: row.year,
            day_of_year: row.day_of_year,
            date,
            timestamp_key: row.timestamp_key,
            tile: row.tile,
            collection: row.collection,
            production: row.production,
        })
    }
}

/// Write the index to `index_path` via a sibling temp file and rename.
pub fn write_index(index_path: &Path, granules: &[Granule]) -> Result<()> {
    if let Some(parent) = index_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create index directory {}", parent.display()))?;
    }
    let temp_path = temp_path_for(index_path);
    remove_stale(&temp_path)?;
    {
        let mut writer = csv::Writer::from_path(&temp_path)
            .with_context(|| format!("create index {}", temp_path.display()))?;
        for g in granules {
            writer.serialize(IndexRow::from(g)).context("write index row")?;
        }
        writer.flush().context("flush index")?;
    }
    rename_temp_to_final(&temp_path, index_path)
}

/// Load a previously written index. Rows are re-sorted so grouping stays deterministic
/// even for hand-edited files.
pub fn load_index(index_path: &Path) -> Result<Vec<Granule>> {
    let mut reader = csv::Reader::from_path(index_path)
        .with_context(|| format!("open index {}", index_path.display()))?;
    let mut granules = Vec::new();
    for row in reader.deserialize::<IndexRow>() {
        let row = row.with_context(|| format!("read index {}", index_path.display()))?;
        granules.push(Granule::try_from(row)?);
    }
    sort_granules(&mut granules);
    Ok(granules)
}

/// Scan `root` and write the index.
pub fn build_index(root: &Path, index_path: &Path, product_code: &str) -> Result<Vec<Granule>> {
    info!("Scanning {} for {} granules", root.display(), product_code);
    let granules = scan_granules(root, product_code)?;
    write_index(index_path, &granules)?;
    info!(
        "[INDEX] Saved {} rows to {}",
        granules.len(),
        index_path.display()
    );
    Ok(granules)
}

/// Rebuild-if-absent: build the index when the file is missing (or `opts.reindex`), else load it.
pub fn ensure_index(opts: &Opts) -> Result<Vec<Granule>> {
    if opts.reindex || !opts.index_path.exists() {
        if opts.index_path.exists() {
            debug!("Rebuilding index {}", opts.index_path.display());
        }
        return build_index(&opts.input_root, &opts.index_path, &opts.product.code);
    }
    info!("Reading existing index {}", opts.index_path.display());
    let granules = load_index(&opts.index_path)?;
    info!("{} granule records in index", granules.len());
    Ok(granules)
}
