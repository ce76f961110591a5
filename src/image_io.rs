// src/image_io.rs - Per-image geometry input and debug image output

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{FiberSightError, Result};
use crate::geometry::{Point, Polygon, Region, RegionId};

/// One segmented fiber as delivered by the segmentation stage
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FiberInput {
    pub id: RegionId,
    /// Closed ring of `[x, y]` pixel coordinates
    pub polygon: Vec<[f64; 2]>,
    /// Percent positive area per marker channel; `null` means not measured
    #[serde(default)]
    pub channels: BTreeMap<String, Option<f64>>,
}

impl FiberInput {
    /// Channel fractions with unmeasured values as NaN
    pub fn channel_fractions(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.channels
            .iter()
            .map(|(name, value)| (name.as_str(), value.unwrap_or(f64::NAN)))
    }
}

/// Everything the analysis needs to know about one image
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageInput {
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(skip)]
    pub filename: String,

    /// Image size in pixels, `[width, height]`
    #[serde(default)]
    pub frame: Option<[u32; 2]>,

    pub fibers: Vec<FiberInput>,

    /// Nucleus centroids; `null` coordinates mark undetectable positions
    #[serde(default)]
    pub nuclei: Vec<[Option<f64>; 2]>,

    /// Outer boundary of the analysable tissue
    #[serde(default)]
    pub border: Option<Vec<[f64; 2]>>,

    /// Boundary candidates to pick from when no border is given
    #[serde(default)]
    pub border_candidates: Vec<Vec<[f64; 2]>>,
}

impl ImageInput {
    /// Parse an image description from JSON text
    pub fn from_json(content: &str, filename: &str) -> serde_json::Result<Self> {
        let mut input: ImageInput = serde_json::from_str(content)?;
        input.filename = filename.to_string();
        Ok(input)
    }

    /// Fiber polygons as regions, in input order
    pub fn regions(&self) -> Result<Vec<Region>> {
        self.fibers
            .iter()
            .map(|fiber| {
                let polygon = Polygon::from_coords(&fiber.polygon).map_err(|e| {
                    FiberSightError::InvalidGeometry(format!("fiber {}: {}", fiber.id, e))
                })?;
                Ok(Region::new(fiber.id, polygon))
            })
            .collect()
    }

    pub fn points(&self) -> Vec<Point> {
        self.nuclei
            .iter()
            .map(|[x, y]| Point::new(x.unwrap_or(f64::NAN), y.unwrap_or(f64::NAN)))
            .collect()
    }

    pub fn border(&self) -> Result<Option<Polygon>> {
        self.border.as_deref().map(Polygon::from_coords).transpose()
    }

    pub fn border_candidates(&self) -> Result<Vec<Polygon>> {
        self.border_candidates
            .iter()
            .map(|ring| Polygon::from_coords(ring))
            .collect()
    }

    /// Edge exclusion runs when any boundary was supplied
    pub fn wants_edge_exclusion(&self) -> bool {
        self.border.is_some() || !self.border_candidates.is_empty()
    }

    /// Fiber records keyed by id. With repeated ids the last record wins.
    pub fn fibers_by_id(&self) -> BTreeMap<RegionId, &FiberInput> {
        self.fibers.iter().map(|fiber| (fiber.id, fiber)).collect()
    }
}

/// Get all JSON files from a directory (recursively)
pub fn get_json_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(FiberSightError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(FiberSightError::Config(format!(
            "{} is not a directory", dir_path.display()
        )));
    }

    let mut json_files = Vec::new();
    find_json_files_recursive(dir_path, &mut json_files)?;
    json_files.sort();

    Ok(json_files)
}

fn find_json_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_json_files_recursive(&path, result)?;
        } else if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.to_ascii_lowercase() == "json" {
                    result.push(path);
                }
            }
        }
    }

    Ok(())
}

/// Load one image description from a JSON file
pub fn load_image_input<P: AsRef<Path>>(path: P) -> Result<ImageInput> {
    let path = path.as_ref();

    // Get filename without extension
    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| FiberSightError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let content = fs::read_to_string(path)?;
    let mut input = ImageInput::from_json(&content, &filename).map_err(|source| FiberSightError::Json {
        source,
        path: path.to_path_buf(),
    })?;
    input.path = path.to_path_buf();

    Ok(input)
}

/// Save a greyscale image as PNG, creating parent directories
pub fn save_gray_image<P: AsRef<Path>>(image: &GrayImage, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Png)?;

    Ok(())
}
