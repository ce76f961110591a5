// src/pipeline.rs - Per-image analysis: edge exclusion, nucleus depth and fiber typing

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::central_nucleation::{classify_depth, CentralityTable};
use crate::config::Config;
use crate::edge_exclusion::{exclude_edge_touching, ExclusionOptions, LabelImage};
use crate::errors::Result;
use crate::fiber_typing::{classify_fibers, known_channel_fractions, ChannelFractions, FiberType, FiberTypeCounts};
use crate::geometry::{ensure_unique_ids, Point, Region, RegionId};
use crate::image_io::{save_gray_image, FiberInput, ImageInput};
use crate::output::{write_central_csv, write_results_csv};
use crate::point_analysis::{assign, Assignment};

/// Result row for one analysed fiber
#[derive(Debug, Clone, PartialEq)]
pub struct FiberReport {
    pub id: RegionId,
    pub area: f64,
    /// Minimum caliper diameter of the fiber outline
    pub min_feret: f64,
    /// Nuclei still inside the fiber at the deepest erosion level
    pub central_nuclei: usize,
    pub peripheral_nuclei: usize,
    pub total_nuclei: usize,
    /// Marker fractions as supplied, for the known channels
    pub channels: ChannelFractions,
    pub fiber_type: FiberType,
    pub deepest_central_level: Option<f64>,
}

/// Everything computed for one image
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub filename: String,
    /// One row per analysed fiber, in input order
    pub fibers: Vec<FiberReport>,
    pub assignment: Assignment,
    pub centrality: CentralityTable,
    pub type_counts: FiberTypeCounts,
    /// Fibers dropped for being too small
    pub removed_small: Vec<RegionId>,
    /// Fibers dropped by edge exclusion
    pub excluded: Vec<RegionId>,
    /// Label raster of the surviving fibers when edge exclusion ran
    pub labels: Option<LabelImage>,
}

/// Drop fibers whose area does not exceed `minimum_area`. A non-positive
/// minimum keeps everything.
pub fn remove_small_fibers(regions: &mut Vec<Region>, minimum_area: f64) -> Vec<RegionId> {
    if minimum_area.is_nan() || minimum_area <= 0.0 {
        return Vec::new();
    }

    let mut removed = Vec::new();
    regions.retain(|region| {
        let keep = region.area() > minimum_area;
        if !keep {
            removed.push(region.id);
        }
        keep
    });
    removed
}

/// Assign nuclei to fibers and sweep the erosion levels
fn locate_nuclei(points: &[Point], regions: &[Region], config: &Config) -> Result<(Assignment, CentralityTable)> {
    let assignment = if regions.is_empty() {
        Assignment::unassigned(points)
    } else {
        assign(points, regions, config.nearest_fiber_candidates)?
    };
    let centrality = classify_depth(regions, &assignment, &config.erosion_levels)?;
    Ok((assignment, centrality))
}

fn type_fibers(
    fibers: &BTreeMap<RegionId, &FiberInput>,
    regions: &[Region],
    config: &Config,
) -> BTreeMap<RegionId, FiberType> {
    let records = regions.iter().map(|region| {
        let channels: Vec<(&str, f64)> = fibers
            .get(&region.id)
            .map(|fiber| fiber.channel_fractions().collect())
            .unwrap_or_default();
        (region.id, channels)
    });
    classify_fibers(records, config.positivity_threshold, config.hybrid)
}

/// Run the full analysis for one image without touching the filesystem.
///
/// Edge exclusion (when a border is supplied) filters the fibers first; the
/// surviving fibers are then typed from their markers while, in parallel,
/// nuclei are assigned and their depth classified.
pub fn analyze_image(input: &ImageInput, config: &Config) -> Result<ImageReport> {
    config.validate_parameters()?;

    let mut regions = input.regions()?;
    ensure_unique_ids(&regions)?;
    let total_fibers = regions.len();

    let removed_small = remove_small_fibers(&mut regions, config.minimum_fiber_area);
    if !removed_small.is_empty() {
        debug!(
            "{}: removed {} fibers with area <= {}",
            input.filename,
            removed_small.len(),
            config.minimum_fiber_area
        );
    }

    let (regions, excluded, labels) = if input.wants_edge_exclusion() {
        let border = input.border()?;
        let candidates = input.border_candidates()?;
        let options = ExclusionOptions {
            separate_touching: config.separate_touching_fibers,
            frame: input.frame.map(|[width, height]| (width, height)),
        };
        let result = exclude_edge_touching(&regions, border.as_ref(), &candidates, &options)?;
        (result.retained, result.excluded, Some(result.labels))
    } else {
        (regions, Vec::new(), None)
    };

    if regions.is_empty() {
        warn!("{}: no fibers left to analyse out of {}", input.filename, total_fibers);
    }

    let points = input.points();
    let records = input.fibers_by_id();
    let (types, located) = rayon::join(
        || type_fibers(&records, &regions, config),
        || locate_nuclei(&points, &regions, config),
    );
    let (assignment, centrality) = located?;

    let fibers: Vec<FiberReport> = regions
        .iter()
        .map(|region| {
            let channels = records
                .get(&region.id)
                .map(|fiber| known_channel_fractions(fiber.channel_fractions()))
                .unwrap_or_default();
            FiberReport {
                id: region.id,
                area: region.area(),
                min_feret: region.polygon().min_feret(),
                central_nuclei: centrality.central_at_max_depth(region.id),
                peripheral_nuclei: centrality.peripheral(region.id),
                total_nuclei: centrality.total_assigned(region.id),
                channels,
                fiber_type: types.get(&region.id).copied().unwrap_or(FiberType::UndeterminedNone),
                deepest_central_level: centrality.deepest_central_level(region.id),
            }
        })
        .collect();

    let type_counts = FiberTypeCounts::tally(fibers.iter().map(|f| f.fiber_type));

    info!(
        "{}: {} fibers analysed ({} excluded at the border), {} of {} nuclei assigned",
        input.filename,
        fibers.len(),
        excluded.len(),
        assignment.assigned_count(),
        assignment.len()
    );

    Ok(ImageReport {
        filename: input.filename.clone(),
        fibers,
        assignment,
        centrality,
        type_counts,
        removed_small,
        excluded,
        labels,
    })
}

/// Analyse one image and write its result tables. In debug mode the label
/// raster left by edge exclusion is saved as well.
pub fn process_image(input: ImageInput, config: &Config, debug: bool) -> Result<ImageReport> {
    let report = analyze_image(&input, config)?;

    let output_dir = PathBuf::from(&config.output_base_dir);
    write_results_csv(&report, &output_dir, &report.filename)?;
    write_central_csv(&report, &output_dir, &report.filename)?;

    if debug {
        if let Some(labels) = &report.labels {
            let preview_path = output_dir
                .join("debug")
                .join(format!("{}_labels.png", report.filename));
            save_gray_image(&labels.preview(), &preview_path)?;
            debug!("Saved label preview to {}", preview_path.display());
        }

        for (fiber_type, count) in report.type_counts.iter() {
            debug!("{}: {} fibers of type {}", report.filename, count, fiber_type);
        }
    }

    Ok(report)
}
