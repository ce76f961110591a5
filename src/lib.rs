// src/lib.rs - Library interface for FiberSight

pub mod central_nucleation;
pub mod config;
pub mod edge_exclusion;
pub mod errors;
pub mod fiber_typing;
pub mod geometry;
pub mod image_io;
pub mod image_utils;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod point_analysis;

// Re-export commonly used types and functions
pub use errors::{FiberSightError, Result};
pub use config::Config;
pub use geometry::{Point, Polygon, Region, RegionId};
pub use pipeline::{analyze_image, process_image, FiberReport, ImageReport};
pub use image_io::{load_image_input, ImageInput, FiberInput};

// Nucleus assignment
pub use point_analysis::{assign, Assignment, PointAssignment, DEFAULT_CANDIDATES};

// Central nucleation
pub use central_nucleation::{
    classify_depth,
    default_erosion_levels,
    CentralityTable,
};

// Fiber typing
pub use fiber_typing::{
    classify,
    classify_channels,
    classify_fibers,
    AdjacentPair,
    Channel,
    FiberType,
    FiberTypeCounts,
    HybridFlags,
};

// Edge exclusion
pub use edge_exclusion::{
    exclude_edge_touching,
    resolve_boundary,
    EdgeExclusion,
    ExclusionOptions,
    LabelImage,
};
