use std::fs;

use assert_approx_eq::assert_approx_eq;

use fiber_sight_rust_lib::config::Config;
use fiber_sight_rust_lib::fiber_typing::FiberType;
use fiber_sight_rust_lib::image_io::ImageInput;
use fiber_sight_rust_lib::pipeline::{analyze_image, process_image};
use fiber_sight_rust_lib::FiberSightError;

/// Five fibers in a 40x30 image: two cut by the border, three inside
const SECTION: &str = r#"{
    "frame": [40, 30],
    "fibers": [
        {"id": 1, "polygon": [[0,6],[4,6],[4,16],[0,16]],
         "channels": {"Type I": 90.0}},
        {"id": 2, "polygon": [[6,6],[16,6],[16,16],[6,16]],
         "channels": {"Type I": 80.0, "Type IIa": 30.0}},
        {"id": 3, "polygon": [[18,6],[28,6],[28,16],[18,16]],
         "channels": {"Type IIa": 60.0, "Type IIx": 70.0}},
        {"id": 4, "polygon": [[30,6],[40,6],[40,16],[30,16]],
         "channels": {"Type IIb": 95.0}},
        {"id": 5, "polygon": [[6,18],[16,18],[16,28],[6,28]],
         "channels": {"Type I": 55.0, "Type IIx": 55.0}}
    ],
    "nuclei": [
        [11.0, 11.0], [7.5, 11.0], [6.2, 11.0],
        [19.0, 8.0],
        [2.0, 10.0], [20.0, 17.0], [null, 3.0]
    ],
    "border": [[2,2],[38,2],[38,28],[2,28]]
}"#;

fn section_config() -> Config {
    let mut config = Config::default();
    config.erosion_levels = vec![0.0, 0.3, 0.6];
    config.hybrid.type_iia_iix = true;
    config
}

#[test]
fn border_fibers_are_excluded_before_analysis() {
    let input = ImageInput::from_json(SECTION, "section").unwrap();
    let report = analyze_image(&input, &section_config()).unwrap();

    assert_eq!(report.excluded, vec![1, 4]);
    let ids: Vec<u32> = report.fibers.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![2, 3, 5]);
    assert!(report.removed_small.is_empty());
}

#[test]
fn nuclei_are_assigned_and_graded_by_depth() {
    let input = ImageInput::from_json(SECTION, "section").unwrap();
    let report = analyze_image(&input, &section_config()).unwrap();

    assert_eq!(report.assignment.assigned_count(), 4);
    assert_eq!(report.assignment.unassigned_count(), 2);
    assert_eq!(report.assignment.unassignable_count(), 1);

    let fiber2 = &report.fibers[0];
    assert_approx_eq!(fiber2.area, 100.0);
    assert_approx_eq!(fiber2.min_feret, 10.0);
    assert_eq!(fiber2.total_nuclei, 3);
    assert_eq!(fiber2.central_nuclei, 1);
    assert_eq!(fiber2.peripheral_nuclei, 2);
    assert_eq!(fiber2.deepest_central_level, Some(0.6));

    let fiber3 = &report.fibers[1];
    assert_eq!(fiber3.total_nuclei, 1);
    assert_eq!(fiber3.central_nuclei, 0);
    assert_eq!(fiber3.deepest_central_level, Some(0.3));

    let fiber5 = &report.fibers[2];
    assert_eq!(fiber5.total_nuclei, 0);
    assert_eq!(fiber5.deepest_central_level, None);

    let centrality = &report.centrality;
    assert_eq!(centrality.central_fiber_count(0), 2);
    assert_eq!(centrality.central_fiber_count(1), 2);
    assert_eq!(centrality.central_fiber_count(2), 1);
    for fiber in &report.fibers {
        assert_eq!(fiber.peripheral_nuclei + fiber.central_nuclei, fiber.total_nuclei);
    }
}

#[test]
fn fibers_are_typed_from_markers() {
    let input = ImageInput::from_json(SECTION, "section").unwrap();
    let report = analyze_image(&input, &section_config()).unwrap();

    let types: Vec<FiberType> = report.fibers.iter().map(|f| f.fiber_type).collect();
    assert_eq!(types, vec![FiberType::I, FiberType::HybridIIaIIx, FiberType::Undetermined]);
    assert_eq!(report.type_counts.total(), 3);

    let mut no_hybrids = section_config();
    no_hybrids.hybrid.type_iia_iix = false;
    let report = analyze_image(&input, &no_hybrids).unwrap();
    assert_eq!(report.fibers[1].fiber_type, FiberType::IIx);
}

#[test]
fn ambiguous_border_fails_the_image() {
    let input = ImageInput::from_json(
        r#"{
            "fibers": [{"id": 1, "polygon": [[5,5],[9,5],[9,9],[5,9]]}],
            "border_candidates": [
                [[0,0],[20,0],[20,20],[0,20]],
                [[1,1],[19,1],[19,19],[1,19]]
            ]
        }"#,
        "ambiguous",
    )
    .unwrap();
    assert!(matches!(
        analyze_image(&input, &section_config()),
        Err(FiberSightError::AmbiguousBoundary(2))
    ));
}

#[test]
fn process_image_writes_result_tables() {
    let output_dir = std::env::temp_dir().join(format!("fiber_sight_out_{}", std::process::id()));
    let mut config = section_config();
    config.output_base_dir = output_dir.to_string_lossy().into_owned();

    let input = ImageInput::from_json(SECTION, "section").unwrap();
    process_image(input, &config, true).unwrap();

    let mut results = csv::Reader::from_path(output_dir.join("Results").join("section.csv")).unwrap();
    let header = results.headers().unwrap().clone();
    assert_eq!(&header[0], "Label");
    assert_eq!(&header[2], "MinFeret");
    assert_eq!(&header[6], "Type I_%-Area");
    assert_eq!(&header[10], "Fiber_Type");
    let rows: Vec<csv::StringRecord> = results.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[0][2], "10.000");
    assert_eq!(&rows[1][10], "IIa/IIx");
    assert_eq!(&rows[0][7], "30.000");
    assert_eq!(&rows[0][8], "");

    let mut central = csv::Reader::from_path(output_dir.join("Central").join("section.csv")).unwrap();
    assert_eq!(central.records().count(), 3);

    assert!(output_dir.join("debug").join("section_labels.png").exists());

    let _ = fs::remove_dir_all(&output_dir);
}
