use std::fs;
use std::path::Path;
use csv::Writer;

use crate::errors::{FiberSightError, Result};
use crate::fiber_typing::Channel;
use crate::pipeline::ImageReport;

/// Marker percentage formatted for the results table. Unmeasured values are
/// written as 0, absent channels as an empty cell.
fn format_fraction(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_nan() => format!("{:.3}", 0.0),
        Some(v) => format!("{:.3}", v),
        None => String::new(),
    }
}

/// Write the per-fiber results table to `<output>/Results/<filename>.csv`
pub fn write_results_csv<P: AsRef<Path>>(
    report: &ImageReport,
    output_dir: P,
    filename: &str,
) -> Result<()> {
    let output_path = output_dir.as_ref().join("Results").join(format!("{}.csv", filename));

    // Create directory if it doesn't exist
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(FiberSightError::Io)?;
    }

    let mut writer = Writer::from_path(&output_path)?;

    let mut header = vec![
        "Label".to_string(),
        "Area".to_string(),
        "MinFeret".to_string(),
        "Central Nuclei".to_string(),
        "Peripheral Nuclei".to_string(),
        "Total Nuclei".to_string(),
    ];
    header.extend(Channel::CONTINUUM.iter().map(|c| format!("Type {}_%-Area", c)));
    header.push("Fiber_Type".to_string());
    writer.write_record(&header)?;

    for fiber in &report.fibers {
        let mut record = vec![
            fiber.id.to_string(),
            format!("{:.3}", fiber.area),
            format!("{:.3}", fiber.min_feret),
            fiber.central_nuclei.to_string(),
            fiber.peripheral_nuclei.to_string(),
            fiber.total_nuclei.to_string(),
        ];
        record.extend(
            Channel::CONTINUUM
                .iter()
                .map(|c| format_fraction(fiber.channels.get(c).copied())),
        );
        record.push(fiber.fiber_type.to_string());
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| FiberSightError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}

/// Write the erosion sweep summary to `<output>/Central/<filename>.csv`
pub fn write_central_csv<P: AsRef<Path>>(
    report: &ImageReport,
    output_dir: P,
    filename: &str,
) -> Result<()> {
    let output_path = output_dir.as_ref().join("Central").join(format!("{}.csv", filename));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(FiberSightError::Io)?;
    }

    let mut writer = Writer::from_path(&output_path)?;
    writer.write_record(["Erosion_Level", "Central_Fibers", "Mean_Retained_Fraction"])?;

    let centrality = &report.centrality;
    for (index, level) in centrality.levels().iter().enumerate() {
        writer.write_record(&[
            format!("{:.2}", level),
            centrality.central_fiber_count(index).to_string(),
            centrality
                .mean_retained_fraction(index)
                .map(|f| format!("{:.6}", f))
                .unwrap_or_default(),
        ])?;
    }

    writer.flush().map_err(|e| FiberSightError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}
