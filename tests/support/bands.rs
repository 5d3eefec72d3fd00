use std::path::Path;

use serde_json::{Value, json};

/// Write a separable two-band dataset: icebergs are bright, ships are dark.
pub fn write_band_dataset(path: &Path, count: usize, side: usize, labeled: bool) {
    let records: Vec<Value> = (0..count)
        .map(|i| {
            let label = (i % 2) as u8;
            let level = if label == 1 { 1.0 } else { -1.0 };
            let band: Vec<f32> = (0..side * side)
                .map(|p| level + (p % 3) as f32 * 0.05 + (i % 5) as f32 * 0.01)
                .collect();
            let mut record = json!({ "band_1": band, "band_2": band });
            if labeled {
                record["is_iceberg"] = json!(label);
            }
            record
        })
        .collect();
    std::fs::write(path, serde_json::to_string(&records).expect("serialize records"))
        .expect("write dataset");
}
