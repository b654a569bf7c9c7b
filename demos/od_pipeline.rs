//! Runs the full analysis on a synthetic fleet.
//!
//! Twenty taxis shuttle passengers between three busy pickup spots in
//! Futian/Luohu and random dropoffs across the city.
//!
//! ```sh
//! cargo run --example od_pipeline
//! ```

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use taxi_od::{AnalysisConfig, Analyzer, RawRecord};

const SPOTS: [(f64, f64); 3] = [(114.0579, 22.5431), (114.1183, 22.5318), (114.0255, 22.5362)];

fn synthetic_fleet(seed: u64) -> Vec<RawRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2014, 10, 22)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .expect("valid start time");

    let mut records = Vec::new();
    for vehicle in 0..20 {
        let mut t = start + Duration::seconds(rng.gen_range(0..600));
        let mut pos = SPOTS[vehicle % SPOTS.len()];
        let id = format!("B{:05}", vehicle);
        let mut push = |t: NaiveDateTime, pos: (f64, f64), status: i64, speed: f64| {
            records.push(RawRecord {
                id: Some(id.clone()),
                time: Some(t.format("%Y-%m-%d %H:%M:%S").to_string()),
                long: Some(pos.0),
                lati: Some(pos.1),
                status: Some(status),
                speed: Some(speed),
                head: None,
            });
        };

        for _ in 0..12 {
            // Cruise to a pickup spot while vacant
            let spot = SPOTS[rng.gen_range(0..SPOTS.len())];
            for _ in 0..3 {
                t += Duration::seconds(60);
                pos = (
                    pos.0 + (spot.0 - pos.0) / 2.0,
                    pos.1 + (spot.1 - pos.1) / 2.0,
                );
                push(t, pos, 0, 25.0);
            }
            pos = (
                spot.0 + rng.gen_range(-0.001..0.001),
                spot.1 + rng.gen_range(-0.001..0.001),
            );
            t += Duration::seconds(30);
            push(t, pos, 1, 0.0);

            // Occupied leg to a random dropoff
            let dest = (rng.gen_range(113.9..114.3), rng.gen_range(22.5..22.7));
            for step in 1..=5 {
                t += Duration::seconds(rng.gen_range(120..300));
                let f = step as f64 / 5.0;
                let p = (pos.0 + (dest.0 - pos.0) * f, pos.1 + (dest.1 - pos.1) * f);
                push(t, p, 1, 35.0);
            }
            pos = dest;
            t += Duration::seconds(30);
            push(t, pos, 0, 0.0);
        }
    }
    records
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let raw = synthetic_fleet(42);
    let analyzer = match Analyzer::new(AnalysisConfig::default()) {
        Ok(analyzer) => analyzer.with_heatmap(true),
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return;
        }
    };

    let report = match analyzer.analyze_records(&raw) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("analysis failed: {}", e);
            return;
        }
    };

    println!("\n=== OD pipeline ===");
    println!("Records: {} raw, {} cleaned", report.raw_records(), report.cleaned_records());
    println!("Trips:   {}", report.trips.len());
    println!("Hotspots:");
    for hotspot in &report.hotspots.hotspots {
        println!(
            "  #{:<2} ({:.4}, {:.4}) {:>3} pickups, coverage {:.3} km",
            hotspot.cluster_id,
            hotspot.center_lon,
            hotspot.center_lat,
            hotspot.point_count,
            hotspot.coverage_km
        );
    }
    println!("Busiest hours:");
    let mut hours = report.hourly_pickups.clone();
    hours.sort_by(|a, b| b.demand.cmp(&a.demand));
    for h in hours.iter().take(3) {
        println!("  {:02}:00  {} pickups", h.hour, h.demand);
    }
    if let Some(peak) = report.occupancy.iter().max_by_key(|s| s.occupied) {
        println!("Peak occupancy: {} at {}", peak.occupied, peak.time);
    }
    if let Some(frames) = &report.heatmap {
        println!("Heatmap: {} frames", frames.frames.len());
    }
}
