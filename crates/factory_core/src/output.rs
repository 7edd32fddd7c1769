//! Structured output / telemetry export (§6, §10.4).
//!
//! An in-memory [`RunTelemetry`] resource accumulates lightweight records
//! during the run (per-product completion records and per-tick collision
//! counts), and a set of writer functions flush them to disk at the points
//! §6 specifies. The wire format is plain `.txt`, so these writers are plain
//! `std::fs`/`io` rather than a columnar record-batch builder, but each
//! follows the same `Result<(), Box<dyn Error>>` return idiom and
//! one-writer-function-per-file shape.

use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use bevy_ecs::prelude::{Entity, Resource};

/// One completed product, recorded when its recipe finishes (§4.10).
#[derive(Debug, Clone)]
pub struct CompletedProductRecord {
    pub product_id: String,
    pub transport_ticks: u64,
    pub transport_distance: f64,
    pub processing_ticks: u64,
    pub step_label: String,
}

/// One mover-position trace line, appended per tick it moves (feeds
/// `Movers/{id}.txt`).
#[derive(Debug, Clone)]
pub struct MoverTraceLine {
    pub tick: u64,
    pub position_x: f64,
    pub position_y: f64,
    pub state: &'static str,
}

/// Accumulates lightweight run telemetry for §6's `Output/` artifacts.
/// Populated on message receipt (product completions, halts).
#[derive(Debug, Default, Resource)]
pub struct RunTelemetry {
    pub completed_products: Vec<CompletedProductRecord>,
    pub collision_events: u64,
    pub log_lines: Vec<String>,
    pub mover_traces: std::collections::HashMap<Entity, Vec<MoverTraceLine>>,
    pub product_traces: std::collections::HashMap<Entity, Vec<String>>,
}

impl RunTelemetry {
    pub fn record_completion(&mut self, record: CompletedProductRecord) {
        self.log_lines.push(format!(
            "ProductCompleted id={} transport_ticks={} distance={:.2} processing_ticks={} step={}",
            record.product_id, record.transport_ticks, record.transport_distance, record.processing_ticks, record.step_label
        ));
        self.completed_products.push(record);
    }

    pub fn record_line(&mut self, line: impl Into<String>) {
        self.log_lines.push(line.into());
    }

    pub fn record_mover_trace(&mut self, mover: Entity, line: MoverTraceLine) {
        self.mover_traces.entry(mover).or_default().push(line);
    }

    pub fn record_product_trace(&mut self, product: Entity, line: impl Into<String>) {
        self.product_traces.entry(product).or_default().push(line.into());
    }
}

/// Per-run output directory: `Output/{blueprint}_{nav}_{mov}_{prod}_{timestamp}_{guid16}/`
/// (§6). Timestamp and GUID are supplied by the caller (environment.rs
/// resolves them once at `LoadBlueprint` time) rather than generated here,
/// since this module must stay a pure writer with no hidden clock/RNG reads.
pub fn run_directory_name(blueprint_name: &str, nav: &str, mover_count: usize, producer_count: usize, timestamp: u64, guid16: &str) -> String {
    format!("{blueprint_name}_{nav}_{mover_count}_{producer_count}_{timestamp}_{guid16}")
}

/// Ensures the per-run directory tree (`Movers/`, `Products/`) exists.
pub fn ensure_run_directory(root: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(root.join("Movers"))?;
    fs::create_dir_all(root.join("Products"))?;
    Ok(())
}

/// Writes the shared `Log.txt` (§6): one line per entry.
pub fn write_log(root: &Path, telemetry: &RunTelemetry) -> Result<(), Box<dyn Error>> {
    let mut buf = String::new();
    for line in &telemetry.log_lines {
        writeln!(buf, "{line}")?;
    }
    fs::write(root.join("Log.txt"), buf)?;
    Ok(())
}

/// Writes `Movers/{id}.txt` for every mover with recorded trace lines.
pub fn write_mover_traces(root: &Path, ids: &std::collections::HashMap<Entity, String>, telemetry: &RunTelemetry) -> Result<(), Box<dyn Error>> {
    for (entity, lines) in &telemetry.mover_traces {
        let Some(id) = ids.get(entity) else { continue };
        let mut buf = String::new();
        for line in lines {
            writeln!(buf, "tick={} x={:.2} y={:.2} state={}", line.tick, line.position_x, line.position_y, line.state)?;
        }
        fs::write(root.join("Movers").join(format!("{id}.txt")), buf)?;
    }
    Ok(())
}

/// Writes `Products/{id}.txt` for every product with recorded trace lines.
pub fn write_product_traces(root: &Path, ids: &std::collections::HashMap<Entity, String>, telemetry: &RunTelemetry) -> Result<(), Box<dyn Error>> {
    for (entity, lines) in &telemetry.product_traces {
        let Some(id) = ids.get(entity) else { continue };
        let mut buf = String::new();
        for line in lines {
            writeln!(buf, "{line}")?;
        }
        fs::write(root.join("Products").join(format!("{id}.txt")), buf)?;
    }
    Ok(())
}

/// Writes the final-summary `Dump.txt` (§6), produced once at halt.
pub fn write_dump(root: &Path, update_ticks: u64, tick_cap: u64, telemetry: &RunTelemetry) -> Result<(), Box<dyn Error>> {
    let mut buf = String::new();
    writeln!(buf, "update_ticks={update_ticks}")?;
    writeln!(buf, "tick_cap={tick_cap}")?;
    writeln!(buf, "completed_products={}", telemetry.completed_products.len())?;
    writeln!(buf, "collision_events={}", telemetry.collision_events)?;
    for record in &telemetry.completed_products {
        writeln!(
            buf,
            "  {} transport_ticks={} distance={:.2} processing_ticks={} step={}",
            record.product_id, record.transport_ticks, record.transport_distance, record.processing_ticks, record.step_label
        )?;
    }
    fs::write(root.join("Dump.txt"), buf)?;
    Ok(())
}

/// Tiered crash-dump fallback (§7, §10.1): normal path -> partially
/// recovered -> barebones -> timestamped path in `Output/`. Each tier is
/// attempted in order; the first one that succeeds in writing wins. I/O
/// failure at every tier is logged and swallowed (§7: "per-actor logging is
/// best-effort").
pub fn write_crash_dump(output_root: &Path, run_dir: Option<&Path>, update_ticks: u64, telemetry: Option<&RunTelemetry>, timestamp: u64) -> PathBuf {
    if let (Some(run_dir), Some(telemetry)) = (run_dir, telemetry) {
        let path = run_dir.join("Dump_crashlog.txt");
        if write_dump(run_dir, update_ticks, update_ticks, telemetry).is_ok() && fs::rename(run_dir.join("Dump.txt"), &path).is_ok() {
            return path;
        }
    }

    if let Some(telemetry) = telemetry {
        let path = output_root.join("Dump_crashlog_partial.txt");
        let mut buf = String::new();
        let _ = writeln!(buf, "update_ticks={update_ticks}");
        let _ = writeln!(buf, "completed_products={}", telemetry.completed_products.len());
        if fs::write(&path, buf).is_ok() {
            return path;
        }
    }

    let barebones = output_root.join("Dump_crashlog_barebones.txt");
    if fs::write(&barebones, format!("update_ticks={update_ticks}\n")).is_ok() {
        return barebones;
    }

    let fallback = std::env::temp_dir().join(format!("Dump_crashlog_{timestamp}.txt"));
    let _ = fs::write(&fallback, format!("update_ticks={update_ticks}\n"));
    fallback
}
