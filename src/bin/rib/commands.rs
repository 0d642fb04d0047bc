use std::path::Path;

use log::info;
use rib::errors::Result;
use rib::Builder;
use serde::Serialize;

pub fn init(dir: &Path) -> Result<()> {
    let builder = Builder::init(dir)?;
    println!("Initialized directory '{}'.", builder.workspace().root().display());
    Ok(())
}

pub fn build(dir: &Path, seqmin: u64) -> Result<()> {
    let report = Builder::open(dir)?.build(seqmin)?;
    info!(
        "Ran {} of {} scripts in {:?}",
        report.scripts_run, report.scripts_selected, report.duration
    );
    Ok(())
}

pub fn shell(dir: &Path, args: &[String]) -> Result<()> {
    Builder::open(dir)?.shell(args)
}

pub fn clean(dir: &Path, all: bool) -> Result<()> {
    Builder::open(dir)?.clean(all)
}

#[derive(Serialize)]
struct PlanEntry {
    sequence: Option<u64>,
    flags: String,
    path: String,
}

pub fn list(dir: &Path, seqmin: u64, json: bool) -> Result<()> {
    let plan = Builder::open(dir)?.plan(seqmin)?;
    let entries: Vec<PlanEntry> = plan
        .iter()
        .map(|request| PlanEntry {
            sequence: request.sequence,
            flags: request.flags.to_string(),
            path: request.program.display().to_string(),
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&entries)
            .map_err(|e| rib::RibError::Configuration(format!("JSON output: {}", e)))?;
        println!("{}", out);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No build scripts.");
        return Ok(());
    }
    for entry in &entries {
        let seq = entry.sequence.map(|s| s.to_string()).unwrap_or_default();
        println!("  {:>6}  {:8}  {}", seq, entry.flags, entry.path);
    }
    Ok(())
}
