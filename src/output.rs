use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, SyncPlan, SyncResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_result(result: &SyncResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(plan: &SyncPlan) -> io::Result<()> {
        Self::print_json(plan)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Forwards pipeline progress to the log.
pub struct LogOutput;

impl ProgressSink for LogOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

pub fn print_summary(result: &SyncResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("lineage-sync summary for {}", result.input);
    println!("  rows read:         {}", result.rows);
    println!("  operations built:  {}", result.operations);
    if result.warnings > 0 {
        println!("{yellow}  record warnings:   {}{reset}", result.warnings);
    }
    println!("{green}  succeeded:         {}{reset}", result.write.succeeded());
    println!("  documents matched: {}", result.write.matched);
    println!("  documents updated: {}", result.write.modified);
    if result.write.skipped > 0 {
        println!("{yellow}  skipped (no id):   {}{reset}", result.write.skipped);
    }
    if result.write.failed > 0 {
        println!("{red}  failed:            {}{reset}", result.write.failed);
    }
}
