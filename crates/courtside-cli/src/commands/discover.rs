use anyhow::Result;
use courtside_core::TableKind;

use crate::Args;

#[cfg(target_os = "windows")]
pub fn run(args: &Args, table: TableKind, json: bool) -> Result<()> {
    use courtside_core::{DiscoveryReport, Error};
    use owo_colors::OwoColorize;

    super::with_engine(args, false, |engine| {
        let outcome = engine.run_discovery(table);
        let (report, conclusive): (DiscoveryReport, bool) = match outcome {
            Ok(report) => (report, true),
            Err(Error::DiscoveryInconclusive { report, .. }) => (*report, false),
            Err(e) => return Err(e.into()),
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "{} discovery: {} hits in {}ms (threshold {})",
            table, report.hits.len(), report.elapsed_ms, report.threshold
        );
        for hit in report.hits.iter().take(10) {
            println!("  hit {:>18}  {}", format!("{:#x}", hit.address), hit.target);
        }
        if report.hits.len() > 10 {
            println!("  ... {} more hits", report.hits.len() - 10);
        }
        println!("candidates:");
        for candidate in &report.candidates {
            let line = format!("  {:#018x}  {:>6} votes", candidate.address, candidate.votes);
            if Some(candidate.address) == report.chosen {
                println!("{}  <- chosen", line.green());
            } else {
                println!("{}", line);
            }
        }
        if !conclusive {
            println!(
                "{}",
                "no candidate crossed the threshold; configure a literal base or recalibrate"
                    .yellow()
            );
        }
        Ok(())
    })
}

#[cfg(not(target_os = "windows"))]
pub fn run(_args: &Args, _table: TableKind, _json: bool) -> Result<()> {
    Err(super::unsupported())
}
