use std::path::PathBuf;

use cardorder_analysis::{
    individual_log::EliteId,
    report::{DiscrepancyMap, ReportSummary},
};
use cardorder_stats::descriptive::DescriptiveStats;
use serde::Serialize;

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SummarizeArg {
    /// Report files written by `compare-orders`
    #[arg(required = true)]
    reports: Vec<PathBuf>,
    /// Write `(report, elite_id, fitness, inversions, sum_squared_pos_shift)` rows to this CSV file
    #[arg(long)]
    csv_output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CsvRow {
    report: String,
    elite_id: EliteId,
    fitness: f64,
    inversions: u64,
    sum_squared_pos_shift: f64,
}

pub(crate) fn run(arg: &SummarizeArg) -> anyhow::Result<()> {
    let mut rows = vec![];
    for path in &arg.reports {
        let map: DiscrepancyMap = util::read_json("report", path)?;
        let summary = ReportSummary::new(map.values());

        println!("{} ({} elites)", path.display(), summary.count);
        print_stats("inversions", summary.inversions.as_ref());
        print_stats("sum_squared_pos_shift", summary.sum_squared_pos_shift.as_ref());

        let report = path.display().to_string();
        rows.extend(map.iter().map(|(&elite_id, record)| CsvRow {
            report: report.clone(),
            elite_id,
            fitness: record.fitness,
            inversions: record.inversions,
            sum_squared_pos_shift: record.sum_squared_pos_shift,
        }));
    }

    if let Some(path) = &arg.csv_output {
        Output::create(Some(path.clone()))?.write_csv(rows)?;
    }
    Ok(())
}

fn print_stats(name: &str, stats: Option<&DescriptiveStats>) {
    match stats {
        Some(s) => println!(
            "  {name:<22} mean={:.4} std={:.4} min={:.4} max={:.4} median={:.4}",
            s.mean, s.std_dev, s.min, s.max, s.median
        ),
        None => println!("  {name:<22} (no data)"),
    }
}
