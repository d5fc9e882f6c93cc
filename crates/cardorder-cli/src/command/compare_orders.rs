use std::path::{Path, PathBuf};

use anyhow::Context;
use cardorder_analysis::{
    comparator::{BatchAbort, DeckOrderComparator, PredictedOrderSource, PredictionMode},
    individual_log::{EliteId, IndividualLog},
    remove_card::RemoveCardAnalysis,
    report::{ComparisonReport, EliteComparison},
};
use serde::Serialize;

use crate::util::{self, OracleArg, Output};

const INVERSIONS_FILE: &str = "inversions.json";
const OUT_OF_DISTRIBUTION_INVERSIONS_FILE: &str = "out-dist_inversions.json";

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CompareOrdersArg {
    /// Experiment log directory holding `individual_log.csv` and `remove_card_analysis/`
    log_dir: PathBuf,
    /// Card-index JSON file of the deck class
    #[arg(long)]
    card_index: PathBuf,
    /// Source of the predicted card order
    #[arg(long, default_value = "surrogate")]
    mode: PredictionMode,
    #[clap(flatten)]
    oracle: OracleArg,
    /// Number of worker threads
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Report file path [default: LOG_DIR/inversions.json]
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write skipped elites to this JSON file
    #[arg(long)]
    skipped_output: Option<PathBuf>,
    /// Write per-elite rows including Kendall tau to this CSV file
    #[arg(long)]
    csv_output: Option<PathBuf>,
}

impl CompareOrdersArg {
    fn default_output(&self) -> PathBuf {
        let out_of_distribution = self.mode == PredictionMode::Gradient
            && self.oracle.oracle_command.is_empty()
            && self
                .oracle
                .model_dir
                .as_deref()
                .is_some_and(|dir| !same_dir(dir, &self.log_dir));
        let file = if out_of_distribution {
            OUT_OF_DISTRIBUTION_INVERSIONS_FILE
        } else {
            INVERSIONS_FILE
        };
        self.log_dir.join(file)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[derive(Debug, Serialize)]
struct CsvRow {
    elite_id: EliteId,
    fitness: f64,
    num_cards: usize,
    inversions: u64,
    sum_squared_pos_shift: f64,
    kendall_tau: f64,
}

impl From<&EliteComparison> for CsvRow {
    fn from(c: &EliteComparison) -> Self {
        Self {
            elite_id: c.elite_id,
            fitness: c.record.fitness,
            num_cards: c.num_cards,
            inversions: c.record.inversions,
            sum_squared_pos_shift: c.record.sum_squared_pos_shift,
            kendall_tau: c.kendall_tau,
        }
    }
}

pub(crate) fn run(arg: &CompareOrdersArg) -> anyhow::Result<()> {
    let card_index = util::read_card_index_file(&arg.card_index)?;
    let individuals = IndividualLog::open_in_log_dir(&arg.log_dir)
        .with_context(|| format!("Failed to load individual log in {}", arg.log_dir.display()))?;
    let analysis = RemoveCardAnalysis::open(&arg.log_dir)?;
    let elite_ids = analysis.elite_ids()?;

    let oracle = match arg.mode {
        PredictionMode::Surrogate => None,
        PredictionMode::Gradient => Some(util::build_oracle(
            &arg.oracle,
            &arg.log_dir,
            &card_index,
        )?),
    };
    let source = match &oracle {
        None => PredictedOrderSource::SurrogateSimulation,
        Some(oracle) => PredictedOrderSource::Gradient {
            card_index: &card_index,
            oracle: oracle.as_ref(),
        },
    };

    let comparator = DeckOrderComparator::new(&individuals, &analysis, source)
        .with_card_index(&card_index)
        .with_workers(arg.workers);
    let report = match comparator.run(&elite_ids) {
        Ok(report) => report,
        Err(abort) => {
            let BatchAbort {
                elite_id,
                stage,
                partial,
                ..
            } = &abort;
            log::error!(
                "{} elites recorded before the abort at elite #{elite_id} ({stage}); no report written",
                partial.len()
            );
            return Err(abort).context("Card-order comparison aborted");
        }
    };

    write_report(arg, &report)
}

fn write_report(arg: &CompareOrdersArg, report: &ComparisonReport) -> anyhow::Result<()> {
    let output = arg.output.clone().unwrap_or_else(|| arg.default_output());
    Output::save_json(&report.discrepancy_map(), Some(output))?;

    if let Some(path) = &arg.skipped_output {
        Output::save_json(&report.skipped(), Some(path.clone()))?;
    }
    if let Some(path) = &arg.csv_output {
        Output::create(Some(path.clone()))?.write_csv(report.comparisons().map(CsvRow::from))?;
    }
    Ok(())
}
