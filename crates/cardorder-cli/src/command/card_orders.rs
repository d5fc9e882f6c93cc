use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context;
use cardorder_analysis::{
    individual_log::{EliteId, IndividualLog},
    ranking::{self, SimulationOrders},
    remove_card::RemoveCardAnalysis,
};

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CardOrdersArg {
    /// Experiment log directory holding `individual_log.csv` and `remove_card_analysis/`
    log_dir: PathBuf,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &CardOrdersArg) -> anyhow::Result<()> {
    let individuals = IndividualLog::open_in_log_dir(&arg.log_dir)
        .with_context(|| format!("Failed to load individual log in {}", arg.log_dir.display()))?;
    let analysis = RemoveCardAnalysis::open(&arg.log_dir)?;

    let mut orders = BTreeMap::<EliteId, SimulationOrders>::new();
    for elite_id in analysis.elite_ids()? {
        let elite = match individuals.find_elite(elite_id) {
            Ok(elite) => elite,
            Err(e) => {
                log::warn!("Skipping elite #{elite_id}: {e}");
                continue;
            }
        };
        match analysis.load_perturbations(&elite) {
            Ok(perturbations) => {
                orders.insert(
                    elite_id,
                    ranking::simulation_orders(elite.fitness, &perturbations),
                );
            }
            Err(e) => log::warn!("Skipping elite #{elite_id}: {e}"),
        }
    }
    log::info!("Extracted card orders of {} elites", orders.len());

    Output::save_json(&orders, arg.output.clone())
}
