use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context;
use cardorder_analysis::{
    comparator::{self, EliteError},
    individual_log::{EliteId, IndividualLog},
    ranking::CardRanking,
    remove_card::RemoveCardAnalysis,
};
use serde::Serialize;

use crate::util::{self, OracleArg, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct JacobianArg {
    /// Experiment log directory holding `individual_log.csv`
    log_dir: PathBuf,
    /// Card-index JSON file of the deck class
    #[arg(long)]
    card_index: PathBuf,
    #[clap(flatten)]
    oracle: OracleArg,
    /// Elite IDs to evaluate [default: every elite with remove-card results]
    #[arg(long = "elite")]
    elites: Vec<EliteId>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct EliteGradient {
    fitness: f64,
    /// Present cards by descending fitness gradient
    cards: CardRanking,
}

pub(crate) fn run(arg: &JacobianArg) -> anyhow::Result<()> {
    let card_index = util::read_card_index_file(&arg.card_index)?;
    let individuals = IndividualLog::open_in_log_dir(&arg.log_dir)
        .with_context(|| format!("Failed to load individual log in {}", arg.log_dir.display()))?;
    let elite_ids = if arg.elites.is_empty() {
        RemoveCardAnalysis::open(&arg.log_dir)?.elite_ids()?
    } else {
        arg.elites.clone()
    };
    let oracle = util::build_oracle(&arg.oracle, &arg.log_dir, &card_index)?;

    let mut gradients = BTreeMap::new();
    for elite_id in elite_ids {
        let elite = match individuals.find_elite(elite_id) {
            Ok(elite) => elite,
            Err(e) => {
                log::warn!("Skipping elite #{elite_id}: {e}");
                continue;
            }
        };
        match comparator::gradient_order(&card_index, oracle.as_ref(), &elite.deck) {
            Ok(cards) => {
                gradients.insert(
                    elite_id,
                    EliteGradient {
                        fitness: elite.fitness,
                        cards,
                    },
                );
            }
            Err(EliteError::Oracle(e)) if e.is_systemic() => {
                return Err(e).with_context(|| format!("Oracle failed at elite #{elite_id}"));
            }
            Err(e) => log::warn!("Skipping elite #{elite_id} ({}): {e}", e.reason_code()),
        }
    }

    Output::save_json(&gradients, arg.output.clone())
}
