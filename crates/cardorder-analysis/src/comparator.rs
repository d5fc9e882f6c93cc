//! Batch comparison of real and predicted card orders.
//!
//! Every elite goes through the same stages:
//!
//! ```text
//! LoadDeck -> ExtractRealOrder -> ExtractPredictedOrder -> Compare -> record
//! ```
//!
//! A failure in any stage skips that elite with a reason code and the batch
//! moves on. A systemic oracle failure (unreachable or misconfigured model)
//! stops the batch and is returned as [`BatchAbort`] together with the elites
//! recorded so far.
//!
//! Elites can be split across several worker threads. Workers share only
//! read-only inputs, and results are merged by elite ID.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use cardorder_stats::inversion::{OrderComparison, SetMismatchError};
use serde::{Deserialize, Serialize};

use crate::{
    card_index::{CardIndex, UnknownCardError},
    deck::{DataIntegrityError, Deck},
    individual_log::{EliteId, IndividualLog, NotFoundError},
    oracle::{self, GradientOracle, OracleError},
    ranking::{self, CardRanking, SimulationOrders},
    remove_card::{MissingDataError, PerturbationError, RemoveCardAnalysis},
    report::{ComparisonReport, DiscrepancyRecord, EliteComparison, SkippedElite},
};

/// Per-elite processing stage, reported with every skip.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[display("load_deck")]
    LoadDeck,
    #[display("extract_real_order")]
    ExtractRealOrder,
    #[display("extract_predicted_order")]
    ExtractPredictedOrder,
    #[display("compare")]
    Compare,
}

/// Where the predicted card order comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::FromStr)]
pub enum PredictionMode {
    /// Surrogate predictions for the same leave-one-card-out decks
    #[display("surrogate")]
    Surrogate,
    /// Gradient of a live surrogate model at the complete deck
    #[display("gradient")]
    Gradient,
}

#[derive(Debug, Clone, Copy)]
pub enum PredictedOrderSource<'a> {
    SurrogateSimulation,
    Gradient {
        card_index: &'a CardIndex,
        oracle: &'a dyn GradientOracle,
    },
}

impl PredictedOrderSource<'_> {
    #[must_use]
    pub fn mode(&self) -> PredictionMode {
        match self {
            PredictedOrderSource::SurrogateSimulation => PredictionMode::Surrogate,
            PredictedOrderSource::Gradient { .. } => PredictionMode::Gradient,
        }
    }
}

/// Why one elite was left out of the report.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum EliteError {
    NotFound(NotFoundError),
    MissingData(MissingDataError),
    DataIntegrity(DataIntegrityError),
    UnknownCard(UnknownCardError),
    SetMismatch(SetMismatchError),
    Oracle(OracleError),
}

impl From<PerturbationError> for EliteError {
    fn from(err: PerturbationError) -> Self {
        match err {
            PerturbationError::Missing(err) => EliteError::MissingData(err),
            PerturbationError::Integrity(err) => EliteError::DataIntegrity(err),
        }
    }
}

impl EliteError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            EliteError::NotFound(_) => "not_found",
            EliteError::MissingData(_) => "missing_data",
            EliteError::DataIntegrity(_) => "data_integrity",
            EliteError::UnknownCard(_) => "unknown_card",
            EliteError::SetMismatch(_) => "set_mismatch",
            EliteError::Oracle(OracleError::Timeout { .. }) => "oracle_timeout",
            EliteError::Oracle(_) => "oracle_failed",
        }
    }
}

/// An elite failure together with the stage it happened in.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("{stage}: {source}")]
pub struct EliteFailure {
    pub stage: Stage,
    pub source: EliteError,
}

fn at<E>(stage: Stage) -> impl FnOnce(E) -> EliteFailure
where
    E: Into<EliteError>,
{
    move |err| EliteFailure {
        stage,
        source: err.into(),
    }
}

/// A systemic failure stopped the batch.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("batch aborted at elite #{elite_id} ({stage}): {source}")]
pub struct BatchAbort {
    pub elite_id: EliteId,
    pub stage: Stage,
    pub source: OracleError,
    /// Elites recorded and skipped before the abort
    pub partial: ComparisonReport,
}

type Outcome = Option<Result<EliteComparison, EliteFailure>>;

#[derive(Debug)]
pub struct DeckOrderComparator<'a> {
    individuals: &'a IndividualLog,
    analysis: &'a RemoveCardAnalysis,
    source: PredictedOrderSource<'a>,
    card_index: Option<&'a CardIndex>,
    workers: usize,
}

impl<'a> DeckOrderComparator<'a> {
    #[must_use]
    pub fn new(
        individuals: &'a IndividualLog,
        analysis: &'a RemoveCardAnalysis,
        source: PredictedOrderSource<'a>,
    ) -> Self {
        Self {
            individuals,
            analysis,
            source,
            card_index: None,
            workers: 1,
        }
    }

    /// Rejects elites whose complete deck holds a card missing from `card_index`.
    #[must_use]
    pub fn with_card_index(mut self, card_index: &'a CardIndex) -> Self {
        self.card_index = Some(card_index);
        self
    }

    /// Number of worker threads; values below 1 mean 1.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Runs every stage for one elite.
    pub fn compare_elite(&self, elite_id: EliteId) -> Result<EliteComparison, EliteFailure> {
        let elite = self
            .individuals
            .find_elite(elite_id)
            .map_err(at(Stage::LoadDeck))?;
        if let Some(card_index) = self.card_index {
            card_index
                .encode(&elite.deck)
                .map_err(at(Stage::LoadDeck))?;
        }

        let perturbations = self
            .analysis
            .load_perturbations(&elite)
            .map_err(at::<PerturbationError>(Stage::ExtractRealOrder))?;
        let SimulationOrders {
            real_order,
            surrogate_order,
        } = ranking::simulation_orders(elite.fitness, &perturbations);

        let predicted_order = match self.source {
            PredictedOrderSource::SurrogateSimulation => surrogate_order,
            PredictedOrderSource::Gradient { card_index, oracle } => {
                gradient_order(card_index, oracle, &elite.deck)
                    .map_err(at(Stage::ExtractPredictedOrder))?
            }
        };

        let comparison = OrderComparison::new(&real_order.names(), &predicted_order.names())
            .map_err(at(Stage::Compare))?;
        log::debug!(
            "Elite #{elite_id}: {} cards, {} inversions",
            comparison.len(),
            comparison.inversions
        );
        Ok(EliteComparison {
            elite_id,
            record: DiscrepancyRecord {
                inversions: comparison.inversions,
                sum_squared_pos_shift: comparison.sum_squared_pos_shift,
                fitness: elite.fitness,
            },
            num_cards: comparison.len(),
            kendall_tau: comparison.kendall_tau(),
        })
    }

    /// Compares every elite in `elite_ids`.
    pub fn run(&self, elite_ids: &[EliteId]) -> Result<ComparisonReport, BatchAbort> {
        log::info!(
            "Comparing card orders of {} elites ({} mode, {} workers)",
            elite_ids.len(),
            self.source.mode(),
            self.workers
        );

        let abort = AtomicBool::new(false);
        let mut outcomes: Vec<Outcome> = elite_ids.iter().map(|_| None).collect();
        if self.workers == 1 || elite_ids.len() <= 1 {
            self.run_worker(elite_ids, &mut outcomes, &abort);
        } else {
            let chunk_size = elite_ids.len().div_ceil(self.workers);
            thread::scope(|s| {
                for (ids, slots) in elite_ids
                    .chunks(chunk_size)
                    .zip(outcomes.chunks_mut(chunk_size))
                {
                    let abort = &abort;
                    s.spawn(move || self.run_worker(ids, slots, abort));
                }
            });
        }

        let mut report = ComparisonReport::default();
        let mut systemic = None;
        for (&elite_id, outcome) in elite_ids.iter().zip(outcomes) {
            match outcome {
                None => {}
                Some(Ok(comparison)) => report.record(comparison),
                Some(Err(EliteFailure {
                    stage,
                    source: EliteError::Oracle(err),
                })) if err.is_systemic() => {
                    if systemic.is_none() {
                        systemic = Some((elite_id, stage, err));
                    }
                }
                Some(Err(failure)) => report.skip(SkippedElite {
                    elite_id,
                    stage: failure.stage,
                    reason: failure.source.reason_code().to_owned(),
                    message: failure.source.to_string(),
                }),
            }
        }

        if let Some((elite_id, stage, source)) = systemic {
            log::error!("Aborting batch at elite #{elite_id} ({stage}): {source}");
            return Err(BatchAbort {
                elite_id,
                stage,
                source,
                partial: report,
            });
        }

        log::info!(
            "Recorded {} elites, skipped {}",
            report.len(),
            report.skipped().len()
        );
        Ok(report)
    }

    fn run_worker(&self, elite_ids: &[EliteId], slots: &mut [Outcome], abort: &AtomicBool) {
        for (&elite_id, slot) in elite_ids.iter().zip(slots) {
            if abort.load(Ordering::Relaxed) {
                break;
            }
            let outcome = self.compare_elite(elite_id);
            if let Err(failure) = &outcome {
                if matches!(&failure.source, EliteError::Oracle(err) if err.is_systemic()) {
                    abort.store(true, Ordering::Relaxed);
                } else {
                    log::warn!(
                        "Skipping elite #{elite_id} at {} ({}): {}",
                        failure.stage,
                        failure.source.reason_code(),
                        failure.source
                    );
                }
            }
            *slot = Some(outcome);
        }
    }
}

/// Gradient-based predicted order of a complete deck.
pub fn gradient_order(
    card_index: &CardIndex,
    oracle: &dyn GradientOracle,
    deck: &Deck,
) -> Result<CardRanking, EliteError> {
    let encoding = card_index.encode(deck)?;
    let jacobian = oracle::evaluate_checked(oracle, &encoding)?;
    Ok(ranking::gradient_order(
        card_index,
        &encoding,
        jacobian.fitness_gradient(),
    ))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, fs, path::Path};

    use super::*;
    use crate::{
        deck::DeckEncoding,
        oracle::{Jacobian, SURROGATE_OUTPUT_COUNT},
    };

    const LOG: &str = "\
Individual,AverageHealthDifference,Deck
1,10.0,A*B*C
2,4.0,A*A*B
3,6.0,B*C
";

    fn write_result(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    fn real_result(cards: &[&str], fitness: f64) -> String {
        let cards = cards
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "[PlayerDeck]\nCardList = [{cards}]\n\n\
             [OverallStats]\nAverageHealthDifference = {fitness:?}\n"
        )
    }

    fn surrogate_result(fitness: f64) -> String {
        format!("AverageHealthDifference = {fitness:?}\n")
    }

    /// Elite 1: real deltas A 2, B 5, C 8; surrogate deltas A 1, B 9, C 3.
    /// Elite 2: real deltas A 3, B 1; surrogate agrees.
    /// Elite 3 has no result directories.
    fn fake_log_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let rca = dir.path().join("remove_card_analysis");
        let (real, surrogate) = (rca.join("real_sim"), rca.join("surrogate_sim"));

        let elite1 = [
            ("A", &["B", "C"][..], 8.0, 9.0),
            ("B", &["A", "C"][..], 5.0, 1.0),
            ("C", &["A", "B"][..], 2.0, 7.0),
        ];
        for (card, rest, real_fitness, surrogate_fitness) in elite1 {
            write_result(
                &real.join("elite#1"),
                &format!("remove_card-{card}.tml"),
                &real_result(rest, real_fitness),
            );
            write_result(
                &surrogate.join("elite#1"),
                &format!("remove_card{card}.tml"),
                &surrogate_result(surrogate_fitness),
            );
        }

        let elite2 = [("A", &["B"][..], 1.0, 0.5), ("B", &["A", "A"][..], 3.0, 2.5)];
        for (card, rest, real_fitness, surrogate_fitness) in elite2 {
            write_result(
                &real.join("elite#2"),
                &format!("remove_card-{card}.tml"),
                &real_result(rest, real_fitness),
            );
            write_result(
                &surrogate.join("elite#2"),
                &format!("remove_card-{card}.tml"),
                &surrogate_result(surrogate_fitness),
            );
        }
        dir
    }

    #[derive(Debug)]
    struct FixedGradient {
        gradient: Vec<f64>,
        error: Option<fn() -> OracleError>,
    }

    impl GradientOracle for FixedGradient {
        fn num_features(&self) -> usize {
            self.gradient.len()
        }

        fn evaluate_gradient(&self, _encoding: &DeckEncoding) -> Result<Jacobian, OracleError> {
            if let Some(error) = self.error {
                return Err(error());
            }
            Jacobian::from_rows(
                vec![self.gradient.clone(); SURROGATE_OUTPUT_COUNT],
                self.gradient.len(),
            )
        }
    }

    fn card_index() -> CardIndex {
        CardIndex::from_map(BTreeMap::from([
            ("A".to_owned(), 0),
            ("B".to_owned(), 1),
            ("C".to_owned(), 2),
        ]))
        .unwrap()
    }

    #[test]
    fn test_surrogate_mode() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let comparator =
            DeckOrderComparator::new(&log, &analysis, PredictedOrderSource::SurrogateSimulation);

        // real [C, B, A], surrogate [B, C, A]
        let comparison = comparator.compare_elite(1).unwrap();
        assert_eq!(comparison.record.inversions, 1);
        assert!((comparison.record.sum_squared_pos_shift - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(comparison.record.fitness, 10.0);
        assert_eq!(comparison.num_cards, 3);

        let comparison = comparator.compare_elite(2).unwrap();
        assert_eq!(comparison.record.inversions, 0);
        assert_eq!(comparison.kendall_tau, 1.0);
    }

    #[test]
    fn test_missing_directory_is_skipped() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let comparator =
            DeckOrderComparator::new(&log, &analysis, PredictedOrderSource::SurrogateSimulation);

        let report = comparator.run(&[1, 2, 3, 99]).unwrap();
        assert_eq!(report.discrepancy_map().keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let skipped = report
            .skipped()
            .iter()
            .map(|s| (s.elite_id, s.stage, s.reason.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            skipped,
            vec![
                (3, Stage::ExtractRealOrder, "missing_data"),
                (99, Stage::LoadDeck, "not_found"),
            ]
        );
    }

    #[test]
    fn test_gradient_mode() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let index = card_index();
        let oracle = FixedGradient {
            gradient: vec![0.9, 0.3, 0.6],
            error: None,
        };
        let comparator = DeckOrderComparator::new(
            &log,
            &analysis,
            PredictedOrderSource::Gradient {
                card_index: &index,
                oracle: &oracle,
            },
        );

        // real [C, B, A], gradient [A, C, B]
        let comparison = comparator.compare_elite(1).unwrap();
        assert_eq!(comparison.record.inversions, 2);

        // real [A, B], gradient [A, B]
        let comparison = comparator.compare_elite(2).unwrap();
        assert_eq!(comparison.record.inversions, 0);
    }

    #[test]
    fn test_partial_sweep_is_set_mismatch() {
        let dir = fake_log_dir();
        fs::remove_file(
            dir.path()
                .join("remove_card_analysis/real_sim/elite#1/remove_card-A.tml"),
        )
        .unwrap();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let index = card_index();
        let oracle = FixedGradient {
            gradient: vec![0.9, 0.3, 0.6],
            error: None,
        };
        let comparator = DeckOrderComparator::new(
            &log,
            &analysis,
            PredictedOrderSource::Gradient {
                card_index: &index,
                oracle: &oracle,
            },
        );
        let failure = comparator.compare_elite(1).unwrap_err();
        assert_eq!(failure.stage, Stage::Compare);
        assert_eq!(failure.source.reason_code(), "set_mismatch");
    }

    #[test]
    fn test_oracle_timeout_skips_elite() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let index = card_index();
        let oracle = FixedGradient {
            gradient: vec![0.0; 3],
            error: Some(|| OracleError::Timeout {
                limit: std::time::Duration::from_secs(1),
            }),
        };
        let comparator = DeckOrderComparator::new(
            &log,
            &analysis,
            PredictedOrderSource::Gradient {
                card_index: &index,
                oracle: &oracle,
            },
        );
        let report = comparator.run(&[1, 2]).unwrap();
        assert!(report.is_empty());
        assert!(report.skipped().iter().all(|s| s.reason == "oracle_timeout"));
    }

    #[test]
    fn test_systemic_oracle_failure_aborts() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let index = card_index();
        let oracle = FixedGradient {
            gradient: vec![0.0; 3],
            error: Some(|| OracleError::Unavailable {
                reason: "model server down".into(),
            }),
        };
        let comparator = DeckOrderComparator::new(
            &log,
            &analysis,
            PredictedOrderSource::Gradient {
                card_index: &index,
                oracle: &oracle,
            },
        );
        // elite 3 fails before the oracle is called and stays a plain skip
        let abort = comparator.run(&[3, 1, 2]).unwrap_err();
        assert_eq!(abort.elite_id, 1);
        assert_eq!(abort.stage, Stage::ExtractPredictedOrder);
        assert!(abort.partial.is_empty());
        assert_eq!(abort.partial.skipped().len(), 1);
    }

    #[test]
    fn test_parallel_run_matches_sequential() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let ids = [1, 2, 3, 99];

        let sequential =
            DeckOrderComparator::new(&log, &analysis, PredictedOrderSource::SurrogateSimulation)
                .run(&ids)
                .unwrap();
        let parallel =
            DeckOrderComparator::new(&log, &analysis, PredictedOrderSource::SurrogateSimulation)
                .with_workers(3)
                .run(&ids)
                .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_card_index_validates_decks() {
        let dir = fake_log_dir();
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        let analysis = RemoveCardAnalysis::open(dir.path()).unwrap();
        let index = CardIndex::from_map(BTreeMap::from([("A".to_owned(), 0), ("B".to_owned(), 1)]))
            .unwrap();
        let comparator =
            DeckOrderComparator::new(&log, &analysis, PredictedOrderSource::SurrogateSimulation)
                .with_card_index(&index);

        assert!(comparator.compare_elite(2).is_ok());
        let failure = comparator.compare_elite(1).unwrap_err();
        assert_eq!(failure.stage, Stage::LoadDeck);
        assert_eq!(failure.source.reason_code(), "unknown_card");
    }

    #[test]
    fn test_prediction_mode_from_str() {
        assert_eq!("gradient".parse::<PredictionMode>().unwrap(), PredictionMode::Gradient);
        assert_eq!(PredictionMode::Surrogate.to_string(), "surrogate");
    }
}
