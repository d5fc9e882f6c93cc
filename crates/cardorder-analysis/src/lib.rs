//! Card-order analysis for surrogate-assisted deck search experiments
//!
//! This crate compares two rankings of the cards in every elite deck of an
//! experiment: the ground-truth order obtained by removing each card and
//! re-simulating games, and the order predicted by the surrogate model.
//!
//! # Overview
//!
//! ## Inputs
//!
//! 1. **Card Pool** ([`card_index::CardIndex`]): Card name ↔ feature index table
//! 2. **Elites** ([`individual_log::IndividualLog`]): Complete decks and baseline fitness
//! 3. **Perturbations** ([`remove_card::RemoveCardAnalysis`]): Leave-one-card-out results
//!    from the game simulator and the surrogate
//! 4. **Surrogate Model** ([`experiment::load_surrogate_oracle`]): Latest model checkpoint
//!    of a surrogate-assisted search, as a [`oracle::GradientOracle`]
//!
//! ## Ranking Extraction
//!
//! - **Simulation-Based** ([`ranking::simulation_orders`]): Cards by fitness drop when removed
//! - **Gradient-Based** ([`ranking::gradient_order`]): Present cards by fitness gradient
//!
//! ## Comparison
//!
//! [`comparator::DeckOrderComparator`] runs the extractors for every elite,
//! counts inversions between the real and predicted orders, and collects a
//! [`report::ComparisonReport`]. Elites with missing or inconsistent data are
//! skipped with a reason code; a systemic oracle failure aborts the batch.
//!
//! # Example
//!
//! ```no_run
//! use cardorder_analysis::{
//!     comparator::{DeckOrderComparator, PredictedOrderSource},
//!     individual_log::IndividualLog,
//!     remove_card::RemoveCardAnalysis,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log_dir = "logs/paladin_surrogate";
//! let individuals = IndividualLog::open_in_log_dir(log_dir)?;
//! let analysis = RemoveCardAnalysis::open(log_dir)?;
//! let comparator = DeckOrderComparator::new(
//!     &individuals,
//!     &analysis,
//!     PredictedOrderSource::SurrogateSimulation,
//! );
//! let report = comparator.run(&analysis.elite_ids()?)?;
//! println!("{}", serde_json::to_string(&report.discrepancy_map())?);
//! # Ok(())
//! # }
//! ```

pub mod card_index;
pub mod comparator;
pub mod deck;
pub mod experiment;
pub mod individual_log;
pub mod oracle;
pub mod ranking;
pub mod remove_card;
pub mod report;
