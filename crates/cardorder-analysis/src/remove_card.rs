//! Leave-one-card-out simulation results.
//!
//! The remove-card analysis re-simulates every elite once per distinct card,
//! with all copies of that card taken out of the deck, both on the real game
//! simulator and on the surrogate model:
//!
//! ```text
//! <log_dir>/remove_card_analysis/
//! ├─ real_sim/
//! │   └─ elite#<id>/
//! │       └─ remove_card-<Card>.tml   # PlayerDeck.CardList, OverallStats
//! └─ surrogate_sim/
//!     └─ elite#<id>/
//!         └─ remove_card<Card>.tml    # AverageHealthDifference, NumTurns, HandSize
//! ```
//!
//! Real and surrogate files are paired by the card named in the file name. The
//! removed card itself is recovered from the deck difference and checked
//! against that name.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    deck::{DataIntegrityError, Deck},
    individual_log::{Elite, EliteId},
};

pub const REMOVE_CARD_ANALYSIS_DIR: &str = "remove_card_analysis";
pub const REAL_SIM_DIR: &str = "real_sim";
pub const SURROGATE_SIM_DIR: &str = "surrogate_sim";

const ELITE_DIR_PREFIX: &str = "elite#";
const RESULT_FILE_PREFIX: &str = "remove_card";
const RESULT_FILE_EXTENSION: &str = "tml";

/// Expected remove-card results are absent or unusable.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum MissingDataError {
    #[display("directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },
    #[display("no remove-card results in {}", path.display())]
    NoResults { path: PathBuf },
    #[display("no surrogate result for card '{card}' in {}", dir.display())]
    SurrogateResultMissing { card: String, dir: PathBuf },
    #[display("failed to read {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },
    #[display("failed to parse {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum PerturbationError {
    Missing(MissingDataError),
    Integrity(DataIntegrityError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationKind {
    Real,
    Surrogate,
}

impl SimulationKind {
    fn dir_name(self) -> &'static str {
        match self {
            SimulationKind::Real => REAL_SIM_DIR,
            SimulationKind::Surrogate => SURROGATE_SIM_DIR,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RealSimResult {
    player_deck: PlayerDeck,
    overall_stats: OverallStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PlayerDeck {
    card_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OverallStats {
    average_health_difference: f64,
}

/// Surrogate prediction for an incomplete deck.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SurrogateSimResult {
    pub average_health_difference: f64,
    #[serde(default)]
    pub num_turns: Option<f64>,
    #[serde(default)]
    pub hand_size: Option<f64>,
}

/// Outcome of one leave-one-card-out perturbation of an elite deck.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    /// The distinct card removed from the complete deck
    pub card_removed: String,
    /// Copies of `card_removed` the complete deck held
    pub copies_removed: usize,
    pub incomplete_deck: Deck,
    /// Average health difference of the incomplete deck on the game simulator
    pub real_performance: f64,
    /// Average health difference of the incomplete deck predicted by the surrogate
    pub surrogate_performance: f64,
}

/// Handle on the `remove_card_analysis` tree of one experiment log directory.
#[derive(Debug, Clone)]
pub struct RemoveCardAnalysis {
    root: PathBuf,
}

impl RemoveCardAnalysis {
    /// Opens the tree under `log_dir`, failing if the real-simulation directory
    /// does not exist.
    pub fn open<P>(log_dir: P) -> Result<Self, MissingDataError>
    where
        P: AsRef<Path>,
    {
        let analysis = Self {
            root: log_dir.as_ref().join(REMOVE_CARD_ANALYSIS_DIR),
        };
        let real_dir = analysis.root.join(REAL_SIM_DIR);
        if !real_dir.is_dir() {
            return Err(MissingDataError::DirectoryNotFound { path: real_dir });
        }
        Ok(analysis)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn elite_dir(&self, kind: SimulationKind, elite_id: EliteId) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{ELITE_DIR_PREFIX}{elite_id}"))
    }

    /// IDs of all elites with a real-simulation result directory, ascending.
    pub fn elite_ids(&self) -> Result<Vec<EliteId>, MissingDataError> {
        let real_dir = self.root.join(REAL_SIM_DIR);
        let mut ids = list_dir(&real_dir)?
            .into_iter()
            .filter_map(|(name, path)| {
                let id = name.strip_prefix(ELITE_DIR_PREFIX)?.parse().ok();
                if id.is_none() || !path.is_dir() {
                    log::debug!("Ignoring {}", path.display());
                    return None;
                }
                id
            })
            .collect::<Vec<EliteId>>();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Loads every perturbation recorded for `elite`, in result-file name order.
    pub fn load_perturbations(
        &self,
        elite: &Elite,
    ) -> Result<Vec<Perturbation>, PerturbationError> {
        let real_dir = self.elite_dir(SimulationKind::Real, elite.id);
        let surrogate_dir = self.elite_dir(SimulationKind::Surrogate, elite.id);
        for dir in [&real_dir, &surrogate_dir] {
            if !dir.is_dir() {
                return Err(MissingDataError::DirectoryNotFound { path: dir.clone() }.into());
            }
        }

        let surrogate_files = result_files(&surrogate_dir)?;
        let mut perturbations = vec![];
        for (declared_card, real_path) in result_files(&real_dir)? {
            let surrogate_path = surrogate_files.get(&declared_card).ok_or_else(|| {
                MissingDataError::SurrogateResultMissing {
                    card: declared_card.clone(),
                    dir: surrogate_dir.clone(),
                }
            })?;

            let real: RealSimResult = read_toml(&real_path)?;
            let surrogate: SurrogateSimResult = read_toml(surrogate_path)?;

            let incomplete_deck = Deck::new(real.player_deck.card_list);
            let removed = elite.deck.removed_card(&incomplete_deck)?;
            if removed.card != declared_card {
                return Err(DataIntegrityError::RemovedCardMismatch {
                    declared: declared_card,
                    actual: removed.card,
                }
                .into());
            }

            perturbations.push(Perturbation {
                card_removed: removed.card,
                copies_removed: removed.copies,
                incomplete_deck,
                real_performance: real.overall_stats.average_health_difference,
                surrogate_performance: surrogate.average_health_difference,
            });
        }

        if perturbations.is_empty() {
            return Err(MissingDataError::NoResults { path: real_dir }.into());
        }
        Ok(perturbations)
    }
}

/// Extracts the card name from `remove_card-<Card>.tml` or `remove_card<Card>.tml`.
fn card_from_file_name(file_name: &str) -> Option<&str> {
    let stem = file_name
        .strip_suffix(RESULT_FILE_EXTENSION)?
        .strip_suffix('.')?
        .strip_prefix(RESULT_FILE_PREFIX)?;
    let card = stem.strip_prefix('-').unwrap_or(stem);
    (!card.is_empty()).then_some(card)
}

/// Result files of one elite directory keyed by declared card, in name order.
fn result_files(dir: &Path) -> Result<BTreeMap<String, PathBuf>, MissingDataError> {
    let mut files = BTreeMap::new();
    for (name, path) in list_dir(dir)? {
        match card_from_file_name(&name) {
            Some(card) if path.is_file() => {
                files.insert(card.to_owned(), path);
            }
            _ => log::debug!("Ignoring {}", path.display()),
        }
    }
    Ok(files)
}

fn list_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>, MissingDataError> {
    let unreadable = |source| MissingDataError::Unreadable {
        path: dir.to_owned(),
        source,
    };
    let mut entries = vec![];
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    Ok(entries)
}

fn read_toml<T>(path: &Path) -> Result<T, MissingDataError>
where
    T: serde::de::DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|source| MissingDataError::Unreadable {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| MissingDataError::Malformed {
        path: path.to_owned(),
        source,
    })
}
