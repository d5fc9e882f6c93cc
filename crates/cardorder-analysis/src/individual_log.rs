//! Individual log reader.
//!
//! The deck search writes every evaluated individual to `individual_log.csv`
//! in the experiment log directory. Only three columns matter here:
//!
//! ```text
//! Individual,...,AverageHealthDifference,...,Deck
//! 12,...,7.35,...,Consecration*Consecration*Tirion Fordring*...
//! ```
//!
//! Other columns (`Parent`, `WinCount`, `NumTurns`, ...) are ignored.

use std::{
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::deck::Deck;

pub const INDIVIDUAL_LOG_FILE: &str = "individual_log.csv";

/// Elite identifier assigned by the deck search.
pub type EliteId = u32;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("failed to read individual log {}: {source}", path.display())]
pub struct IndividualLogError {
    pub path: PathBuf,
    pub source: csv::Error,
}

/// The individual log does not hold exactly one row for an elite.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("individual log has {matches} rows for elite #{elite_id}, expected exactly one")]
pub struct NotFoundError {
    pub elite_id: EliteId,
    pub matches: usize,
}

/// One row of the individual log.
#[derive(Debug, Clone, Deserialize)]
pub struct LogIndividual {
    #[serde(rename = "Individual")]
    pub id: EliteId,
    #[serde(rename = "AverageHealthDifference")]
    pub average_health_difference: f64,
    #[serde(rename = "Deck")]
    pub deck: String,
}

/// A deck retained in the archive, with its baseline fitness.
#[derive(Debug, Clone, PartialEq)]
pub struct Elite {
    pub id: EliteId,
    pub deck: Deck,
    /// Average health difference of the complete deck
    pub fitness: f64,
}

#[derive(Debug, Clone, Default)]
pub struct IndividualLog {
    individuals: Vec<LogIndividual>,
}

impl IndividualLog {
    /// Reads `individual_log.csv` from an experiment log directory.
    pub fn open_in_log_dir<P>(log_dir: P) -> Result<Self, IndividualLogError>
    where
        P: AsRef<Path>,
    {
        Self::open(log_dir.as_ref().join(INDIVIDUAL_LOG_FILE))
    }

    pub fn open<P>(path: P) -> Result<Self, IndividualLogError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let wrap = |source| IndividualLogError {
            path: path.to_owned(),
            source,
        };
        let reader = csv::Reader::from_path(path).map_err(wrap)?;
        let log = Self::from_csv_reader(reader).map_err(wrap)?;
        log::info!(
            "Loaded {} individuals from {}",
            log.individuals.len(),
            path.display()
        );
        Ok(log)
    }

    pub fn from_reader<R>(reader: R) -> Result<Self, csv::Error>
    where
        R: io::Read,
    {
        Self::from_csv_reader(csv::Reader::from_reader(reader))
    }

    fn from_csv_reader<R>(mut reader: csv::Reader<R>) -> Result<Self, csv::Error>
    where
        R: io::Read,
    {
        let individuals = reader
            .deserialize::<LogIndividual>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { individuals })
    }

    #[must_use]
    pub fn individuals(&self) -> &[LogIndividual] {
        &self.individuals
    }

    /// Looks up an elite's complete deck and baseline fitness.
    ///
    /// Exactly one row must carry `elite_id`.
    pub fn find_elite(&self, elite_id: EliteId) -> Result<Elite, NotFoundError> {
        let mut rows = self.individuals.iter().filter(|ind| ind.id == elite_id);
        let (Some(row), None) = (rows.next(), rows.next()) else {
            let matches = self
                .individuals
                .iter()
                .filter(|ind| ind.id == elite_id)
                .count();
            return Err(NotFoundError { elite_id, matches });
        };
        Ok(Elite {
            id: row.id,
            deck: Deck::parse(&row.deck),
            fitness: row.average_health_difference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Individual,Parent,WinCount,AverageHealthDifference,NumTurns,Deck
1,0,120,4.5,10.2,A*B*B
2,1,80,-3.25,11.0,C*A
3,1,90,1.0,9.5,C*C
3,2,91,1.5,9.4,C*B
";

    #[test]
    fn test_find_elite() {
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        assert_eq!(log.individuals().len(), 4);

        let elite = log.find_elite(2).unwrap();
        assert_eq!(elite.id, 2);
        assert_eq!(elite.fitness, -3.25);
        assert_eq!(elite.deck, Deck::parse("C*A"));
    }

    #[test]
    fn test_missing_elite() {
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        assert_eq!(
            log.find_elite(42),
            Err(NotFoundError {
                elite_id: 42,
                matches: 0
            })
        );
    }

    #[test]
    fn test_ambiguous_elite() {
        let log = IndividualLog::from_reader(LOG.as_bytes()).unwrap();
        assert_eq!(log.find_elite(3).unwrap_err().matches, 2);
    }
}
