//! Bijective card-name ↔ feature-index table for one card pool.
//!
//! The table is loaded once per analysis run from a JSON object mapping card
//! names to indices (e.g. `paladin_card_index.json`):
//!
//! ```json
//! { "Blessing of Kings": 0, "Consecration": 1, "Truesilver Champion": 2 }
//! ```
//!
//! Indices must cover `0..n` exactly once. The table is immutable after loading
//! and is shared read-only between workers.

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use crate::deck::{Deck, DeckEncoding};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CardIndexError {
    #[display("failed to open card index {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[display("failed to parse card index {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("card index is empty")]
    Empty,
    #[display("cards '{first}' and '{second}' share index {index}")]
    DuplicateIndex {
        index: usize,
        first: String,
        second: String,
    },
    #[display("card '{card}' has index {index}, outside 0..{len}")]
    IndexOutOfRange {
        card: String,
        index: usize,
        len: usize,
    },
}

/// A card name that the card index does not know.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("card '{card}' is not in the card index")]
pub struct UnknownCardError {
    pub card: String,
}

#[derive(Debug, Clone)]
pub struct CardIndex {
    names: Vec<String>,
    index_of: HashMap<String, usize>,
}

impl CardIndex {
    /// Builds the table from a name → index mapping, validating that it is a
    /// bijection onto `0..mapping.len()`.
    pub fn from_map(mapping: BTreeMap<String, usize>) -> Result<Self, CardIndexError> {
        if mapping.is_empty() {
            return Err(CardIndexError::Empty);
        }

        let len = mapping.len();
        let mut names: Vec<Option<String>> = vec![None; len];
        for (card, &index) in &mapping {
            let slot = names
                .get_mut(index)
                .ok_or_else(|| CardIndexError::IndexOutOfRange {
                    card: card.clone(),
                    index,
                    len,
                })?;
            if let Some(first) = slot {
                return Err(CardIndexError::DuplicateIndex {
                    index,
                    first: first.clone(),
                    second: card.clone(),
                });
            }
            *slot = Some(card.clone());
        }

        // n distinct indices below n: every slot is filled.
        let names = names.into_iter().flatten().collect::<Vec<_>>();
        Ok(Self {
            names,
            index_of: mapping.into_iter().collect(),
        })
    }

    pub fn open<P>(path: P) -> Result<Self, CardIndexError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CardIndexError::Open {
            path: path.to_owned(),
            source,
        })?;
        let mapping: BTreeMap<String, usize> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CardIndexError::Parse {
                path: path.to_owned(),
                source,
            })?;
        let index = Self::from_map(mapping)?;
        log::info!("Loaded card index with {} cards from {}", index.len(), path.display());
        Ok(index)
    }

    /// Number of cards in the pool, i.e. the deck-encoding length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, card: &str) -> Result<usize, UnknownCardError> {
        self.index_of
            .get(card)
            .copied()
            .ok_or_else(|| UnknownCardError {
                card: card.to_owned(),
            })
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Card names in feature-index order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Encodes a deck as per-card copy counts, one entry per card in the pool.
    pub fn encode(&self, deck: &Deck) -> Result<DeckEncoding, UnknownCardError> {
        let mut counts = vec![0.0; self.len()];
        for card in deck.cards() {
            counts[self.index_of(card)?] += 1.0;
        }
        Ok(DeckEncoding::new(counts))
    }
}
