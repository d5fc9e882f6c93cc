//! Decks as card multisets and their numeric encodings.
//!
//! A [`Deck`] is the flat card list read from an individual log, where the
//! cards are joined by [`DECK_DELIMITER`]. A [`DeckEncoding`] is the same deck
//! as copy counts per card-pool feature (see
//! [`CardIndex::encode`](crate::card_index::CardIndex::encode)).
//!
//! Decks are never mutated after loading; a deck with one card removed is a
//! separate value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Separator between card names in the `Deck` column of an individual log.
pub const DECK_DELIMITER: char = '*';

/// A leave-one-card-out perturbation does not correspond to removing exactly
/// one distinct card from the complete deck.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum DataIntegrityError {
    #[display("incomplete deck is identical to the complete deck")]
    NoCardRemoved,
    #[display("incomplete deck removes several distinct cards: {cards:?}")]
    MultipleCardsRemoved { cards: Vec<String> },
    #[display("incomplete deck holds {found} copies of '{card}', complete deck only {expected}")]
    NotASubDeck {
        card: String,
        expected: usize,
        found: usize,
    },
    #[display("result file names card '{declared}' but the decks differ by '{actual}'")]
    RemovedCardMismatch { declared: String, actual: String },
}

/// The card that distinguishes a complete deck from one of its incomplete decks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedCard {
    pub card: String,
    /// Number of copies of `card` that were taken out
    pub copies: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deck {
    cards: Vec<String>,
}

impl Deck {
    #[must_use]
    pub fn new(cards: Vec<String>) -> Self {
        Self { cards }
    }

    /// Parses a `*`-joined card list. An empty string is an empty deck.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::default();
        }
        Self {
            cards: s.split(DECK_DELIMITER).map(str::to_owned).collect(),
        }
    }

    #[must_use]
    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Copies held of every distinct card.
    #[must_use]
    pub fn card_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for card in &self.cards {
            *counts.entry(card.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct cards in first-encounter order.
    #[must_use]
    pub fn distinct_cards(&self) -> Vec<&str> {
        let mut seen = Vec::<&str>::new();
        for card in &self.cards {
            if !seen.contains(&card.as_str()) {
                seen.push(card);
            }
        }
        seen
    }

    /// Returns a new deck without any copy of `card`.
    #[must_use]
    pub fn without_card(&self, card: &str) -> Self {
        Self {
            cards: self.cards.iter().filter(|c| *c != card).cloned().collect(),
        }
    }

    /// Finds the single distinct card removed to produce `incomplete`.
    ///
    /// Decks are compared as multisets, so repeated copies are accounted for.
    /// Any number of copies of the removed card may be missing, but exactly one
    /// distinct card must differ, and `incomplete` may not hold anything the
    /// complete deck lacks.
    pub fn removed_card(&self, incomplete: &Deck) -> Result<RemovedCard, DataIntegrityError> {
        let mut remaining = self.card_counts();
        for card in &incomplete.cards {
            let expected = self.cards.iter().filter(|c| *c == card).count();
            match remaining.get_mut(card.as_str()) {
                Some(count) if *count > 0 => *count -= 1,
                _ => {
                    return Err(DataIntegrityError::NotASubDeck {
                        card: card.clone(),
                        expected,
                        found: incomplete.cards.iter().filter(|c| *c == card).count(),
                    });
                }
            }
        }

        let mut removed = remaining
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(card, copies)| RemovedCard {
                card: card.to_owned(),
                copies,
            })
            .collect::<Vec<_>>();
        match removed.len() {
            0 => Err(DataIntegrityError::NoCardRemoved),
            1 => Ok(removed.remove(0)),
            _ => Err(DataIntegrityError::MultipleCardsRemoved {
                cards: removed.into_iter().map(|r| r.card).collect(),
            }),
        }
    }
}

/// Deck as copy counts, indexed by card-pool feature index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckEncoding {
    counts: Vec<f64>,
}

impl DeckEncoding {
    #[must_use]
    pub fn new(counts: Vec<f64>) -> Self {
        Self { counts }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.counts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Feature indices of cards with a nonzero count, ascending.
    pub fn present_features(&self) -> impl Iterator<Item = usize> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count != 0.0)
            .map(|(idx, _)| idx)
    }
}
