//! Card rankings by estimated importance to one deck.
//!
//! Two extractors produce a [`CardRanking`]:
//!
//! - [`simulation_orders`] ranks cards by how much fitness drops when the card
//!   is removed, once for the real simulator and once for the surrogate.
//! - [`gradient_order`] ranks the cards present in a deck by the surrogate's
//!   fitness gradient at the deck encoding.
//!
//! Both sort descending with [`f64::total_cmp`] and keep equal scores in input
//! order, so ties resolve to result-file name order and ascending feature
//! index respectively. A positive NaN score ranks first.

use serde::Serialize;

use crate::{card_index::CardIndex, deck::DeckEncoding, remove_card::Perturbation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCard {
    pub card: String,
    /// Fitness delta or gradient value the ranking is sorted by
    pub score: f64,
    /// Copies of the card in the complete deck
    pub copies: usize,
}

/// Cards ordered from most to least impactful.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CardRanking {
    cards: Vec<RankedCard>,
}

impl CardRanking {
    /// Sorts `cards` by descending score, keeping ties in their given order.
    #[must_use]
    pub fn from_scores(mut cards: Vec<RankedCard>) -> Self {
        cards.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self { cards }
    }

    #[must_use]
    pub fn cards(&self) -> &[RankedCard] {
        &self.cards
    }

    /// Card names in rank order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.card.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Rankings derived from the leave-one-card-out simulations of one elite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOrders {
    /// Ranked by `baseline_fitness - real_performance`
    pub real_order: CardRanking,
    /// Ranked by `baseline_fitness - surrogate_performance`
    pub surrogate_order: CardRanking,
}

/// Ranks the removed cards by fitness delta on the real simulator and on the
/// surrogate, independently.
///
/// Each ranking holds one entry per perturbation.
#[must_use]
pub fn simulation_orders(
    baseline_fitness: f64,
    perturbations: &[Perturbation],
) -> SimulationOrders {
    let ranking = |performance: fn(&Perturbation) -> f64| {
        CardRanking::from_scores(
            perturbations
                .iter()
                .map(|p| RankedCard {
                    card: p.card_removed.clone(),
                    score: baseline_fitness - performance(p),
                    copies: p.copies_removed,
                })
                .collect(),
        )
    };
    SimulationOrders {
        real_order: ranking(|p| p.real_performance),
        surrogate_order: ranking(|p| p.surrogate_performance),
    }
}

/// Ranks the cards present in `encoding` by descending fitness gradient.
///
/// Cards with a zero count are left out whatever their gradient, so an empty
/// deck yields an empty ranking.
#[must_use]
pub fn gradient_order(
    card_index: &CardIndex,
    encoding: &DeckEncoding,
    fitness_gradient: &[f64],
) -> CardRanking {
    let counts = encoding.as_slice();
    let cards = encoding
        .present_features()
        .filter_map(|idx| {
            let card = card_index.name(idx)?;
            let score = *fitness_gradient.get(idx)?;
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let copies = counts[idx] as usize;
            Some(RankedCard {
                card: card.to_owned(),
                score,
                copies,
            })
        })
        .collect();
    CardRanking::from_scores(cards)
}
