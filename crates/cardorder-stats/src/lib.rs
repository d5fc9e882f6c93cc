//! Rank-comparison and summary statistics for card-order analysis.
//!
//! - [`inversion`]: inversion counting between two rankings (merge-sort based,
//!   O(n log n)), mean squared position shift, and Kendall's tau derived from
//!   the inversion count
//! - [`descriptive`]: descriptive statistics used to summarize comparison reports
//!
//! # Examples
//!
//! ```
//! use cardorder_stats::{descriptive::DescriptiveStats, inversion::OrderComparison};
//!
//! let real_order = ["Consecration", "Truesilver Champion", "Blessing of Kings"];
//! let predicted = ["Truesilver Champion", "Consecration", "Blessing of Kings"];
//! let comparison = OrderComparison::new(&real_order, &predicted).unwrap();
//! assert_eq!(comparison.inversions, 1);
//!
//! let stats = DescriptiveStats::new([1.0, 3.0]).unwrap();
//! assert_eq!(stats.mean, 2.0);
//! ```

pub mod descriptive;
pub mod inversion;
