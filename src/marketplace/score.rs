//! Profitability scoring for normalized listings.

use super::normalize::{Condition, Listing};

/// Weight applied to the margin for a given condition; rougher items sell
/// slower and discount harder.
pub fn condition_factor(condition: Condition) -> f64 {
    match condition {
        Condition::New => 1.0,
        Condition::LikeNew => 0.95,
        Condition::VeryGood => 0.85,
        Condition::Good => 0.75,
        Condition::Acceptable => 0.6,
        Condition::Poor => 0.4,
    }
}

/// Estimate how profitable flipping `listing` at `reference_price` would be.
///
/// The score is the margin left after item and shipping cost, as a fraction
/// of the reference price, weighted by condition and clamped to `[0, 1]`.
/// A listing at or above the reference price scores 0.
pub fn value_score(listing: &Listing, reference_price: f64) -> f64 {
    if reference_price <= 0.0 {
        return 0.0;
    }
    let cost = listing.price + listing.shipping_cost;
    let margin = (reference_price - cost) / reference_price;
    (margin * condition_factor(listing.condition)).clamp(0.0, 1.0)
}
