pub mod mercari;
pub mod normalize;
pub mod score;

pub use mercari::{MercariClient, MercariError, SearchQuery};
pub use normalize::{normalize_listing, Condition, Listing, RawListing, SellerInfo};
pub use score::{condition_factor, value_score};
