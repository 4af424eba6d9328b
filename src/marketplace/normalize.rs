//! Normalization of raw Mercari listings into the canonical shape shared by
//! every marketplace integration.
//!
//! Marketplaces disagree on condition labels, seller fields, and where the
//! brand hides; everything downstream (scoring, events, UI) works on
//! [`Listing`] only.

use serde::{Deserialize, Serialize};

/// Canonical item condition across marketplaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    New,
    LikeNew,
    VeryGood,
    Good,
    Acceptable,
    Poor,
}

impl Condition {
    /// Map a Mercari condition label onto the canonical enum.
    ///
    /// Longer phrases are matched first so "Like New" never reads as "New";
    /// unrecognized labels fall back to `Good`.
    pub fn from_label(label: &str) -> Self {
        const TABLE: &[(&str, Condition)] = &[
            ("like new", Condition::LikeNew),
            ("brand new", Condition::New),
            ("new", Condition::New),
            ("very good", Condition::VeryGood),
            ("good", Condition::Good),
            ("acceptable", Condition::Acceptable),
            ("poor", Condition::Poor),
            ("has flaws", Condition::Poor),
        ];
        let label = label.to_lowercase();
        for (phrase, condition) in TABLE {
            if contains_phrase(&label, phrase) {
                return *condition;
            }
        }
        Condition::Good
    }
}

/// Whole-word phrase search: "new" must not match inside "renewed".
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(phrase) {
        let begin = start + pos;
        let end = begin + phrase.len();
        let bounded_left = begin == 0 || !bytes[begin - 1].is_ascii_alphanumeric();
        let bounded_right = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if bounded_left && bounded_right {
            return true;
        }
        // The phrases are ASCII, so begin + 1 stays on a char boundary.
        start = begin + 1;
    }
    false
}

/// Seller details extracted from a raw listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerInfo {
    pub seller_name: String,
    pub seller_rating: Option<f64>,
    pub total_sales: u64,
    pub joined_date: Option<String>,
}

/// Raw listing payload as returned by the Mercari search API.
///
/// Everything defaults: the API omits fields freely and a sparse listing
/// must still normalize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default, alias = "condition_description")]
    pub condition: Option<String>,
    #[serde(default)]
    pub seller_username: Option<String>,
    #[serde(default)]
    pub seller_rating: Option<f64>,
    #[serde(default)]
    pub seller_total_sales: Option<u64>,
    #[serde(default)]
    pub seller_join_date: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub shipping_cost: f64,
    #[serde(default)]
    pub shipping_method: Option<String>,
    #[serde(default, alias = "listing_url")]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RawListing {
    pub fn is_sold(&self) -> bool {
        self.status.as_deref() == Some("sold")
    }
}

/// Canonical normalized listing, as emitted in `listing.found` payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub platform: String,
    pub platform_id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub images: Vec<String>,
    pub condition: Condition,
    pub seller_info: SellerInfo,
    pub category: String,
    pub brand: Option<String>,
    pub shipping_cost: f64,
    pub shipping_method: String,
    pub url: Option<String>,
}

/// Brands recognized when the listing itself does not name one.
const KNOWN_BRANDS: &[&str] = &["Nike", "Adidas", "Apple", "Samsung", "Sony"];

pub fn normalize_listing(raw: &RawListing) -> Listing {
    Listing {
        platform: "Mercari".to_string(),
        platform_id: raw.id.clone(),
        title: raw.title.clone(),
        description: raw.description.clone(),
        price: raw.price,
        images: raw.image_urls.clone(),
        condition: raw
            .condition
            .as_deref()
            .map(Condition::from_label)
            .unwrap_or(Condition::Good),
        seller_info: extract_seller_info(raw),
        category: raw.category.clone().unwrap_or_else(|| "Unknown".to_string()),
        brand: extract_brand(raw),
        shipping_cost: raw.shipping_cost,
        shipping_method: raw
            .shipping_method
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        url: raw.url.clone().or_else(|| {
            (!raw.id.is_empty()).then(|| format!("https://mercari.com/item/{}", raw.id))
        }),
    }
}

pub fn extract_seller_info(raw: &RawListing) -> SellerInfo {
    SellerInfo {
        seller_name: raw
            .seller_username
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        seller_rating: raw.seller_rating,
        total_sales: raw.seller_total_sales.unwrap_or(0),
        joined_date: raw.seller_join_date.clone(),
    }
}

/// Brand from the explicit field, else the title, else the description.
fn extract_brand(raw: &RawListing) -> Option<String> {
    raw.brand
        .clone()
        .filter(|brand| !brand.is_empty())
        .or_else(|| find_brand(&raw.title))
        .or_else(|| find_brand(&raw.description))
}

fn find_brand(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    KNOWN_BRANDS
        .iter()
        .find(|brand| lowered.contains(&brand.to_lowercase()))
        .map(|brand| brand.to_string())
}
