//! Marketplace scan pipeline: the resident producer feeding the broadcaster.
//!
//! Each pass searches Mercari, normalizes the results, and turns them into
//! events: `listing.found` for every live listing, `opportunity.created` /
//! `opportunity.updated` for listings whose profitability score clears the
//! tracking threshold, `alert.high-value` above the alert threshold, and a
//! closing `job.complete` (or `job.failed`). Delivery is best-effort; the
//! pipeline never knows or cares who is subscribed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use crate::broadcaster::Broadcaster;
use crate::event::EventKind;
use crate::marketplace::{
    normalize_listing, value_score, MercariClient, MercariError, RawListing, SearchQuery,
};

/// Tuning for the scan loop.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub query: SearchQuery,
    pub interval: Duration,
    /// Assumed resale value. Without one, scoring (and with it the
    /// opportunity and alert events) is skipped.
    pub reference_price: Option<f64>,
    /// Score at or above which a listing becomes a tracked opportunity.
    pub opportunity_score: f64,
    /// Score at or above which a high-value alert fires.
    pub alert_score: f64,
}

/// Totals for one scan pass, embedded in the `job.complete` payload.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub listings: usize,
    pub opportunities: usize,
    pub updates: usize,
    pub alerts: usize,
}

/// Remembers scored listings across passes so repeat sightings become
/// `opportunity.updated` instead of duplicate `opportunity.created` events.
#[derive(Debug, Default)]
pub struct OpportunityTracker {
    scores: HashMap<String, f64>,
}

enum Observation {
    New,
    Changed,
    Unchanged,
    Below,
}

impl OpportunityTracker {
    fn observe(&mut self, platform_id: &str, score: f64, threshold: f64) -> Observation {
        if score < threshold {
            // A listing that drops below the bar stops being tracked, so a
            // later recovery reads as a fresh opportunity.
            self.scores.remove(platform_id);
            return Observation::Below;
        }
        match self.scores.insert(platform_id.to_string(), score) {
            None => Observation::New,
            Some(previous) if (previous - score).abs() > f64::EPSILON => Observation::Changed,
            Some(_) => Observation::Unchanged,
        }
    }
}

/// Run scan passes forever on the configured interval. The first pass fires
/// immediately.
pub async fn run(client: MercariClient, broadcaster: Broadcaster, config: ScanConfig) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut tracker = OpportunityTracker::default();
    loop {
        interval.tick().await;
        if let Err(error) = scan_once(&client, &broadcaster, &config, &mut tracker).await {
            tracing::warn!(%error, "scan pass failed");
        }
    }
}

/// One search-and-publish pass.
pub async fn scan_once(
    client: &MercariClient,
    broadcaster: &Broadcaster,
    config: &ScanConfig,
    tracker: &mut OpportunityTracker,
) -> Result<ScanSummary, MercariError> {
    let started = Instant::now();
    let raw = match client.search(&config.query).await {
        Ok(raw) => raw,
        Err(error) => {
            let _ = broadcaster.emit(
                EventKind::JobFailed,
                &json!({
                    "job": "mercari.scan",
                    "error": error.to_string(),
                }),
            );
            return Err(error);
        }
    };

    let summary = publish_listings(broadcaster, config, tracker, &raw);
    let _ = broadcaster.emit(
        EventKind::JobComplete,
        &json!({
            "job": "mercari.scan",
            "duration_ms": started.elapsed().as_millis() as u64,
            "summary": &summary,
        }),
    );
    tracing::info!(
        listings = summary.listings,
        opportunities = summary.opportunities,
        alerts = summary.alerts,
        "scan pass complete",
    );
    Ok(summary)
}

fn publish_listings(
    broadcaster: &Broadcaster,
    config: &ScanConfig,
    tracker: &mut OpportunityTracker,
    raw: &[RawListing],
) -> ScanSummary {
    let mut summary = ScanSummary::default();
    for raw_listing in raw {
        if raw_listing.is_sold() {
            continue;
        }
        let listing = normalize_listing(raw_listing);
        summary.listings += 1;
        let _ = broadcaster.emit(EventKind::ListingFound, &listing);

        let Some(reference) = config.reference_price else {
            continue;
        };
        let score = value_score(&listing, reference);
        match tracker.observe(&listing.platform_id, score, config.opportunity_score) {
            Observation::New => {
                summary.opportunities += 1;
                let _ = broadcaster.emit(
                    EventKind::OpportunityCreated,
                    &json!({ "listing": &listing, "score": score }),
                );
            }
            Observation::Changed => {
                summary.updates += 1;
                let _ = broadcaster.emit(
                    EventKind::OpportunityUpdated,
                    &json!({ "platform_id": &listing.platform_id, "score": score }),
                );
            }
            Observation::Unchanged | Observation::Below => {}
        }
        if score >= config.alert_score {
            summary.alerts += 1;
            let _ = broadcaster.emit(
                EventKind::AlertHighValue,
                &json!({ "listing": &listing, "score": score }),
            );
        }
    }
    summary
}
