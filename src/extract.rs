//! Route stat extraction from the host page.
//!
//! The host page is an untrusted, unstable external data source: its build
//! system appends hashed suffixes to class names, and its client-side
//! rendering replaces stat nodes at arbitrary times. All page access goes
//! through the narrow [`PageSource`] trait so the fragile substring
//! matching lives in the host adapter and the extractor stays testable
//! against synthetic fixtures.

use crate::error::Result;
use crate::units::{parse_measurement, MeasureOptions};
use crate::Route;

/// One labeled stat rendered by the host page.
///
/// Either side may be missing: an icon-only stat has no value text, and a
/// half-rendered node may expose no label at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatItem {
    pub label: Option<String>,
    pub value: Option<String>,
}

impl StatItem {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            value: Some(value.into()),
        }
    }
}

/// Query surface the extractor depends on.
///
/// Implementations query the live page by partial class name (exact class
/// names do not survive the host's build system). Each stat item read is
/// individually fallible so one broken node cannot abort the batch.
pub trait PageSource {
    /// All currently rendered stat items, one `Result` per node.
    fn stat_items(&self) -> Vec<Result<StatItem>>;

    /// Current text of the activity-type selector, `None` while the
    /// control has not been rendered yet.
    fn activity_selector_text(&self) -> Option<String>;

    /// Title of the route being drawn, if the host exposes one.
    fn route_title(&self) -> Option<String>;

    /// URL of the page this source is attached to.
    fn page_url(&self) -> String;
}

impl<P: PageSource + ?Sized> PageSource for &P {
    fn stat_items(&self) -> Vec<Result<StatItem>> {
        (**self).stat_items()
    }

    fn activity_selector_text(&self) -> Option<String> {
        (**self).activity_selector_text()
    }

    fn route_title(&self) -> Option<String> {
        (**self).route_title()
    }

    fn page_url(&self) -> String {
        (**self).page_url()
    }
}

/// Labels the host page uses for the activity-type stat. The activity type
/// is encoded as the label itself, with an icon as the value.
pub const ACTIVITY_LABELS: [&str; 5] = ["trail run", "run", "ride", "walk", "hike"];

/// Extract the current route metrics from the host page.
///
/// Dispatches each stat item by its trimmed, lowercased label; items with
/// unrecognized labels are ignored and a faulting item is logged and
/// skipped. When the page exposes no stat items at all (not yet rendered),
/// the result is an all-absent [`Route`], not an error.
pub fn extract_route(source: &dyn PageSource) -> Route {
    let items = source.stat_items();
    if items.is_empty() {
        log::debug!("[Extractor] no stat items found, host UI may not be loaded yet");
        return Route::default();
    }

    let mut route = Route::default();
    for item in items {
        match item {
            Ok(item) => apply_stat_item(&mut route, &item),
            Err(e) => log::warn!("[Extractor] skipping unreadable stat item: {}", e),
        }
    }

    log::debug!("[Extractor] extracted {:?}", route);
    route
}

fn apply_stat_item(route: &mut Route, item: &StatItem) {
    let raw_label = match item.label.as_deref() {
        Some(l) => l.trim(),
        None => return,
    };
    let label = raw_label.to_lowercase();
    let value = item.value.as_deref().unwrap_or("").trim();

    match label.as_str() {
        "distance" => {
            route.distance_km = parse_measurement(value, MeasureOptions::distance());
        }
        "elevation gain" => {
            route.elevation_gain_m = parse_measurement(value, MeasureOptions::elevation());
        }
        "elevation loss" => {
            route.elevation_loss_m = parse_measurement(value, MeasureOptions::elevation());
        }
        _ if ACTIVITY_LABELS.contains(&label.as_str()) => {
            route.activity_label = Some(raw_label.to_string());
        }
        _ => {}
    }
}
