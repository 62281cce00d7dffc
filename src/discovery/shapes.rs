//! Normalization of listing payloads
//!
//! The portal answers listing requests with a JSON array, a JSON object
//! wrapping a `data` array, an HTML `<option>` fragment, or something
//! malformed enough that only a regex recovers it. Each attempt here is a pure
//! function; [`normalize_listing`] tries them in order and the first success
//! wins.

use crate::markup::clean_text;
use crate::model::Item;
use crate::transport::snippet;
use crate::ParseError;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;

/// Keys that may carry a region id, in priority order
pub const ID_KEYS: [&str; 7] = [
    "id",
    "upazila_id",
    "UpazilaId",
    "UnionCode",
    "whrec_id",
    "value",
    "code",
];

/// Keys that may carry a region name, in priority order
pub const NAME_KEYS: [&str; 7] = [
    "name",
    "upazila_name",
    "UpazilaName",
    "UnionName",
    "wh_name",
    "text",
    "label",
];

/// A normalized `{id, name}` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: String,
    pub name: String,
}

impl Listing {
    fn new(id: &str, name: &str) -> Self {
        let id = id.trim().to_string();
        let name = clean_text(name);
        let name = if name.is_empty() { id.clone() } else { name };
        Self { id, name }
    }
}

/// Which attempt recognized the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingShape {
    JsonArray,
    JsonData,
    HtmlOptions,
    RegexFallback,
    Empty,
}

type Attempt = fn(&str) -> Option<Vec<Listing>>;

const ATTEMPTS: [(ListingShape, Attempt); 4] = [
    (ListingShape::JsonArray, parse_json_array),
    (ListingShape::JsonData, parse_json_data),
    (ListingShape::HtmlOptions, parse_html_options),
    (ListingShape::RegexFallback, parse_with_regex),
];

/// Normalizes a listing payload into `{id, name}` pairs
///
/// Returns an empty list for an empty body or a well-formed empty JSON
/// listing. A payload no attempt recognizes is a [`ParseError`].
pub fn normalize_listing(body: &str) -> Result<(Vec<Listing>, ListingShape), ParseError> {
    let body = body.trim_start_matches('\u{feff}').trim();
    if body.is_empty() {
        return Ok((Vec::new(), ListingShape::Empty));
    }

    for (shape, attempt) in ATTEMPTS {
        if let Some(listings) = attempt(body) {
            return Ok((dedup(listings), shape));
        }
    }

    Err(ParseError::Unrecognized {
        what: "listing",
        snippet: snippet(body),
    })
}

fn dedup(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = std::collections::HashSet::new();
    listings
        .into_iter()
        .filter(|l| !l.id.is_empty() && seen.insert(l.id.clone()))
        .collect()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_key(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| object.get(*k).and_then(value_to_string))
}

/// Maps an array of objects; `None` if the array is non-empty but nothing in it
/// looks like a listing entry.
fn listings_from_array(items: &[Value]) -> Option<Vec<Listing>> {
    if items.is_empty() {
        return Some(Vec::new());
    }
    let listings: Vec<Listing> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|object| {
            let id = first_key(object, &ID_KEYS)?;
            let name = first_key(object, &NAME_KEYS).unwrap_or_default();
            Some(Listing::new(&id, &name))
        })
        .collect();
    (!listings.is_empty()).then_some(listings)
}

/// (a) top-level JSON array of objects
pub fn parse_json_array(body: &str) -> Option<Vec<Listing>> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(items) => listings_from_array(&items),
        _ => None,
    }
}

/// (b) JSON object with a `data` array
pub fn parse_json_data(body: &str) -> Option<Vec<Listing>> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Object(object) => match object.get("data")? {
            Value::Array(items) => listings_from_array(items),
            _ => None,
        },
        _ => None,
    }
}

fn option_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("option").ok()).as_ref()
}

/// (c) HTML fragment of `<option value>` elements
///
/// Options with an empty value are placeholders ("Select ...") and skipped.
pub fn parse_html_options(body: &str) -> Option<Vec<Listing>> {
    if !body.contains("<option") {
        return None;
    }
    // Bare <option> fragments are dropped by the fragment parser outside a <select>
    let wrapped = format!("<select>{}</select>", body);
    let fragment = Html::parse_fragment(&wrapped);
    let listings: Vec<Listing> = fragment
        .select(option_selector()?)
        .filter_map(|option| {
            let value = option.value().attr("value")?;
            if value.trim().is_empty() {
                return None;
            }
            let text: String = option.text().collect();
            Some(Listing::new(value, &text))
        })
        .collect();
    (!listings.is_empty()).then_some(listings)
}

fn option_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<option[^>]*?value\s*=\s*["']([^"']*)["'][^>]*>(.*?)</option>"#).ok()
    })
    .as_ref()
}

fn union_object_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""UnionCode"\s*:\s*"?([^",}]*)"?\s*,\s*"UnionName"\s*:\s*"([^"]*)""#).ok()
    })
    .as_ref()
}

/// (d) regex over raw text for option tags and union objects
pub fn parse_with_regex(body: &str) -> Option<Vec<Listing>> {
    let mut listings: Vec<Listing> = option_regex()?
        .captures_iter(body)
        .filter(|c| !c[1].trim().is_empty())
        .map(|c| Listing::new(&c[1], &c[2]))
        .collect();

    listings.extend(
        union_object_regex()?
            .captures_iter(body)
            .map(|c| Listing::new(&c[1], &c[2])),
    );

    (!listings.is_empty()).then_some(listings)
}

fn button_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("button[id]").ok()).as_ref()
}

fn button_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<button[^>]*?\bid\s*=\s*["']([^"']+)["'][^>]*>(.*?)</button>"#).ok()
    })
    .as_ref()
}

/// Parses the item tab strip into items
///
/// Structural parsing first; the regex runs only when no `<button id>` element
/// can be located. An empty result is normal.
pub fn parse_item_buttons(body: &str) -> Vec<Item> {
    let fragment = Html::parse_fragment(body);
    let mut items: Vec<Item> = match button_selector() {
        Some(selector) => fragment
            .select(selector)
            .filter_map(|button| {
                let code = button.value().attr("id")?.trim();
                if code.is_empty() {
                    return None;
                }
                let name = clean_text(&button.text().collect::<String>());
                Some(Item::new(code, name))
            })
            .collect(),
        None => Vec::new(),
    };

    if items.is_empty() {
        if let Some(re) = button_regex() {
            items = re
                .captures_iter(body)
                .map(|c| Item::new(c[1].trim(), clean_text(&c[2])))
                .collect();
        }
        if !items.is_empty() {
            tracing::debug!("Item tabs recovered by regex fallback");
        }
    }

    let mut seen = std::collections::HashSet::new();
    items.retain(|i| seen.insert(i.code.clone()));
    items
}
