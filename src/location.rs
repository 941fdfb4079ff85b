//! Location extraction from a rendered listing page.
//!
//! Strategies run in a fixed order and each field keeps the first value
//! found: embedded coordinates, then the site's address widget, then the
//! breadcrumb trail.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use select::document::Document;
use select::predicate::{Name, Predicate};
use serde::Serialize;
use utoipa::ToSchema;

/// Category and boilerplate words that never name a place.
const BREADCRUMB_STOP_WORDS: &[&str] = &[
    "acasa",
    "acasă",
    "home",
    "pagina principala",
    "pagina principală",
    "anunturi",
    "anunţuri",
    "anunțuri",
    "imobiliare",
    "apartamente",
    "garsoniere",
    "camere",
    "case",
    "vile",
    "terenuri",
    "spatii",
    "spații",
    "birouri",
    "de vanzare",
    "de vânzare",
    "de inchiriat",
    "de închiriat",
    "toate",
    "publi24",
    "olx",
];

/// Label prefixes of the ancillary listing parameters, with the key they are reported under.
const PARAMETER_LABELS: &[(&str, &str)] = &[
    ("suprafata utila", "usable_area"),
    ("suprafață utilă", "usable_area"),
    ("suprafata", "usable_area"),
    ("etaj", "floor"),
    ("compartimentare", "partitioning"),
    ("an constructie", "year_built"),
    ("an construcție", "year_built"),
    ("anul constructiei", "year_built"),
    ("numar camere", "rooms"),
    ("număr camere", "rooms"),
    ("nr. camere", "rooms"),
];

const MAP_HOST_MARKERS: &[&str] = &[
    "maps.google",
    "google.com/maps",
    "google.ro/maps",
    "goo.gl/maps",
    "openstreetmap.org",
    "waze.com",
];

static MAP_QUERY_COORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[?&](?:q|query|ll|daddr|center)=(-?\d{1,3}\.\d+)(?:,|%2C)\s*(-?\d{1,3}\.\d+)")
        .expect("valid map query regex")
});
static MAP_AT_COORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(-?\d{1,3}\.\d+),(-?\d{1,3}\.\d+)").expect("valid map path regex"));
static OSM_COORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"mlat=(-?\d{1,3}\.\d+)&(?:amp;)?mlon=(-?\d{1,3}\.\d+)").expect("valid osm regex")
});
static SCRIPT_LAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\b(?:lat|latitude)["']?\s*[:=]\s*["']?(-?\d{1,3}\.\d+)"#).expect("valid lat regex")
});
static SCRIPT_LNG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\b(?:lon|lng|longitude)["']?\s*[:=]\s*["']?(-?\d{1,3}\.\d+)"#).expect("valid lng regex")
});
static ADDRESS_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",|\s[-–—]\s").expect("valid address separator regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct LocationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Non-empty parts joined as "area, city, county".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl LocationRecord {
    pub fn is_empty(&self) -> bool {
        self.county.is_none()
            && self.city.is_none()
            && self.area.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }

    fn fill_places(&mut self, parts: &[String]) {
        let mut parts = parts.iter().filter(|p| !p.is_empty());
        if let Some(county) = parts.next() {
            self.county.get_or_insert_with(|| county.clone());
        }
        if let Some(city) = parts.next() {
            self.city.get_or_insert_with(|| city.clone());
        }
        let rest: Vec<&str> = parts.map(String::as_str).collect();
        if !rest.is_empty() {
            self.area.get_or_insert_with(|| rest.join(", "));
        }
    }

    fn compose_address(&mut self) {
        let parts: Vec<&str> = [&self.area, &self.city, &self.county]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        self.address = (!parts.is_empty()).then(|| parts.join(", "));
    }
}

/// Site-specific DOM knowledge the location strategies rely on.
pub trait LocationSource {
    /// Free-text address from the site's address widget or "show address" control.
    fn address_text(&self, doc: &Document) -> Option<String>;

    /// Breadcrumb entries in page order.
    fn breadcrumb_trail(&self, doc: &Document) -> Vec<String>;
}

/// Runs the strategy chain. Never fails; unknown fields stay `None`.
pub fn extract_location<S: LocationSource + ?Sized>(html: &str, source: &S) -> LocationRecord {
    let doc = Document::from(html);
    let mut record = LocationRecord::default();

    if let Some((lat, lng)) = find_coordinates(&doc) {
        record.latitude = Some(lat);
        record.longitude = Some(lng);
    }

    if let Some(text) = source.address_text(&doc) {
        record.fill_places(&split_address(&text));
    }

    if record.county.is_none() || record.city.is_none() {
        let known: Vec<String> = [&record.county, &record.city, &record.area]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::to_lowercase)
            .collect();
        // A place the widget already named must not fill a second slot.
        let mut candidates = breadcrumb_places(&source.breadcrumb_trail(&doc))
            .into_iter()
            .filter(|place| !known.contains(&place.to_lowercase()));
        if record.county.is_none() {
            record.county = candidates.next();
        }
        if record.city.is_none() {
            record.city = candidates.next();
        }
    }

    record.compose_address();
    record
}

/// First coordinates found in a map link, then in inline scripts.
pub fn find_coordinates(doc: &Document) -> Option<(f64, f64)> {
    let from_links = doc
        .find(Name("a"))
        .filter_map(|a| a.attr("href"))
        .filter(|href| MAP_HOST_MARKERS.iter().any(|m| href.contains(m)))
        .find_map(coordinates_in_map_url);
    if from_links.is_some() {
        return from_links;
    }

    doc.find(Name("script"))
        .map(|s| s.text())
        .find_map(|script| coordinates_in_script(&script))
}

pub fn coordinates_in_map_url(href: &str) -> Option<(f64, f64)> {
    [&*MAP_QUERY_COORDS, &*MAP_AT_COORDS, &*OSM_COORDS]
        .iter()
        .find_map(|re| re.captures(href))
        .and_then(|caps| valid_pair(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

fn coordinates_in_script(script: &str) -> Option<(f64, f64)> {
    let lat = SCRIPT_LAT.captures(script)?.get(1)?.as_str().to_string();
    let lng = SCRIPT_LNG.captures(script)?.get(1)?.as_str().to_string();
    valid_pair(&lat, &lng)
}

fn valid_pair(lat: &str, lng: &str) -> Option<(f64, f64)> {
    let lat: f64 = lat.parse().ok()?;
    let lng: f64 = lng.parse().ok()?;
    let in_range = lat.abs() <= 90.0 && lng.abs() <= 180.0;
    let null_island = lat == 0.0 && lng == 0.0;
    (in_range && !null_island).then_some((lat, lng))
}

/// Splits on commas and spaced dashes; hyphenated names stay whole.
pub fn split_address(text: &str) -> Vec<String> {
    ADDRESS_SEPARATOR
        .split(text)
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Drops boilerplate and numeric-only breadcrumb entries.
pub fn breadcrumb_places(trail: &[String]) -> Vec<String> {
    trail
        .iter()
        .map(|entry| collapse_whitespace(entry))
        .filter(|entry| !entry.is_empty())
        .filter(|entry| !entry.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()))
        .filter(|entry| {
            let lower = entry.to_lowercase();
            !BREADCRUMB_STOP_WORDS.iter().any(|w| lower.contains(w))
        })
        .collect()
}

/// Ancillary listing parameters found by label prefix, e.g. "Etaj: 3".
pub fn extract_parameters(html: &str) -> BTreeMap<String, String> {
    let doc = Document::from(html);
    let mut params = BTreeMap::new();

    let blocks = Name("li").or(Name("p")).or(Name("dd")).or(Name("tr"));
    for node in doc.find(blocks) {
        let text = node.text();
        for line in text.lines() {
            let line = collapse_whitespace(line);
            let lower = line.to_lowercase();
            for (label, key) in PARAMETER_LABELS {
                if params.contains_key(*key) || !lower.starts_with(label) {
                    continue;
                }
                // Byte offsets line up: lowercasing keeps these labels' lengths.
                let Some(rest) = line.get(label.len()..) else {
                    continue;
                };
                let value = rest.trim_start_matches([':', ' ', '-']).trim();
                if !value.is_empty() {
                    params.insert(key.to_string(), value.to_string());
                }
                break;
            }
        }
    }
    params
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
