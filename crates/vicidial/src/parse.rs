//! Parsers for the ViciDial responses the source relies on. All of them are pure
//! so they can be tested against captured pages.

use crate::VicidialError;
use leadsync::CampaignList;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap());
static INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name]").unwrap());
static TEXTAREA_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("textarea[name]").unwrap());
static SELECT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select[name]").unwrap());
static SELECTED_OPTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option[selected]").unwrap());

static LEAD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"admin_modify_lead\.php\?(?:.*[&;])?lead_id=(\d+)").unwrap());
static LIST_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&;]list_id=(\d+)").unwrap());

/// Fields whose presence marks a page as a real lead form.
const LEAD_FORM_MARKERS: &[&str] = &["phone_number", "first_name", "last_name", "lead_id"];

/// Input types that never carry lead data.
const IGNORED_INPUT_TYPES: &[&str] = &["submit", "button", "reset", "image"];

fn hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn capture_all(re: &Regex, hrefs: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    hrefs
        .iter()
        .filter_map(|href| re.captures(href))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Parses a `list_info` reply from the non-agent API (`stage=pipe`, `header=NO`):
/// `list_id|list_name|campaign_id|active|...`.
///
/// An `ERROR` reply or an empty body means the list does not exist.
pub fn parse_list_info(list_id: &str, body: &str) -> Result<Option<CampaignList>, VicidialError> {
    let Some(line) = body.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };
    if line.starts_with("ERROR") {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(VicidialError::Parse(format!(
            "list_info for {list_id} has {} fields: {line}",
            fields.len()
        )));
    }
    let id = if fields[0].is_empty() { list_id } else { fields[0] };
    Ok(Some(CampaignList {
        id: id.to_string(),
        name: fields[1].to_string(),
        campaign: fields[2].to_string(),
        active: fields[3].eq_ignore_ascii_case("Y"),
    }))
}

/// List ids linked from the admin "show lists" page, in document order.
pub fn parse_list_ids(html: &str) -> Vec<String> {
    capture_all(&LIST_ID_RE, &hrefs(html))
}

/// Lead ids linked from a search results page, de-duplicated, in document order.
pub fn parse_lead_ids(html: &str) -> Vec<String> {
    capture_all(&LEAD_ID_RE, &hrefs(html))
}

/// Collects every named control of the lead modify form.
///
/// Inputs contribute their `value`, textareas their text, selects their selected
/// option. Returns `None` when the page is not a lead form (login page, error page).
pub fn parse_lead_form(html: &str) -> Option<HashMap<String, String>> {
    let document = Html::parse_document(html);
    let mut fields = HashMap::new();

    for input in document.select(&INPUT_SELECTOR) {
        let element = input.value();
        let kind = element.attr("type").unwrap_or("text").to_ascii_lowercase();
        if IGNORED_INPUT_TYPES.contains(&kind.as_str()) {
            continue;
        }
        if (kind == "checkbox" || kind == "radio") && element.attr("checked").is_none() {
            continue;
        }
        if let Some(name) = element.attr("name") {
            let value = element.attr("value").unwrap_or_default();
            fields.insert(name.to_string(), value.trim().to_string());
        }
    }

    for textarea in document.select(&TEXTAREA_SELECTOR) {
        if let Some(name) = textarea.value().attr("name") {
            let text: String = textarea.text().collect();
            fields.insert(name.to_string(), text.trim().to_string());
        }
    }

    for select in document.select(&SELECT_SELECTOR) {
        let Some(name) = select.value().attr("name") else {
            continue;
        };
        if let Some(option) = select.select(&SELECTED_OPTION_SELECTOR).next() {
            let value = option
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| option.text().collect());
            fields.insert(name.to_string(), value.trim().to_string());
        }
    }

    LEAD_FORM_MARKERS
        .iter()
        .any(|marker| fields.contains_key(*marker))
        .then_some(fields)
}

/// File hrefs in a recordings directory listing whose name contains `phone`.
///
/// Sort links (`?C=N;O=D`) and sub-directories are ignored.
pub fn parse_recording_links(html: &str, phone: &str) -> Vec<String> {
    if phone.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    hrefs(html)
        .into_iter()
        .filter(|href| !href.starts_with('?') && !href.ends_with('/'))
        .filter(|href| file_name(href).contains(phone))
        .filter(|href| seen.insert(href.clone()))
        .collect()
}

/// The last path segment of an href, without any query string.
pub fn file_name(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/').next().unwrap_or(path)
}
