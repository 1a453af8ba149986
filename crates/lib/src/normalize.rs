//! # Lead Normalization
//!
//! Turns the flat field map scraped from a lead's detail form into a `LeadRecord`.
//! Trucking attributes that agents type into the comments box are recovered with
//! best-effort patterns; anything that does not match is left at its default.

use crate::types::{CampaignList, LeadRecord};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

static DOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:US\s*)?DOT\s*(?:#|no\.?|number)?\s*[:#]?\s*(\d{5,8})\b").unwrap()
});
static MC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bMC\s*(?:#|no\.?|number)?\s*[:#-]?\s*(\d{4,8})\b").unwrap()
});
static FLEET_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfleet(?:\s*size)?\s*[:=#-]?\s*(\d{1,4})\b").unwrap()
});
static FLEET_UNITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,4})\s*(?:power\s*units?|trucks?|tractors?|units?|vehicles?)\b").unwrap()
});
static PREMIUM_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)premium[^$\d]{0,20}\$?\s*([\d,]+(?:\.\d{1,2})?)").unwrap()
});
static DOLLAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([\d,]+(?:\.\d{1,2})?)").unwrap());
static STATES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:operating\s+states?)\s*[:=-]?\s*([A-Z]{2}(?:\s*[,/ ]\s*[A-Z]{2})*)\b").unwrap()
});
static CARRIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:current\s+carrier|insured\s+with)\s*[:=-]?\s*([A-Za-z0-9&.' ]{2,40}?)\s*(?:[,;\n]|\.(?:\s|$)|$)")
        .unwrap()
});
static COMMODITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:commodity|commodities|hauls?|hauling)\s*[:=-]?\s*([A-Za-z0-9&/' ]{2,40}?)\s*(?:[,;\n]|\.(?:\s|$)|$)")
        .unwrap()
});

/// Strips a phone number down to its national digits.
///
/// `"+1 (555) 123-4567"` becomes `"5551234567"`.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

/// Trucking attributes recovered from free text.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommentAttributes {
    pub dot_number: Option<String>,
    pub mc_number: Option<String>,
    pub fleet_size: Option<u32>,
    pub premium: Option<f64>,
    pub operating_states: Vec<String>,
    pub current_carrier: Option<String>,
    pub commodity: Option<String>,
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Scans a comments block for the attributes agents usually jot down.
pub fn extract_comment_attributes(text: &str) -> CommentAttributes {
    let fleet_size = first_capture(&FLEET_LABEL_RE, text)
        .or_else(|| first_capture(&FLEET_UNITS_RE, text))
        .and_then(|n| n.parse().ok());

    let premium = first_capture(&PREMIUM_LABEL_RE, text)
        .or_else(|| first_capture(&DOLLAR_RE, text))
        .and_then(|raw| parse_amount(&raw));

    let operating_states = first_capture(&STATES_RE, text)
        .map(|states| {
            states
                .split(|c: char| !c.is_ascii_alphabetic())
                .filter(|s| s.len() == 2)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    CommentAttributes {
        dot_number: first_capture(&DOT_RE, text),
        mc_number: first_capture(&MC_RE, text),
        fleet_size,
        premium,
        operating_states,
        current_carrier: first_capture(&CARRIER_RE, text),
        commodity: first_capture(&COMMODITY_RE, text),
    }
}

/// The list a lead belongs to, according to its detail form.
///
/// Status searches are not always scoped to the list being searched, so the
/// form's own `list_id` wins. A list missing from `known` keeps only its id.
pub fn owning_list<'a>(
    fields: &HashMap<String, String>,
    searched: &'a CampaignList,
    known: &'a [CampaignList],
) -> Cow<'a, CampaignList> {
    let form_list = fields.get("list_id").map(|v| v.trim()).unwrap_or_default();
    if form_list.is_empty() || form_list == searched.id {
        return Cow::Borrowed(searched);
    }
    match known.iter().find(|l| l.id == form_list) {
        Some(list) => Cow::Borrowed(list),
        None => Cow::Owned(CampaignList {
            id: form_list.to_string(),
            name: String::new(),
            campaign: String::new(),
            active: false,
        }),
    }
}

/// Builds a lead record from the scraped detail form of `lead_id`.
///
/// `fallback_status` is used when the form has no status field, which happens on
/// some admin skins; it is the status the lead was searched by.
pub fn lead_from_fields(
    lead_id: &str,
    fields: &HashMap<String, String>,
    list: &CampaignList,
    fallback_status: &str,
    source_tag: &str,
) -> LeadRecord {
    let field = |name: &str| {
        fields
            .get(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };
    let any_of = |names: &[&str]| {
        names
            .iter()
            .map(|name| field(name))
            .find(|v| !v.is_empty())
            .unwrap_or_default()
    };

    let mut lead = LeadRecord::new(lead_id);
    lead.first_name = field("first_name");
    lead.last_name = field("last_name");
    lead.phone = normalize_phone(&any_of(&["phone_number", "phone", "alt_phone"]));
    lead.email = field("email");
    lead.address = [field("address1"), field("address2")]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    lead.city = field("city");
    lead.state = field("state");
    lead.zip = any_of(&["postal_code", "zip"]);
    lead.comments = field("comments");
    lead.vendor_code = field("vendor_lead_code");
    lead.status = {
        let status = field("status");
        if status.is_empty() {
            fallback_status.to_string()
        } else {
            status
        }
    };
    lead.name = {
        let company = any_of(&["company", "address3", "title"]);
        if company.is_empty() {
            lead.full_name()
        } else {
            company
        }
    };
    lead.source = source_tag.to_string();
    lead.list_id = list.id.clone();
    lead.list_name = list.name.clone();
    lead.campaign = list.campaign.clone();

    let attrs = extract_comment_attributes(&lead.comments);
    lead.dot_number = any_of(&["dot_number", "dot"]);
    if lead.dot_number.is_empty() {
        lead.dot_number = attrs.dot_number.unwrap_or_default();
    }
    lead.mc_number = any_of(&["mc_number", "mc"]);
    if lead.mc_number.is_empty() {
        lead.mc_number = attrs.mc_number.unwrap_or_default();
    }
    lead.fleet_size = field("fleet_size")
        .parse()
        .ok()
        .or(attrs.fleet_size)
        .unwrap_or(0);
    lead.premium = parse_amount(field("premium").trim_start_matches('$')).or(attrs.premium);
    lead.operating_states = if attrs.operating_states.is_empty() && !lead.state.is_empty() {
        vec![lead.state.clone()]
    } else {
        attrs.operating_states
    };
    lead.current_carrier = attrs.current_carrier.unwrap_or_default();
    lead.commodity_hauled = attrs.commodity.unwrap_or_default();
    lead
}
