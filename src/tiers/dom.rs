//! Structured-data and heuristic field extraction over an HTML document.
//!
//! Shared by the static and rendered tiers: both end up with an HTML string
//! (plain-fetched or post-render) and run the same pipeline over it —
//! JSON-LD `JobPosting` markup first, then meta tags, then class-name
//! heuristics. All of this is synchronous CPU work; `scraper::Html` is
//! never held across an await point.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::types::ExtractedFields;

/// Longest description we keep, in characters.
const MAX_DESCRIPTION_CHARS: usize = 10_000;

/// Longest visible-text excerpt handed to the semantic tier, in characters.
const MAX_VISIBLE_TEXT_CHARS: usize = 60_000;

/// Minimum length for a heuristic description candidate to count.
const MIN_DESCRIPTION_CHARS: usize = 200;

lazy_static! {
    static ref JSON_LD_SELECTOR: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse("title").unwrap();
    static ref OG_TITLE_SELECTOR: Selector =
        Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    static ref SITE_NAME_SELECTOR: Selector =
        Selector::parse(r#"meta[property="og:site_name"]"#).unwrap();
    static ref COMPANY_META_SELECTOR: Selector =
        Selector::parse(r#"meta[name="company"], meta[name="author"]"#).unwrap();
    static ref LOCATION_CLASS_SELECTOR: Selector = Selector::parse(
        r#"[class*="job-location"], [class*="jobLocation"], [class*="location"]"#
    )
    .unwrap();
    static ref LOCATION_META_SELECTOR: Selector =
        Selector::parse(r#"meta[name="location"]"#).unwrap();
    static ref SALARY_CLASS_SELECTOR: Selector =
        Selector::parse(r#"[class*="salary"], [class*="compensation"], [class*="pay"]"#).unwrap();
    static ref DESCRIPTION_SELECTORS: Vec<Selector> = [
        r#"[class*="job-description"]"#,
        r#"[class*="jobDescription"]"#,
        r#"[class*="description"]"#,
        r#"[id*="job-description"]"#,
        r#"[id*="description"]"#,
        "article",
        r#"[role="main"]"#,
        "main",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect();

    static ref SALARY_TEXT: Regex = Regex::new(
        r"(?i)[$£€][\d,]+(?:\s*[-–]\s*[$£€]?[\d,]+)?(?:\s*(?:per|/|a)\s*(?:year|yr|annum|hour|hr|month|mo))?"
    )
    .unwrap();
    static ref SCRIPT_BLOCK: Regex = Regex::new(r"(?si)<script[^>]*>.*?</script>").unwrap();
    static ref STYLE_BLOCK: Regex = Regex::new(r"(?si)<style[^>]*>.*?</style>").unwrap();
    static ref MULTI_BLANK: Regex = Regex::new(r"\n{3,}").unwrap();
}

const JOB_SUBDOMAINS: [&str; 5] = ["jobs", "careers", "hiring", "recruit", "work"];

/// Run the full structured-data/heuristic pipeline over an HTML document.
pub fn extract_fields(html: &str, url: &Url) -> ExtractedFields {
    let document = Html::parse_document(html);
    let json_ld = find_job_posting_json_ld(&document);

    let title = extract_title(&document, json_ld.as_ref());
    let company = extract_company(&document, json_ld.as_ref())
        .or_else(|| company_from_host(url.host_str().unwrap_or("")));
    let location = extract_location(&document, json_ld.as_ref());
    let salary = extract_salary(&document, json_ld.as_ref(), html);
    let description = extract_description(&document, json_ld.as_ref());

    ExtractedFields {
        title,
        company,
        location,
        salary,
        description,
    }
    .normalized()
}

/// Strip scripts/styles and collapse the document to visible text, capped
/// for prompt assembly.
pub fn visible_text(html: &str) -> String {
    let stripped = SCRIPT_BLOCK.replace_all(html, " ");
    let stripped = STYLE_BLOCK.replace_all(&stripped, " ");

    let document = Html::parse_document(&stripped);
    let mut text = String::new();
    for chunk in document.root_element().text() {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(chunk);
        if text.len() >= MAX_VISIBLE_TEXT_CHARS {
            break;
        }
    }
    truncate_at_char_boundary(&text, MAX_VISIBLE_TEXT_CHARS).to_string()
}

/// Locate a `JobPosting` object in any JSON-LD block: top level, inside an
/// array, or inside an `@graph` array.
fn find_job_posting_json_ld(document: &Html) -> Option<Value> {
    for script in document.select(&JSON_LD_SELECTOR) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };

        if let Some(posting) = job_posting_in(&data) {
            return Some(posting.clone());
        }
    }
    None
}

fn job_posting_in(data: &Value) -> Option<&Value> {
    match data {
        Value::Object(map) => {
            if map.get("@type").and_then(Value::as_str) == Some("JobPosting") {
                return Some(data);
            }
            if let Some(graph) = map.get("@graph").and_then(Value::as_array) {
                return graph
                    .iter()
                    .find(|item| item.get("@type").and_then(Value::as_str) == Some("JobPosting"));
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find(|item| item.get("@type").and_then(Value::as_str) == Some("JobPosting")),
        _ => None,
    }
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

fn extract_title(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    if let Some(title) = json_ld
        .and_then(|j| j.get("title"))
        .and_then(Value::as_str)
    {
        let title = title.trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
    }

    if let Some(og) = meta_content(document, &OG_TITLE_SELECTOR) {
        return Some(og);
    }

    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_company(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    if let Some(org) = json_ld.and_then(|j| j.get("hiringOrganization")) {
        let name = match org {
            Value::Object(map) => map.get("name").and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        };
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
    }

    meta_content(document, &SITE_NAME_SELECTOR)
        .or_else(|| meta_content(document, &COMPANY_META_SELECTOR))
        // Twitter handles sneak into author/company meta tags.
        .filter(|c| !c.starts_with('@'))
}

fn place_to_location(place: &Value) -> Option<String> {
    let address = place.get("address")?;
    match address {
        Value::Object(map) => {
            let parts: Vec<&str> = ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn extract_location(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    if let Some(job_location) = json_ld.and_then(|j| j.get("jobLocation")) {
        let found = match job_location {
            Value::Array(places) => {
                let locations: Vec<String> =
                    places.iter().filter_map(place_to_location).collect();
                if locations.is_empty() {
                    None
                } else {
                    Some(locations.join("; "))
                }
            }
            Value::Object(_) => place_to_location(job_location),
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }

    // Remote postings often carry it in jobLocationType instead.
    if let Some(location_type) = json_ld
        .and_then(|j| j.get("jobLocationType"))
        .and_then(Value::as_str)
    {
        if location_type.eq_ignore_ascii_case("TELECOMMUTE") {
            return Some("Remote".to_string());
        }
    }

    document
        .select(&LOCATION_CLASS_SELECTOR)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty() && text.len() < 200)
        .or_else(|| meta_content(document, &LOCATION_META_SELECTOR))
}

fn extract_salary(document: &Html, json_ld: Option<&Value>, html: &str) -> Option<String> {
    if let Some(salary) = json_ld
        .and_then(|j| j.get("baseSalary"))
        .and_then(format_base_salary)
    {
        return Some(salary);
    }

    if let Some(salary) = document
        .select(&SALARY_CLASS_SELECTOR)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty() && t.len() < 100 && t.chars().any(|c| c.is_ascii_digit()))
    {
        return Some(salary);
    }

    // The regex sweep runs over visible text only, so a dollar figure
    // inside a script or style block never surfaces as a salary.
    SALARY_TEXT
        .find(&visible_text(html))
        .map(|m| m.as_str().trim().to_string())
}

/// Render a schema.org `MonetaryAmount` as a display string, e.g.
/// `USD 100,000 - 150,000 / YEAR`.
fn format_base_salary(base: &Value) -> Option<String> {
    let currency = base
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();
    let value = base.get("value")?;

    let formatted = match value {
        Value::Object(map) => {
            let unit = map
                .get("unitText")
                .and_then(Value::as_str)
                .unwrap_or("YEAR");
            let min = map.get("minValue").and_then(Value::as_f64);
            let max = map.get("maxValue").and_then(Value::as_f64);
            match (min, max) {
                (Some(min), Some(max)) => {
                    format!("{} - {} / {}", group_thousands(min), group_thousands(max), unit)
                }
                (Some(min), None) => format!("{} / {}", group_thousands(min), unit),
                _ => map
                    .get("value")
                    .and_then(Value::as_f64)
                    .map(|v| format!("{} / {}", group_thousands(v), unit))?,
            }
        }
        Value::Number(n) => group_thousands(n.as_f64()?),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    let combined = format!("{currency} {formatted}");
    Some(combined.trim().to_string()).filter(|s| !s.is_empty())
}

fn extract_description(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    if let Some(raw) = json_ld
        .and_then(|j| j.get("description"))
        .and_then(Value::as_str)
    {
        // JSON-LD descriptions frequently arrive with escaped markup.
        let unescaped = unescape_entities(raw);
        let markdown = html_to_text(&unescaped);
        let cleaned = clean_description(&markdown);
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }

    for selector in DESCRIPTION_SELECTORS.iter() {
        if let Some(node) = document.select(selector).next() {
            let cleaned = clean_description(&html_to_text(&node.html()));
            if cleaned.len() > MIN_DESCRIPTION_CHARS {
                return Some(cleaned);
            }
        }
    }

    None
}

/// Convert an HTML fragment to readable text (markdown-ish), falling back to
/// raw text collection if conversion fails.
fn html_to_text(html: &str) -> String {
    if !html.contains('<') {
        return html.to_string();
    }
    htmd::convert(html).unwrap_or_else(|_| {
        Html::parse_fragment(html)
            .root_element()
            .text()
            .collect::<String>()
    })
}

/// Trim each line, drop empties beyond paragraph breaks, cap the length.
fn clean_description(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = MULTI_BLANK.replace_all(&joined, "\n\n");
    truncate_at_char_boundary(collapsed.trim(), MAX_DESCRIPTION_CHARS).to_string()
}

/// Derive a candidate company name from the host, e.g.
/// `jobs.predli.com` -> `Predli`. Last-resort fallback only.
pub fn company_from_host(host: &str) -> Option<String> {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    let mut name = *labels.first()?;

    // jobs.company.com / careers.company.com: skip the job-board label.
    if JOB_SUBDOMAINS.contains(&name) && labels.len() > 2 {
        name = labels[1];
    }

    let name = name.trim_matches(['-', '_']);
    if name.is_empty() || JOB_SUBDOMAINS.contains(&name) {
        return None;
    }

    let mut chars = name.chars();
    let first = chars.next()?.to_uppercase().collect::<String>();
    Some(format!("{first}{}", chars.as_str()))
}

/// `120000.0` -> `120,000`; cents are dropped.
fn group_thousands(value: f64) -> String {
    let whole = value.trunc() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{sign}{grouped}")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
