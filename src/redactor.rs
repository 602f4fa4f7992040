//! PII scrubbing for extracted job fields.
//!
//! Pattern-based removal of emails, phone numbers, professional-profile
//! URLs, social handles, and recruiter/contact names. Runs over every
//! successful tier attempt before it can become the engine's accepted
//! result. Scrubbing is idempotent: replacement tokens never re-match any
//! pattern.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::ExtractedFields;

lazy_static! {
    // RFC 5322, simplified.
    static ref EMAIL: Regex =
        Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap();

    // Professional-network profile URLs.
    static ref PROFILE_URL: Regex =
        Regex::new(r"(?i)(?:https?://)?(?:[a-z]{2,3}\.)?linkedin\.com/in/[A-Za-z0-9_%-]+/?").unwrap();

    // US phone formats, with optional +1 country code.
    static ref PHONE_US: Regex =
        Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap();

    // UK phone formats.
    static ref PHONE_UK: Regex =
        Regex::new(r"\b(?:\+44|0)\s?\d{2,4}\s?\d{3,4}\s?\d{3,4}\b").unwrap();

    // International numbers with explicit country code.
    static ref PHONE_INTL: Regex =
        Regex::new(r"\+\d{1,3}[-.\s]?\d{1,4}[-.\s]?\d{1,4}[-.\s]?\d{1,9}\b").unwrap();

    // "contact: Jane Doe" and similar recruiter attributions. The name part
    // is case-sensitive so ordinary words after "contact" don't match.
    static ref CONTACT_NAME: Regex = Regex::new(
        r"(?i)\b(contact|recruiter|hiring manager|reach out to|apply to|speak with|talk to)(?-i)[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2})\b"
    )
    .unwrap();

    // Slack/Discord/Twitter-style handles. Must run after EMAIL so the
    // domain half of an address is never matched on its own.
    static ref HANDLE: Regex = Regex::new(r"@[A-Za-z0-9_]{3,}").unwrap();
}

/// Scrub PII from a single text field.
pub fn scrub_text(text: &str) -> String {
    let text = EMAIL.replace_all(text, "[EMAIL]");
    let text = PROFILE_URL.replace_all(&text, "[LINKEDIN]");
    let text = PHONE_US.replace_all(&text, "[PHONE]");
    let text = PHONE_UK.replace_all(&text, "[PHONE]");
    let text = PHONE_INTL.replace_all(&text, "[PHONE]");
    let text = CONTACT_NAME.replace_all(&text, "$1: [CONTACT_NAME]");
    let text = HANDLE.replace_all(&text, "[HANDLE]");
    text.into_owned()
}

/// Scrub every string field of an extraction.
///
/// The description is the usual offender, but recruiter contact details do
/// turn up in title and location strings on scraped boards, so all five
/// fields get the same pass.
pub fn scrub_fields(fields: ExtractedFields) -> ExtractedFields {
    fn scrub(field: Option<String>) -> Option<String> {
        field.map(|s| scrub_text(&s))
    }

    ExtractedFields {
        title: scrub(fields.title),
        company: scrub(fields.company),
        location: scrub(fields.location),
        salary: scrub(fields.salary),
        description: scrub(fields.description),
    }
}
