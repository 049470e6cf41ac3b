//! Classification of WFS-T TransactionResponse bodies.
//!
//! Servers report the same outcome in different shapes: OWS exception
//! reports, `TransactionSummary` totals, WFS 1.0.0 `Status` blocks, and
//! per-feature `Message` elements inside an otherwise successful document.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::model::TransactionResult;
use crate::xml::{self, Element};

const MESSAGE_SEPARATOR: &str = "; ";

static EXCEPTION_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w.-]+:)?(?:ExceptionText|ServiceException)\b[^>]*>(.*?)</")
        .expect("valid exception pattern")
});

static MESSAGE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w.-]+:)?Message\b[^>]*>(.*?)</").expect("valid message pattern")
});

static TOTAL_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:[\w.-]+:)?(totalInserted|totalUpdated|totalDeleted)\b[^>]*>\s*(\d+)\s*<")
        .expect("valid total pattern")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    inserted: Option<u64>,
    updated: Option<u64>,
    deleted: Option<u64>,
}

impl Totals {
    fn is_empty(&self) -> bool {
        self.inserted.is_none() && self.updated.is_none() && self.deleted.is_none()
    }

    fn set(&mut self, tag: &str, value: u64) {
        match tag.to_ascii_lowercase().as_str() {
            "totalinserted" => self.inserted = Some(value),
            "totalupdated" => self.updated = Some(value),
            "totaldeleted" => self.deleted = Some(value),
            _ => {}
        }
    }
}

/// WFS 1.0.0 `TransactionResult/Status` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Partial,
    Failed,
}

/// What could be read out of a body, before classification.
#[derive(Debug, Default)]
struct Findings {
    exception: Option<String>,
    totals: Totals,
    messages: Vec<String>,
    inserted_ids: Vec<String>,
    status: Option<Status>,
    recognised: bool,
}

/// Classify a transaction response body. Never fails: anything that cannot
/// be understood is reported as an unsuccessful result.
pub fn parse_transaction_response(body: &str) -> TransactionResult {
    let findings = match xml::parse_document(body) {
        Ok(root) => read_document(&root, body),
        Err(err) => {
            warn!("Transaction response is not well-formed XML, scanning text: {}", err);
            read_text(body)
        }
    };
    classify(findings)
}

fn read_document(root: &Element, body: &str) -> Findings {
    let mut findings = Findings {
        recognised: root.local_name().contains("TransactionResponse"),
        ..Findings::default()
    };

    findings.exception = root
        .find_all("ows:ExceptionText")
        .into_iter()
        .chain(root.find_all("ServiceException"))
        .map(Element::deep_text)
        .find(|text| !text.is_empty());

    if let Some(summary) = root.find_first("wfs:TransactionSummary") {
        for total in &summary.children {
            if let Ok(value) = total.trimmed_text().parse::<u64>() {
                findings.totals.set(total.local_name(), value);
            }
        }
    }
    if findings.totals.is_empty() {
        findings.totals = scan_totals(body);
    }

    findings.messages = root
        .find_all("wfs:Message")
        .into_iter()
        .map(Element::deep_text)
        .filter(|text| !text.is_empty())
        .collect();

    findings.inserted_ids = root
        .find_all("ogc:FeatureId")
        .into_iter()
        .filter_map(|fid| fid.attr("fid"))
        .map(str::to_string)
        .collect();

    findings.status = root.find_first("wfs:Status").and_then(|status| {
        status.children.iter().find_map(|flag| match flag.local_name() {
            "SUCCESS" => Some(Status::Success),
            "PARTIAL" => Some(Status::Partial),
            "FAILED" => Some(Status::Failed),
            _ => None,
        })
    });

    findings.recognised |= findings.exception.is_some()
        || !findings.totals.is_empty()
        || findings.status.is_some()
        || !findings.messages.is_empty();
    findings
}

fn read_text(body: &str) -> Findings {
    let exception = EXCEPTION_TEXT
        .captures(body)
        .map(|captures| captures[1].trim().to_string())
        .filter(|text| !text.is_empty());
    let totals = scan_totals(body);
    let messages: Vec<String> = MESSAGE_TEXT
        .captures_iter(body)
        .map(|captures| captures[1].trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    Findings {
        recognised: exception.is_some() || !totals.is_empty() || !messages.is_empty(),
        exception,
        totals,
        messages,
        ..Findings::default()
    }
}

fn scan_totals(body: &str) -> Totals {
    let mut totals = Totals::default();
    for captures in TOTAL_VALUE.captures_iter(body) {
        if let Ok(value) = captures[2].parse::<u64>() {
            totals.set(&captures[1], value);
        }
    }
    totals
}

fn classify(findings: Findings) -> TransactionResult {
    if let Some(error) = findings.exception {
        return TransactionResult::failure(error);
    }
    if !findings.recognised {
        return TransactionResult::failure("unrecognised transaction response");
    }

    let joined = (!findings.messages.is_empty()).then(|| findings.messages.join(MESSAGE_SEPARATOR));

    if findings.status == Some(Status::Failed) {
        return TransactionResult::failure(
            joined.unwrap_or_else(|| "transaction failed".to_string()),
        );
    }

    let inserted = match findings.totals.inserted {
        Some(count) => count,
        // WFS 1.0.0 reports inserts only as InsertResult feature ids.
        None if findings.totals.is_empty() => findings.inserted_ids.len() as u64,
        None => 0,
    };
    let result = TransactionResult {
        success: true,
        inserted,
        updated: findings.totals.updated.unwrap_or(0),
        deleted: findings.totals.deleted.unwrap_or(0),
        error: None,
        warning: None,
        inserted_ids: findings.inserted_ids,
    };

    if findings.status == Some(Status::Partial) {
        let warning = joined.unwrap_or_else(|| "transaction partially applied".to_string());
        warn!("Transaction partially applied: {}", warning);
        return TransactionResult {
            warning: Some(warning),
            ..result
        };
    }

    match joined {
        Some(messages) if result.total() == 0 => TransactionResult::failure(messages),
        Some(messages) => {
            debug!("Transaction applied with messages: {}", messages);
            TransactionResult {
                warning: Some(messages),
                ..result
            }
        }
        None => result,
    }
}
