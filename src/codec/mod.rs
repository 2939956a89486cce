//! Annotation codec.
//!
//! Entry annotations are a compact, `/`-delimited shorthand the operators
//! type directly into the ledger: `"로로벳출석10/바때기5환/메모본사확인요청"`.
//! Amounts are compact numbers, one unit = 10,000 base currency units.
//!
//! Decoding is token-class-first and greedy: manual notes, then
//! side-ledger tokens, then site-scoped tokens. Tokens that match no
//! class are dropped rather than reconstructed; years of hand-typed
//! legacy data make guessing worse than ignoring.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{
    ChipKind, ChipOutcome, PointType, SideDirection, SideLedgerChip, SideLedgerEntry, SideTotals,
    SiteChipAdjustment, SitePointAdjustment, StructuredAnnotation,
};

/// Marker prefix for free-text tokens that must survive verbatim.
const MANUAL_NOTE_MARKER: &str = "메모";
/// Fixed keyword opening a side-ledger token.
const SIDE_LEDGER_KEYWORD: &str = "바때기";

const CHIP_KINDS: &str = "칩실수|배거|칩팅";
const POINT_TYPES: &str = "출석|페이백|정착|요율|지추|첫충|매충|입플";

fn side_chip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            "^{SIDE_LEDGER_KEYWORD}({CHIP_KINDS})(\\d+(?:\\.\\d+)?)(먹|못먹)$"
        ))
        .expect("valid side chip pattern")
    })
}

fn side_cash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            "^(?:{SIDE_LEDGER_KEYWORD})?(\\d+(?:\\.\\d+)?)(충|환)$"
        ))
        .expect("valid side cash pattern")
    })
}

fn site_chip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^({CHIP_KINDS})(\\d+(?:\\.\\d+)?)(먹|못먹)$"))
            .expect("valid site chip pattern")
    })
}

fn site_point_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^({POINT_TYPES})?(\\d+(?:\\.\\d+)?)$"))
            .expect("valid site point pattern")
    })
}

fn charge_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})충").expect("valid charge pattern"))
}

fn withdraw_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})환").expect("valid withdraw pattern"))
}

/// Parse a compact amount ("10", "1.5") into base units (x10,000).
fn parse_compact_amount(text: &str) -> Option<i64> {
    let value: f64 = text.parse().ok()?;
    Some((value * 10_000.0).round() as i64)
}

/// Format base units back into the compact representation.
fn format_compact_amount(amount: i64) -> String {
    if amount % 10_000 == 0 {
        (amount / 10_000).to_string()
    } else {
        format!("{}", amount as f64 / 10_000.0)
    }
}

/// Resolve the site name a token starts with: full names first (longest
/// wins), then the 2-character abbreviation fallback. Returns the full
/// site name and the unmatched remainder of the token.
fn match_site<'a>(token: &'a str, known_sites: &[String]) -> Option<(String, &'a str)> {
    let mut by_length: Vec<&String> = known_sites.iter().filter(|s| !s.is_empty()).collect();
    by_length.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));

    for site in &by_length {
        if let Some(rest) = token.strip_prefix(site.as_str()) {
            return Some(((*site).clone(), rest));
        }
    }

    // Abbreviation fallback keeps the original declaration order.
    for site in known_sites {
        let abbrev: String = site.chars().take(2).collect();
        if abbrev.chars().count() < 2 {
            continue;
        }
        if let Some(rest) = token.strip_prefix(abbrev.as_str()) {
            return Some((site.clone(), rest));
        }
    }

    None
}

/// Decode annotation text into its structured form. Unknown tokens are
/// dropped.
pub fn decode(text: &str, known_sites: &[String]) -> StructuredAnnotation {
    let mut decoded = StructuredAnnotation::default();

    for raw in text.split('/') {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }

        // (a) manual notes, taken verbatim
        if let Some(note) = token.strip_prefix(MANUAL_NOTE_MARKER) {
            if !note.is_empty() {
                decoded.manual_notes.push(note.to_string());
            }
            continue;
        }

        // (b) side-ledger tokens, before any site matching
        if let Some(caps) = side_chip_re().captures(token) {
            if let (Some(kind), Some(amount)) = (
                ChipKind::from_keyword(&caps[1]),
                parse_compact_amount(&caps[2]),
            ) {
                if amount != 0 {
                    decoded.side_chips.push(SideLedgerChip {
                        kind,
                        amount,
                        outcome: outcome_from(&caps[3]),
                    });
                }
            }
            continue;
        }
        if let Some(caps) = side_cash_re().captures(token) {
            if let Some(amount) = parse_compact_amount(&caps[1]) {
                if amount != 0 {
                    decoded.side_entries.push(SideLedgerEntry {
                        amount,
                        direction: direction_from(&caps[2]),
                    });
                }
            }
            continue;
        }

        // (c) site-scoped tokens
        if let Some((site, rest)) = match_site(token, known_sites) {
            if let Some(caps) = site_chip_re().captures(rest) {
                if let (Some(kind), Some(amount)) = (
                    ChipKind::from_keyword(&caps[1]),
                    parse_compact_amount(&caps[2]),
                ) {
                    if amount != 0 {
                        decoded.site_chips.push(SiteChipAdjustment {
                            site,
                            kind,
                            amount,
                            outcome: outcome_from(&caps[3]),
                        });
                    }
                }
                continue;
            }
            if let Some(caps) = site_point_re().captures(rest) {
                let point_type = caps.get(1).and_then(|m| PointType::from_keyword(m.as_str()));
                if let Some(amount) = parse_compact_amount(&caps[2]) {
                    if amount != 0 {
                        decoded.site_points.push(SitePointAdjustment {
                            site,
                            point_type,
                            amount,
                        });
                    }
                }
                continue;
            }
        }

        // anything else is dropped
    }

    decoded
}

/// Encode a structured annotation back into its compact text form.
/// Zero-amount adjustments and blank notes are omitted.
pub fn encode(annotation: &StructuredAnnotation) -> String {
    let mut tokens: Vec<String> = Vec::new();

    for point in &annotation.site_points {
        if point.amount == 0 {
            continue;
        }
        let type_keyword = point.point_type.map(|p| p.keyword()).unwrap_or("");
        tokens.push(format!(
            "{}{}{}",
            point.site,
            type_keyword,
            format_compact_amount(point.amount)
        ));
    }

    for chip in &annotation.site_chips {
        if chip.amount == 0 {
            continue;
        }
        tokens.push(format!(
            "{}{}{}{}",
            chip.site,
            chip.kind.keyword(),
            format_compact_amount(chip.amount),
            chip.outcome.keyword()
        ));
    }

    for entry in &annotation.side_entries {
        if entry.amount == 0 {
            continue;
        }
        tokens.push(format!(
            "{}{}",
            format_compact_amount(entry.amount),
            entry.direction.keyword()
        ));
    }

    for chip in &annotation.side_chips {
        if chip.amount == 0 {
            continue;
        }
        tokens.push(format!(
            "{}{}{}{}",
            SIDE_LEDGER_KEYWORD,
            chip.kind.keyword(),
            format_compact_amount(chip.amount),
            chip.outcome.keyword()
        ));
    }

    for note in &annotation.manual_notes {
        if note.is_empty() {
            continue;
        }
        tokens.push(format!("{MANUAL_NOTE_MARKER}{note}"));
    }

    tokens.join("/")
}

/// Charge/withdraw totals for the cascade, scanned over the raw text.
///
/// Matches every `N충` / `N환` occurrence regardless of what precedes it,
/// so a site-scoped `로로벳10충` moves the cash position the same way a
/// bare `10충` does. This mirrors how the ledger has always been read.
pub fn charge_withdraw_totals(text: &str) -> SideTotals {
    let mut totals = SideTotals::default();

    for caps in charge_re().captures_iter(text) {
        if let Ok(units) = caps[1].parse::<i64>() {
            totals.charge += units * 10_000;
        }
    }
    for caps in withdraw_re().captures_iter(text) {
        if let Ok(units) = caps[1].parse::<i64>() {
            totals.withdraw += units * 10_000;
        }
    }

    totals
}

fn outcome_from(keyword: &str) -> ChipOutcome {
    if keyword == "먹" {
        ChipOutcome::Won
    } else {
        ChipOutcome::Lost
    }
}

fn direction_from(keyword: &str) -> SideDirection {
    if keyword == "충" {
        SideDirection::Charge
    } else {
        SideDirection::Withdraw
    }
}
