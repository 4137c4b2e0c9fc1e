// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! RFC 1035 zone text parsing and normalization.
//!
//! This module turns the zone text pushed by the upstream into a normalized
//! record list. The parsed record count is the reference used to verify each
//! backend after a write, so the counting rule here is the single source of
//! truth: blank lines and comments are ignored, a parenthesized record
//! (typically the SOA) is one record, and the SOA counts like any other
//! record.
//!
//! Names are normalized to absolute, lowercased, dotless FQDNs. `@` and
//! relative owner names are resolved against the zone origin (`$ORIGIN`
//! directive when present, the zone name otherwise).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Record types accepted in zone text.
const KNOWN_RECORD_TYPES: &[&str] = &[
    "A", "AAAA", "ALIAS", "CAA", "CERT", "CNAME", "DNAME", "DNSKEY", "DS", "HINFO", "HTTPS", "LOC",
    "MX", "NAPTR", "NS", "NSEC", "PTR", "RRSIG", "SOA", "SPF", "SRV", "SSHFP", "SVCB", "TLSA",
    "TXT",
];

/// Errors that can occur while parsing zone text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneParseError {
    /// A `(` was opened but never closed before the end of the text
    #[error("Unbalanced parentheses starting on line {line}")]
    UnbalancedParentheses {
        /// 1-based source line of the opening parenthesis
        line: usize,
    },

    /// A quoted string was not terminated before the end of the line
    #[error("Unterminated quoted string on line {line}")]
    UnterminatedQuote {
        /// 1-based source line of the opening quote
        line: usize,
    },

    /// A record line had an owner but no recognizable record type
    #[error("No record type found on line {line}: '{text}'")]
    MissingRecordType {
        /// 1-based source line
        line: usize,
        /// The offending logical line
        text: String,
    },

    /// A record line started with whitespace but no owner was seen yet
    #[error("Record on line {line} inherits an owner, but no previous owner exists")]
    NoPreviousOwner {
        /// 1-based source line
        line: usize,
    },

    /// An unsupported `$` directive was encountered
    #[error("Unsupported directive '{directive}' on line {line}")]
    UnsupportedDirective {
        /// The directive, e.g. `$INCLUDE`
        directive: String,
        /// 1-based source line
        line: usize,
    },

    /// The zone text contained no records at all
    #[error("Zone text contains no records")]
    Empty,
}

/// A single normalized resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    /// Absolute, lowercased owner name without trailing dot
    pub name: String,
    /// Explicit TTL if one appeared on the record line
    pub ttl: Option<u32>,
    /// Record type, uppercased (e.g. `A`, `SOA`, `TXT`)
    pub rtype: String,
    /// Record data, tokens joined by single spaces, quoting preserved
    pub rdata: String,
}

/// A parsed zone: origin, default TTL, and the normalized record list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedZone {
    /// Zone origin as an absolute, lowercased, dotless FQDN
    pub origin: String,
    /// `$TTL` directive value when present
    pub default_ttl: Option<u32>,
    /// Records in source order
    pub records: Vec<ZoneRecord>,
}

impl ParsedZone {
    /// Number of authoritative records, the verification reference count.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The zone's SOA record, if one is present.
    #[must_use]
    pub fn soa(&self) -> Option<&ZoneRecord> {
        self.records.iter().find(|r| r.rtype == "SOA")
    }

    /// Order-independent record set, used to compare a backend's contents
    /// against the reference during reconciliation.
    #[must_use]
    pub fn record_set(&self) -> BTreeSet<(String, String, String)> {
        self.records
            .iter()
            .map(|r| (r.name.clone(), r.rtype.clone(), r.rdata.clone()))
            .collect()
    }

    /// Render the zone back to zone-file text.
    ///
    /// Used by drivers that regenerate a zone from the normalized record
    /// list. Round-trips through [`parse_zone`] with an identical record
    /// count.
    #[must_use]
    pub fn to_zone_text(&self) -> String {
        let mut out = String::new();
        if let Some(ttl) = self.default_ttl {
            out.push_str(&format!("$TTL {ttl}\n"));
        }
        out.push_str(&format!("$ORIGIN {}.\n", self.origin));
        for record in &self.records {
            match record.ttl {
                Some(ttl) => out.push_str(&format!(
                    "{}. {} IN {} {}\n",
                    record.name, ttl, record.rtype, record.rdata
                )),
                None => out.push_str(&format!(
                    "{}. IN {} {}\n",
                    record.name, record.rtype, record.rdata
                )),
            }
        }
        out
    }
}

/// Lowercase a zone name and strip any trailing dot.
///
/// This is the canonical key form used by the datastore and the queues.
#[must_use]
pub fn canonical_zone_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Resolve an owner name or in-zone target to an absolute, lowercased,
/// dotless FQDN.
///
/// `@` resolves to the origin; a name with a trailing dot is already
/// absolute; anything else is relative to the origin. Wildcards pass
/// through (`*` stays a label).
#[must_use]
pub fn absolute_name(name: &str, origin: &str) -> String {
    let origin = canonical_zone_name(origin);
    let name = name.trim();
    if name == "@" || name.is_empty() {
        return origin;
    }
    if let Some(stripped) = name.strip_suffix('.') {
        return stripped.to_ascii_lowercase();
    }
    format!("{}.{origin}", name.to_ascii_lowercase())
}

/// Parse a TTL token: plain seconds or a single BIND-style unit suffix
/// (`s`, `m`, `h`, `d`, `w`).
fn parse_ttl(token: &str) -> Option<u32> {
    if token.is_empty() || !token.is_ascii() {
        return None;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse().ok();
    }
    let (digits, unit) = token.split_at(token.len() - 1);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 604_800,
        _ => return None,
    };
    value.checked_mul(multiplier)
}

/// A logical line after comment stripping and parenthesis joining.
struct LogicalLine {
    /// 1-based line number of the first source line
    line: usize,
    /// The joined text
    text: String,
    /// Whether the first source line began with whitespace (owner inherits)
    leading_whitespace: bool,
}

/// Strip comments and join parenthesized continuations into logical lines.
fn logical_lines(text: &str) -> Result<Vec<LogicalLine>, ZoneParseError> {
    let mut out: Vec<LogicalLine> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;
    let mut current_leading_ws = false;
    let mut paren_depth = 0usize;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let mut stripped = String::new();
        let mut in_quotes = false;

        for c in raw_line.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    stripped.push(c);
                }
                ';' if !in_quotes => break,
                '(' if !in_quotes => {
                    if paren_depth == 0 && current.is_empty() {
                        current_start = line_no;
                    }
                    paren_depth += 1;
                    stripped.push(' ');
                }
                ')' if !in_quotes => {
                    if paren_depth == 0 {
                        return Err(ZoneParseError::UnbalancedParentheses { line: line_no });
                    }
                    paren_depth -= 1;
                    stripped.push(' ');
                }
                _ => stripped.push(c),
            }
        }
        if in_quotes {
            return Err(ZoneParseError::UnterminatedQuote { line: line_no });
        }

        if current.is_empty() {
            if stripped.trim().is_empty() && paren_depth == 0 {
                continue;
            }
            current_start = line_no;
            current_leading_ws = stripped.starts_with(char::is_whitespace);
            current = stripped;
        } else {
            current.push(' ');
            current.push_str(&stripped);
        }

        if paren_depth == 0 {
            if !current.trim().is_empty() {
                out.push(LogicalLine {
                    line: current_start,
                    text: std::mem::take(&mut current),
                    leading_whitespace: current_leading_ws,
                });
            } else {
                current.clear();
            }
        }
    }

    if paren_depth != 0 {
        return Err(ZoneParseError::UnbalancedParentheses {
            line: current_start,
        });
    }
    if !current.trim().is_empty() {
        out.push(LogicalLine {
            line: current_start,
            text: current,
            leading_whitespace: current_leading_ws,
        });
    }

    Ok(out)
}

/// Split a logical line into tokens, keeping quoted strings intact.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse RFC 1035 zone text into a normalized record list.
///
/// `zone_name` provides the initial origin; a `$ORIGIN` directive inside the
/// text overrides it from that point on. Owner names may be `@`, relative,
/// or absolute; lines beginning with whitespace inherit the previous owner.
///
/// # Errors
///
/// Returns [`ZoneParseError`] on unbalanced parentheses, unterminated
/// quotes, a line with no recognizable record type, owner inheritance with
/// no previous owner, unsupported directives, or an empty zone.
pub fn parse_zone(zone_name: &str, text: &str) -> Result<ParsedZone, ZoneParseError> {
    let mut origin = canonical_zone_name(zone_name);
    let mut default_ttl: Option<u32> = None;
    let mut records: Vec<ZoneRecord> = Vec::new();
    let mut previous_owner: Option<String> = None;

    for logical in logical_lines(text)? {
        let tokens = tokenize(&logical.text);
        if tokens.is_empty() {
            continue;
        }

        // Directives
        if tokens[0].starts_with('$') {
            let directive = tokens[0].to_ascii_uppercase();
            match directive.as_str() {
                "$ORIGIN" => {
                    if let Some(value) = tokens.get(1) {
                        origin = canonical_zone_name(value);
                    }
                }
                "$TTL" => {
                    default_ttl = tokens.get(1).and_then(|t| parse_ttl(t));
                }
                _ => {
                    return Err(ZoneParseError::UnsupportedDirective {
                        directive: tokens[0].clone(),
                        line: logical.line,
                    });
                }
            }
            continue;
        }

        // Owner resolution
        let mut cursor = 0usize;
        let owner = if logical.leading_whitespace {
            previous_owner
                .clone()
                .ok_or(ZoneParseError::NoPreviousOwner { line: logical.line })?
        } else {
            cursor = 1;
            absolute_name(&tokens[0], &origin)
        };

        // Optional TTL and class, in either order
        let mut ttl: Option<u32> = None;
        let mut seen_class = false;
        while cursor < tokens.len() {
            let token = &tokens[cursor];
            let upper = token.to_ascii_uppercase();
            if matches!(upper.as_str(), "IN" | "CH" | "HS") && !seen_class {
                seen_class = true;
                cursor += 1;
            } else if ttl.is_none() && token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                match parse_ttl(token) {
                    Some(value) => {
                        ttl = Some(value);
                        cursor += 1;
                    }
                    None => break,
                }
            } else {
                break;
            }
        }

        // Record type
        let rtype = tokens
            .get(cursor)
            .map(|t| t.to_ascii_uppercase())
            .filter(|t| KNOWN_RECORD_TYPES.contains(&t.as_str()))
            .ok_or_else(|| ZoneParseError::MissingRecordType {
                line: logical.line,
                text: logical.text.trim().to_string(),
            })?;
        cursor += 1;

        let rdata = tokens[cursor..].join(" ");
        previous_owner = Some(owner.clone());
        records.push(ZoneRecord {
            name: owner,
            ttl,
            rtype,
            rdata,
        });
    }

    if records.is_empty() {
        return Err(ZoneParseError::Empty);
    }

    Ok(ParsedZone {
        origin,
        default_ttl,
        records,
    })
}

#[cfg(test)]
#[path = "zone_tests.rs"]
mod zone_tests;
