use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A mail address with an optional display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub addr: String,
    pub name: String,
}

impl Address {
    #[must_use]
    pub fn new(addr: impl Into<String>, name: impl Into<String>) -> Self {
        Self { addr: addr.into(), name: name.into() }
    }

    #[must_use]
    pub fn bare(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), name: String::new() }
    }
}

/// Packs `(value, label)` pairs into the persisted list format:
/// `"value,label;value,label;..."`.
///
/// This is the column format shared by address lists and attachment lists.
#[must_use]
pub fn format_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (value, label) in pairs {
        let _ = write!(out, "{value},{label};");
    }
    out
}

/// Parses the persisted `"value,label;..."` list format back into pairs.
///
/// Empty segments (including the trailing one produced by the format) are
/// skipped; a segment without a comma is a bare value with an empty label.
#[must_use]
pub fn parse_pairs(line: &str) -> Vec<(String, String)> {
    line.split(';')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(',') {
            Some((value, label)) => (value.to_owned(), label.to_owned()),
            None => (segment.to_owned(), String::new()),
        })
        .collect()
}

/// Serializes an address list to the persisted column format.
#[must_use]
pub fn format_addresses(addresses: &[Address]) -> String {
    format_pairs(addresses.iter().map(|a| (a.addr.as_str(), a.name.as_str())))
}

/// Parses a persisted address list column.
#[must_use]
pub fn parse_addresses(line: &str) -> Vec<Address> {
    parse_pairs(line).into_iter().map(|(addr, name)| Address { addr, name }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_addresses_with_and_without_names() {
        let addresses = vec![
            Address::new("ops@example.org", "Operations"),
            Address::bare("noc@example.org"),
        ];

        let line = format_addresses(&addresses);
        assert_eq!(line, "ops@example.org,Operations;noc@example.org,;");
        assert_eq!(parse_addresses(&line), addresses);
    }

    #[test]
    fn parses_legacy_bare_segments() {
        // Rows written by older installations may lack the comma entirely.
        let parsed = parse_addresses("a@example.org;b@example.org,Bee;");
        assert_eq!(
            parsed,
            vec![Address::bare("a@example.org"), Address::new("b@example.org", "Bee")]
        );
    }

    #[test]
    fn empty_list_round_trips_to_empty_string() {
        assert_eq!(format_addresses(&[]), "");
        assert!(parse_addresses("").is_empty());
    }
}
