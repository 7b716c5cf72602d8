//! Player name normalization.
//!
//! Applied identically to canonical names at roster build time and to
//! exchange runner names at lookup time.

/// Case-fold, strip periods, hyphens to spaces, trim and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace('.', "")
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First-initial form of a normalized multi-token name: `novak djokovic` → `n djokovic`
pub fn initialled(normalized: &str) -> Option<String> {
    let mut tokens = normalized.split(' ');
    let first = tokens.next()?;
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() || first.chars().count() < 2 {
        return None;
    }
    let initial = first.chars().next()?;
    Some(format!("{} {}", initial, rest.join(" ")))
}

/// Tokens sorted and re-joined, for order-insensitive comparison
pub fn token_sorted(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("N. DJOKOVIC"), "n djokovic");
        assert_eq!(normalize_name("  Jo-Wilfried Tsonga "), "jo wilfried tsonga");
        assert_eq!(normalize_name("Felix Auger-Aliassime"), "felix auger aliassime");
        assert_eq!(normalize_name("J.J. Wolf"), "jj wolf");
        assert_eq!(normalize_name("..."), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "N. DJOKOVIC",
            "Alex de Minaur",
            "Jo-Wilfried  Tsonga",
            "  - Hyphen - Edge -",
            "Stan Wawrinka.",
            "",
        ] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_initialled() {
        assert_eq!(initialled("novak djokovic").as_deref(), Some("n djokovic"));
        assert_eq!(initialled("alex de minaur").as_deref(), Some("a de minaur"));
        assert_eq!(initialled("n djokovic"), None);
        assert_eq!(initialled("djokovic"), None);
    }

    #[test]
    fn test_token_sorted() {
        assert_eq!(token_sorted("millman john"), "john millman");
        assert_eq!(token_sorted("john millman"), "john millman");
    }
}
