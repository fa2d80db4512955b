use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Company {
    pub symbol: &'static str,
    pub name: &'static str,
}

/// Tickers the trainer fits models for and the dashboard offers, in display order.
pub const COMPANIES: [Company; 10] = [
    Company { symbol: "AAPL", name: "Apple" },
    Company { symbol: "AMZN", name: "Amazon" },
    Company { symbol: "BLK", name: "BlackRock" },
    Company { symbol: "COO", name: "Cooper Companies" },
    Company { symbol: "DGX", name: "Quest Diagnostics" },
    Company { symbol: "ETR", name: "Entergy Corp" },
    Company { symbol: "FOX", name: "Fox Corp" },
    Company { symbol: "GS", name: "Goldman Sachs" },
    Company { symbol: "MAC", name: "Macerich Co" },
    Company { symbol: "NFLX", name: "Netflix" },
];

pub fn companies() -> &'static [Company] {
    &COMPANIES
}

pub fn find(symbol: &str) -> Option<&'static Company> {
    let symbol = symbol.trim();
    COMPANIES
        .iter()
        .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
}

/// Parses a comma separated ticker list, keeping catalog order and rejecting unknown symbols.
pub fn parse_subset(list: &str) -> anyhow::Result<Vec<&'static Company>> {
    let mut wanted = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let company = find(part).ok_or_else(|| anyhow::anyhow!("unknown ticker: {part}"))?;
        wanted.push(company.symbol);
    }
    anyhow::ensure!(!wanted.is_empty(), "ticker list must be non-empty");

    Ok(COMPANIES
        .iter()
        .filter(|c| wanted.contains(&c.symbol))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_names_case_insensitively() {
        assert_eq!(find("AAPL").map(|c| c.name), Some("Apple"));
        assert_eq!(find(" nflx ").map(|c| c.name), Some("Netflix"));
        assert!(find("TSLA").is_none());
    }

    #[test]
    fn subset_keeps_catalog_order() {
        let out = parse_subset("NFLX, aapl,GS").unwrap();
        let syms: Vec<_> = out.iter().map(|c| c.symbol).collect();
        assert_eq!(syms, vec!["AAPL", "GS", "NFLX"]);
    }

    #[test]
    fn subset_rejects_unknown_and_empty() {
        assert!(parse_subset("AAPL,TSLA").is_err());
        assert!(parse_subset(" , ").is_err());
    }
}
