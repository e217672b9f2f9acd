//! Static IDX sector table and cross-sector diversification picks.

use rand::seq::IndexedRandom;
use rand::Rng;

pub const UNKNOWN_SECTOR: &str = "Unknown";

/// How many candidates a diversification pick returns at most.
pub const DIVERSIFICATION_PICKS: usize = 3;

pub const SECTORS: &[(&str, &[&str])] = &[
    (
        "Finance",
        &["BBCA", "BBRI", "BMRI", "BBNI", "BBTN", "BRIS", "ARTO", "BNGA", "NISP", "MEGA"],
    ),
    (
        "Energy",
        &["ADRO", "PTBA", "ITMG", "BUMI", "HRUM", "INDY", "PGAS", "MEDC", "AKRA"],
    ),
    (
        "Basic Materials",
        &["MDKA", "ANTM", "INCO", "MBMA", "TINS", "BRMS", "SMGR", "INTP", "TPIA", "BRPT"],
    ),
    (
        "Infrastructure",
        &["TLKM", "ISAT", "EXCL", "TOWR", "MTEL", "JSMR", "PTPP", "WIKA"],
    ),
    (
        "Consumer Non-Cyclicals",
        &["ICBP", "INDF", "MYOR", "CMRY", "AMRT", "UNVR", "GGRM", "HMSP", "CPIN", "JPFA"],
    ),
    ("Technology", &["GOTO", "BUKA", "EMTK", "WIRG"]),
    ("Industrials", &["ASII", "UNTR", "HEXA"]),
    (
        "Property & Real Estate",
        &["BSDE", "CTRA", "PWON", "SMRA", "PANI"],
    ),
    ("Healthcare", &["KLBF", "MIKA", "SILO", "HEAL"]),
];

/// Case-insensitive; [`UNKNOWN_SECTOR`] when the ticker is not listed.
pub fn sector_for(ticker: &str) -> &'static str {
    let t = ticker.trim();
    SECTORS
        .iter()
        .find(|(_, tickers)| tickers.iter().any(|x| x.eq_ignore_ascii_case(t)))
        .map(|(sector, _)| *sector)
        .unwrap_or(UNKNOWN_SECTOR)
}

pub fn tickers_in(sector: &str) -> &'static [&'static str] {
    SECTORS
        .iter()
        .find(|(s, _)| *s == sector)
        .map(|(_, t)| *t)
        .unwrap_or(&[])
}

/// Tickers outside `current_sector` and not in `exclude`, sampled down to
/// [`DIVERSIFICATION_PICKS`] when more are available. An unknown sector gets
/// no suggestions.
pub fn diversification_candidates<R: Rng + ?Sized>(
    current_sector: &str,
    exclude: &[String],
    rng: &mut R,
) -> Vec<&'static str> {
    if current_sector == UNKNOWN_SECTOR {
        return Vec::new();
    }
    let pool: Vec<&'static str> = SECTORS
        .iter()
        .filter(|(sector, _)| *sector != current_sector)
        .flat_map(|(_, tickers)| tickers.iter().copied())
        .filter(|t| !exclude.iter().any(|e| e.trim().eq_ignore_ascii_case(t)))
        .collect();

    if pool.len() >= DIVERSIFICATION_PICKS {
        pool.choose_multiple(rng, DIVERSIFICATION_PICKS)
            .copied()
            .collect()
    } else {
        pool
    }
}
