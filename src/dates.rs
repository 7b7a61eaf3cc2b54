//! Year decomposition for partial publication dates.
//!
//! Catalog dates are frequently imprecise (`"19--"`, `"192?"`, `"1900-1910"`).
//! Rather than rounding unknown digits to zero, each of century/decade/year
//! is kept as an explicit unknown so that "19th century, unknown decade" and
//! "1900" stay distinguishable through clustering and label reduction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref YEAR_MONTH_DAY: Regex = Regex::new(r"^(\d{4})-\d{2}-\d{2}$").unwrap();
    static ref YEAR_MONTH: Regex = Regex::new(r"^(\d{4})-\d{2}$").unwrap();
    static ref YEAR_RANGE: Regex =
        Regex::new(r"^([0-9?xXu\-]{4})-([0-9?xXu\-]{4})$").unwrap();
    static ref YEAR_ONLY: Regex = Regex::new(r"^([0-9?xXu\-]{4})$").unwrap();
}

/// One boundary (start or end) of a year range, split into digit positions.
///
/// `century` holds the leading two digits (19 for the 1900s), `decade` and
/// `year` one digit each. `None` marks a digit the source left unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearBoundary {
    pub century: Option<u8>,
    pub decade: Option<u8>,
    pub year: Option<u8>,
}

impl YearBoundary {
    pub fn is_empty(&self) -> bool {
        self.century.is_none() && self.decade.is_none() && self.year.is_none()
    }

    /// Decompose a 4-character year token. Wildcard characters (`-`, `?`,
    /// `x`, `u`) leave the corresponding component unknown.
    fn from_token(token: &str) -> Self {
        let digits: Vec<Option<u8>> = token
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect();
        if digits.len() != 4 {
            return Self::default();
        }
        let century = match (digits[0], digits[1]) {
            (Some(a), Some(b)) => Some(a * 10 + b),
            _ => None,
        };
        Self {
            century,
            decade: digits[2],
            year: digits[3],
        }
    }

    /// The earliest year this boundary could denote (unknown digits low).
    pub fn earliest(&self) -> u16 {
        self.century.unwrap_or(0) as u16 * 100
            + self.decade.unwrap_or(0) as u16 * 10
            + self.year.unwrap_or(0) as u16
    }

    /// The latest year this boundary could denote (unknown digits high).
    pub fn latest(&self) -> u16 {
        self.century.unwrap_or(99) as u16 * 100
            + self.decade.unwrap_or(9) as u16 * 10
            + self.year.unwrap_or(9) as u16
    }

    /// Display form with `x` for unknown digits, e.g. `19xx`.
    pub fn display(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let century = match self.century {
            Some(c) => format!("{:02}", c),
            None => "xx".to_string(),
        };
        let decade = self.decade.map_or("x".to_string(), |d| d.to_string());
        let year = self.year.map_or("x".to_string(), |y| y.to_string());
        format!("{}{}{}", century, decade, year)
    }
}

/// Start/end boundaries decomposed from a raw date string or range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearComponents {
    pub start: YearBoundary,
    pub end: YearBoundary,
}

impl YearComponents {
    /// Parse a raw date string into components.
    ///
    /// Recognizes `YYYY-YYYY`, `YYYY-MM-DD`, `YYYY-MM` and bare `YYYY`; the
    /// last three collapse start = end. Returns `None` when no pattern
    /// matches.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .trim_start_matches(['c', '©'])
            .chars()
            .filter(|c| !matches!(c, '[' | ']' | '©' | '.'))
            .collect();
        let cleaned = cleaned.trim();

        if let Some(caps) = YEAR_MONTH_DAY
            .captures(cleaned)
            .or_else(|| YEAR_MONTH.captures(cleaned))
        {
            let boundary = YearBoundary::from_token(&caps[1]);
            return Some(Self {
                start: boundary,
                end: boundary,
            });
        }
        if let Some(caps) = YEAR_RANGE.captures(cleaned) {
            let start = YearBoundary::from_token(&caps[1]);
            let end = YearBoundary::from_token(&caps[2]);
            if start.is_empty() && end.is_empty() {
                return None;
            }
            return Some(Self { start, end });
        }
        if let Some(caps) = YEAR_ONLY.captures(cleaned) {
            let boundary = YearBoundary::from_token(&caps[1]);
            if boundary.is_empty() {
                return None;
            }
            return Some(Self {
                start: boundary,
                end: boundary,
            });
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.end.is_empty()
    }

    /// Display form, omitting the end boundary when it equals the start.
    pub fn display(&self) -> String {
        if self.end.is_empty() || self.end == self.start {
            self.start.display()
        } else if self.start.is_empty() {
            self.end.display()
        } else {
            format!("{}-{}", self.start.display(), self.end.display())
        }
    }

    /// Merge components across cluster members into one covering range:
    /// the earliest possible start and the latest possible end.
    pub fn merge<I: IntoIterator<Item = YearComponents>>(members: I) -> YearComponents {
        let mut merged = YearComponents::default();
        for yc in members {
            if yc.is_empty() {
                continue;
            }
            let start = if yc.start.is_empty() { yc.end } else { yc.start };
            let end = if yc.end.is_empty() { yc.start } else { yc.end };
            if merged.start.is_empty() || start.earliest() < merged.start.earliest() {
                merged.start = start;
            }
            if merged.end.is_empty() || end.latest() > merged.end.latest() {
                merged.end = end;
            }
        }
        merged
    }

    /// Sparse feature components for vectorization; unknown digits are
    /// omitted rather than zero-filled.
    pub fn feature_components(&self) -> Vec<(&'static str, f64)> {
        let mut features = Vec::new();
        let mut push = |name, value: Option<u8>| {
            if let Some(v) = value {
                features.push((name, v as f64));
            }
        };
        push("centuryStart", self.start.century);
        push("decadeStart", self.start.decade);
        push("yearStart", self.start.year);
        push("centuryEnd", self.end.century);
        push("decadeEnd", self.end.decade);
        push("yearEnd", self.end.year);
        features
    }
}
