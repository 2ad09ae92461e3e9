use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockbook_core::{LedgerError, LedgerResult};

/// Widest zero-fill accepted for a series (fits any i64).
pub const MAX_PADDING: u8 = 19;

/// Movement family a series numbers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesScope {
    SaleB2c,
    SaleB2b,
    Return,
    Deposit,
    Web,
}

impl SeriesScope {
    pub const ALL: [SeriesScope; 5] = [
        SeriesScope::SaleB2c,
        SeriesScope::SaleB2b,
        SeriesScope::Return,
        SeriesScope::Deposit,
        SeriesScope::Web,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SeriesScope::SaleB2c => "sale_b2c",
            SeriesScope::SaleB2b => "sale_b2b",
            SeriesScope::Return => "return",
            SeriesScope::Deposit => "deposit",
            SeriesScope::Web => "web",
        }
    }
}

impl core::fmt::Display for SeriesScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesScope {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeriesScope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| LedgerError::validation(format!("unknown series scope '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSeries {
    /// Unique code, e.g. `B2C-2024`.
    pub code: String,
    pub name: String,
    pub scope: SeriesScope,
    pub prefix: String,
    /// When set, the series only numbers documents dated in this year.
    pub year: Option<i32>,
    pub next_number: i64,
    pub padding: u8,
    pub active: bool,
}

impl DocumentSeries {
    pub fn new(code: &str, scope: SeriesScope, prefix: &str, year: Option<i32>) -> LedgerResult<Self> {
        let series = Self {
            code: code.trim().to_string(),
            name: code.trim().to_string(),
            scope,
            prefix: prefix.to_string(),
            year,
            next_number: 1,
            padding: 6,
            active: true,
        };
        series.validate()?;
        Ok(series)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.code.is_empty() {
            return Err(LedgerError::validation("series code cannot be empty"));
        }
        if self.next_number < 1 {
            return Err(LedgerError::validation(format!(
                "series {} next_number must be at least 1, got {}",
                self.code, self.next_number
            )));
        }
        if self.padding > MAX_PADDING {
            return Err(LedgerError::validation(format!(
                "series {} padding must be at most {MAX_PADDING}",
                self.code
            )));
        }
        Ok(())
    }

    /// Render `number` as a reference: `prefix`, then `year-` when year-scoped,
    /// then the zero-padded number. Numbers wider than `padding` are not cut.
    pub fn format(&self, number: i64) -> String {
        let width = usize::from(self.padding);
        match self.year {
            Some(year) => format!("{}{year}-{number:0width$}", self.prefix),
            None => format!("{}{number:0width$}", self.prefix),
        }
    }

    /// The reference the next allocation would produce.
    pub fn peek(&self) -> String {
        self.format(self.next_number)
    }

    /// Consume the current number and advance the counter.
    pub fn issue(&mut self) -> LedgerResult<String> {
        let number = self.next_number;
        let next = number
            .checked_add(1)
            .ok_or_else(|| LedgerError::SeriesExhausted(self.code.clone()))?;
        self.next_number = next;
        Ok(self.format(number))
    }

    pub fn patched(&self, patch: &SeriesPatch) -> LedgerResult<Self> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(prefix) = &patch.prefix {
            next.prefix = prefix.clone();
        }
        if let Some(n) = patch.next_number {
            next.next_number = n;
        }
        if let Some(padding) = patch.padding {
            next.padding = padding;
        }
        if let Some(active) = patch.active {
            next.active = active;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Administrative edit of a series. Applies from the next allocation on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPatch {
    pub name: Option<String>,
    pub prefix: Option<String>,
    pub next_number: Option<i64>,
    pub padding: Option<u8>,
    pub active: Option<bool>,
}

/// Choose the series that numbers a `scope` document dated in `year`.
///
/// An active series for exactly that year wins; otherwise an active series
/// without a year. Several candidates resolve to the lowest code. Nothing
/// usable is a configuration error; series are never created on the fly.
pub fn select_series<'a>(
    series: &'a [DocumentSeries],
    scope: SeriesScope,
    year: i32,
) -> LedgerResult<&'a DocumentSeries> {
    let candidates = || series.iter().filter(|s| s.active && s.scope == scope);

    let dated = candidates()
        .filter(|s| s.year == Some(year))
        .min_by(|a, b| a.code.cmp(&b.code));
    let undated = || {
        candidates()
            .filter(|s| s.year.is_none())
            .min_by(|a, b| a.code.cmp(&b.code))
    };

    if let Some(found) = dated.or_else(undated) {
        return Ok(found);
    }
    if candidates().next().is_some() {
        return Err(LedgerError::series(format!(
            "no active {scope} series for year {year}"
        )));
    }
    Err(LedgerError::series(format!("no active {scope} series")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_year_scoped_reference() {
        let mut s = DocumentSeries::new("B2C-2024", SeriesScope::SaleB2c, "B2C-", Some(2024)).unwrap();
        s.next_number = 123;
        assert_eq!(s.issue().unwrap(), "B2C-2024-000123");
        assert_eq!(s.next_number, 124);
    }

    #[test]
    fn formats_without_year_and_never_truncates() {
        let mut s = DocumentSeries::new("RET", SeriesScope::Return, "R", None).unwrap();
        s.padding = 2;
        s.next_number = 12_345;
        assert_eq!(s.peek(), "R12345");
    }

    #[test]
    fn exhausted_counter_is_not_consumed() {
        let mut s = DocumentSeries::new("X", SeriesScope::Web, "W", None).unwrap();
        s.next_number = i64::MAX;
        assert!(matches!(s.issue(), Err(LedgerError::SeriesExhausted(_))));
        assert_eq!(s.next_number, i64::MAX);
    }

    #[test]
    fn selection_prefers_matching_year_then_undated() {
        let y24 = DocumentSeries::new("B2C-24", SeriesScope::SaleB2c, "B2C-", Some(2024)).unwrap();
        let plain = DocumentSeries::new("B2C", SeriesScope::SaleB2c, "B2C-", None).unwrap();
        let all = vec![plain.clone(), y24.clone()];

        assert_eq!(select_series(&all, SeriesScope::SaleB2c, 2024).unwrap().code, y24.code);
        assert_eq!(select_series(&all, SeriesScope::SaleB2c, 2025).unwrap().code, plain.code);
    }

    #[test]
    fn missing_year_is_a_configuration_error() {
        let y24 = DocumentSeries::new("B2C-24", SeriesScope::SaleB2c, "B2C-", Some(2024)).unwrap();
        let err = select_series(&[y24], SeriesScope::SaleB2c, 2025).unwrap_err();
        assert!(matches!(err, LedgerError::SeriesMisconfigured(msg) if msg.contains("2025")));
    }

    #[test]
    fn inactive_or_foreign_series_are_not_selected() {
        let mut off = DocumentSeries::new("DEP", SeriesScope::Deposit, "D", None).unwrap();
        off.active = false;
        let other = DocumentSeries::new("RET", SeriesScope::Return, "R", None).unwrap();
        assert!(select_series(&[off, other], SeriesScope::Deposit, 2024).is_err());
    }

    #[test]
    fn patch_rejects_zero_next_number() {
        let s = DocumentSeries::new("B2B", SeriesScope::SaleB2b, "B2B-", None).unwrap();
        let patch = SeriesPatch {
            next_number: Some(0),
            ..Default::default()
        };
        assert!(s.patched(&patch).is_err());
    }

    #[test]
    fn scope_parses_wire_names() {
        for scope in SeriesScope::ALL {
            assert_eq!(scope.as_str().parse::<SeriesScope>().unwrap(), scope);
        }
        assert!("sales".parse::<SeriesScope>().is_err());
    }

    proptest! {
        /// Property: consecutive issues are distinct and strictly increasing.
        #[test]
        fn issued_numbers_strictly_increase(start in 1i64..1_000_000_000, n in 1usize..200) {
            let mut s = DocumentSeries::new("P", SeriesScope::SaleB2c, "P-", Some(2024)).unwrap();
            s.next_number = start;
            let mut previous: Option<i64> = None;
            for _ in 0..n {
                let before = s.next_number;
                let reference = s.issue().unwrap();
                prop_assert_eq!(reference, s.format(before));
                if let Some(p) = previous {
                    prop_assert!(before > p);
                }
                previous = Some(before);
            }
        }
    }
}
