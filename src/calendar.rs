//! Fiscal calendar helpers.
//!
//! The fiscal year starts in November and is named after the calendar year in
//! which it ends: November 2025 falls in FY26. Quarters are fixed three-month
//! windows (Q1 Nov-Jan, Q2 Feb-Apr, Q3 May-Jul, Q4 Aug-Oct).

use crate::error::{FlashReportError, Result};
use crate::schema::FiscalMonth;
use crate::table::Table;
use crate::utils::{add_months, first_day_of_month, last_day_of_month};
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Months in which a new fiscal quarter begins.
const QUARTER_START_MONTHS: [u32; 4] = [11, 2, 5, 8];
const GRACE_START_DAY: u32 = 13;
pub const QUARTER_CHANGE_GRACE_DAYS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiscalQuarter {
    pub fiscal_year: i32,
    pub quarter: u8,
}

impl FiscalQuarter {
    pub fn from_month(year: i32, month: u32) -> Self {
        let quarter = match month {
            11 | 12 | 1 => 1,
            2..=4 => 2,
            5..=7 => 3,
            _ => 4,
        };
        let fiscal_year = if month >= 11 { year + 1 } else { year };
        Self {
            fiscal_year,
            quarter,
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_month(date.year(), date.month())
    }

    pub fn from_fiscal_month(month: FiscalMonth) -> Self {
        Self::from_month(month.year, month.month)
    }

    /// "Q1".."Q4"
    pub fn name(&self) -> String {
        format!("Q{}", self.quarter)
    }

    /// e.g. "FY26Q1"
    pub fn label(&self) -> String {
        format!("FY{:02}Q{}", self.fiscal_year.rem_euclid(100), self.quarter)
    }

    fn first_month(&self) -> (i32, u32) {
        match self.quarter {
            1 => (self.fiscal_year - 1, 11),
            2 => (self.fiscal_year, 2),
            3 => (self.fiscal_year, 5),
            _ => (self.fiscal_year, 8),
        }
    }

    pub fn start_date(&self) -> Result<NaiveDate> {
        let (year, month) = self.first_month();
        first_day_of_month(year, month)
    }

    pub fn end_date(&self) -> Result<NaiveDate> {
        let (year, month) = self.first_month();
        let (year, month) = add_months(year, month, 2);
        last_day_of_month(year, month)
    }

    /// The three months of the quarter, in order.
    pub fn months(&self) -> Vec<FiscalMonth> {
        let (year, month) = self.first_month();
        (0..3)
            .map(|offset| {
                let (year, month) = add_months(year, month, offset);
                FiscalMonth { year, month }
            })
            .collect()
    }

    pub fn contains(&self, month: FiscalMonth) -> bool {
        Self::from_fiscal_month(month) == *self
    }

    pub fn previous(&self) -> Self {
        if self.quarter == 1 {
            Self {
                fiscal_year: self.fiscal_year - 1,
                quarter: 4,
            }
        } else {
            Self {
                fiscal_year: self.fiscal_year,
                quarter: self.quarter - 1,
            }
        }
    }
}

impl fmt::Display for FiscalQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Current and previous quarter labels for `date`, e.g. ("FY26Q1", "FY25Q4").
pub fn quarter_labels(date: NaiveDate) -> (String, String) {
    let current = FiscalQuarter::from_date(date);
    (current.label(), current.previous().label())
}

/// True inside the window of `grace_days` days starting on the 13th of a
/// quarter's first month, when the previous quarter's data is still settling.
pub fn in_quarter_change_window(date: NaiveDate, grace_days: u32) -> bool {
    QUARTER_START_MONTHS.contains(&date.month())
        && date.day() >= GRACE_START_DAY
        && date.day() < GRACE_START_DAY + grace_days
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingCalendarEntry {
    pub date: NaiveDate,
    pub days_of_reporting: u32,
}

/// A region's reporting calendar: elapsed reporting days for each valid run date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportingCalendar {
    pub region: String,
    pub entries: Vec<ReportingCalendarEntry>,
}

impl ReportingCalendar {
    pub fn new(region: impl Into<String>, entries: Vec<ReportingCalendarEntry>) -> Self {
        Self {
            region: region.into(),
            entries,
        }
    }

    /// Reads the first column as dates and the second as day counts. Rows
    /// with an unreadable date or a negative or fractional count are skipped.
    pub fn from_table(region: &str, table: &Table) -> Result<Self> {
        if table.columns.len() < 2 {
            return Err(FlashReportError::DateError(format!(
                "{region} reporting calendar needs a date column and a days column, found {}",
                table.columns.len()
            )));
        }

        let mut entries = Vec::with_capacity(table.len());
        let mut skipped = 0usize;
        for row in 0..table.len() {
            let date = table.cell(row, 0).as_date();
            let days = table
                .cell(row, 1)
                .as_f64()
                .filter(|d| *d >= 0.0 && d.fract() == 0.0)
                .map(|d| d as u32);
            match (date, days) {
                (Some(date), Some(days_of_reporting)) => entries.push(ReportingCalendarEntry {
                    date,
                    days_of_reporting,
                }),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("{} reporting calendar: skipped {} unreadable rows", region, skipped);
        }

        Ok(Self::new(region, entries))
    }

    /// Exact-date lookup. A date absent from the calendar is not a valid
    /// reporting date for the region.
    pub fn days_of_reporting(&self, date: NaiveDate) -> Result<u32> {
        self.entries
            .iter()
            .find(|e| e.date == date)
            .map(|e| e.days_of_reporting)
            .ok_or_else(|| FlashReportError::CalendarLookup {
                region: self.region.clone(),
                date,
            })
    }

    /// Largest day count in the calendar; 0 when it is empty.
    pub fn days_in_quarter(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.days_of_reporting)
            .max()
            .unwrap_or(0)
    }
}
