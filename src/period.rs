//! Period addressing for the sheet hierarchy
//!
//! Every sheet sits at a coordinate `(level, year, period)`:
//!
//! | level   | year            | period                                   |
//! |---------|-----------------|------------------------------------------|
//! | life    | `0` (sentinel)  | `0`                                      |
//! | phase   | phase start     | `0`                                      |
//! | year    | calendar year   | `0`                                      |
//! | quarter | calendar year   | `1..=3` (4-month blocks)                 |
//! | month   | calendar year   | `1..=12`                                 |
//! | week    | calendar year   | `1..=60`, `(month - 1) * 5 + weekOfMonth`|
//!
//! All level-specific behavior is driven from the [`LEVELS`] table so the
//! parent, child, period domain and label of a level are defined once.
//!
//! Everything in this module is pure: no I/O, no clock reads. Callers pass
//! "today" explicitly where it matters.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Weeks per month in the week encoding. Every month has exactly five.
pub const WEEKS_PER_MONTH: i32 = 5;

/// Months per "quarter". A year holds three 4-month blocks.
pub const MONTHS_PER_QUARTER: i32 = 4;

/// Years per phase.
pub const PHASE_YEARS: i32 = 3;

/// Number of phases offered when drilling down from the life sheet.
pub const LIFE_PHASE_CHOICES: i32 = 5;

/// Highest year accepted for non-life coordinates.
pub const MAX_YEAR: i32 = 9999;

/// Lowest phase start year. The phase enclosing year 1 can start up to
/// two years earlier, whatever the anchor.
pub const MIN_PHASE_YEAR: i32 = 1 - (PHASE_YEARS - 1);

/// Coordinate outside the documented domain. Always a caller bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainViolation {
    #[error("unknown level '{0}'")]
    UnknownLevel(String),

    #[error("period {period} outside {level} domain {min}..={max}")]
    Period {
        level: Level,
        period: i32,
        min: i32,
        max: i32,
    },

    #[error("year {year} invalid for {level}")]
    Year { level: Level, year: i32 },

    #[error("month {0} outside 1..=12")]
    Month(i32),

    #[error("week of month {0} outside 1..=5")]
    WeekOfMonth(i32),
}

/// Granularity tier, ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Life,
    Phase,
    Year,
    Quarter,
    Month,
    Week,
}

/// Static facts about one level.
#[derive(Debug)]
pub struct LevelSpec {
    pub level: Level,
    pub name: &'static str,
    pub display_name: &'static str,
    pub parent: Option<Level>,
    pub child: Option<Level>,
    /// Inclusive period range
    pub periods: (i32, i32),
    label: fn(i32, i32) -> String,
}

/// The dispatch table, indexed by `Level as usize`.
pub static LEVELS: [LevelSpec; 6] = [
    LevelSpec {
        level: Level::Life,
        name: "life",
        display_name: "Life",
        parent: None,
        child: Some(Level::Phase),
        periods: (0, 0),
        label: life_label,
    },
    LevelSpec {
        level: Level::Phase,
        name: "phase",
        display_name: "3 years",
        parent: Some(Level::Life),
        child: Some(Level::Year),
        periods: (0, 0),
        label: phase_label,
    },
    LevelSpec {
        level: Level::Year,
        name: "year",
        display_name: "Year",
        parent: Some(Level::Phase),
        child: Some(Level::Quarter),
        periods: (0, 0),
        label: year_label,
    },
    LevelSpec {
        level: Level::Quarter,
        name: "quarter",
        display_name: "4 months",
        parent: Some(Level::Year),
        child: Some(Level::Month),
        periods: (1, 12 / MONTHS_PER_QUARTER),
        label: quarter_label,
    },
    LevelSpec {
        level: Level::Month,
        name: "month",
        display_name: "Month",
        parent: Some(Level::Quarter),
        child: Some(Level::Week),
        periods: (1, 12),
        label: month_label,
    },
    LevelSpec {
        level: Level::Week,
        name: "week",
        display_name: "Week",
        parent: Some(Level::Month),
        child: None,
        periods: (1, 12 * WEEKS_PER_MONTH),
        label: week_label,
    },
];

fn life_label(_year: i32, _period: i32) -> String {
    "Life plan".to_string()
}

fn phase_label(year: i32, _period: i32) -> String {
    format!("{}-{}", year, year + PHASE_YEARS - 1)
}

fn year_label(year: i32, _period: i32) -> String {
    year.to_string()
}

fn quarter_label(year: i32, period: i32) -> String {
    let (start, end) = quarter_month_range(period);
    format!("{} {}-{}", year, start, end)
}

fn month_label(year: i32, period: i32) -> String {
    format!("{}/{}", year, period)
}

fn week_label(year: i32, period: i32) -> String {
    let week = split_week_period(period);
    format!("{}/{} week {}", year, week.month, week.week_of_month)
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Life,
        Level::Phase,
        Level::Year,
        Level::Quarter,
        Level::Month,
        Level::Week,
    ];

    pub fn spec(self) -> &'static LevelSpec {
        &LEVELS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    pub fn parent(self) -> Option<Level> {
        self.spec().parent
    }

    pub fn child(self) -> Option<Level> {
        self.spec().child
    }

    pub fn period_domain(self) -> (i32, i32) {
        self.spec().periods
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = DomainViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LEVELS
            .iter()
            .find(|spec| spec.name == s)
            .map(|spec| spec.level)
            .ok_or_else(|| DomainViolation::UnknownLevel(s.to_string()))
    }
}

/// A decoded week period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekOfMonth {
    pub month: i32,
    pub week_of_month: i32,
}

/// `period = (month - 1) * 5 + weekOfMonth`
pub fn encode_week_period(month: i32, week_of_month: i32) -> Result<i32, DomainViolation> {
    if !(1..=12).contains(&month) {
        return Err(DomainViolation::Month(month));
    }
    if !(1..=WEEKS_PER_MONTH).contains(&week_of_month) {
        return Err(DomainViolation::WeekOfMonth(week_of_month));
    }
    Ok((month - 1) * WEEKS_PER_MONTH + week_of_month)
}

/// Exact inverse of [`encode_week_period`] over `1..=60`.
pub fn decode_week_period(period: i32) -> Result<WeekOfMonth, DomainViolation> {
    let (min, max) = Level::Week.period_domain();
    if !(min..=max).contains(&period) {
        return Err(DomainViolation::Period {
            level: Level::Week,
            period,
            min,
            max,
        });
    }
    Ok(split_week_period(period))
}

// Unchecked split; only reached with validated periods.
fn split_week_period(period: i32) -> WeekOfMonth {
    WeekOfMonth {
        month: (period - 1).div_euclid(WEEKS_PER_MONTH) + 1,
        week_of_month: (period - 1).rem_euclid(WEEKS_PER_MONTH) + 1,
    }
}

/// Start year of the 3-year phase containing `year`.
///
/// Phases are anchored to `birth_year` (0 when unknown). Years before the
/// anchor fall into buckets that round toward negative infinity.
pub fn phase_start_year(year: i32, birth_year: Option<i32>) -> i32 {
    let anchor = birth_year.unwrap_or(0);
    let phase_index = (year - anchor).div_euclid(PHASE_YEARS);
    anchor + phase_index * PHASE_YEARS
}

/// 4-month block that contains `month`.
pub fn quarter_of_month(month: i32) -> Result<i32, DomainViolation> {
    if !(1..=12).contains(&month) {
        return Err(DomainViolation::Month(month));
    }
    Ok((month - 1) / MONTHS_PER_QUARTER + 1)
}

/// First and last month of a quarter.
pub fn quarter_month_range(quarter: i32) -> (i32, i32) {
    let start = (quarter - 1) * MONTHS_PER_QUARTER + 1;
    (start, start + MONTHS_PER_QUARTER - 1)
}

/// Week-of-month for a day of the month, capped at the fifth week.
pub fn week_of_month_for_day(day: u32) -> i32 {
    let week = (day as i32 + 6) / 7;
    week.clamp(1, WEEKS_PER_MONTH)
}

/// Human-readable label for a coordinate.
pub fn sheet_label(level: Level, year: i32, period: i32) -> Result<String, DomainViolation> {
    Ok(Coord::new(level, year, period)?.label())
}

/// Position of a sheet in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub level: Level,
    pub year: i32,
    pub period: i32,
}

/// Inputs that the hierarchy needs beyond the coordinate itself.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyContext {
    pub birth_year: Option<i32>,
    pub today: NaiveDate,
}

impl Coord {
    /// Validated constructor.
    pub fn new(level: Level, year: i32, period: i32) -> Result<Self, DomainViolation> {
        let coord = Self { level, year, period };
        coord.validate()?;
        Ok(coord)
    }

    /// The single life sheet.
    pub fn life() -> Self {
        Self { level: Level::Life, year: 0, period: 0 }
    }

    pub fn validate(&self) -> Result<(), DomainViolation> {
        let year_ok = match self.level {
            Level::Life => self.year == 0,
            Level::Phase => (MIN_PHASE_YEAR..=MAX_YEAR).contains(&self.year),
            _ => (1..=MAX_YEAR).contains(&self.year),
        };
        if !year_ok {
            return Err(DomainViolation::Year { level: self.level, year: self.year });
        }

        let (min, max) = self.level.period_domain();
        if !(min..=max).contains(&self.period) {
            return Err(DomainViolation::Period {
                level: self.level,
                period: self.period,
                min,
                max,
            });
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        (self.level.spec().label)(self.year, self.period)
    }

    /// Coordinate of the structurally enclosing sheet; `None` for life.
    pub fn parent(&self, birth_year: Option<i32>) -> Result<Option<Coord>, DomainViolation> {
        self.validate()?;
        let parent = match self.level {
            Level::Life => None,
            Level::Phase => Some(Coord::life()),
            Level::Year => Some(Coord {
                level: Level::Phase,
                year: phase_start_year(self.year, birth_year),
                period: 0,
            }),
            Level::Quarter => Some(Coord { level: Level::Year, year: self.year, period: 0 }),
            Level::Month => Some(Coord {
                level: Level::Quarter,
                year: self.year,
                period: quarter_of_month(self.period)?,
            }),
            Level::Week => Some(Coord {
                level: Level::Month,
                year: self.year,
                period: split_week_period(self.period).month,
            }),
        };
        Ok(parent)
    }

    /// Chain from the life sheet down to (and including) this coordinate.
    pub fn ancestry(&self, birth_year: Option<i32>) -> Result<Vec<Coord>, DomainViolation> {
        let mut chain = vec![*self];
        let mut current = *self;
        while let Some(parent) = current.parent(birth_year)? {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Drill-down coordinates one level below. Phases and years that would
    /// fall outside the year range are left out.
    pub fn children(&self, ctx: &HierarchyContext) -> Result<Vec<Coord>, DomainViolation> {
        self.validate()?;
        let children = match self.level {
            Level::Life => {
                let first = phase_start_year(ctx.today.year(), ctx.birth_year);
                (0..LIFE_PHASE_CHOICES)
                    .map(|i| Coord { level: Level::Phase, year: first + i * PHASE_YEARS, period: 0 })
                    .filter(|c| c.validate().is_ok())
                    .collect()
            }
            Level::Phase => (0..PHASE_YEARS)
                .map(|i| Coord { level: Level::Year, year: self.year + i, period: 0 })
                .filter(|c| c.validate().is_ok())
                .collect(),
            Level::Year => {
                let (min, max) = Level::Quarter.period_domain();
                (min..=max)
                    .map(|q| Coord { level: Level::Quarter, year: self.year, period: q })
                    .collect()
            }
            Level::Quarter => {
                let (start, end) = quarter_month_range(self.period);
                (start..=end)
                    .map(|m| Coord { level: Level::Month, year: self.year, period: m })
                    .collect()
            }
            Level::Month => (1..=WEEKS_PER_MONTH)
                .map(|w| {
                    encode_week_period(self.period, w)
                        .map(|period| Coord { level: Level::Week, year: self.year, period })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Level::Week => Vec::new(),
        };
        Ok(children)
    }

    /// Coordinate at `level` that contains `today`.
    pub fn current(level: Level, today: NaiveDate, birth_year: Option<i32>) -> Coord {
        let year = today.year();
        let month = today.month() as i32;
        match level {
            Level::Life => Coord::life(),
            Level::Phase => Coord {
                level,
                year: phase_start_year(year, birth_year),
                period: 0,
            },
            Level::Year => Coord { level, year, period: 0 },
            Level::Quarter => Coord {
                level,
                year,
                period: (month - 1) / MONTHS_PER_QUARTER + 1,
            },
            Level::Month => Coord { level, year, period: month },
            Level::Week => Coord {
                level,
                year,
                period: (month - 1) * WEEKS_PER_MONTH + week_of_month_for_day(today.day()),
            },
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.year, self.period)
    }
}
