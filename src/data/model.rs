use std::fmt;

use chrono::{Month, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::FieldParseWarning;

/// Secondary genre assigned when the raw genre string has a single segment.
pub const NOT_APPLICABLE: &str = "Not-Applicable";

/// Weekday levels in the order used for design matrices.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Calendar months in the order used for design matrices and grouping.
pub const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

// ---------------------------------------------------------------------------
// Field – canonical column names
// ---------------------------------------------------------------------------

/// Canonical internal name of every column, parsed or derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    ReleaseDate,
    ProductionCompany,
    Actor1,
    Actor2,
    Actor3,
    Director,
    BoxOffice,
    Budget,
    RunTime,
    CriticScore,
    Genre,
    PrimaryGenre,
    SecondaryGenre,
    GenreCount,
    NetProfit,
    TitleSentiment,
    DayOfWeek,
    ReleaseMonth,
}

impl Field {
    pub const ALL: [Field; 19] = [
        Field::Title,
        Field::ReleaseDate,
        Field::ProductionCompany,
        Field::Actor1,
        Field::Actor2,
        Field::Actor3,
        Field::Director,
        Field::BoxOffice,
        Field::Budget,
        Field::RunTime,
        Field::CriticScore,
        Field::Genre,
        Field::PrimaryGenre,
        Field::SecondaryGenre,
        Field::GenreCount,
        Field::NetProfit,
        Field::TitleSentiment,
        Field::DayOfWeek,
        Field::ReleaseMonth,
    ];

    /// Real-valued fields, in the order the correlation matrix uses.
    pub const NUMERIC: [Field; 7] = [
        Field::BoxOffice,
        Field::Budget,
        Field::NetProfit,
        Field::CriticScore,
        Field::RunTime,
        Field::TitleSentiment,
        Field::GenreCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::ReleaseDate => "release_date",
            Field::ProductionCompany => "production_company",
            Field::Actor1 => "actor_1",
            Field::Actor2 => "actor_2",
            Field::Actor3 => "actor_3",
            Field::Director => "director",
            Field::BoxOffice => "box_office",
            Field::Budget => "budget",
            Field::RunTime => "run_time",
            Field::CriticScore => "critic_score",
            Field::Genre => "genre",
            Field::PrimaryGenre => "primary_genre",
            Field::SecondaryGenre => "secondary_genre",
            Field::GenreCount => "genre_count",
            Field::NetProfit => "net_profit",
            Field::TitleSentiment => "title_sentiment",
            Field::DayOfWeek => "day_of_week",
            Field::ReleaseMonth => "release_month",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// ---------------------------------------------------------------------------
// FieldValue – a single cell, viewed generically
// ---------------------------------------------------------------------------

/// A dynamically-typed view of one cell, used by diagnostics and the design
/// matrix builder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Date(NaiveDate),
    Weekday(Weekday),
    Month(Month),
    Missing,
}

impl FieldValue<'_> {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Level label for categorical use. Numbers and dates have none.
    pub fn level(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some((*s).to_string()),
            FieldValue::Weekday(d) => Some(weekday_label(*d).to_string()),
            FieldValue::Month(m) => Some(m.name().to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Number(v) => write!(f, "{v:.4}"),
            FieldValue::Date(d) => write!(f, "{d}"),
            FieldValue::Weekday(d) => write!(f, "{}", weekday_label(*d)),
            FieldValue::Month(m) => write!(f, "{}", m.name()),
            FieldValue::Missing => write!(f, "<missing>"),
        }
    }
}

pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn text(value: &Option<String>) -> FieldValue<'_> {
    value
        .as_deref()
        .map(FieldValue::Text)
        .unwrap_or(FieldValue::Missing)
}

fn number(value: Option<f64>) -> FieldValue<'static> {
    value.map(FieldValue::Number).unwrap_or(FieldValue::Missing)
}

// ---------------------------------------------------------------------------
// RawFilm – one parsed input row
// ---------------------------------------------------------------------------

/// One film as parsed from the input file, before any derived columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawFilm {
    pub title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub production_company: Option<String>,
    pub actors: [Option<String>; 3],
    pub director: Option<String>,
    pub box_office: Option<f64>,
    pub budget: Option<f64>,
    /// Minutes.
    pub run_time: Option<f64>,
    /// 0–100.
    pub critic_score: Option<f64>,
    pub genre: Option<String>,
}

impl RawFilm {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// Result of the primary/secondary genre split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenreSplit {
    pub primary: String,
    pub secondary: String,
    /// Number of `/`-delimited segments, including any beyond the second.
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Film – an augmented observation
// ---------------------------------------------------------------------------

/// A raw film plus every derived column. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Film {
    pub raw: RawFilm,
    pub genre: Option<GenreSplit>,
    pub net_profit: Option<f64>,
    pub title_sentiment: Option<f64>,
    pub day_of_week: Option<Weekday>,
    pub release_month: Option<Month>,
}

impl Film {
    pub fn title(&self) -> &str {
        self.raw.title()
    }

    pub fn value(&self, field: Field) -> FieldValue<'_> {
        let raw = &self.raw;
        match field {
            Field::Title => text(&raw.title),
            Field::ReleaseDate => raw
                .release_date
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Missing),
            Field::ProductionCompany => text(&raw.production_company),
            Field::Actor1 => text(&raw.actors[0]),
            Field::Actor2 => text(&raw.actors[1]),
            Field::Actor3 => text(&raw.actors[2]),
            Field::Director => text(&raw.director),
            Field::BoxOffice => number(raw.box_office),
            Field::Budget => number(raw.budget),
            Field::RunTime => number(raw.run_time),
            Field::CriticScore => number(raw.critic_score),
            Field::Genre => text(&raw.genre),
            Field::PrimaryGenre => match &self.genre {
                Some(g) => FieldValue::Text(&g.primary),
                None => FieldValue::Missing,
            },
            Field::SecondaryGenre => match &self.genre {
                Some(g) => FieldValue::Text(&g.secondary),
                None => FieldValue::Missing,
            },
            Field::GenreCount => number(self.genre.as_ref().map(|g| g.count as f64)),
            Field::NetProfit => number(self.net_profit),
            Field::TitleSentiment => number(self.title_sentiment),
            Field::DayOfWeek => self
                .day_of_week
                .map(FieldValue::Weekday)
                .unwrap_or(FieldValue::Missing),
            Field::ReleaseMonth => self
                .release_month
                .map(FieldValue::Month)
                .unwrap_or(FieldValue::Missing),
        }
    }

    pub fn numeric(&self, field: Field) -> Option<f64> {
        self.value(field).as_f64()
    }
}

// ---------------------------------------------------------------------------
// Datasets – immutable snapshots
// ---------------------------------------------------------------------------

/// Output of the loader: parsed rows plus every per-cell parse failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawDataset {
    pub films: Vec<RawFilm>,
    pub warnings: Vec<FieldParseWarning>,
}

impl RawDataset {
    pub fn len(&self) -> usize {
        self.films.len()
    }

    pub fn is_empty(&self) -> bool {
        self.films.is_empty()
    }
}

/// An ordered collection of augmented films. Both the augmented and the
/// filtered (complete-case) snapshots use this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub films: Vec<Film>,
}

/// Descriptive statistics for one numeric field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub field: Field,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Dataset {
    pub fn new(films: Vec<Film>) -> Self {
        Dataset { films }
    }

    pub fn len(&self) -> usize {
        self.films.len()
    }

    pub fn is_empty(&self) -> bool {
        self.films.is_empty()
    }

    /// One field across all rows, `None` where missing or non-numeric.
    pub fn column(&self, field: Field) -> Vec<Option<f64>> {
        self.films.iter().map(|f| f.numeric(field)).collect()
    }

    /// Count/mean/sd/min/max of every numeric field over its present values.
    pub fn describe(&self) -> Vec<FieldSummary> {
        Field::NUMERIC
            .iter()
            .filter_map(|&field| {
                let values: Vec<f64> = self.column(field).into_iter().flatten().collect();
                if values.is_empty() {
                    return None;
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let std_dev = if values.len() > 1 {
                    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
                } else {
                    0.0
                };
                Some(FieldSummary {
                    field,
                    count: values.len(),
                    mean,
                    std_dev,
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                })
            })
            .collect()
    }
}
