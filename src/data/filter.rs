use std::cmp::Ordering;

use log::{debug, info};
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use super::model::{Dataset, Field, Film};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Exclusion policy
// ---------------------------------------------------------------------------

/// Explicit, data-independent rules for removing films before modelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionPolicy {
    /// Case-insensitive regexes matched against the production company.
    /// A match marks a self-distributing streaming release.
    pub streaming_patterns: Vec<String>,
    /// Streaming-produced titles confirmed to have had a full theatrical run.
    pub theatrical_allow_list: Vec<String>,
    /// Extreme high-revenue titles removed from the sample.
    pub outlier_titles: Vec<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        ExclusionPolicy {
            streaming_patterns: vec!["netflix".into(), "amazon studios".into()],
            theatrical_allow_list: vec![
                "Late Night".into(),
                "Brittany Runs a Marathon".into(),
                "Honey Boy".into(),
            ],
            outlier_titles: vec![
                "Avengers: Endgame".into(),
                "The Lion King".into(),
                "Frozen II".into(),
                "Star Wars: The Rise of Skywalker".into(),
                "Toy Story 4".into(),
            ],
        }
    }
}

/// Fields that must be present for a film to enter the models.
pub const DEFAULT_REQUIRED_FIELDS: [Field; 5] = [
    Field::NetProfit,
    Field::Budget,
    Field::CriticScore,
    Field::TitleSentiment,
    Field::ReleaseMonth,
];

struct CompiledPolicy<'a> {
    streaming: RegexSet,
    policy: &'a ExclusionPolicy,
}

impl<'a> CompiledPolicy<'a> {
    fn new(policy: &'a ExclusionPolicy) -> Result<Self> {
        let streaming = RegexSetBuilder::new(&policy.streaming_patterns)
            .case_insensitive(true)
            .build()?;
        Ok(CompiledPolicy { streaming, policy })
    }

    fn verdict(&self, film: &Film) -> Option<DropReason> {
        let title = film.title().trim();
        let listed = |list: &[String]| list.iter().any(|t| t.trim().eq_ignore_ascii_case(title));

        if let Some(company) = film.raw.production_company.as_deref() {
            if self.streaming.is_match(company) && !listed(&self.policy.theatrical_allow_list) {
                return Some(DropReason::StreamingRelease {
                    company: company.to_string(),
                });
            }
        }
        if listed(&self.policy.outlier_titles) {
            return Some(DropReason::Outlier);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    StreamingRelease { company: String },
    Outlier,
    Incomplete { fields: Vec<Field> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedFilm {
    pub title: String,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// Missing-value count for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingCount {
    pub field: Field,
    pub missing: usize,
    pub fraction: f64,
}

/// Everything the filter decided, for the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterReport {
    pub rows_before: usize,
    pub rows_after: usize,
    /// Computed on the augmented snapshot, before any exclusion.
    pub missing_before: Vec<MissingCount>,
    pub missing_after: Vec<MissingCount>,
    pub dropped: Vec<DroppedFilm>,
}

impl FilterReport {
    pub fn count(&self, pred: impl Fn(&DropReason) -> bool) -> usize {
        self.dropped.iter().filter(|d| pred(&d.reason)).count()
    }

    pub fn streaming_dropped(&self) -> usize {
        self.count(|r| matches!(r, DropReason::StreamingRelease { .. }))
    }

    pub fn outliers_dropped(&self) -> usize {
        self.count(|r| matches!(r, DropReason::Outlier))
    }

    pub fn incomplete_dropped(&self) -> usize {
        self.count(|r| matches!(r, DropReason::Incomplete { .. }))
    }
}

/// Per-field missing count and fraction over every canonical field.
pub fn missing_values(dataset: &Dataset) -> Vec<MissingCount> {
    let n = dataset.len();
    Field::ALL
        .iter()
        .map(|&field| {
            let missing = dataset
                .films
                .iter()
                .filter(|f| f.value(field).is_missing())
                .count();
            MissingCount {
                field,
                missing,
                fraction: if n == 0 { 0.0 } else { missing as f64 / n as f64 },
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Apply the exclusion policy, then keep complete cases over `required`.
///
/// The returned snapshot is sorted into a canonical order so the result does
/// not depend on the input row order.
pub fn quality_filter(
    dataset: &Dataset,
    policy: &ExclusionPolicy,
    required: &[Field],
) -> Result<(Dataset, FilterReport)> {
    let compiled = CompiledPolicy::new(policy)?;
    let missing_before = missing_values(dataset);

    let mut kept: Vec<Film> = Vec::with_capacity(dataset.len());
    let mut dropped: Vec<DroppedFilm> = Vec::new();

    let mut ordered: Vec<&Film> = dataset.films.iter().collect();
    ordered.sort_by(|a, b| canonical_order(a, b));

    for film in ordered {
        let reason = compiled.verdict(film).or_else(|| {
            let absent: Vec<Field> = required
                .iter()
                .copied()
                .filter(|&f| film.value(f).is_missing())
                .collect();
            (!absent.is_empty()).then_some(DropReason::Incomplete { fields: absent })
        });
        match reason {
            Some(reason) => {
                debug!("dropping {:?}: {reason:?}", film.title());
                dropped.push(DroppedFilm {
                    title: film.title().to_string(),
                    reason,
                });
            }
            None => kept.push(film.clone()),
        }
    }

    let filtered = Dataset::new(kept);

    let report = FilterReport {
        rows_before: dataset.len(),
        rows_after: filtered.len(),
        missing_before,
        missing_after: missing_values(&filtered),
        dropped,
    };
    info!(
        "quality filter: {} → {} rows ({} streaming, {} outliers, {} incomplete)",
        report.rows_before,
        report.rows_after,
        report.streaming_dropped(),
        report.outliers_dropped(),
        report.incomplete_dropped()
    );
    Ok((filtered, report))
}

fn canonical_order(a: &Film, b: &Film) -> Ordering {
    let num = |x: Option<f64>, y: Option<f64>| match (x, y) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (x, y) => x.is_some().cmp(&y.is_some()),
    };
    a.raw
        .title
        .cmp(&b.raw.title)
        .then_with(|| a.raw.release_date.cmp(&b.raw.release_date))
        .then_with(|| a.raw.production_company.cmp(&b.raw.production_company))
        .then_with(|| a.raw.director.cmp(&b.raw.director))
        .then_with(|| num(a.raw.box_office, b.raw.box_office))
        .then_with(|| num(a.raw.budget, b.raw.budget))
        .then_with(|| num(a.raw.critic_score, b.raw.critic_score))
        .then_with(|| num(a.raw.run_time, b.raw.run_time))
        .then_with(|| a.raw.genre.cmp(&b.raw.genre))
        .then_with(|| a.raw.actors.cmp(&b.raw.actors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RawFilm;
    use chrono::Month;
    use proptest::prelude::*;

    fn film(title: &str, company: &str, profit: Option<f64>) -> Film {
        Film {
            raw: RawFilm {
                title: Some(title.into()),
                production_company: Some(company.into()),
                budget: Some(10.0),
                critic_score: Some(50.0),
                ..RawFilm::default()
            },
            genre: None,
            net_profit: profit,
            title_sentiment: Some(0.0),
            day_of_week: None,
            release_month: Some(Month::May),
        }
    }

    fn sample() -> Dataset {
        Dataset::new(vec![
            film("Zeta", "Universal", Some(5.0)),
            film("The Irishman", "Netflix", Some(1.0)),
            film("Late Night", "Amazon Studios", Some(2.0)),
            film("Avengers: Endgame", "Marvel Studios", Some(2000.0)),
            film("Alpha", "Warner Bros.", None),
            film("Beta", "Lionsgate", Some(-3.0)),
        ])
    }

    #[test]
    fn test_exclusion_rules() {
        let (filtered, report) =
            quality_filter(&sample(), &ExclusionPolicy::default(), &DEFAULT_REQUIRED_FIELDS).unwrap();
        let titles: Vec<&str> = filtered.films.iter().map(|f| f.title()).collect();
        assert_eq!(titles, vec!["Beta", "Late Night", "Zeta"]);

        assert_eq!(report.rows_before, 6);
        assert_eq!(report.rows_after, 3);
        assert_eq!(report.streaming_dropped(), 1);
        assert_eq!(report.outliers_dropped(), 1);
        assert_eq!(report.incomplete_dropped(), 1);

        let alpha = report.dropped.iter().find(|d| d.title == "Alpha").unwrap();
        assert_eq!(
            alpha.reason,
            DropReason::Incomplete {
                fields: vec![Field::NetProfit]
            }
        );
    }

    #[test]
    fn test_missing_fraction() {
        let films: Vec<Film> = (0..20)
            .map(|i| {
                let profit = if i % 4 == 0 { None } else { Some(i as f64) };
                film(&format!("F{i}"), "Studio", profit)
            })
            .collect();
        let report = missing_values(&Dataset::new(films));
        let profit = report.iter().find(|m| m.field == Field::NetProfit).unwrap();
        assert_eq!(profit.missing, 5);
        assert_eq!(profit.fraction, 0.25);
        let title = report.iter().find(|m| m.field == Field::Title).unwrap();
        assert_eq!(title.missing, 0);
    }

    #[test]
    fn test_bad_pattern_is_an_error() {
        let policy = ExclusionPolicy {
            streaming_patterns: vec!["(".into()],
            ..ExclusionPolicy::default()
        };
        assert!(quality_filter(&sample(), &policy, &DEFAULT_REQUIRED_FIELDS).is_err());
    }

    /// Two rows titled "Gamma" dropped for different reasons.
    fn sample_with_tied_drops() -> Dataset {
        let mut films = sample().films;
        films.push(film("Gamma", "Netflix", Some(4.0)));
        films.push(film("Gamma", "Focus Features", None));
        Dataset::new(films)
    }

    #[test]
    fn test_tied_titles_are_ordered_by_the_rest_of_the_row() {
        let policy = ExclusionPolicy::default();
        let ds = sample_with_tied_drops();
        let mut reversed = ds.films.clone();
        reversed.reverse();

        let (_, forward) = quality_filter(&ds, &policy, &DEFAULT_REQUIRED_FIELDS).unwrap();
        let (_, backward) =
            quality_filter(&Dataset::new(reversed), &policy, &DEFAULT_REQUIRED_FIELDS).unwrap();
        assert_eq!(forward.dropped, backward.dropped);

        let gamma: Vec<&DropReason> = forward
            .dropped
            .iter()
            .filter(|d| d.title == "Gamma")
            .map(|d| &d.reason)
            .collect();
        assert_eq!(gamma.len(), 2);
        // "Focus Features" sorts before "Netflix".
        assert!(matches!(gamma[0], DropReason::Incomplete { .. }));
        assert!(matches!(gamma[1], DropReason::StreamingRelease { .. }));
    }

    proptest! {
        #[test]
        fn prop_filter_is_order_independent(
            shuffled in Just(sample_with_tied_drops().films).prop_shuffle()
        ) {
            let policy = ExclusionPolicy::default();
            let (a, ra) = quality_filter(&sample_with_tied_drops(), &policy, &DEFAULT_REQUIRED_FIELDS).unwrap();
            let (b, rb) = quality_filter(&Dataset::new(shuffled), &policy, &DEFAULT_REQUIRED_FIELDS).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(ra, rb);
        }
    }
}
