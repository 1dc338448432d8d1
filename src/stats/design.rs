use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::model::{weekday_label, Dataset, Field, Film, MONTHS, WEEKDAYS};

/// Label for the intercept column.
pub const INTERCEPT: &str = "(Intercept)";
/// Genre level collecting every genre outside the configured list.
pub const OTHER_GENRE: &str = "Other";

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// A covariate that can enter a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictor {
    Budget,
    CriticScore,
    TitleSentiment,
    RunTime,
    GenreCount,
    DayOfWeek,
    PrimaryGenre,
    ReleaseMonth,
}

impl Predictor {
    pub fn field(self) -> Field {
        match self {
            Predictor::Budget => Field::Budget,
            Predictor::CriticScore => Field::CriticScore,
            Predictor::TitleSentiment => Field::TitleSentiment,
            Predictor::RunTime => Field::RunTime,
            Predictor::GenreCount => Field::GenreCount,
            Predictor::DayOfWeek => Field::DayOfWeek,
            Predictor::PrimaryGenre => Field::PrimaryGenre,
            Predictor::ReleaseMonth => Field::ReleaseMonth,
        }
    }

    pub fn is_categorical(self) -> bool {
        matches!(
            self,
            Predictor::DayOfWeek | Predictor::PrimaryGenre | Predictor::ReleaseMonth
        )
    }

    pub fn name(self) -> &'static str {
        self.field().name()
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// ---------------------------------------------------------------------------
// Leveling – explicit categorical levels
// ---------------------------------------------------------------------------

/// Fixed level enumerations for categorical predictors, so coefficient
/// tables line up across subsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Leveling {
    genres: Vec<String>,
}

impl Leveling {
    pub fn new(genres: &[String]) -> Self {
        let mut genres: Vec<String> = genres.to_vec();
        genres.retain(|g| g != OTHER_GENRE);
        genres.push(OTHER_GENRE.to_string());
        Leveling { genres }
    }

    /// Expected levels in design order. Empty for numeric predictors.
    pub fn levels(&self, predictor: Predictor) -> Vec<String> {
        match predictor {
            Predictor::DayOfWeek => WEEKDAYS.iter().map(|d| weekday_label(*d).to_string()).collect(),
            Predictor::ReleaseMonth => MONTHS.iter().map(|m| m.name().to_string()).collect(),
            Predictor::PrimaryGenre => self.genres.clone(),
            _ => Vec::new(),
        }
    }

    /// The film's level for a categorical predictor.
    pub fn level_of(&self, film: &Film, predictor: Predictor) -> Option<String> {
        let level = film.value(predictor.field()).level()?;
        if predictor == Predictor::PrimaryGenre && !self.genres.contains(&level) {
            return Some(OTHER_GENRE.to_string());
        }
        Some(level)
    }
}

impl Default for Leveling {
    fn default() -> Self {
        Leveling::new(&default_genres())
    }
}

pub fn default_genres() -> Vec<String> {
    [
        "Action",
        "Adventure",
        "Animation",
        "Biography",
        "Comedy",
        "Crime",
        "Documentary",
        "Drama",
        "Family",
        "Fantasy",
        "History",
        "Horror",
        "Music",
        "Musical",
        "Mystery",
        "Romance",
        "Sci-Fi",
        "Sport",
        "Thriller",
        "War",
        "Western",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Design matrix
// ---------------------------------------------------------------------------

/// Observation count behind one level of a categorical predictor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCount {
    pub predictor: Predictor,
    pub level: String,
    pub count: usize,
}

/// Treatment-coded design matrix plus response.
#[derive(Debug, Clone)]
pub struct Design {
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    pub columns: Vec<String>,
    /// Dataset indices of the rows used, in matrix order.
    pub rows: Vec<usize>,
    pub level_counts: Vec<LevelCount>,
    /// Expected levels with no observations; they get no column.
    pub absent_levels: Vec<String>,
}

/// Indices of rows with `response` and every predictor present.
pub fn complete_rows(dataset: &Dataset, response: Field, predictors: &[Predictor]) -> Vec<usize> {
    dataset
        .films
        .iter()
        .enumerate()
        .filter(|(_, film)| {
            !film.value(response).is_missing()
                && predictors.iter().all(|p| !film.value(p.field()).is_missing())
        })
        .map(|(i, _)| i)
        .collect()
}

impl Design {
    /// Build an intercept-plus-predictors design over `rows`. Numeric
    /// predictors become one column; categorical predictors get one column
    /// per observed non-reference level, the reference being the first
    /// expected level that is observed.
    ///
    /// `rows` must already be complete for `response` and `predictors`
    /// (see [`complete_rows`]); incomplete rows are skipped.
    pub fn build(
        dataset: &Dataset,
        rows: &[usize],
        response: Field,
        predictors: &[Predictor],
        leveling: &Leveling,
    ) -> Design {
        let rows: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|&i| {
                let film = &dataset.films[i];
                !film.value(response).is_missing()
                    && predictors.iter().all(|p| !film.value(p.field()).is_missing())
            })
            .collect();
        let films: Vec<&Film> = rows.iter().map(|&i| &dataset.films[i]).collect();

        let mut columns = vec![INTERCEPT.to_string()];
        let mut data: Vec<Vec<f64>> = vec![vec![1.0; films.len()]];
        let mut level_counts = Vec::new();
        let mut absent_levels = Vec::new();

        for &predictor in predictors {
            if !predictor.is_categorical() {
                columns.push(predictor.name().to_string());
                data.push(films.iter().map(|f| f.numeric(predictor.field()).unwrap_or(0.0)).collect());
                continue;
            }

            let observed: Vec<String> = films
                .iter()
                .map(|f| leveling.level_of(f, predictor).unwrap_or_default())
                .collect();
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for level in &observed {
                *counts.entry(level.as_str()).or_default() += 1;
            }

            let mut reference_seen = false;
            for level in leveling.levels(predictor) {
                let count = counts.get(level.as_str()).copied().unwrap_or(0);
                if count == 0 {
                    absent_levels.push(format!("{predictor}[{level}]"));
                    continue;
                }
                level_counts.push(LevelCount {
                    predictor,
                    level: level.clone(),
                    count,
                });
                if !reference_seen {
                    reference_seen = true;
                    continue;
                }
                columns.push(format!("{predictor}[{level}]"));
                data.push(observed.iter().map(|o| f64::from(u8::from(*o == level))).collect());
            }
        }

        let x = DMatrix::from_fn(films.len(), columns.len(), |i, j| data[j][i]);
        let y = DVector::from_iterator(
            films.len(),
            films.iter().map(|f| f.numeric(response).unwrap_or(0.0)),
        );

        Design {
            x,
            y,
            columns,
            rows,
            level_counts,
            absent_levels,
        }
    }

    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.x.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RawFilm;
    use chrono::Weekday;

    fn film(budget: Option<f64>, day: Weekday, genre: &str) -> Film {
        Film {
            raw: RawFilm {
                budget,
                ..RawFilm::default()
            },
            genre: crate::data::augment::split_genre(genre),
            net_profit: Some(1.0),
            title_sentiment: Some(0.0),
            day_of_week: Some(day),
            release_month: None,
        }
    }

    #[test]
    fn test_complete_rows() {
        let ds = Dataset::new(vec![
            film(Some(1.0), Weekday::Fri, "Drama"),
            film(None, Weekday::Fri, "Drama"),
        ]);
        assert_eq!(complete_rows(&ds, Field::NetProfit, &[Predictor::Budget]), vec![0]);
        assert_eq!(complete_rows(&ds, Field::NetProfit, &[Predictor::DayOfWeek]), vec![0, 1]);
        assert!(complete_rows(&ds, Field::NetProfit, &[Predictor::ReleaseMonth]).is_empty());
    }

    #[test]
    fn test_treatment_coding_uses_first_observed_level() {
        let ds = Dataset::new(vec![
            film(Some(1.0), Weekday::Fri, "Drama"),
            film(Some(2.0), Weekday::Wed, "Drama"),
            film(Some(3.0), Weekday::Fri, "Western/Drama"),
            film(Some(4.0), Weekday::Sun, "Polka"),
        ]);
        let rows: Vec<usize> = (0..4).collect();
        let design = Design::build(
            &ds,
            &rows,
            Field::NetProfit,
            &[Predictor::Budget, Predictor::DayOfWeek, Predictor::PrimaryGenre],
            &Leveling::default(),
        );

        assert_eq!(
            design.columns,
            vec![
                INTERCEPT,
                "budget",
                "day_of_week[Friday]",
                "day_of_week[Sunday]",
                "primary_genre[Western]",
                "primary_genre[Other]",
            ]
        );
        assert_eq!(design.x.nrows(), 4);
        assert_eq!(design.x[(0, 2)], 1.0);
        assert_eq!(design.x[(1, 2)], 0.0);
        assert_eq!(design.x[(3, 3)], 1.0);
        assert_eq!(design.x[(3, 5)], 1.0);
        assert!(design.absent_levels.contains(&"day_of_week[Monday]".to_string()));

        let wed = design
            .level_counts
            .iter()
            .find(|c| c.level == "Wednesday")
            .unwrap();
        assert_eq!(wed.count, 1);
    }
}
