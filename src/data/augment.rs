use chrono::Datelike;
use log::info;

use super::model::{Dataset, Film, GenreSplit, RawDataset, RawFilm, MONTHS, NOT_APPLICABLE};
use super::sentiment::SentimentScorer;

/// Derive genre split, net profit, title sentiment, weekday and month for
/// every row. Never drops a row.
pub fn augment<S>(raw: &RawDataset, scorer: &S) -> Dataset
where
    S: SentimentScorer + ?Sized,
{
    let films: Vec<Film> = raw.films.iter().map(|f| augment_film(f, scorer)).collect();
    info!("augmented {} rows", films.len());
    Dataset::new(films)
}

pub fn augment_film<S>(raw: &RawFilm, scorer: &S) -> Film
where
    S: SentimentScorer + ?Sized,
{
    Film {
        genre: raw.genre.as_deref().and_then(split_genre),
        net_profit: net_profit(raw.box_office, raw.budget),
        title_sentiment: raw.title.as_deref().map(|t| scorer.score(t)),
        day_of_week: raw.release_date.map(|d| d.weekday()),
        release_month: raw.release_date.map(|d| MONTHS[d.month0() as usize]),
        raw: raw.clone(),
    }
}

/// Box office minus budget; missing if either side is.
pub fn net_profit(box_office: Option<f64>, budget: Option<f64>) -> Option<f64> {
    Some(box_office? - budget?)
}

/// Split a `/`-delimited genre string. Whitespace is removed first; empty
/// segments are ignored. `None` when nothing remains.
pub fn split_genre(raw: &str) -> Option<GenreSplit> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let segments: Vec<&str> = compact.split('/').filter(|s| !s.is_empty()).collect();
    let primary = segments.first()?;
    Some(GenreSplit {
        primary: (*primary).to_string(),
        secondary: segments
            .get(1)
            .map(|s| (*s).to_string())
            .unwrap_or_else(|| NOT_APPLICABLE.to_string()),
        count: segments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Month, NaiveDate, Weekday};
    use proptest::prelude::*;

    fn split(raw: &str) -> (String, String, usize) {
        let g = split_genre(raw).unwrap();
        (g.primary, g.secondary, g.count)
    }

    #[test]
    fn test_split_genre_cases() {
        assert_eq!(split("Action/War"), ("Action".into(), "War".into(), 2));
        assert_eq!(split("Drama"), ("Drama".into(), NOT_APPLICABLE.into(), 1));
        assert_eq!(split("A/B/C"), ("A".into(), "B".into(), 3));
        assert_eq!(split(" Sci Fi / Horror "), ("SciFi".into(), "Horror".into(), 2));
        assert_eq!(split_genre("  "), None);
        assert_eq!(split_genre("/"), None);
    }

    #[test]
    fn test_net_profit() {
        assert_eq!(net_profit(Some(10.0), Some(4.0)), Some(6.0));
        assert_eq!(net_profit(Some(1.0), Some(4.0)), Some(-3.0));
        assert_eq!(net_profit(None, Some(4.0)), None);
        assert_eq!(net_profit(Some(10.0), None), None);
    }

    #[test]
    fn test_augment_keeps_rows_and_derives_dates() {
        let raw = RawDataset {
            films: vec![
                RawFilm {
                    title: Some("Good Boys".into()),
                    release_date: NaiveDate::from_ymd_opt(2019, 8, 16),
                    box_office: Some(100.0),
                    budget: Some(20.0),
                    genre: Some("Comedy".into()),
                    ..RawFilm::default()
                },
                RawFilm::default(),
            ],
            warnings: Vec::new(),
        };
        let ds = augment(&raw, &|t: &str| t.len() as f64);
        assert_eq!(ds.len(), 2);

        let first = &ds.films[0];
        assert_eq!(first.net_profit, Some(80.0));
        assert_eq!(first.title_sentiment, Some(9.0));
        assert_eq!(first.day_of_week, Some(Weekday::Fri));
        assert_eq!(first.release_month, Some(Month::August));
        assert_eq!(first.raw, raw.films[0]);

        let second = &ds.films[1];
        assert_eq!(second.net_profit, None);
        assert_eq!(second.title_sentiment, None);
        assert_eq!(second.day_of_week, None);
        assert_eq!(second.genre, None);
    }

    proptest! {
        #[test]
        fn prop_net_profit_is_difference(box_office in -1e9f64..1e9, budget in 0f64..1e9) {
            prop_assert_eq!(net_profit(Some(box_office), Some(budget)), Some(box_office - budget));
        }

        #[test]
        fn prop_split_genre_counts_segments(parts in prop::collection::vec("[A-Za-z]{1,8}", 1..5)) {
            let g = split_genre(&parts.join("/")).unwrap();
            prop_assert_eq!(g.count, parts.len());
            prop_assert_eq!(&g.primary, &parts[0]);
            let expected = parts.get(1).cloned().unwrap_or_else(|| NOT_APPLICABLE.to_string());
            prop_assert_eq!(g.secondary, expected);
        }
    }
}
