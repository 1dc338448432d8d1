use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::model::{Dataset, Field};

/// Pairwise-complete Pearson correlations. `None` where a pair has fewer
/// than two shared rows or either side has zero variance on them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub fields: Vec<Field>,
    pub values: Vec<Vec<Option<f64>>>,
    /// Rows used for each pair.
    pub pair_counts: Vec<Vec<usize>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Field, b: Field) -> Option<f64> {
        let i = self.fields.iter().position(|&f| f == a)?;
        let j = self.fields.iter().position(|&f| f == b)?;
        self.values[i][j]
    }

    /// `(field, field) → r` for every defined entry.
    pub fn to_map(&self) -> BTreeMap<(Field, Field), f64> {
        let mut map = BTreeMap::new();
        for (i, &a) in self.fields.iter().enumerate() {
            for (j, &b) in self.fields.iter().enumerate() {
                if let Some(r) = self.values[i][j] {
                    map.insert((a, b), r);
                }
            }
        }
        map
    }
}

/// Correlate every pair of `fields` over `dataset`.
pub fn correlation_matrix(dataset: &Dataset, fields: &[Field]) -> CorrelationMatrix {
    let columns: Vec<Vec<Option<f64>>> = fields.iter().map(|&f| dataset.column(f)).collect();
    let k = fields.len();
    let mut values = vec![vec![None; k]; k];
    let mut pair_counts = vec![vec![0; k]; k];

    for i in 0..k {
        for j in i..k {
            let pairs: Vec<(f64, f64)> = columns[i]
                .iter()
                .zip(&columns[j])
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .collect();
            let r = pearson(&pairs).map(|r| if i == j { 1.0 } else { r });
            values[i][j] = r;
            values[j][i] = r;
            pair_counts[i][j] = pairs.len();
            pair_counts[j][i] = pairs.len();
        }
    }

    CorrelationMatrix {
        fields: fields.to_vec(),
        values,
        pair_counts,
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for &(a, b) in pairs {
        let (da, db) = (a - mean_a, b - mean_b);
        sab += da * db;
        saa += da * da;
        sbb += db * db;
    }
    if saa <= 0.0 || sbb <= 0.0 {
        return None;
    }
    Some((sab / (saa * sbb).sqrt()).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Film, RawFilm};

    fn film(budget: Option<f64>, critic: Option<f64>, run_time: f64) -> Film {
        Film {
            raw: RawFilm {
                budget,
                critic_score: critic,
                run_time: Some(run_time),
                ..RawFilm::default()
            },
            genre: None,
            net_profit: None,
            title_sentiment: None,
            day_of_week: None,
            release_month: None,
        }
    }

    fn sample() -> Dataset {
        Dataset::new(vec![
            film(Some(1.0), Some(2.0), 100.0),
            film(Some(2.0), Some(4.1), 100.0),
            film(Some(3.0), None, 100.0),
            film(Some(4.0), Some(7.9), 100.0),
            film(None, Some(3.0), 100.0),
            film(Some(6.0), Some(1.0), 100.0),
        ])
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        let fields = [Field::Budget, Field::CriticScore, Field::RunTime];
        let m = correlation_matrix(&sample(), &fields);
        for &a in &fields {
            for &b in &fields {
                assert_eq!(m.get(a, b), m.get(b, a));
            }
        }
        assert_eq!(m.get(Field::Budget, Field::Budget), Some(1.0));
        assert_eq!(m.get(Field::CriticScore, Field::CriticScore), Some(1.0));
        // Constant run time has no defined correlation.
        assert_eq!(m.get(Field::RunTime, Field::RunTime), None);
        assert_eq!(m.get(Field::Budget, Field::RunTime), None);
    }

    #[test]
    fn test_pairwise_complete_rows() {
        let m = correlation_matrix(&sample(), &[Field::Budget, Field::CriticScore]);
        assert_eq!(m.pair_counts[0][1], 4);
        assert_eq!(m.pair_counts[0][0], 5);

        let expected = pearson(&[(1.0, 2.0), (2.0, 4.1), (4.0, 7.9), (6.0, 1.0)]).unwrap();
        let r = m.get(Field::Budget, Field::CriticScore).unwrap();
        assert!((r - expected).abs() < 1e-15);
        assert!((-1.0..=1.0).contains(&r));
        assert!(m.to_map().contains_key(&(Field::CriticScore, Field::Budget)));
    }

    #[test]
    fn test_perfect_correlation() {
        let ds = Dataset::new(vec![
            film(Some(1.0), Some(-2.0), 1.0),
            film(Some(2.0), Some(-4.0), 2.0),
            film(Some(3.0), Some(-6.0), 3.0),
        ]);
        let m = correlation_matrix(&ds, &[Field::Budget, Field::CriticScore, Field::RunTime]);
        assert!((m.get(Field::Budget, Field::CriticScore).unwrap() + 1.0).abs() < 1e-12);
        assert!((m.get(Field::Budget, Field::RunTime).unwrap() - 1.0).abs() < 1e-12);
    }
}
