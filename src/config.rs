use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::filter::{ExclusionPolicy, DEFAULT_REQUIRED_FIELDS};
use crate::data::model::Field;
use crate::error::{PipelineError, Result};
use crate::stats::design::{default_genres, Leveling, Predictor};
use crate::stats::mixed::MixedConfig;

/// Every constant the pipeline depends on. Each field falls back to its
/// default when absent from a TOML override file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// F-test p-value below which a candidate is significant.
    pub significance_level: f64,
    /// Coverage of every reported interval.
    pub confidence_level: f64,
    /// A significant categorical candidate is still rejected when any of its
    /// observed levels has fewer rows than this.
    pub min_level_observations: usize,
    pub baseline: Vec<Predictor>,
    /// Tried one at a time against the baseline, in this order.
    pub candidates: Vec<Predictor>,
    /// Fields that must be present after exclusion.
    pub required_fields: Vec<Field>,
    pub genre_levels: Vec<String>,
    pub exclusion: ExclusionPolicy,
    pub mixed: MixedConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            significance_level: 0.05,
            confidence_level: 0.95,
            min_level_observations: 3,
            baseline: vec![Predictor::Budget, Predictor::CriticScore],
            candidates: vec![
                Predictor::TitleSentiment,
                Predictor::DayOfWeek,
                Predictor::RunTime,
                Predictor::PrimaryGenre,
            ],
            required_fields: DEFAULT_REQUIRED_FIELDS.to_vec(),
            genre_levels: default_genres(),
            exclusion: ExclusionPolicy::default(),
            mixed: MixedConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn leveling(&self) -> Leveling {
        Leveling::new(&self.genre_levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::mixed::MixedVariant;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.significance_level, 0.05);
        assert_eq!(config.min_level_observations, 3);
        assert_eq!(config.candidates.len(), 4);
        assert_eq!(config.mixed.adopted_variant, MixedVariant::RandomSlope);
        assert_eq!(config.mixed.slope_predictor, Predictor::CriticScore);
        assert!(config.required_fields.contains(&Field::ReleaseMonth));
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_toml_str(
            r#"
            significance_level = 0.01
            candidates = ["run_time", "day_of_week"]

            [exclusion]
            outlier_titles = ["Joker"]

            [mixed]
            adopted_variant = "random_intercept"
            "#,
        )
        .unwrap();
        assert_eq!(config.significance_level, 0.01);
        assert_eq!(config.candidates, vec![Predictor::RunTime, Predictor::DayOfWeek]);
        assert_eq!(config.exclusion.outlier_titles, vec!["Joker".to_string()]);
        assert_eq!(
            config.exclusion.streaming_patterns,
            ExclusionPolicy::default().streaming_patterns
        );
        assert_eq!(config.mixed.adopted_variant, MixedVariant::RandomIntercept);
        assert_eq!(config.mixed.max_evaluations, MixedConfig::default().max_evaluations);
        assert_eq!(config.baseline, PipelineConfig::default().baseline);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "min_level_observations = 5").unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.min_level_observations, 5);

        assert!(matches!(
            PipelineConfig::from_file(Path::new("/nonexistent/film-profit.toml")),
            Err(PipelineError::Io { .. })
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("candidates = [\"box_office\"]"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = PipelineConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), config);
    }
}
