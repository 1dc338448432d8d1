/// Data layer: typed rows, loading, feature derivation and filtering.
///
/// Architecture:
/// ```text
///  films.csv / films.tsv
///        │
///        ▼
///   ┌──────────┐
///   │  loader  │  parse cells → RawDataset (+ per-cell warnings)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ augment  │  genre split, net profit, sentiment, weekday/month → Dataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter  │  exclusion policy + complete cases → Dataset, FilterReport
///   └──────────┘
/// ```
///
/// Every stage takes its input by reference and returns a new snapshot.

pub mod augment;
pub mod filter;
pub mod loader;
pub mod model;
pub mod sentiment;
pub mod synthetic;
