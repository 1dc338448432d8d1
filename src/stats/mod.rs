/// Statistics layer: design matrices, correlation, OLS with nested F-tests,
/// covariate selection and mixed-effects fits grouped by release month.
pub mod correlation;
pub mod design;
pub mod ftest;
pub mod mixed;
pub mod ols;
pub mod selection;
