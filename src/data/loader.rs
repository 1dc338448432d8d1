use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use log::{info, warn};

use super::model::{Field, RawDataset, RawFilm};
use crate::error::{FieldParseWarning, PipelineError, Result};

/// Input header → canonical field. Headers are compared after trimming.
pub const COLUMN_MAP: [(&str, Field); 12] = [
    ("Title", Field::Title),
    ("Release Date", Field::ReleaseDate),
    ("Production Company", Field::ProductionCompany),
    ("Actor 1", Field::Actor1),
    ("Actor 2", Field::Actor2),
    ("Actor 3", Field::Actor3),
    ("Director", Field::Director),
    ("Box Office", Field::BoxOffice),
    ("Budget", Field::Budget),
    ("Run Time", Field::RunTime),
    ("Critic Score", Field::CriticScore),
    ("Genre", Field::Genre),
];

const DATE_FORMAT: &str = "%m/%d/%Y";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load the raw film table.  Dispatch on extension for the delimiter.
///
/// * `.tsv` / `.tab` – tab separated
/// * anything else   – comma separated
pub fn load_file(path: &Path) -> Result<RawDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let delimiter = match ext.as_str() {
        "tsv" | "tab" => b'\t',
        _ => b',',
    };

    let file = std::fs::File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = load_reader(file, delimiter)?;
    if dataset.is_empty() {
        return Err(PipelineError::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    info!(
        "loaded {} rows from {} ({} cell warnings)",
        dataset.len(),
        path.display(),
        dataset.warnings.len()
    );
    Ok(dataset)
}

/// Parse delimited text from any reader. An empty table is returned as-is;
/// [`load_file`] turns it into a fatal error.
pub fn load_reader<R: Read>(reader: R, delimiter: u8) -> Result<RawDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();
    let columns = resolve_columns(&headers);

    let mut films = Vec::new();
    let mut warnings = Vec::new();

    // Cells are decoded one by one so a stray non-UTF-8 byte only costs
    // that field.
    for (row_no, result) in reader.byte_records().enumerate() {
        let record = result?;
        let mut film = RawFilm::default();
        for &(field, idx) in &columns {
            let bytes = record.get(idx).unwrap_or(&[]);
            let decoded = std::str::from_utf8(bytes)
                .map_err(|_| String::from_utf8_lossy(bytes).into_owned());
            if let Err(raw) = decoded.and_then(|cell| assign(&mut film, field, cell)) {
                warn!("row {row_no}: cannot parse {field} from {raw:?}; treating as missing");
                warnings.push(FieldParseWarning { row: row_no, field, raw });
            }
        }
        films.push(film);
    }

    Ok(RawDataset { films, warnings })
}

/// Map each canonical field to its column index. Unmatched fields are
/// logged and left missing on every row.
fn resolve_columns(headers: &[String]) -> Vec<(Field, usize)> {
    COLUMN_MAP
        .iter()
        .filter_map(|&(name, field)| match headers.iter().position(|h| h == name) {
            Some(idx) => Some((field, idx)),
            None => {
                warn!("input has no {name:?} column; every {field} will be missing");
                None
            }
        })
        .collect()
}

/// Store one cell on the film. `Err` carries the raw text on parse failure;
/// the field is then left missing.
fn assign(film: &mut RawFilm, field: Field, cell: &str) -> std::result::Result<(), String> {
    let Some(cell) = present(cell) else {
        return Ok(());
    };
    match field {
        Field::Title => film.title = Some(cell.to_string()),
        Field::ProductionCompany => film.production_company = Some(cell.to_string()),
        Field::Actor1 => film.actors[0] = Some(cell.to_string()),
        Field::Actor2 => film.actors[1] = Some(cell.to_string()),
        Field::Actor3 => film.actors[2] = Some(cell.to_string()),
        Field::Director => film.director = Some(cell.to_string()),
        Field::Genre => film.genre = Some(cell.to_string()),
        Field::ReleaseDate => film.release_date = Some(parse_date(cell).ok_or(cell)?),
        Field::BoxOffice => film.box_office = Some(parse_currency(cell).ok_or(cell)?),
        Field::Budget => film.budget = Some(parse_currency(cell).ok_or(cell)?),
        Field::RunTime => film.run_time = Some(parse_number(cell).ok_or(cell)?),
        Field::CriticScore => film.critic_score = Some(parse_number(cell).ok_or(cell)?),
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cell parsers
// ---------------------------------------------------------------------------

/// Trimmed cell text, or `None` for an empty or `N/A` cell.
pub fn present(cell: &str) -> Option<&str> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("N/A") {
        None
    } else {
        Some(cell)
    }
}

/// `"$1,234,567"` → `1234567.0`. A leading minus sign may sit on either side
/// of the currency symbol.
pub fn parse_currency(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    let (negative, rest) = match cell.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cell),
    };
    let rest = rest.trim_start_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '.');
    let cleaned: String = rest.chars().filter(|&c| c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Plain number, tolerating a trailing `%` (critic scores) or ` min`
/// (run times).
pub fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    let cell = cell
        .strip_suffix('%')
        .or_else(|| cell.strip_suffix("min"))
        .unwrap_or(cell)
        .trim();
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `mm/dd/yyyy`.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(cell.trim(), DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Title,Release Date,Production Company,Actor 1,Actor 2,Actor 3,Director,Box Office,Budget,Run Time,Critic Score,Genre\n";

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("$1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_currency("$250"), Some(250.0));
        assert_eq!(parse_currency("-$1,000"), Some(-1000.0));
        assert_eq!(parse_currency("1,000.50"), Some(1000.5));
        assert_eq!(parse_currency("$"), None);
        assert_eq!(parse_currency("unknown"), None);
        assert_eq!(parse_currency("abc123"), None);
    }

    #[test]
    fn test_parse_number_suffixes() {
        assert_eq!(parse_number("87%"), Some(87.0));
        assert_eq!(parse_number("112 min"), Some(112.0));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("long"), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("04/26/2019"), NaiveDate::from_ymd_opt(2019, 4, 26));
        assert_eq!(parse_date("2019-04-26"), None);
        assert_eq!(parse_date("13/01/2019"), None);
    }

    #[test]
    fn test_missing_markers() {
        assert_eq!(present("  "), None);
        assert_eq!(present("N/A"), None);
        assert_eq!(present("n/a"), None);
        assert_eq!(present(" x "), Some("x"));
    }

    #[test]
    fn test_load_reader_records_warnings_without_failing() {
        let csv = format!(
            "{HEADER}\
             Alpha,01/04/2019,Studio A,A1,A2,A3,Dir,\"$10,000\",\"$4,000\",100,80%,Action/War\n\
             Beta,not a date,Studio B,,,,Dir,N/A,$bad,95,,Drama\n"
        );
        let ds = load_reader(csv.as_bytes(), b',').unwrap();
        assert_eq!(ds.len(), 2);

        let alpha = &ds.films[0];
        assert_eq!(alpha.title(), "Alpha");
        assert_eq!(alpha.box_office, Some(10_000.0));
        assert_eq!(alpha.budget, Some(4_000.0));
        assert_eq!(alpha.critic_score, Some(80.0));
        assert_eq!(alpha.actors[2].as_deref(), Some("A3"));
        assert_eq!(alpha.genre.as_deref(), Some("Action/War"));

        let beta = &ds.films[1];
        assert_eq!(beta.release_date, None);
        assert_eq!(beta.box_office, None);
        assert_eq!(beta.budget, None);
        assert_eq!(beta.critic_score, None);
        assert_eq!(beta.actors[0], None);

        let fields: Vec<Field> = ds.warnings.iter().map(|w| w.field).collect();
        assert_eq!(fields, vec![Field::ReleaseDate, Field::Budget]);
        assert_eq!(ds.warnings[1].row, 1);
        assert_eq!(ds.warnings[1].raw, "$bad");
    }

    #[test]
    fn test_non_utf8_cell_becomes_missing_with_warning() {
        let mut csv = format!("{HEADER}Alpha,01/04/2019,Studio A,A1,A2,A3,Dir,$100,$40,100,80,Drama\n").into_bytes();
        csv.extend_from_slice(b"Am\xe9lie,04/25/2001,UGC,A1,A2,A3,Dir,$174,$10,122,89,Comedy\n");

        let ds = load_reader(csv.as_slice(), b',').unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.films[0].title(), "Alpha");
        assert_eq!(ds.films[0].budget, Some(40.0));

        let amelie = &ds.films[1];
        assert_eq!(amelie.title, None);
        assert_eq!(amelie.box_office, Some(174.0));
        assert_eq!(amelie.critic_score, Some(89.0));
        assert_eq!(amelie.production_company.as_deref(), Some("UGC"));

        assert_eq!(ds.warnings.len(), 1);
        assert_eq!(ds.warnings[0].field, Field::Title);
        assert_eq!(ds.warnings[0].row, 1);
        assert!(ds.warnings[0].raw.starts_with("Am"));
    }

    #[test]
    fn test_missing_column_is_all_missing() {
        let csv = "Title,Budget\nAlpha,$5\n";
        let ds = load_reader(csv.as_bytes(), b',').unwrap();
        assert_eq!(ds.films[0].budget, Some(5.0));
        assert_eq!(ds.films[0].critic_score, None);
        assert!(ds.warnings.is_empty());
    }

    #[test]
    fn test_load_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(matches!(load_file(&missing), Err(PipelineError::Io { .. })));

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, HEADER).unwrap();
        assert!(matches!(load_file(&empty), Err(PipelineError::EmptyInput { .. })));
    }

    #[test]
    fn test_tab_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("films.tsv");
        std::fs::write(&path, "Title\tBudget\nAlpha\t$1,000\n").unwrap();
        let ds = load_file(&path).unwrap();
        assert_eq!(ds.films[0].budget, Some(1000.0));
    }
}
