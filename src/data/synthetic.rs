//! Deterministic synthetic film tables for demos and statistical tests.

use std::io::Write;

use chrono::{Datelike, NaiveDate};

use super::loader::COLUMN_MAP;
use super::model::{Field, RawFilm};
use crate::error::Result;

/// Minimal deterministic PRNG (xoshiro256**)
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    /// Uniform on [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next_f64() * n as f64) as usize % n.max(1)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

const ADJECTIVES: &[&str] = &[
    "Dark", "Happy", "Last", "Lost", "Good", "Wicked", "Little", "Brave", "Silent", "Golden",
    "Broken", "Sweet", "Final", "Wild", "Dead",
];
const NOUNS: &[&str] = &[
    "Night", "Boys", "Women", "Kingdom", "River", "Hero", "Killer", "Summer", "Dream", "War",
    "Friend", "Storm", "House", "Road", "Game",
];
const GENRES: &[&str] = &[
    "Action", "Adventure", "Animation", "Comedy", "Crime", "Drama", "Horror", "Romance",
    "Sci-Fi", "Thriller", "War",
];
const COMPANIES: &[&str] = &[
    "Universal Pictures",
    "Warner Bros.",
    "Sony Pictures",
    "Paramount Pictures",
    "Lionsgate",
    "20th Century Fox",
    "A24",
    "Netflix",
];
const PEOPLE: &[&str] = &[
    "Avery Cole", "Jordan Reyes", "Sam Whitaker", "Riley Chen", "Morgan Ellis", "Casey Patel",
    "Jamie Novak", "Quinn Harper",
];

/// Knobs for [`generate_films`]. Money is in dollars.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub rows: usize,
    pub intercept: f64,
    /// Box office dollars per budget dollar.
    pub budget_effect: f64,
    /// Box office dollars per critic-score point.
    pub critic_effect: f64,
    /// Standard deviation of the per-month critic-score slope.
    pub month_slope_sd: f64,
    pub noise_sd: f64,
    /// Probability that any optional cell is written as `N/A`.
    pub missing_rate: f64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        SyntheticSpec {
            rows: 120,
            intercept: -2.0e7,
            budget_effect: 2.5,
            critic_effect: 1.5e6,
            month_slope_sd: 4.0e5,
            noise_sd: 3.0e7,
            missing_rate: 0.05,
        }
    }
}

/// Generate films whose box office follows
/// `intercept + budget_effect·budget + (critic_effect + slope[month])·critic + noise`.
pub fn generate_films(spec: &SyntheticSpec, rng: &mut SimpleRng) -> Vec<RawFilm> {
    let month_slopes: Vec<f64> = (0..12).map(|_| rng.gauss(0.0, spec.month_slope_sd)).collect();
    let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default();

    (0..spec.rows)
        .map(|i| {
            let date = start + chrono::Days::new(rng.below(365) as u64);
            let budget = rng.uniform(5.0e6, 2.0e8).round();
            let critic = rng.uniform(10.0, 98.0).round();
            let slope = spec.critic_effect + month_slopes[date.month0() as usize];
            let box_office = (spec.intercept
                + spec.budget_effect * budget
                + slope * critic
                + rng.gauss(0.0, spec.noise_sd))
            .max(0.0)
            .round();

            let genre = if rng.next_f64() < 0.5 {
                rng.pick(GENRES).to_string()
            } else {
                format!("{}/{}", rng.pick(GENRES), rng.pick(GENRES))
            };

            let mut keep = || rng.next_f64() >= spec.missing_rate;
            let title = format!("{} {} {}", word(ADJECTIVES, i), word(NOUNS, i / 15), i);
            RawFilm {
                title: Some(title),
                release_date: Some(date),
                production_company: Some(COMPANIES[i % COMPANIES.len()].to_string()),
                actors: [
                    Some(PEOPLE[i % PEOPLE.len()].to_string()),
                    Some(PEOPLE[(i + 3) % PEOPLE.len()].to_string()),
                    None,
                ],
                director: Some(PEOPLE[(i + 5) % PEOPLE.len()].to_string()),
                box_office: keep().then_some(box_office),
                budget: keep().then_some(budget),
                run_time: Some((85 + i % 70) as f64),
                critic_score: keep().then_some(critic),
                genre: Some(genre),
            }
        })
        .collect()
}

fn word(words: &[&str], i: usize) -> String {
    words[i % words.len()].to_string()
}

/// Write films in the loader's input format: currency with `$` and thousands
/// separators, `mm/dd/yyyy` dates, `N/A` for missing cells.
pub fn write_csv<W: Write>(films: &[RawFilm], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(COLUMN_MAP.iter().map(|(name, _)| *name))?;
    for film in films {
        let row: Vec<String> = COLUMN_MAP.iter().map(|&(_, field)| cell(film, field)).collect();
        writer.write_record(&row)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn cell(film: &RawFilm, field: Field) -> String {
    let text = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
    let num = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_else(|| "N/A".to_string());
    match field {
        Field::Title => text(&film.title),
        Field::ReleaseDate => film
            .release_date
            .map(|d| d.format("%m/%d/%Y").to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        Field::ProductionCompany => text(&film.production_company),
        Field::Actor1 => text(&film.actors[0]),
        Field::Actor2 => text(&film.actors[1]),
        Field::Actor3 => text(&film.actors[2]),
        Field::Director => text(&film.director),
        Field::BoxOffice => currency(film.box_office),
        Field::Budget => currency(film.budget),
        Field::RunTime => num(film.run_time),
        Field::CriticScore => num(film.critic_score),
        Field::Genre => text(&film.genre),
        _ => String::new(),
    }
}

/// `1234567.0` → `"$1,234,567"`.
pub fn currency(value: Option<f64>) -> String {
    let Some(value) = value else {
        return "N/A".to_string();
    };
    let digits = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}")
}
