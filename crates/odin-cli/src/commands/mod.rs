pub mod architectures;
pub mod evaluate;
pub mod sweep;
pub mod tpr95;

use std::fmt::Display;
use std::str::FromStr;

/// Print the error and exit with status 1.
pub fn fail(err: impl Display) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}

/// Parse a comma-separated list, ignoring blanks around entries.
pub fn parse_list<T>(flag: &str, value: &str) -> Result<Vec<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| format!("--{flag}: '{s}': {e}")))
        .collect()
}

/// Format an optional rate, or "undefined" when no threshold qualified.
pub fn fmt_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{r:.4}"))
        .unwrap_or_else(|| "undefined".to_string())
}
