use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::config::parse_date;

fn args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Value of `--name=value` or `--name value`, first match wins.
pub fn find_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn parse_path_arg(name: &str) -> Option<PathBuf> {
    find_value(&args(), name).map(PathBuf::from)
}

pub fn parse_db_path_arg() -> Option<PathBuf> {
    parse_path_arg("--db")
}

pub fn parse_arg<T: FromStr>(name: &str) -> Option<T> {
    find_value(&args(), name).and_then(|v| v.parse::<T>().ok())
}

pub fn parse_f64_arg(name: &str) -> Option<f64> {
    parse_arg::<f64>(name).filter(|v| v.is_finite())
}

pub fn parse_date_arg(name: &str) -> Option<NaiveDate> {
    find_value(&args(), name).and_then(|v| parse_date(&v))
}

pub fn has_flag(name: &str) -> bool {
    args().iter().any(|arg| arg == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_flag_styles_are_read() {
        let a = argv(&["--db=/tmp/x.sqlite", "--ev", "0.05"]);
        assert_eq!(find_value(&a, "--db").as_deref(), Some("/tmp/x.sqlite"));
        assert_eq!(find_value(&a, "--ev").as_deref(), Some("0.05"));
        assert_eq!(find_value(&a, "--commission"), None);
    }

    #[test]
    fn a_following_flag_is_not_a_value() {
        let a = argv(&["--quotes", "--xlsx", "out.xlsx"]);
        assert_eq!(find_value(&a, "--quotes"), None);
        assert_eq!(find_value(&a, "--xlsx").as_deref(), Some("out.xlsx"));
    }
}
