use anyhow::{Context, Result};
use std::path::Path;

/// Parse newline-delimited floating point series, ignoring blank/comment lines.
/// Input with no values yields an empty series.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let parsed = parse_f64_series("# ecg lead II\n0.1\n\n-0.25\n  3e-2 \n").unwrap();
        assert_eq!(parsed, vec![0.1, -0.25, 0.03]);
    }

    #[test]
    fn reports_offending_line() {
        let err = parse_f64_series("0.1\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn comment_only_input_is_empty() {
        assert!(parse_f64_series("# nothing\n").unwrap().is_empty());
        assert!(parse_f64_series("").unwrap().is_empty());
    }
}
