//! Grader output to fractional score.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeError {
    #[error("empty grade")]
    Empty,
    #[error("unparsable grade: {0}")]
    Unparsable(String),
    #[error("grade denominator must be positive: {0}")]
    ZeroDenominator(String),
}

/// Parses `"n/d"` (e.g. `"9/10"`) or a bare number into a score in `[0, 1]`.
/// A bare number above 1 is read as a percentage.
pub fn parse_grade(grade: &str) -> Result<f64, GradeError> {
    let grade = grade.trim();
    if grade.is_empty() {
        return Err(GradeError::Empty);
    }

    let fraction = match grade.split_once('/') {
        Some((num, den)) => {
            let num = parse_number(num, grade)?;
            let den = parse_number(den, grade)?;
            if den <= 0.0 {
                return Err(GradeError::ZeroDenominator(grade.to_string()));
            }
            num / den
        }
        None => {
            let value = parse_number(grade.trim_end_matches('%'), grade)?;
            if value > 1.0 || grade.ends_with('%') {
                value / 100.0
            } else {
                value
            }
        }
    };

    Ok(fraction.clamp(0.0, 1.0))
}

fn parse_number(part: &str, whole: &str) -> Result<f64, GradeError> {
    part.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| GradeError::Unparsable(whole.to_string()))
}
