//! Style value parsing and normalisation.
//!
//! Colours are accepted as `#RRGGBB` or `RRGGBB`, case-insensitively, and
//! normalised to upper-case with a leading `#`. A malformed colour (wrong
//! length or non-hex digit) is a validation error, never a silent null.
//! Numeric ranges: opacity 0..=255, line width 1..=4, text position 0..=2.

/// Normalise a colour string, or explain why it is malformed.
pub fn parse_color(s: &str) -> Result<String, String> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(format!("colour '{s}' must be 6 hex digits, optionally prefixed with '#'"));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("colour '{s}' contains non-hex characters"));
    }
    Ok(format!("#{}", hex.to_uppercase()))
}

/// Validate an opacity value (0..=255).
pub fn parse_opacity(v: f64) -> Result<u8, String> {
    if !v.is_finite() || v.fract() != 0.0 || !(0.0..=255.0).contains(&v) {
        return Err(format!("opacity {v} must be an integer in 0..=255"));
    }
    Ok(v as u8)
}

/// Validate a connection line width (1..=4).
pub fn parse_line_width(v: f64) -> Result<u8, String> {
    if !v.is_finite() || v.fract() != 0.0 || !(1.0..=4.0).contains(&v) {
        return Err(format!("line width {v} must be an integer in 1..=4"));
    }
    Ok(v as u8)
}

/// Validate a connection text position (0 source, 1 middle, 2 target).
pub fn parse_text_position(v: f64) -> Result<u8, String> {
    if !v.is_finite() || v.fract() != 0.0 || !(0.0..=2.0).contains(&v) {
        return Err(format!("text position {v} must be 0, 1 or 2"));
    }
    Ok(v as u8)
}
