// src/gps/fixed.rs
//! Fixed-point field conversions
//!
//! NMEA numbers are kept as scaled integers: the number of implied decimal
//! places is chosen per field and the text is never round-tripped through
//! floating point.

/// Parse `text` as a decimal with exactly `places` implied decimal digits.
///
/// Leading blanks are skipped and a leading `-` is honoured. Digits after the
/// point beyond `places` are ignored; missing ones count as zero, as does a
/// missing point.
pub fn parse_and_scale(text: &str, places: u8) -> i32 {
    let bytes = text.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }

    let negative = bytes.get(pos) == Some(&b'-');
    if negative {
        pos += 1;
    }

    let mut result: u32 = 0;
    while let Some(digit) = bytes.get(pos).filter(|b| b.is_ascii_digit()) {
        result = result.wrapping_mul(10).wrapping_add(u32::from(digit - b'0'));
        pos += 1;
    }

    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
    }

    for _ in 0..places {
        result = result.wrapping_mul(10);
        if let Some(digit) = bytes.get(pos).filter(|b| b.is_ascii_digit()) {
            result = result.wrapping_add(u32::from(digit - b'0'));
            pos += 1;
        }
    }

    let result = result as i32;
    if negative {
        result.wrapping_neg()
    } else {
        result
    }
}

/// Convert `ddmm.mmmmm` into millionths of a degree.
///
/// Minutes are converted with `(hundred_thousandths + 3) / 6`, which rounds
/// minutes/60 at 10^-6 degree precision.
pub fn parse_position(text: &str) -> i32 {
    let scaled = parse_and_scale(text, 5) as u32;

    let hundred_thousandths_of_minutes = scaled % 10_000_000;
    let degrees = (scaled / 10_000_000) * 1_000_000;

    (degrees + (hundred_thousandths_of_minutes + 3) / 6) as i32
}

/// Leading unsigned decimal integer, 0 when there is none
pub fn parse_integer(text: &str) -> u32 {
    parse_radix(text, 10)
}

/// Leading hexadecimal integer, 0 when there is none
pub fn parse_hex(text: &str) -> u32 {
    parse_radix(text, 16)
}

fn parse_radix(text: &str, radix: u32) -> u32 {
    text.trim_start()
        .chars()
        .map_while(|c| c.to_digit(radix))
        .fold(0u32, |acc, d| acc.wrapping_mul(radix).wrapping_add(d))
}

/// Render a scaled integer back to text with `places` decimals
pub fn format_scaled(value: i64, places: u8) -> String {
    if places == 0 {
        return value.to_string();
    }
    let divisor = 10i64.pow(u32::from(places));
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    format!(
        "{}{}.{:0width$}",
        sign,
        magnitude / divisor as u64,
        magnitude % divisor as u64,
        width = places as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_scale_basic() {
        assert_eq!(parse_and_scale("022.4", 2), 2240);
        assert_eq!(parse_and_scale("084.4", 2), 8440);
        assert_eq!(parse_and_scale("545.4", 2), 54540);
        assert_eq!(parse_and_scale("0.9", 2), 90);
    }

    #[test]
    fn test_parse_and_scale_zero_fills() {
        assert_eq!(parse_and_scale("123519", 3), 123_519_000);
        assert_eq!(parse_and_scale("092750.5", 3), 92_750_500);
        assert_eq!(parse_and_scale("7.", 2), 700);
        assert_eq!(parse_and_scale("", 2), 0);
    }

    #[test]
    fn test_parse_and_scale_truncates_extra_digits() {
        assert_eq!(parse_and_scale("1.2399", 2), 123);
    }

    #[test]
    fn test_parse_and_scale_sign_and_whitespace() {
        assert_eq!(parse_and_scale("  -12.5", 2), -1250);
        assert_eq!(parse_and_scale("\t3", 1), 30);
        assert_eq!(parse_and_scale("-0.01", 2), -1);
    }

    #[test]
    fn test_parse_and_scale_round_trips() {
        for places in 0..=5u8 {
            for value in [0i64, 1, -1, 7, 99, 1234, -56789, 1_000_000, 21_474_836] {
                let text = format_scaled(value, places);
                assert_eq!(
                    i64::from(parse_and_scale(&text, places)),
                    value,
                    "{} with {} places",
                    text,
                    places
                );
            }
        }
    }

    #[test]
    fn test_position_rounding() {
        // 48 degrees 07.038 minutes
        assert_eq!(parse_position("4807.038"), 48_000_000 + (703_800 + 3) / 6);
        assert_eq!(parse_position("4807.038"), 48_117_300);
        assert_eq!(parse_position("01131.000"), 11_516_667);
        assert_eq!(parse_position("5321.6802"), 53_361_337);
        assert_eq!(parse_position("00630.3372"), 6_505_620);
    }

    #[test]
    fn test_position_matches_float_conversion() {
        let fixed = parse_position("4807.038");
        let expected = 48.0 + 7.038 / 60.0;
        assert!((f64::from(fixed) / 1_000_000.0 - expected).abs() < 1e-6);
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("08"), 8);
        assert_eq!(parse_integer("230394"), 230_394);
        assert_eq!(parse_integer(""), 0);
        assert_eq!(parse_integer("12abc"), 12);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("6A"), 0x6a);
        assert_eq!(parse_hex("6a"), 0x6a);
        assert_eq!(parse_hex("0"), 0);
        assert_eq!(parse_hex("zz"), 0);
    }

    #[test]
    fn test_format_scaled() {
        assert_eq!(format_scaled(2240, 2), "22.40");
        assert_eq!(format_scaled(-5, 3), "-0.005");
        assert_eq!(format_scaled(42, 0), "42");
    }
}
