//! Domain scale conversions
//!
//! Pure functions layered on top of the integer codec. Each pair is
//! round-trip exact inside its clamped display range and monotone in the
//! raw input, so sliders and imports can move values without drift.

/// Lowest displayed rating.
pub const RATING_MIN: u32 = 25;
/// Highest displayed rating.
pub const RATING_MAX_DISPLAY: u32 = 99;
/// True ceiling of the proportional scale. Raw max maps here, not to 99;
/// display values are clamped after projection.
pub const RATING_MAX_TRUE: u32 = 110;

pub const POTENTIAL_MIN: u32 = 40;
pub const POTENTIAL_MAX: u32 = 99;

/// Height records store total inches scaled by this factor.
pub const HEIGHT_UNIT_SCALE: u32 = 254;
pub const HEIGHT_MIN_INCHES: u32 = 48;
pub const HEIGHT_MAX_INCHES: u32 = 120;

/// Years are stored as offsets from this base unless the raw value already
/// is an absolute calendar year.
pub const YEAR_BASE: u32 = 1900;

/// Badge tiers in storage order.
pub const BADGE_LEVELS: [&str; 5] = ["None", "Bronze", "Silver", "Gold", "Hall of Fame"];

fn max_raw(length_bits: u32) -> u64 {
    if length_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << length_bits) - 1
    }
}

/// Project a raw bitfield value onto the 25–99 display scale.
pub fn raw_to_rating(raw: u64, length_bits: u32) -> u32 {
    let max = max_raw(length_bits);
    if max == 0 {
        return RATING_MIN;
    }
    let span = (RATING_MAX_TRUE - RATING_MIN) as f64;
    let rating = RATING_MIN as f64 + (raw.min(max) as f64 / max as f64) * span;
    (rating.round() as u32).clamp(RATING_MIN, RATING_MAX_DISPLAY)
}

/// Invert [`raw_to_rating`]: clamp into 25–99 and project back onto the
/// raw bit range.
pub fn rating_to_raw(rating: u32, length_bits: u32) -> u64 {
    let max = max_raw(length_bits);
    if max == 0 {
        return 0;
    }
    let clamped = rating.clamp(RATING_MIN, RATING_MAX_DISPLAY);
    let fraction = (clamped - RATING_MIN) as f64 / (RATING_MAX_TRUE - RATING_MIN) as f64;
    ((fraction * max as f64).round() as u64).min(max)
}

/// Tendencies are stored on their display scale already; clamp to 0–100.
pub fn raw_to_tendency(raw: u64) -> u32 {
    raw.min(100) as u32
}

pub fn tendency_to_raw(tendency: u32) -> u64 {
    tendency.min(100) as u64
}

/// Potentials are stored as display values clamped to 40–99.
pub fn raw_to_potential(raw: u64) -> u32 {
    (raw as u32).clamp(POTENTIAL_MIN, POTENTIAL_MAX)
}

pub fn potential_to_raw(potential: u32, length_bits: u32) -> u64 {
    let clamped = potential.clamp(POTENTIAL_MIN, POTENTIAL_MAX) as u64;
    clamped.min(max_raw(length_bits))
}

/// Raw stored height (inches × 254) to whole inches, clamped into the
/// supported range.
pub fn raw_to_height_inches(raw: u64) -> u32 {
    let inches = ((raw as f64) / HEIGHT_UNIT_SCALE as f64).round() as u32;
    inches.clamp(HEIGHT_MIN_INCHES, HEIGHT_MAX_INCHES)
}

pub fn height_inches_to_raw(inches: u32) -> u64 {
    inches.clamp(HEIGHT_MIN_INCHES, HEIGHT_MAX_INCHES) as u64 * HEIGHT_UNIT_SCALE as u64
}

/// Format inches as feet and inches, the way rosters display height.
pub fn format_height(inches: u32) -> String {
    format!("{}'{}\"", inches / 12, inches % 12)
}

/// Stored year offset to calendar year. Values at or above the base year
/// already look absolute and pass through unchanged.
pub fn raw_to_year(raw: u64) -> u32 {
    if raw >= YEAR_BASE as u64 {
        return raw as u32;
    }
    YEAR_BASE + raw as u32
}

/// Calendar year to stored offset. Small values are already offsets and
/// pass through; pre-base years clamp to the base.
pub fn year_to_raw(year: u32) -> u64 {
    if year < YEAR_BASE {
        return year as u64;
    }
    (year - YEAR_BASE) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_round_trip_exact_over_domain() {
        for bits in [7u32, 8, 10] {
            for rating in RATING_MIN..=RATING_MAX_DISPLAY {
                let raw = rating_to_raw(rating, bits);
                assert_eq!(
                    raw_to_rating(raw, bits),
                    rating,
                    "rating {} via {} bits",
                    rating,
                    bits
                );
            }
        }
    }

    #[test]
    fn test_rating_clamps_out_of_range_raw() {
        assert_eq!(raw_to_rating(0, 8), RATING_MIN);
        // Raw max projects to the true ceiling (110) and clamps at 99.
        assert_eq!(raw_to_rating(255, 8), RATING_MAX_DISPLAY);
        assert_eq!(rating_to_raw(120, 8), rating_to_raw(99, 8));
        assert_eq!(rating_to_raw(0, 8), 0);
    }

    #[test]
    fn test_rating_monotone_in_raw() {
        let mut last = 0;
        for raw in 0..=255u64 {
            let rating = raw_to_rating(raw, 8);
            assert!(rating >= last);
            last = rating;
        }
    }

    #[test]
    fn test_tendency_identity_with_clamp() {
        for t in 0..=100 {
            assert_eq!(raw_to_tendency(tendency_to_raw(t)), t);
        }
        assert_eq!(raw_to_tendency(255), 100);
        assert_eq!(tendency_to_raw(150), 100);
    }

    #[test]
    fn test_potential_round_trip_and_clamp() {
        for p in POTENTIAL_MIN..=POTENTIAL_MAX {
            assert_eq!(raw_to_potential(potential_to_raw(p, 8)), p);
        }
        assert_eq!(raw_to_potential(10), POTENTIAL_MIN);
        assert_eq!(raw_to_potential(200), POTENTIAL_MAX);
    }

    #[test]
    fn test_height_round_trip() {
        for inches in HEIGHT_MIN_INCHES..=HEIGHT_MAX_INCHES {
            assert_eq!(raw_to_height_inches(height_inches_to_raw(inches)), inches);
        }
        // 6'6" stores as 78 * 254.
        assert_eq!(height_inches_to_raw(78), 19812);
        assert_eq!(format_height(78), "6'6\"");
        // Out-of-range requests clamp.
        assert_eq!(height_inches_to_raw(30), height_inches_to_raw(48));
    }

    #[test]
    fn test_year_offset_and_absolute_forms() {
        assert_eq!(raw_to_year(104), 2004);
        assert_eq!(year_to_raw(2004), 104);
        // Already-absolute raw values pass through.
        assert_eq!(raw_to_year(2004), 2004);
        // Already-offset years pass through.
        assert_eq!(year_to_raw(104), 104);
        assert_eq!(raw_to_year(year_to_raw(1987)), 1987);
    }
}
