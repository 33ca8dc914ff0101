//! Raw meter conversions for `get_level`
//!
//! The transceiver reports meters on a raw 0-255 scale. Hamlib clients expect
//! signal strength in dB relative to S9, SWR as a ratio and RF power as a
//! fraction of full scale.

use cat_protocol::codec::POWER_RANGE_W;

/// Raw S-meter value to dB relative to S9
const STRENGTH_CALIBRATION: [(u16, f64); 16] = [
    (0, -54.0),
    (12, -48.0),
    (27, -42.0),
    (40, -36.0),
    (55, -30.0),
    (65, -24.0),
    (80, -18.0),
    (95, -12.0),
    (112, -6.0),
    (130, 0.0),
    (150, 10.0),
    (172, 20.0),
    (190, 30.0),
    (220, 40.0),
    (240, 50.0),
    (255, 60.0),
];

/// Raw SWR meter value to SWR ratio
const SWR_CALIBRATION: [(u16, f64); 6] = [
    (0, 1.0),
    (26, 1.2),
    (52, 1.5),
    (89, 2.0),
    (126, 3.0),
    (255, 10.0),
];

/// Piecewise-linear lookup, clamped at both ends
fn interpolate(table: &[(u16, f64)], raw: u16) -> f64 {
    let Some(&(first_raw, first_val)) = table.first() else {
        return 0.0;
    };
    if raw <= first_raw {
        return first_val;
    }
    for pair in table.windows(2) {
        let (lo_raw, lo_val) = pair[0];
        let (hi_raw, hi_val) = pair[1];
        if raw <= hi_raw {
            let span = f64::from(hi_raw - lo_raw);
            let t = f64::from(raw - lo_raw) / span;
            return lo_val + t * (hi_val - lo_val);
        }
    }
    table.last().map(|&(_, v)| v).unwrap_or(first_val)
}

/// S-meter reading as whole dB relative to S9
pub fn strength_db(raw: u16) -> i32 {
    interpolate(&STRENGTH_CALIBRATION, raw).round() as i32
}

/// SWR meter reading as a ratio (1.0 = perfect match)
pub fn swr_ratio(raw: u16) -> f64 {
    interpolate(&SWR_CALIBRATION, raw)
}

/// Power setting in watts as a fraction of the radio's maximum
pub fn rf_power_fraction(watts: u16) -> f64 {
    f64::from(watts) / f64::from(*POWER_RANGE_W.end())
}
