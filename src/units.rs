//! Unit conversion - linear gain, dB, fader position and meter display
//!
//! The engine only understands linear gain. Operators see dB, a 0-100 fader
//! and a 0-100% meter. Fader and meter use two different piecewise-linear
//! laws; do not mix them up.

/// dB values at or below this are treated as silence by `db_to_gain`
pub const SILENCE_DB: f64 = -100.0;

/// Fader ceiling in dB (fader position 100)
pub const FADER_MAX_DB: f64 = 6.0;

/// Meter floor in dB (0%)
pub const METER_FLOOR_DB: f64 = -60.0;

/// Meter ceiling in dB (100%)
pub const METER_CEILING_DB: f64 = 0.0;

/// One point of a piecewise-linear law
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    /// Fader position (0-100) or meter percentage (0-100)
    pub position: f64,
    pub db: f64,
}

const fn bp(position: f64, db: f64) -> Breakpoint {
    Breakpoint { position, db }
}

/// Console fader law, ascending.
///
/// Below the first point the curve runs linearly down to `SILENCE_DB` at
/// position 0+, and position 0 itself is -inf.
pub const FADER_LAW: [Breakpoint; 10] = [
    bp(8.2, -40.0),
    bp(12.3, -30.0),
    bp(20.9, -20.0),
    bp(29.1, -15.0),
    bp(39.9, -10.0),
    bp(48.5, -6.0),
    bp(61.2, -3.0),
    bp(74.3, 0.0),
    bp(86.9, 3.0),
    bp(100.0, FADER_MAX_DB),
];

/// Meter display law, ascending. Tighter spacing near 0 dB.
pub const METER_LAW: [Breakpoint; 9] = [
    bp(0.0, METER_FLOOR_DB),
    bp(5.0, -50.0),
    bp(12.0, -40.0),
    bp(22.0, -30.0),
    bp(38.0, -20.0),
    bp(60.0, -10.0),
    bp(72.0, -6.0),
    bp(85.0, -3.0),
    bp(100.0, METER_CEILING_DB),
];

/// Linear interpolation over an ascending table.
///
/// `key` picks the input coordinate, `value` the output. Inputs outside the
/// table clamp to the end values.
fn interpolate(
    law: &[Breakpoint],
    x: f64,
    key: impl Fn(&Breakpoint) -> f64,
    value: impl Fn(&Breakpoint) -> f64,
) -> f64 {
    let first = &law[0];
    let last = &law[law.len() - 1];
    if x <= key(first) {
        return value(first);
    }
    if x >= key(last) {
        return value(last);
    }
    for pair in law.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if x <= key(hi) {
            let t = (x - key(lo)) / (key(hi) - key(lo));
            return value(lo) + t * (value(hi) - value(lo));
        }
    }
    value(last)
}

// =============================================================================
// Gain <-> dB
// =============================================================================

/// Linear gain to dB. `g <= 0` is -inf.
pub fn gain_to_db(gain: f64) -> f64 {
    if gain.is_nan() || gain <= 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * gain.log10()
}

/// dB to linear gain. Anything at or below -100 dB is silence.
pub fn db_to_gain(db: f64) -> f64 {
    if db.is_nan() || db <= SILENCE_DB {
        return 0.0;
    }
    10.0_f64.powf(db / 20.0)
}

// =============================================================================
// Fader law
// =============================================================================

/// Convert fader position (0-100) to dB (-inf to +6)
pub fn fader_to_db(fader: f64) -> f64 {
    if fader.is_nan() || fader <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if fader >= 100.0 {
        return FADER_MAX_DB;
    }

    let bottom = FADER_LAW[0];
    if fader < bottom.position {
        // Tail: 0+ .. 8.2 maps onto -100 .. -40
        return SILENCE_DB + (fader / bottom.position) * (bottom.db - SILENCE_DB);
    }

    interpolate(&FADER_LAW, fader, |b| b.position, |b| b.db)
}

/// Convert dB to fader position (0-100)
pub fn db_to_fader(db: f64) -> f64 {
    if db.is_nan() || db <= SILENCE_DB {
        return 0.0;
    }
    if db >= FADER_MAX_DB {
        return 100.0;
    }

    let bottom = FADER_LAW[0];
    if db < bottom.db {
        return ((db - SILENCE_DB) / (bottom.db - SILENCE_DB)) * bottom.position;
    }

    interpolate(&FADER_LAW, db, |b| b.db, |b| b.position)
}

/// Fader position straight to the linear gain sent to the engine
pub fn fader_to_gain(fader: f64) -> f64 {
    db_to_gain(fader_to_db(fader))
}

/// Linear gain from the engine to a fader position
pub fn gain_to_fader(gain: f64) -> f64 {
    db_to_fader(gain_to_db(gain))
}

// =============================================================================
// Meter law
// =============================================================================

/// Meter level (linear peak/rms) to dB, floored at -60
pub fn level_to_db(level: f64) -> f64 {
    if level.is_nan() || level <= 0.0 {
        return METER_FLOOR_DB;
    }
    (20.0 * level.log10()).max(METER_FLOOR_DB)
}

/// dB to meter fill percentage (0-100)
pub fn db_to_meter_percent(db: f64) -> f64 {
    if db.is_nan() {
        return 0.0;
    }
    interpolate(&METER_LAW, db, |b| b.db, |b| b.position)
}

/// Linear meter level straight to a fill percentage
pub fn level_to_meter_percent(level: f64) -> f64 {
    db_to_meter_percent(level_to_db(level))
}
