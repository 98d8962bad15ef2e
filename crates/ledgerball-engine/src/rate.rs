// Guarded division for every rate computation in the pipeline.

/// `num / den`, or 0.0 when the denominator is zero or either operand is not
/// finite. A category with no accumulated weight mass resolves to zero.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return 0.0;
    }
    let q = num / den;
    if q.is_finite() {
        q
    } else {
        0.0
    }
}
