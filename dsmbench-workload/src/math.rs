/// Exponent field of `1.0` in the upper 32 bits of an IEEE-754 double, minus a correction that
/// spreads the approximation error evenly.
const EXP_BIAS: f64 = 1_072_632_447.0;

/// Approximates `a.powf(b)` for positive `a`.
///
/// The fractional part of the exponent is applied by interpolating linearly in the exponent field
/// of `a`'s bit pattern, the integer part by exact exponentiation by squaring. The relative error
/// stays below 6%, at a fraction of the cost of [`f64::powf`].
///
/// Based on <http://martin.ankerl.com/2012/01/25/optimized-approximative-pow-in-c-and-cpp/>.
#[inline]
pub fn pow_approx(a: f64, b: f64) -> f64 {
    if b < 0.0 {
        return 1.0 / pow_approx(a, -b);
    }

    let int = b as u32;
    let frac = b - f64::from(int);

    let high = (a.to_bits() >> 32) as i32;
    let high = (frac * (f64::from(high) - EXP_BIAS) + EXP_BIAS) as i32;
    let approx = f64::from_bits(u64::from(high as u32) << 32);

    let mut result = 1.0;
    let mut base = a;
    let mut exp = int;
    while exp != 0 {
        if exp & 1 != 0 {
            result *= base;
        }
        base *= base;
        exp >>= 1;
    }

    result * approx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        let exact = a.powf(b);
        let approx = pow_approx(a, b);
        let error = ((approx - exact) / exact).abs();
        assert!(
            error < 0.06,
            "pow_approx({a}, {b}) = {approx}, expected {exact}"
        );
    }

    #[test]
    fn fractional_exponents() {
        for a in [0.01, 0.1, 0.5, 0.9, 1.0, 1.5, 2.0, 10.0, 1000.0] {
            for b in [0.0, 0.01, 0.25, 0.5, 0.75, 0.99] {
                assert_close(a, b);
            }
        }
    }

    #[test]
    fn integer_and_mixed_exponents() {
        for a in [0.3, 0.999, 1.0, 2.0, 3.7] {
            for b in [1.0, 2.0, 3.0, 1.5, 2.25, 10.0, 12.5] {
                assert_close(a, b);
            }
        }
    }

    #[test]
    fn negative_exponents() {
        assert_close(2.0, -1.0);
        assert_close(8.0, -0.5);
    }
}
