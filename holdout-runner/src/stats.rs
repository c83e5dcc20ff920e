//! Significance of out-of-sample results.
//!
//! A one-sided Student's t-test of per-window out-of-sample scores against a
//! zero mean. With a handful of windows the normality and independence
//! assumptions are loose, so the p-value is a ranking aid rather than a
//! literal false-positive rate.

use crate::metrics::{mean, std_dev};
use serde::{Deserialize, Serialize};

// ─── Special functions ───────────────────────────────────────────────

/// ln Γ(x) for x > 0 (Lanczos series, six terms).
fn ln_gamma(x: f64) -> f64 {
    const SERIES: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut sum = 1.000_000_000_190_015;
    for c in SERIES {
        y += 1.0;
        sum += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * sum / x).ln()
}

/// Continued fraction for the incomplete beta function.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 3e-16;
    const FLOOR: f64 = 1e-300;

    let clamp = |v: f64| if v.abs() < FLOOR { FLOOR } else { v };
    let (sum_ab, a_plus, a_minus) = (a + b, a + 1.0, a - 1.0);

    let mut c = 1.0;
    let mut d = 1.0 / clamp(1.0 - sum_ab * x / a_plus);
    let mut h = d;
    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((a_minus + m2) * (a + m2));
        d = 1.0 / clamp(1.0 + even * d);
        c = clamp(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (sum_ab + m) * x / ((a + m2) * (a_plus + m2));
        d = 1.0 / clamp(1.0 + odd * d);
        c = clamp(1.0 + odd / c);
        let step = d * c;
        h *= step;
        if (step - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta I_x(a, b).
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return f64::NAN;
    }
    if x == 0.0 || x == 1.0 {
        return x;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Student's t CDF: P(T <= t) with `df` degrees of freedom.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if !(df > 0.0) || t.is_nan() {
        return f64::NAN;
    }
    if t == 0.0 {
        return 0.5;
    }
    let tail = 0.5 * incomplete_beta(df / 2.0, 0.5, df / (df + t * t));
    if t > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

// ─── Test ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTest {
    pub n: usize,
    pub mean: f64,
    pub t_statistic: f64,
    pub df: f64,
    /// P(mean this large | true mean 0), one-sided.
    pub p_value: f64,
}

impl TTest {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// H0: mean = 0 against H1: mean > 0. `None` for fewer than 2 finite values.
pub fn one_sided_t_test(values: &[f64]) -> Option<TTest> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n < 2 {
        return None;
    }
    let m = mean(&finite);
    let sd = std_dev(&finite);
    let df = (n - 1) as f64;

    if sd == 0.0 {
        let (t_statistic, p_value) = match m.partial_cmp(&0.0) {
            Some(std::cmp::Ordering::Greater) => (f64::INFINITY, 0.0),
            Some(std::cmp::Ordering::Less) => (f64::NEG_INFINITY, 1.0),
            _ => (0.0, 0.5),
        };
        return Some(TTest {
            n,
            mean: m,
            t_statistic,
            df,
            p_value,
        });
    }

    let t_statistic = m / (sd / (n as f64).sqrt());
    Some(TTest {
        n,
        mean: m,
        t_statistic,
        df,
        p_value: 1.0 - t_cdf(t_statistic, df),
    })
}
