use num::Float;

/// Phred values are capped here when converting very small error probabilities
pub const MAX_PHRED: f64 = 100.0;

pub fn error_prob_to_phred(prob: f64) -> f64 {
    (-10f64 * prob.log10().max(f64::MIN_10_EXP as f64)).min(MAX_PHRED)
}

pub fn qphred_to_error_prob<F: Float>(qphred: u8) -> F {
    let ten = F::from(10.0).unwrap();
    ten.powf(F::from(-(qphred as f64) / 10.0).unwrap())
}
