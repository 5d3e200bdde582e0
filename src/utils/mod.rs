pub mod validation;

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine of the angle between `a` and `b`. Zero when either vector is all
/// zeros, when lengths differ, or when the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot(a, b) / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// `exp(-age / period)`, with negative ages clamped to zero.
pub fn exponential_decay(age_days: i64, period_days: f64) -> f64 {
    let age = age_days.max(0) as f64;
    (-age / period_days).exp()
}

/// Text form of an embedding as stored on user and ad records.
pub fn encode_embedding(embedding: &[f32]) -> serde_json::Result<String> {
    serde_json::to_string(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        let a = vec![1.0, 1.0];
        let b = vec![2.0, 2.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = vec![0.0; 4];
        let v = vec![0.3, -0.2, 0.1, 0.9];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
        assert_eq!(cosine_similarity(&v, &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_non_finite() {
        let v = vec![f32::NAN, 1.0];
        assert_eq!(cosine_similarity(&v, &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_exponential_decay() {
        assert_eq!(exponential_decay(0, 30.0), 1.0);
        assert_eq!(exponential_decay(-5, 30.0), 1.0);
        assert!((exponential_decay(30, 30.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(exponential_decay(31, 30.0) < exponential_decay(30, 30.0));
    }

    #[test]
    fn test_encode_embedding() {
        assert_eq!(encode_embedding(&[0.5, -1.0]).unwrap(), "[0.5,-1.0]");
    }
}
