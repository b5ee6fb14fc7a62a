//! Vector math shared by the index builder and the similarity scorer.

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length.
///
/// A zero vector (norm below `f32::EPSILON`) normalizes to all zeros.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out);
    out
}

/// In-place variant of [`normalize`].
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        v.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    v.iter_mut().for_each(|x| *x /= norm);
}

/// Dot product of two equally sized vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two arbitrary vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}
