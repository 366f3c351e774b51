/// Scale `v` to unit L2 length in place and return its original norm.
///
/// Zero vectors stay zero and report a norm of `0.0`.
pub fn l2_normalize_in_place(v: &mut [f32]) -> f32 {
    let norm = v.iter().fold(0f32, |acc, x| acc + x * x).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    norm
}
