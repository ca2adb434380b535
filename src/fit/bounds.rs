pub(crate) fn within_bounds<T>(x: &[T], lower: &[T], upper: &[T]) -> bool
where
    T: PartialOrd,
{
    for i in 0..x.len() {
        if x[i] < lower[i] || x[i] > upper[i] {
            return false;
        }
    }
    true
}

/// Project `x` onto the box
pub(crate) fn clip_to_bounds(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((x, &lower), &upper) in x.iter_mut().zip(lower).zip(upper) {
        *x = x.clamp(lower, upper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_projects_outside_values() {
        let lower = [0.0, 1.0];
        let upper = [1.0, 2.0];
        let mut x = [-0.5, 2.5];
        assert!(!within_bounds(&x, &lower, &upper));
        clip_to_bounds(&mut x, &lower, &upper);
        assert_eq!(x, [0.0, 2.0]);
        assert!(within_bounds(&x, &lower, &upper));
    }
}
