//! Offsets for chaining crossfades over measured clip durations.

/// Offset of each crossfade when clips are chained pairwise.
///
/// For pair `k` (clip `k+1` blending into everything before it) the offset
/// is the accumulated length of the chain so far minus `fade`.
#[must_use]
pub fn crossfade_offsets(durations: &[f64], fade: f64) -> Vec<f64> {
    let Some((first, rest)) = durations.split_first() else {
        return Vec::new();
    };
    let mut accumulated = *first;
    rest.iter()
        .map(|d| {
            let offset = accumulated - fade;
            accumulated += d - fade;
            offset
        })
        .collect()
}

/// Length of the chained result: `sum - (n - 1) * fade`.
#[must_use]
pub fn crossfaded_duration(durations: &[f64], fade: f64) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let overlaps = (durations.len() - 1) as f64;
    durations.iter().sum::<f64>() - overlaps * fade
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_three_clip_chain() {
        let durations = [9.8, 10.1, 9.9];
        let offsets = crossfade_offsets(&durations, 0.5);

        assert_eq!(offsets.len(), 2);
        assert!(close(offsets[0], 9.3));
        assert!(close(offsets[1], 18.9));
        assert!(close(crossfaded_duration(&durations, 0.5), 28.8));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(crossfade_offsets(&[], 0.5).is_empty());
        assert!(crossfade_offsets(&[4.0], 0.5).is_empty());
        assert!(close(crossfaded_duration(&[4.0], 0.5), 4.0));
        assert!(close(crossfaded_duration(&[], 0.5), 0.0));
    }
}
