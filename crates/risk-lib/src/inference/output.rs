//! Post-processing of raw class scores

use super::InferenceError;
use crate::artifacts::LabelEncoder;
use tract_onnx::prelude::tract_ndarray::{Array2, ArrayView1};

/// Index of the highest score. The first maximum wins and NaN never wins.
pub fn argmax(scores: ArrayView1<'_, f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Per-row arg-max over a score matrix
pub fn argmax_rows(scores: &Array2<f64>) -> Result<Vec<usize>, InferenceError> {
    scores
        .rows()
        .into_iter()
        .enumerate()
        .map(|(row, values)| {
            argmax(values).ok_or_else(|| {
                InferenceError::Backend(format!("row {} has no comparable class score", row))
            })
        })
        .collect()
}

/// Map class indices to labels by direct lookup
pub fn decode_labels(
    indices: &[usize],
    encoder: &LabelEncoder,
) -> Result<Vec<String>, InferenceError> {
    indices
        .iter()
        .map(|&idx| {
            encoder
                .decode(idx)
                .map(str::to_string)
                .ok_or(InferenceError::UnknownClass {
                    index: idx,
                    classes: encoder.len(),
                })
        })
        .collect()
}

/// In-place softmax with max subtraction
pub fn softmax(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::tract_ndarray::{arr1, arr2};

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax(arr1(&[0.2, 0.7, 0.7, 0.1]).view()), Some(1));
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(arr1(&[f64::NAN, 0.1, 0.3]).view()), Some(2));
        assert_eq!(argmax(arr1(&[f64::NAN, f64::NAN]).view()), None);
    }

    #[test]
    fn test_argmax_rows_keeps_row_count() {
        let scores = arr2(&[[0.1, 0.9], [0.8, 0.2], [0.5, 0.5]]);
        assert_eq!(argmax_rows(&scores).unwrap(), vec![1, 0, 0]);
    }

    #[test]
    fn test_decode_is_direct_lookup() {
        let encoder = LabelEncoder::new(vec!["Low".to_string(), "High".to_string()]);
        assert_eq!(decode_labels(&[1, 0], &encoder).unwrap(), vec!["High", "Low"]);
        assert!(matches!(
            decode_labels(&[2], &encoder),
            Err(InferenceError::UnknownClass { index: 2, classes: 2 })
        ));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut values = vec![1000.0, 1001.0, 999.0];
        softmax(&mut values);
        assert!((values.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(values[1] > values[0] && values[0] > values[2]);
    }
}
