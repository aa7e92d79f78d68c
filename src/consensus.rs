//! Cross-engine consensus evaluation.
//!
//! With no ground truth available, agreement between independent engines
//! is the strongest confidence signal there is. This module scores the
//! full candidate set of one (document, field) pair in one pass; it is a
//! pure function of that set, so re-running it can never change a result.

/// One engine's candidate value for the field under evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub metodo: &'a str,
    pub valor: &'a str,
}

/// Scores all engines agreeing on the modal value when it has real
/// corroboration.
pub const SCORE_AGREEMENT: f64 = 1.0;
/// Modal value in an exact two-way split.
pub const SCORE_SPLIT_TIE: f64 = 0.6;
/// Modal value without majority and without a clean two-way split.
pub const SCORE_WEAK_MODAL: f64 = 0.5;
/// Candidate contradicted by the modal value.
pub const SCORE_CONTRADICTED: f64 = 0.3;
/// No two engines agree on anything.
pub const SCORE_NO_CONSENSUS: f64 = 0.2;
/// Empty candidate.
pub const SCORE_EMPTY: f64 = 0.0;

/// Evaluate consensus over all candidates of one (document, field).
///
/// Returns one score per input row, in input order, or `None` when every
/// candidate is empty (the pair is skipped, rows stay unscored).
///
/// Rules:
/// - all non-empty values distinct: every non-empty row scores 0.2,
///   empty rows 0.0;
/// - rows matching the modal value score 1.0 when at least two engines
///   produced it, 0.6/0.5 under the split rules, 0.6 otherwise;
/// - rows with any other value score 0.3; empty rows 0.0.
///
/// The modal value is the first-seen value with the highest occurrence
/// count, so evaluation is deterministic for tied counts.
pub fn evaluate(candidates: &[Candidate<'_>]) -> Option<Vec<f64>> {
    let valid: Vec<&str> = candidates
        .iter()
        .map(|c| c.valor.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if valid.is_empty() {
        return None;
    }

    // Occurrence counts, preserving first-seen order.
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for v in &valid {
        match counts.iter_mut().find(|(value, _)| value == v) {
            Some((_, count)) => *count += 1,
            None => counts.push((v, 1)),
        }
    }

    let total_validos = valid.len();

    // No two engines agree: weak signal across the board.
    if counts.len() == total_validos {
        return Some(
            candidates
                .iter()
                .map(|c| {
                    if c.valor.trim().is_empty() {
                        SCORE_EMPTY
                    } else {
                        SCORE_NO_CONSENSUS
                    }
                })
                .collect(),
        );
    }

    let max_count = counts.iter().map(|(_, count)| *count).max().unwrap_or(1);
    // First value reaching the maximum wins, keeping ties deterministic.
    let max_valor = counts
        .iter()
        .find(|(_, count)| *count == max_count)
        .map(|(v, _)| *v)
        .unwrap_or(valid[0]);

    let scores = candidates
        .iter()
        .map(|c| {
            let valor = c.valor.trim();
            if valor.is_empty() {
                SCORE_EMPTY
            } else if valor == max_valor {
                if max_count >= 2 {
                    SCORE_AGREEMENT
                } else if total_validos > 2 && max_count == total_validos / 2 {
                    let otros: Vec<usize> = counts
                        .iter()
                        .filter(|(v, _)| *v != max_valor)
                        .map(|(_, count)| *count)
                        .collect();
                    if otros.len() == 1 && otros[0] == max_count {
                        SCORE_SPLIT_TIE
                    } else {
                        SCORE_WEAK_MODAL
                    }
                } else {
                    SCORE_SPLIT_TIE
                }
            } else {
                SCORE_CONTRADICTED
            }
        })
        .collect();

    Some(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cands<'a>(values: &[(&'a str, &'a str)]) -> Vec<Candidate<'a>> {
        values
            .iter()
            .map(|&(metodo, valor)| Candidate { metodo, valor })
            .collect()
    }

    #[test]
    fn test_two_against_one() {
        let scores = evaluate(&cands(&[
            ("paddleocr", "A"),
            ("doctr", "A"),
            ("easyocr", "B"),
        ]))
        .unwrap();
        assert_eq!(scores, vec![1.0, 1.0, 0.3]);
    }

    #[test]
    fn test_all_distinct() {
        let scores = evaluate(&cands(&[
            ("paddleocr", "A"),
            ("doctr", "B"),
            ("easyocr", "C"),
        ]))
        .unwrap();
        assert_eq!(scores, vec![0.2, 0.2, 0.2]);
    }

    #[test]
    fn test_all_empty_skips() {
        assert!(evaluate(&cands(&[("paddleocr", ""), ("doctr", "   ")])).is_none());
    }

    #[test]
    fn test_empty_rows_score_zero() {
        let scores = evaluate(&cands(&[
            ("paddleocr", "A"),
            ("doctr", ""),
            ("easyocr", "A"),
        ]))
        .unwrap();
        assert_eq!(scores, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_single_candidate_has_no_corroboration() {
        let scores = evaluate(&cands(&[("paddleocr", "A")])).unwrap();
        assert_eq!(scores, vec![0.2]);
    }

    #[test]
    fn test_two_way_split_both_groups() {
        // 2 vs 2: the modal group is the first seen; the other group is
        // contradicted even with the same count.
        let scores = evaluate(&cands(&[
            ("paddleocr", "A"),
            ("doctr", "B"),
            ("easyocr", "A"),
            ("tesseract_psm4", "B"),
        ]))
        .unwrap();
        assert_eq!(scores, vec![1.0, 0.3, 1.0, 0.3]);
    }

    #[test]
    fn test_values_are_trimmed_before_comparison() {
        let scores = evaluate(&cands(&[
            ("paddleocr", " TOYOTA "),
            ("doctr", "TOYOTA"),
            ("easyocr", "T0YOTA"),
        ]))
        .unwrap();
        assert_eq!(scores, vec![1.0, 1.0, 0.3]);
    }

    #[test]
    fn test_idempotent() {
        let input = cands(&[
            ("paddleocr", "TOYOTA"),
            ("doctr", "T0YOTA"),
            ("easyocr", "TOYOTA"),
            ("tesseract_psm4", ""),
        ]);
        let first = evaluate(&input).unwrap();
        let second = evaluate(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![1.0, 0.3, 1.0, 0.0]);
    }
}
