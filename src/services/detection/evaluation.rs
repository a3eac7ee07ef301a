// Model Evaluation
// Held-out metrics as plain data; rendering lives in the console layer.

use super::classifier::TrainedModel;
use crate::models::{ClassDistribution, ClassMetrics, ConfusionMatrix, EvaluationReport, LabeledExample};

pub const TOP_FEATURES_IN_REPORT: usize = 10;

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn class_metrics(tp: usize, fp: usize, fn_: usize, support: usize) -> ClassMetrics {
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassMetrics {
        precision,
        recall,
        f1_score,
        support,
    }
}

fn averaged(a: &ClassMetrics, b: &ClassMetrics, weighted: bool) -> ClassMetrics {
    let support = a.support + b.support;
    let (wa, wb) = if weighted {
        (ratio(a.support, support), ratio(b.support, support))
    } else {
        (0.5, 0.5)
    };
    ClassMetrics {
        precision: wa * a.precision + wb * b.precision,
        recall: wa * a.recall + wb * b.recall,
        f1_score: wa * a.f1_score + wb * b.f1_score,
        support,
    }
}

/// Metrics for binary predictions. Zero divisions yield 0.
pub fn compute_metrics(actual: &[bool], predicted: &[bool]) -> EvaluationReport {
    let mut confusion = ConfusionMatrix::default();
    for (&y, &p) in actual.iter().zip(predicted) {
        match (y, p) {
            (false, false) => confusion.true_negative += 1,
            (false, true) => confusion.false_positive += 1,
            (true, false) => confusion.false_negative += 1,
            (true, true) => confusion.true_positive += 1,
        }
    }

    let total = confusion.total();
    let correct = confusion.true_negative + confusion.true_positive;
    let accuracy = ratio(correct, total);

    let actual_dist = ClassDistribution {
        non_domain: confusion.true_negative + confusion.false_positive,
        domain: confusion.false_negative + confusion.true_positive,
    };
    let predicted_dist = ClassDistribution {
        non_domain: confusion.true_negative + confusion.false_negative,
        domain: confusion.false_positive + confusion.true_positive,
    };

    let domain = class_metrics(
        confusion.true_positive,
        confusion.false_positive,
        confusion.false_negative,
        actual_dist.domain,
    );
    let non_domain = class_metrics(
        confusion.true_negative,
        confusion.false_negative,
        confusion.false_positive,
        actual_dist.non_domain,
    );

    EvaluationReport {
        accuracy,
        error_rate: if total == 0 { 0.0 } else { 1.0 - accuracy },
        macro_avg: averaged(&non_domain, &domain, false),
        weighted_avg: averaged(&non_domain, &domain, true),
        non_domain,
        domain,
        confusion,
        predicted: predicted_dist,
        actual: actual_dist,
        train_size: 0,
        test_size: total,
        top_features: Vec::new(),
    }
}

/// Evaluate a model on normalized examples.
pub fn evaluate(model: &TrainedModel, examples: &[LabeledExample], train_size: usize) -> EvaluationReport {
    let actual: Vec<bool> = examples.iter().map(|e| e.is_domain).collect();
    let predicted: Vec<bool> = examples
        .iter()
        .map(|e| model.classify(&e.text).is_domain)
        .collect();

    let mut report = compute_metrics(&actual, &predicted);
    report.train_size = train_size;
    report.top_features = model.top_features(TOP_FEATURES_IN_REPORT);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = [true, false, true, false];
        let report = compute_metrics(&y, &y);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.error_rate, 0.0);
        assert_eq!(report.domain.f1_score, 1.0);
        assert_eq!(report.confusion.as_rows(), [[2, 0], [0, 2]]);
    }

    #[test]
    fn test_mixed_predictions() {
        let actual = [true, true, true, false, false];
        let predicted = [true, true, false, true, false];
        let r = compute_metrics(&actual, &predicted);
        assert_eq!(r.confusion.as_rows(), [[1, 1], [1, 2]]);
        assert!((r.accuracy - 0.6).abs() < 1e-12);
        assert!((r.error_rate - 0.4).abs() < 1e-12);
        assert!((r.domain.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.domain.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.non_domain.precision - 0.5).abs() < 1e-12);
        assert_eq!(r.domain.support, 3);
        assert_eq!(r.non_domain.support, 2);
        assert_eq!(r.predicted, ClassDistribution { non_domain: 2, domain: 3 });
        assert_eq!(r.actual, ClassDistribution { non_domain: 2, domain: 3 });
        let expected_weighted = 0.4 * r.non_domain.f1_score + 0.6 * r.domain.f1_score;
        assert!((r.weighted_avg.f1_score - expected_weighted).abs() < 1e-12);
        assert_eq!(r.macro_avg.support, 5);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let actual = [false, false];
        let predicted = [false, false];
        let r = compute_metrics(&actual, &predicted);
        assert_eq!(r.domain.precision, 0.0);
        assert_eq!(r.domain.recall, 0.0);
        assert_eq!(r.domain.f1_score, 0.0);

        let empty = compute_metrics(&[], &[]);
        assert_eq!(empty.accuracy, 0.0);
        assert_eq!(empty.error_rate, 0.0);
    }
}
