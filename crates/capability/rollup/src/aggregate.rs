//! 纯聚合运算
//!
//! 对 `(value, weight)` 样本集计算聚合值。空输入一律返回 None
//! （"无法计算"不等于零，调用方据此跳过写入）。
//!
//! 加权平均除以权重和而不是样本数；Sum 按权缩放；
//! Min / Max / Count / Last 忽略权重。

use domain::AggregationMethod;

/// 单个聚合样本。
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub value: f64,
    pub weight: f64,
}

impl Sample {
    pub fn new(value: f64, weight: f64) -> Self {
        Self { value, weight }
    }

    pub fn unweighted(value: f64) -> Self {
        Self { value, weight: 1.0 }
    }
}

/// 聚合一组样本。
pub fn aggregate(method: AggregationMethod, samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    match method {
        AggregationMethod::Average => {
            let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
            if total_weight == 0.0 {
                return None;
            }
            let weighted_sum: f64 = samples.iter().map(|s| s.value * s.weight).sum();
            Some(weighted_sum / total_weight)
        }
        AggregationMethod::Sum => Some(samples.iter().map(|s| s.value * s.weight).sum()),
        AggregationMethod::Min => samples
            .iter()
            .map(|s| s.value)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            }),
        AggregationMethod::Max => samples
            .iter()
            .map(|s| s.value)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }),
        AggregationMethod::Count => Some(samples.len() as f64),
        AggregationMethod::Last => samples.last().map(|s| s.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_average_divides_by_total_weight() {
        // (20*1 + 30*2 + 20*3) / (1 + 2 + 3) = 140 / 6
        let samples = [
            Sample::new(20.0, 1.0),
            Sample::new(30.0, 2.0),
            Sample::new(20.0, 3.0),
        ];
        let avg = aggregate(AggregationMethod::Average, &samples).expect("avg");
        assert!((avg - 140.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn unweighted_average_is_plain_mean() {
        let samples = [Sample::unweighted(22.0), Sample::unweighted(24.0)];
        assert_eq!(aggregate(AggregationMethod::Average, &samples), Some(23.0));
    }

    #[test]
    fn min_max_ignore_weights() {
        let samples = [Sample::new(5.0, 10.0), Sample::new(9.0, 0.1)];
        assert_eq!(aggregate(AggregationMethod::Min, &samples), Some(5.0));
        assert_eq!(aggregate(AggregationMethod::Max, &samples), Some(9.0));
    }

    #[test]
    fn sum_scales_by_weight() {
        let samples = [Sample::new(10.0, 2.0), Sample::new(5.0, 1.0)];
        assert_eq!(aggregate(AggregationMethod::Sum, &samples), Some(25.0));
    }

    #[test]
    fn count_and_last() {
        let samples = [Sample::unweighted(1.0), Sample::unweighted(2.0)];
        assert_eq!(aggregate(AggregationMethod::Count, &samples), Some(2.0));
        assert_eq!(aggregate(AggregationMethod::Last, &samples), Some(2.0));
    }

    #[test]
    fn empty_input_yields_none_not_zero() {
        for method in [
            AggregationMethod::Average,
            AggregationMethod::Sum,
            AggregationMethod::Min,
            AggregationMethod::Max,
            AggregationMethod::Count,
            AggregationMethod::Last,
        ] {
            assert_eq!(aggregate(method, &[]), None);
        }
    }
}
