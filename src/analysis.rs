//! Usage analysis
//!
//! Pure reductions over a period's buckets: totals, averages, the healthiest
//! bucket, and a short advisory report.

use crate::types::{Period, UsageBucket};
use serde::{Deserialize, Serialize};

/// Average walking minutes above which walking usage is flagged
pub const WALKING_ADVICE_THRESHOLD: f64 = 30.0;

/// Average lying minutes above which lying usage is flagged
pub const LYING_ADVICE_THRESHOLD: f64 = 60.0;

/// Quantitative summary of a bucket sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAnalysis {
    pub bucket_count: usize,
    pub total_walking_minutes: u64,
    pub total_lying_minutes: u64,
    pub avg_walking_minutes: f64,
    pub avg_lying_minutes: f64,
    /// Label of the bucket with the smallest combined usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_label: Option<String>,
}

impl UsageAnalysis {
    /// Reduce an ordered bucket sequence.
    ///
    /// Ties for the best bucket go to the earliest label.
    pub fn from_buckets(buckets: &[UsageBucket]) -> Self {
        let total_walking_minutes: u64 = buckets.iter().map(|b| b.walking_minutes as u64).sum();
        let total_lying_minutes: u64 = buckets.iter().map(|b| b.lying_minutes as u64).sum();
        let count = buckets.len();

        let (avg_walking_minutes, avg_lying_minutes) = if count > 0 {
            (
                total_walking_minutes as f64 / count as f64,
                total_lying_minutes as f64 / count as f64,
            )
        } else {
            (0.0, 0.0)
        };

        // min_by_key keeps the first of equal minima
        let best_label = buckets
            .iter()
            .min_by_key(|b| b.walking_minutes as u64 + b.lying_minutes as u64)
            .map(|b| b.label.clone());

        Self {
            bucket_count: count,
            total_walking_minutes,
            total_lying_minutes,
            avg_walking_minutes,
            avg_lying_minutes,
            best_label,
        }
    }

    pub fn rounded_avg_walking(&self) -> u64 {
        self.avg_walking_minutes.round() as u64
    }

    pub fn rounded_avg_lying(&self) -> u64 {
        self.avg_lying_minutes.round() as u64
    }

    pub fn reduce_walking(&self) -> bool {
        self.avg_walking_minutes > WALKING_ADVICE_THRESHOLD
    }

    pub fn reduce_lying(&self) -> bool {
        self.avg_lying_minutes > LYING_ADVICE_THRESHOLD
    }
}

/// Advisory report for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub period: Period,
    pub buckets: Vec<UsageBucket>,
    pub analysis: UsageAnalysis,
    pub reduce_walking: bool,
    pub reduce_lying: bool,
}

impl UsageReport {
    pub fn new(period: Period, buckets: Vec<UsageBucket>) -> Self {
        let analysis = UsageAnalysis::from_buckets(&buckets);
        Self {
            period,
            reduce_walking: analysis.reduce_walking(),
            reduce_lying: analysis.reduce_lying(),
            buckets,
            analysis,
        }
    }

    /// Plain-text rendering for display
    pub fn to_text(&self) -> String {
        let a = &self.analysis;
        let name = self.period.display_name();
        let mut lines = Vec::new();

        lines.push(format!("📊 {} 사용 패턴 분석", name));
        lines.push(String::new());
        lines.push("🚶‍♀️ 보행 중 사용".to_string());
        lines.push(format!("- 평균: {}분", a.rounded_avg_walking()));
        lines.push(format!("- 총 사용: {}분", a.total_walking_minutes));
        lines.push(if self.reduce_walking {
            "⚠️ 안전을 위해 보행 중 사용을 줄여보세요!".to_string()
        } else {
            "✅ 안전한 보행 습관을 유지하고 계시네요!".to_string()
        });
        lines.push(String::new());
        lines.push("🛏️ 침대에서 사용".to_string());
        lines.push(format!("- 평균: {}분", a.rounded_avg_lying()));
        lines.push(format!("- 총 사용: {}분", a.total_lying_minutes));
        lines.push(if self.reduce_lying {
            "💤 수면의 질 향상을 위해 침대에서의 사용을 줄여보세요!".to_string()
        } else {
            "✅ 좋은 수면 습관을 유지하고 계시네요!".to_string()
        });
        lines.push(String::new());
        lines.push("🎯 맞춤 개선 계획".to_string());
        lines.push(if self.reduce_walking {
            "1. 보행 중 알림 민감도를 높여보세요".to_string()
        } else {
            "1. 현재 보행 습관을 유지하세요".to_string()
        });
        lines.push(if self.reduce_lying {
            "2. 침대 시간 알림을 30분으로 설정해보세요".to_string()
        } else {
            "2. 현재 수면 습관을 유지하세요".to_string()
        });
        lines.push("3. 운동 모드를 활용해 의도적 활동 시간을 구분해보세요".to_string());

        if let Some(best) = &a.best_label {
            lines.push(String::new());
            lines.push(format!("💡 이번 {} 하이라이트", name));
            lines.push(format!("가장 건강한 날: {} 🌟", best));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_week() -> Vec<UsageBucket> {
        vec![
            UsageBucket::new("월", 30, 90),
            UsageBucket::new("화", 45, 110),
            UsageBucket::new("수", 25, 85),
            UsageBucket::new("목", 40, 95),
            UsageBucket::new("금", 35, 120),
            UsageBucket::new("토", 55, 140),
            UsageBucket::new("일", 45, 120),
        ]
    }

    #[test]
    fn test_week_analysis() {
        let analysis = UsageAnalysis::from_buckets(&sample_week());
        assert_eq!(analysis.total_walking_minutes, 275);
        assert_eq!(analysis.total_lying_minutes, 760);
        assert_eq!(analysis.rounded_avg_walking(), 39);
        assert!((analysis.avg_lying_minutes - 108.6).abs() < 0.05);
        assert_eq!(analysis.best_label.as_deref(), Some("수"));
    }

    #[test]
    fn test_best_tie_goes_to_earliest() {
        let buckets = vec![
            UsageBucket::new("1월", 10, 10),
            UsageBucket::new("2월", 5, 15),
            UsageBucket::new("3월", 30, 0),
        ];
        let analysis = UsageAnalysis::from_buckets(&buckets);
        assert_eq!(analysis.best_label.as_deref(), Some("1월"));
    }

    #[test]
    fn test_empty_buckets() {
        let analysis = UsageAnalysis::from_buckets(&[]);
        assert_eq!(analysis.avg_walking_minutes, 0.0);
        assert_eq!(analysis.avg_lying_minutes, 0.0);
        assert!(analysis.best_label.is_none());
    }

    #[test]
    fn test_report_advice() {
        let report = UsageReport::new(Period::Week, sample_week());
        assert!(report.reduce_walking);
        assert!(report.reduce_lying);

        let calm = vec![UsageBucket::new("월", 10, 20), UsageBucket::new("화", 20, 30)];
        let report = UsageReport::new(Period::Week, calm);
        assert!(!report.reduce_walking);
        assert!(!report.reduce_lying);
    }

    #[test]
    fn test_report_text() {
        let report = UsageReport::new(Period::Week, sample_week());
        let text = report.to_text();
        assert!(text.starts_with("📊 주간 사용 패턴 분석"));
        assert!(text.contains("- 평균: 39분"));
        assert!(text.contains("- 평균: 109분"));
        assert!(text.contains("가장 건강한 날: 수"));
    }
}
