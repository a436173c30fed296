//! Core domain model for the ACO cost performance dashboard.
//!
//! Entities mirror the relational schema one-to-one; ids are store-generated
//! and never minted here. Ordering rules that downstream listings must agree
//! on (category sort, priority rank, nulls-last savings) live in this crate
//! so every consumer reproduces them identically.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "acpd-core";

/// Traffic-light rating attached to categories and KPIs. Writer-supplied and
/// trusted by readers; never derived from variance at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceStatus {
    Red,
    Yellow,
    Green,
}

impl PerformanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "red" => Some(Self::Red),
            "yellow" => Some(Self::Yellow),
            "green" => Some(Self::Green),
            _ => None,
        }
    }
}

/// Whether an opportunity flags overspending to fix or efficiency to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityType {
    Overspending,
    Efficient,
}

impl OpportunityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overspending => "overspending",
            Self::Efficient => "efficient",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "overspending" => Some(Self::Overspending),
            "efficient" => Some(Self::Efficient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: high sorts before medium sorts before low.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Recommendation lifecycle states. The write layer validates membership in
/// this set but does not enforce the transition graph; `can_transition` is
/// the advisory graph for callers that want strict enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    NotStarted,
    Acknowledged,
    Accepted,
    InProgress,
    Completed,
    AlreadyDoing,
    Rejected,
}

impl RecommendationStatus {
    pub const ALL: [RecommendationStatus; 7] = [
        Self::NotStarted,
        Self::Acknowledged,
        Self::Accepted,
        Self::InProgress,
        Self::Completed,
        Self::AlreadyDoing,
        Self::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Acknowledged => "acknowledged",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::AlreadyDoing => "already_doing",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn can_transition(self, next: Self) -> bool {
        use RecommendationStatus::*;
        matches!(
            (self, next),
            (NotStarted, Acknowledged | Accepted | Rejected)
                | (Acknowledged, Accepted | Rejected | NotStarted)
                | (Accepted, InProgress)
                | (InProgress, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AlreadyDoing | Self::Rejected | Self::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    BestPractice,
    Testimonial,
    ImplementationStep,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BestPractice => "best_practice",
            Self::Testimonial => "testimonial",
            Self::ImplementationStep => "implementation_step",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "best_practice" => Some(Self::BestPractice),
            "testimonial" => Some(Self::Testimonial),
            "implementation_step" => Some(Self::ImplementationStep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Up,
    Down,
}

impl ChangeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Reporting window. The root of the entity graph: every period-scoped row
/// is destroyed and recreated wholesale by the reset engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePeriod {
    pub id: i64,
    pub period_key: String,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
}

/// One cost category instance for one period. `(slug, period_id)` is unique;
/// the same slug recurs across periods with period-specific numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostCategory {
    pub id: i64,
    pub slug: String,
    pub category_name: String,
    pub period_id: i64,
    pub spending_pmpm_actual: f64,
    pub spending_pmpm_benchmark: f64,
    /// PMPM delta scaled by attributed member-months. Authoritative input.
    pub spending_variance_amount: f64,
    pub spending_variance_percent: f64,
    pub utilization_actual: Option<f64>,
    pub utilization_benchmark: Option<f64>,
    pub utilization_variance_percent: Option<f64>,
    pub utilization_unit: Option<String>,
    pub performance_status: PerformanceStatus,
    pub is_opportunity: bool,
    pub is_strength: bool,
    pub aco_rank: Option<i32>,
    pub total_categories: Option<i32>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
}

/// Derived dashboard ranking row for a notable category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostOpportunity {
    pub id: i64,
    pub period_id: i64,
    pub cost_category_id: i64,
    pub opportunity_type: OpportunityType,
    pub amount_variance: f64,
    pub percent_variance: Option<f64>,
    pub aco_rank: Option<i32>,
    pub display_order: Option<i32>,
    pub show_on_dashboard: bool,
}

/// Improvement recommendation. Period-independent; linked to categories via
/// `RecommendationCostCategory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: RecommendationStatus,
    pub priority: Priority,
    pub is_measurable: bool,
    pub estimated_savings: Option<f64>,
    pub affected_lives: Option<i32>,
    pub implementation_complexity: Option<String>,
    pub patient_cohort: Option<String>,
    pub cohort_size: Option<i32>,
    pub has_program_details: bool,
    pub program_overview: Option<String>,
    pub video_url: Option<String>,
    pub can_convert_to_workflow: bool,
    pub workflow_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub status_changed_by: Option<String>,
}

/// Many-to-many linkage attributing a slice of a recommendation's estimated
/// savings to one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationCostCategory {
    pub recommendation_id: i64,
    pub cost_category_id: i64,
    pub impact_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramResource {
    pub id: i64,
    pub recommendation_id: i64,
    pub resource_type: ResourceType,
    pub title: String,
    pub content: String,
    pub display_order: Option<i32>,
    pub author: Option<String>,
    pub author_role: Option<String>,
}

/// Top-line KPI row, one set per period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub id: i64,
    pub period_id: i64,
    pub metric_type: String,
    pub current_value: f64,
    pub previous_value: Option<f64>,
    pub change_percent: Option<f64>,
    pub change_direction: Option<ChangeDirection>,
    pub benchmark_value: Option<f64>,
    pub is_above_benchmark: bool,
    pub display_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyKpi {
    pub id: i64,
    pub period_id: i64,
    pub kpi_type: String,
    pub kpi_label: String,
    pub actual_value: f64,
    pub aco_benchmark: Option<f64>,
    pub milliman_benchmark: Option<f64>,
    pub variance_percent: Option<f64>,
    pub performance_status: PerformanceStatus,
    pub display_format: String,
    pub display_order: Option<i32>,
    pub aco_rank: Option<i32>,
}

/// Drill-down: facility spend within one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryHospital {
    pub id: i64,
    pub cost_category_id: i64,
    pub hospital_name: String,
    pub spend: f64,
    pub case_count: Option<i32>,
    pub display_order: Option<i32>,
}

/// Drill-down: diagnosis-related-group spend within one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDrg {
    pub id: i64,
    pub cost_category_id: i64,
    pub drg_code: String,
    pub drg_description: String,
    pub total_spend: f64,
    pub case_count: Option<i32>,
    pub display_order: Option<i32>,
}

/// Drill-down: hospitals discharging patients into this category's care.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDischargingHospital {
    pub id: i64,
    pub cost_category_id: i64,
    pub hospital_name: String,
    pub discharges: i32,
    pub total_spend: Option<f64>,
    pub display_order: Option<i32>,
}

/// Two-tier category ordering: ascending `display_order` only when both
/// sides carry one, otherwise worst absolute spending variance first. This
/// is a pairwise rule, not a single global sort key; apply it with a stable
/// sort so equal pairs keep their fetch order.
pub fn cmp_categories(a: &CostCategory, b: &CostCategory) -> Ordering {
    match (a.display_order, b.display_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => b
            .spending_variance_amount
            .abs()
            .total_cmp(&a.spending_variance_amount.abs()),
    }
}

/// Descending with `None` sorting after every `Some`.
pub fn cmp_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Recommendation listing order: priority rank ascending, then estimated
/// savings descending with nulls last.
pub fn cmp_priority_then_savings(
    a_priority: Priority,
    a_savings: Option<f64>,
    b_priority: Priority,
    b_savings: Option<f64>,
) -> Ordering {
    a_priority
        .rank()
        .cmp(&b_priority.rank())
        .then_with(|| cmp_desc_nulls_last(a_savings, b_savings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(display_order: Option<i32>, variance: f64) -> CostCategory {
        CostCategory {
            id: 0,
            slug: "x".into(),
            category_name: "X".into(),
            period_id: 1,
            spending_pmpm_actual: 0.0,
            spending_pmpm_benchmark: 0.0,
            spending_variance_amount: variance,
            spending_variance_percent: 0.0,
            utilization_actual: None,
            utilization_benchmark: None,
            utilization_variance_percent: None,
            utilization_unit: None,
            performance_status: PerformanceStatus::Yellow,
            is_opportunity: false,
            is_strength: false,
            aco_rank: None,
            total_categories: None,
            description: None,
            display_order,
        }
    }

    #[test]
    fn category_order_uses_display_order_when_both_present() {
        let first = category(Some(1), -5.0);
        let second = category(Some(2), 5_000_000.0);
        assert_eq!(cmp_categories(&first, &second), Ordering::Less);
        assert_eq!(cmp_categories(&second, &first), Ordering::Greater);
    }

    #[test]
    fn category_order_falls_back_to_abs_variance_on_one_sided_null() {
        let ordered = category(Some(1), -5.0);
        let unordered = category(None, 50.0);
        // |50| > |-5|, so the row without a display order sorts first.
        assert_eq!(cmp_categories(&ordered, &unordered), Ordering::Greater);
        assert_eq!(cmp_categories(&unordered, &ordered), Ordering::Less);
    }

    #[test]
    fn category_order_falls_back_when_both_null() {
        let big = category(None, -400.0);
        let small = category(None, 90.0);
        assert_eq!(cmp_categories(&big, &small), Ordering::Less);
    }

    #[test]
    fn stable_sort_with_category_comparator_matches_expected_sequence() {
        let mut rows = vec![
            category(None, 50.0),
            category(Some(2), 1.0),
            category(Some(1), -5.0),
            category(None, -75.0),
        ];
        rows.sort_by(cmp_categories);
        let orders: Vec<Option<i32>> = rows.iter().map(|c| c.display_order).collect();
        // Mixed-null pairs compare on |variance|, so the -75 row leads.
        assert_eq!(orders, vec![None, None, Some(1), Some(2)]);
        assert_eq!(rows[0].spending_variance_amount, -75.0);
    }

    #[test]
    fn priority_rank_orders_high_before_low() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn priority_then_savings_puts_nulls_last_within_a_rank() {
        let a = cmp_priority_then_savings(Priority::High, Some(100.0), Priority::High, None);
        assert_eq!(a, Ordering::Less);
        let b = cmp_priority_then_savings(Priority::Low, Some(9e9), Priority::High, None);
        assert_eq!(b, Ordering::Greater);
    }

    #[test]
    fn status_parse_round_trips_known_values_and_rejects_unknown() {
        for status in RecommendationStatus::ALL {
            assert_eq!(RecommendationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecommendationStatus::parse("bogus_status"), None);
        assert_eq!(RecommendationStatus::parse("NOT_STARTED"), None);
    }

    #[test]
    fn transition_graph_allows_documented_moves() {
        use RecommendationStatus::*;
        assert!(NotStarted.can_transition(Acknowledged));
        assert!(NotStarted.can_transition(Accepted));
        assert!(NotStarted.can_transition(Rejected));
        assert!(Acknowledged.can_transition(NotStarted));
        assert!(Accepted.can_transition(InProgress));
        assert!(InProgress.can_transition(Completed));
    }

    #[test]
    fn transition_graph_blocks_terminal_states() {
        use RecommendationStatus::*;
        for next in RecommendationStatus::ALL {
            assert!(!Completed.can_transition(next));
            assert!(!Rejected.can_transition(next));
            assert!(!AlreadyDoing.can_transition(next));
        }
        assert!(Completed.is_terminal());
        assert!(!InProgress.is_terminal());
    }

    #[test]
    fn api_shapes_serialize_camel_case() {
        let period = PerformancePeriod {
            id: 1,
            period_key: "ytd".into(),
            label: "Year to Date".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
            is_active: true,
        };
        let value = serde_json::to_value(&period).unwrap();
        assert!(value.get("periodKey").is_some());
        assert!(value.get("isActive").is_some());
        assert!(value.get("period_key").is_none());

        let json = serde_json::to_value(category(Some(3), 12.5)).unwrap();
        assert!(json.get("spendingVarianceAmount").is_some());
        assert_eq!(json["performanceStatus"], "yellow");
    }

    #[test]
    fn enum_values_serialize_as_storage_strings() {
        assert_eq!(
            serde_json::to_value(RecommendationStatus::InProgress).unwrap(),
            "in_progress"
        );
        assert_eq!(
            serde_json::to_value(ResourceType::BestPractice).unwrap(),
            "best_practice"
        );
        assert_eq!(serde_json::to_value(OpportunityType::Overspending).unwrap(), "overspending");
        assert_eq!(serde_json::to_value(ChangeDirection::Down).unwrap(), "down");
    }
}
