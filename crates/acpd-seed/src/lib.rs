//! Baseline dataset and the idempotent reset engine.
//!
//! The canonical dashboard dataset ships inside the binary as YAML. A reset
//! wipes every table in leaf-to-root order and repopulates it from the
//! baseline inside a single transaction, so readers only ever observe the
//! old dataset or the new one.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use acpd_core::{
    ChangeDirection, OpportunityType, PerformanceStatus, Priority, RecommendationCostCategory,
    ResourceType,
};
use acpd_store::{StoreError, StoreResult};

pub const CRATE_NAME: &str = "acpd-seed";

pub const BASELINE_VERSION: u32 = 1;

/// Canonical dataset compiled into the binary; `--baseline` swaps in a file.
const BUILTIN_BASELINE: &str = include_str!("../baseline.yaml");

/// Tables in leaf-to-root order. Every foreign key in the schema is RESTRICT,
/// so deleting out of this order fails loudly instead of cascading.
pub const RESET_DELETE_ORDER: [&str; 11] = [
    "program_resources",
    "recommendation_cost_categories",
    "cost_opportunities",
    "category_hospitals",
    "category_drgs",
    "category_discharging_hospitals",
    "efficiency_kpis",
    "recommendations",
    "cost_categories",
    "performance_metrics",
    "performance_periods",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Baseline {
    pub version: u32,
    pub periods: Vec<PeriodSeed>,
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub opportunities: Vec<OpportunitySeed>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationSeed>,
    #[serde(default)]
    pub kpis: Vec<KpiSeed>,
    #[serde(default)]
    pub drilldowns: Vec<DrilldownSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodSeed {
    pub period_key: String,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_active: bool,
    pub member_months: f64,
    #[serde(default = "default_drift")]
    pub drift: f64,
    #[serde(default)]
    pub metrics: Vec<MetricSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricSeed {
    pub metric_type: String,
    pub current_value: f64,
    #[serde(default)]
    pub previous_value: Option<f64>,
    #[serde(default)]
    pub benchmark_value: Option<f64>,
    #[serde(default = "default_display_format")]
    pub display_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySeed {
    pub slug: String,
    pub category_name: String,
    pub spending_pmpm_actual: f64,
    pub spending_pmpm_benchmark: f64,
    #[serde(default)]
    pub utilization: Option<UtilizationSeed>,
    pub performance_status: String,
    #[serde(default)]
    pub is_opportunity: bool,
    #[serde(default)]
    pub is_strength: bool,
    #[serde(default)]
    pub aco_rank: Option<i32>,
    #[serde(default)]
    pub total_categories: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtilizationSeed {
    pub actual: f64,
    pub benchmark: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpportunitySeed {
    pub category_slug: String,
    pub opportunity_type: String,
    #[serde(default = "default_true")]
    pub show_on_dashboard: bool,
    #[serde(default)]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationSeed {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub priority: String,
    #[serde(default)]
    pub is_measurable: bool,
    #[serde(default)]
    pub estimated_savings: Option<f64>,
    #[serde(default)]
    pub affected_lives: Option<i32>,
    #[serde(default)]
    pub implementation_complexity: Option<String>,
    #[serde(default)]
    pub patient_cohort: Option<String>,
    #[serde(default)]
    pub cohort_size: Option<i32>,
    #[serde(default)]
    pub has_program_details: bool,
    #[serde(default)]
    pub program_overview: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub can_convert_to_workflow: bool,
    #[serde(default)]
    pub workflow_type: Option<String>,
    #[serde(default)]
    pub affected_categories: Vec<LinkageSeed>,
    #[serde(default)]
    pub resources: Vec<ResourceSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkageSeed {
    pub category_slug: String,
    #[serde(default)]
    pub impact_amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSeed {
    pub resource_type: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub display_order: Option<i32>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiSeed {
    pub kpi_type: String,
    pub kpi_label: String,
    pub actual_value: f64,
    #[serde(default)]
    pub aco_benchmark: Option<f64>,
    #[serde(default)]
    pub milliman_benchmark: Option<f64>,
    pub performance_status: String,
    #[serde(default = "default_display_format")]
    pub display_format: String,
    #[serde(default)]
    pub display_order: Option<i32>,
    #[serde(default)]
    pub aco_rank: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrilldownSeed {
    pub category_slug: String,
    #[serde(default)]
    pub hospitals: Vec<HospitalSeed>,
    #[serde(default)]
    pub drgs: Vec<DrgSeed>,
    #[serde(default)]
    pub discharging_hospitals: Vec<DischargingSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HospitalSeed {
    pub hospital_name: String,
    pub spend: f64,
    #[serde(default)]
    pub case_count: Option<i32>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrgSeed {
    pub drg_code: String,
    pub drg_description: String,
    pub total_spend: f64,
    #[serde(default)]
    pub case_count: Option<i32>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DischargingSeed {
    pub hospital_name: String,
    pub discharges: i32,
    #[serde(default)]
    pub total_spend: Option<f64>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

fn default_drift() -> f64 {
    1.0
}

fn default_display_format() -> String {
    "number".to_string()
}

fn default_true() -> bool {
    true
}

impl Baseline {
    /// The compiled-in dataset. Parsing can only fail if the shipped YAML is
    /// broken, which the unit tests catch before release.
    pub fn builtin() -> StoreResult<Self> {
        let baseline: Baseline = serde_yaml::from_str(BUILTIN_BASELINE)
            .map_err(|err| StoreError::Validation(format!("builtin baseline: {err}")))?;
        baseline.validate()?;
        Ok(baseline)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let baseline: Baseline =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        baseline
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(baseline)
    }

    pub fn category(&self, slug: &str) -> Option<&CategorySeed> {
        self.categories.iter().find(|c| c.slug == slug)
    }

    pub fn active_period(&self) -> Option<&PeriodSeed> {
        self.periods.iter().find(|p| p.is_active)
    }

    /// Structural checks that must hold before any row is written: exactly
    /// one active period, unique keys, known enum spellings, and every slug
    /// reference resolving to a defined category.
    pub fn validate(&self) -> StoreResult<()> {
        if self.version != BASELINE_VERSION {
            return Err(StoreError::Validation(format!(
                "unsupported baseline version {} (expected {BASELINE_VERSION})",
                self.version
            )));
        }
        if self.periods.is_empty() {
            return Err(StoreError::Validation("baseline defines no periods".into()));
        }
        let active = self.periods.iter().filter(|p| p.is_active).count();
        if active != 1 {
            return Err(StoreError::Validation(format!(
                "baseline must mark exactly one active period, found {active}"
            )));
        }

        let mut period_keys = BTreeSet::new();
        for period in &self.periods {
            if !period_keys.insert(period.period_key.as_str()) {
                return Err(StoreError::Validation(format!(
                    "duplicate period key '{}'",
                    period.period_key
                )));
            }
            if period.end_date < period.start_date {
                return Err(StoreError::Validation(format!(
                    "period '{}' ends before it starts",
                    period.period_key
                )));
            }
            if period.member_months <= 0.0 || period.drift <= 0.0 {
                return Err(StoreError::Validation(format!(
                    "period '{}' needs positive member_months and drift",
                    period.period_key
                )));
            }
            let mut metric_types = BTreeSet::new();
            for metric in &period.metrics {
                if !metric_types.insert(metric.metric_type.as_str()) {
                    return Err(StoreError::Validation(format!(
                        "period '{}' repeats metric '{}'",
                        period.period_key, metric.metric_type
                    )));
                }
            }
        }

        let mut slugs = BTreeSet::new();
        let mut display_orders = BTreeSet::new();
        for category in &self.categories {
            if !slugs.insert(category.slug.as_str()) {
                return Err(StoreError::Validation(format!(
                    "duplicate category slug '{}'",
                    category.slug
                )));
            }
            if PerformanceStatus::parse(&category.performance_status).is_none() {
                return Err(StoreError::Validation(format!(
                    "category '{}' has unknown performance_status '{}'",
                    category.slug, category.performance_status
                )));
            }
            if category.spending_pmpm_benchmark <= 0.0 {
                return Err(StoreError::Validation(format!(
                    "category '{}' needs a positive spending benchmark",
                    category.slug
                )));
            }
            if let Some(order) = category.display_order {
                if !display_orders.insert(order) {
                    return Err(StoreError::Validation(format!(
                        "category '{}' repeats display_order {order}",
                        category.slug
                    )));
                }
            }
        }

        for opportunity in &self.opportunities {
            let category = self.category(&opportunity.category_slug).ok_or_else(|| {
                StoreError::Validation(format!(
                    "opportunity references unknown category '{}'",
                    opportunity.category_slug
                ))
            })?;
            let kind = OpportunityType::parse(&opportunity.opportunity_type).ok_or_else(|| {
                StoreError::Validation(format!(
                    "opportunity for '{}' has unknown type '{}'",
                    opportunity.category_slug, opportunity.opportunity_type
                ))
            })?;
            let flagged = match kind {
                OpportunityType::Overspending => category.is_opportunity,
                OpportunityType::Efficient => category.is_strength,
            };
            if !flagged {
                return Err(StoreError::Validation(format!(
                    "category '{}' is not flagged for {} opportunities",
                    category.slug,
                    kind.as_str()
                )));
            }
        }

        for recommendation in &self.recommendations {
            if Priority::parse(&recommendation.priority).is_none() {
                return Err(StoreError::Validation(format!(
                    "recommendation '{}' has unknown priority '{}'",
                    recommendation.title, recommendation.priority
                )));
            }
            if !recommendation.has_program_details && !recommendation.resources.is_empty() {
                return Err(StoreError::Validation(format!(
                    "recommendation '{}' carries resources without program details",
                    recommendation.title
                )));
            }
            for linkage in &recommendation.affected_categories {
                if self.category(&linkage.category_slug).is_none() {
                    return Err(StoreError::Validation(format!(
                        "recommendation '{}' links unknown category '{}'",
                        recommendation.title, linkage.category_slug
                    )));
                }
            }
            for resource in &recommendation.resources {
                if ResourceType::parse(&resource.resource_type).is_none() {
                    return Err(StoreError::Validation(format!(
                        "recommendation '{}' has unknown resource_type '{}'",
                        recommendation.title, resource.resource_type
                    )));
                }
            }
        }

        for kpi in &self.kpis {
            if PerformanceStatus::parse(&kpi.performance_status).is_none() {
                return Err(StoreError::Validation(format!(
                    "kpi '{}' has unknown performance_status '{}'",
                    kpi.kpi_type, kpi.performance_status
                )));
            }
        }

        let mut drilldown_slugs = BTreeSet::new();
        for drilldown in &self.drilldowns {
            if self.category(&drilldown.category_slug).is_none() {
                return Err(StoreError::Validation(format!(
                    "drilldown references unknown category '{}'",
                    drilldown.category_slug
                )));
            }
            if !drilldown_slugs.insert(drilldown.category_slug.as_str()) {
                return Err(StoreError::Validation(format!(
                    "duplicate drilldown for category '{}'",
                    drilldown.category_slug
                )));
            }
        }

        Ok(())
    }
}

/// Spending figures for one category in one period. Actuals scale with the
/// period's drift factor; benchmarks are fixed reference values.
#[derive(Debug, Clone, Copy)]
pub struct CategoryFigures {
    pub pmpm_actual: f64,
    pub pmpm_benchmark: f64,
    pub variance_amount: f64,
    pub variance_percent: f64,
    pub utilization_actual: Option<f64>,
    pub utilization_benchmark: Option<f64>,
    pub utilization_variance_percent: Option<f64>,
}

impl CategorySeed {
    pub fn figures_for(&self, period: &PeriodSeed) -> CategoryFigures {
        let pmpm_actual = round2(self.spending_pmpm_actual * period.drift);
        let pmpm_benchmark = self.spending_pmpm_benchmark;
        let variance_amount = round2((pmpm_actual - pmpm_benchmark) * period.member_months);
        let variance_percent = round1((pmpm_actual - pmpm_benchmark) / pmpm_benchmark * 100.0);
        let (utilization_actual, utilization_benchmark, utilization_variance_percent) =
            match &self.utilization {
                Some(utilization) if utilization.benchmark != 0.0 => {
                    let actual = round1(utilization.actual * period.drift);
                    let variance =
                        round1((actual - utilization.benchmark) / utilization.benchmark * 100.0);
                    (Some(actual), Some(utilization.benchmark), Some(variance))
                }
                Some(utilization) => {
                    let actual = round1(utilization.actual * period.drift);
                    (Some(actual), Some(utilization.benchmark), None)
                }
                None => (None, None, None),
            };
        CategoryFigures {
            pmpm_actual,
            pmpm_benchmark,
            variance_amount,
            variance_percent,
            utilization_actual,
            utilization_benchmark,
            utilization_variance_percent,
        }
    }
}

/// Percent change and direction relative to the previous value. Equal values
/// report zero change with no direction; a missing or zero previous value
/// reports neither.
pub fn metric_change(current: f64, previous: Option<f64>) -> (Option<f64>, Option<ChangeDirection>) {
    match previous {
        Some(prev) if prev != 0.0 => {
            let percent = round1((current - prev) / prev * 100.0);
            let direction = if current > prev {
                Some(ChangeDirection::Up)
            } else if current < prev {
                Some(ChangeDirection::Down)
            } else {
                None
            };
            (Some(percent), direction)
        }
        _ => (None, None),
    }
}

pub fn kpi_variance(actual: f64, benchmark: Option<f64>) -> Option<f64> {
    match benchmark {
        Some(bench) if bench != 0.0 => Some(round1((actual - bench) / bench * 100.0)),
        _ => None,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub periods_created: usize,
    pub metrics_created: usize,
    pub categories_created: usize,
    pub opportunities_created: usize,
    pub recommendations_created: usize,
    pub resources_created: usize,
    pub kpis_created: usize,
    pub drilldown_rows_created: usize,
}

/// Wipes the dashboard tables and repopulates them from `baseline`, all in
/// one transaction, so concurrent readers observe either the old dataset or
/// the new one. Takes no internal lock: concurrent resets are unsupported,
/// and the caller must serialize this administrative operation. A sweep that
/// interleaves with another writer's commit aborts on the RESTRICT keys.
pub async fn reset_to_baseline(pool: &PgPool, baseline: &Baseline) -> StoreResult<ResetSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("baseline_reset", %run_id);
    run_reset(pool, baseline, run_id).instrument(span).await
}

async fn run_reset(pool: &PgPool, baseline: &Baseline, run_id: Uuid) -> StoreResult<ResetSummary> {
    baseline.validate()?;

    let started_at = Utc::now();
    info!(
        periods = baseline.periods.len(),
        categories = baseline.categories.len(),
        recommendations = baseline.recommendations.len(),
        "starting baseline reset"
    );

    let mut tx = pool.begin().await?;

    for table in RESET_DELETE_ORDER {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }

    let mut metrics_created = 0usize;
    let mut categories_created = 0usize;
    let mut opportunities_created = 0usize;
    let mut kpis_created = 0usize;
    let mut drilldown_rows_created = 0usize;
    let mut active_category_ids: HashMap<String, i64> = HashMap::new();

    for period in &baseline.periods {
        let period_id = insert_period(&mut tx, period).await?;
        metrics_created += insert_metrics(&mut tx, period_id, period).await?;

        let category_ids = insert_categories(&mut tx, period_id, period, baseline).await?;
        categories_created += category_ids.len();

        opportunities_created +=
            insert_opportunities(&mut tx, period_id, period, baseline, &category_ids).await?;
        kpis_created += insert_kpis(&mut tx, period_id, baseline).await?;

        if period.is_active {
            drilldown_rows_created += insert_drilldowns(&mut tx, baseline, &category_ids).await?;
            active_category_ids = category_ids;
        }
    }

    let mut resources_created = 0usize;
    for recommendation in &baseline.recommendations {
        resources_created +=
            insert_recommendation(&mut tx, recommendation, &active_category_ids).await?;
    }

    tx.commit().await?;

    let finished_at = Utc::now();
    let summary = ResetSummary {
        run_id,
        started_at,
        finished_at,
        periods_created: baseline.periods.len(),
        metrics_created,
        categories_created,
        opportunities_created,
        recommendations_created: baseline.recommendations.len(),
        resources_created,
        kpis_created,
        drilldown_rows_created,
    };
    info!(
        periods = summary.periods_created,
        categories = summary.categories_created,
        recommendations = summary.recommendations_created,
        "baseline reset complete"
    );
    Ok(summary)
}

async fn insert_period(
    tx: &mut Transaction<'_, Postgres>,
    period: &PeriodSeed,
) -> StoreResult<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO performance_periods (period_key, label, start_date, end_date, is_active)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(&period.period_key)
    .bind(&period.label)
    .bind(period.start_date)
    .bind(period.end_date)
    .bind(period.is_active)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

async fn insert_metrics(
    tx: &mut Transaction<'_, Postgres>,
    period_id: i64,
    period: &PeriodSeed,
) -> StoreResult<usize> {
    for metric in &period.metrics {
        let (change_percent, change_direction) =
            metric_change(metric.current_value, metric.previous_value);
        let is_above_benchmark =
            matches!(metric.benchmark_value, Some(bench) if metric.current_value > bench);
        sqlx::query(
            "INSERT INTO performance_metrics
                 (period_id, metric_type, current_value, previous_value, change_percent,
                  change_direction, benchmark_value, is_above_benchmark, display_format)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(period_id)
        .bind(&metric.metric_type)
        .bind(metric.current_value)
        .bind(metric.previous_value)
        .bind(change_percent)
        .bind(change_direction.map(ChangeDirection::as_str))
        .bind(metric.benchmark_value)
        .bind(is_above_benchmark)
        .bind(&metric.display_format)
        .execute(&mut **tx)
        .await?;
    }
    Ok(period.metrics.len())
}

async fn insert_categories(
    tx: &mut Transaction<'_, Postgres>,
    period_id: i64,
    period: &PeriodSeed,
    baseline: &Baseline,
) -> StoreResult<HashMap<String, i64>> {
    let mut ids = HashMap::with_capacity(baseline.categories.len());
    for category in &baseline.categories {
        let figures = category.figures_for(period);
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO cost_categories
                 (slug, category_name, period_id,
                  spending_pmpm_actual, spending_pmpm_benchmark,
                  spending_variance_amount, spending_variance_percent,
                  utilization_actual, utilization_benchmark,
                  utilization_variance_percent, utilization_unit,
                  performance_status, is_opportunity, is_strength,
                  aco_rank, total_categories, description, display_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                     $11, $12, $13, $14, $15, $16, $17, $18)
             RETURNING id",
        )
        .bind(&category.slug)
        .bind(&category.category_name)
        .bind(period_id)
        .bind(figures.pmpm_actual)
        .bind(figures.pmpm_benchmark)
        .bind(figures.variance_amount)
        .bind(figures.variance_percent)
        .bind(figures.utilization_actual)
        .bind(figures.utilization_benchmark)
        .bind(figures.utilization_variance_percent)
        .bind(category.utilization.as_ref().map(|u| u.unit.as_str()))
        .bind(&category.performance_status)
        .bind(category.is_opportunity)
        .bind(category.is_strength)
        .bind(category.aco_rank)
        .bind(category.total_categories)
        .bind(category.description.as_deref())
        .bind(category.display_order)
        .fetch_one(&mut **tx)
        .await?;
        ids.insert(category.slug.clone(), id);
    }
    Ok(ids)
}

async fn insert_opportunities(
    tx: &mut Transaction<'_, Postgres>,
    period_id: i64,
    period: &PeriodSeed,
    baseline: &Baseline,
    category_ids: &HashMap<String, i64>,
) -> StoreResult<usize> {
    for opportunity in &baseline.opportunities {
        let category = baseline
            .category(&opportunity.category_slug)
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "opportunity references unknown category '{}'",
                    opportunity.category_slug
                ))
            })?;
        let category_id = category_ids.get(&opportunity.category_slug).ok_or_else(|| {
            StoreError::Validation(format!(
                "no category row for slug '{}'",
                opportunity.category_slug
            ))
        })?;
        let figures = category.figures_for(period);
        sqlx::query(
            "INSERT INTO cost_opportunities
                 (period_id, cost_category_id, opportunity_type,
                  amount_variance, percent_variance, aco_rank,
                  display_order, show_on_dashboard)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(period_id)
        .bind(category_id)
        .bind(&opportunity.opportunity_type)
        .bind(figures.variance_amount)
        .bind(figures.variance_percent)
        .bind(category.aco_rank)
        .bind(opportunity.display_order)
        .bind(opportunity.show_on_dashboard)
        .execute(&mut **tx)
        .await?;
    }
    Ok(baseline.opportunities.len())
}

async fn insert_kpis(
    tx: &mut Transaction<'_, Postgres>,
    period_id: i64,
    baseline: &Baseline,
) -> StoreResult<usize> {
    for kpi in &baseline.kpis {
        sqlx::query(
            "INSERT INTO efficiency_kpis
                 (period_id, kpi_type, kpi_label, actual_value,
                  aco_benchmark, milliman_benchmark, variance_percent,
                  performance_status, display_format, display_order, aco_rank)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(period_id)
        .bind(&kpi.kpi_type)
        .bind(&kpi.kpi_label)
        .bind(kpi.actual_value)
        .bind(kpi.aco_benchmark)
        .bind(kpi.milliman_benchmark)
        .bind(kpi_variance(kpi.actual_value, kpi.aco_benchmark))
        .bind(&kpi.performance_status)
        .bind(&kpi.display_format)
        .bind(kpi.display_order)
        .bind(kpi.aco_rank)
        .execute(&mut **tx)
        .await?;
    }
    Ok(baseline.kpis.len())
}

async fn insert_drilldowns(
    tx: &mut Transaction<'_, Postgres>,
    baseline: &Baseline,
    category_ids: &HashMap<String, i64>,
) -> StoreResult<usize> {
    let mut rows = 0usize;
    for drilldown in &baseline.drilldowns {
        let category_id = category_ids.get(&drilldown.category_slug).ok_or_else(|| {
            StoreError::Validation(format!(
                "drilldown references unknown category '{}'",
                drilldown.category_slug
            ))
        })?;

        for hospital in &drilldown.hospitals {
            sqlx::query(
                "INSERT INTO category_hospitals
                     (cost_category_id, hospital_name, spend, case_count, display_order)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(category_id)
            .bind(&hospital.hospital_name)
            .bind(hospital.spend)
            .bind(hospital.case_count)
            .bind(hospital.display_order)
            .execute(&mut **tx)
            .await?;
            rows += 1;
        }

        for drg in &drilldown.drgs {
            sqlx::query(
                "INSERT INTO category_drgs
                     (cost_category_id, drg_code, drg_description,
                      total_spend, case_count, display_order)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(category_id)
            .bind(&drg.drg_code)
            .bind(&drg.drg_description)
            .bind(drg.total_spend)
            .bind(drg.case_count)
            .bind(drg.display_order)
            .execute(&mut **tx)
            .await?;
            rows += 1;
        }

        for discharging in &drilldown.discharging_hospitals {
            sqlx::query(
                "INSERT INTO category_discharging_hospitals
                     (cost_category_id, hospital_name, discharges, total_spend, display_order)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(category_id)
            .bind(&discharging.hospital_name)
            .bind(discharging.discharges)
            .bind(discharging.total_spend)
            .bind(discharging.display_order)
            .execute(&mut **tx)
            .await?;
            rows += 1;
        }
    }
    Ok(rows)
}

// Status is omitted on purpose: freshly seeded recommendations fall back to
// the schema default 'not_started'. Linkages resolve against the active
// period's category rows.
async fn insert_recommendation(
    tx: &mut Transaction<'_, Postgres>,
    recommendation: &RecommendationSeed,
    active_category_ids: &HashMap<String, i64>,
) -> StoreResult<usize> {
    let recommendation_id: i64 = sqlx::query_scalar(
        "INSERT INTO recommendations
             (title, description, priority, is_measurable, estimated_savings,
              affected_lives, implementation_complexity, patient_cohort,
              cohort_size, has_program_details, program_overview, video_url,
              can_convert_to_workflow, workflow_type)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         RETURNING id",
    )
    .bind(&recommendation.title)
    .bind(recommendation.description.as_deref())
    .bind(&recommendation.priority)
    .bind(recommendation.is_measurable)
    .bind(recommendation.estimated_savings)
    .bind(recommendation.affected_lives)
    .bind(recommendation.implementation_complexity.as_deref())
    .bind(recommendation.patient_cohort.as_deref())
    .bind(recommendation.cohort_size)
    .bind(recommendation.has_program_details)
    .bind(recommendation.program_overview.as_deref())
    .bind(recommendation.video_url.as_deref())
    .bind(recommendation.can_convert_to_workflow)
    .bind(recommendation.workflow_type.as_deref())
    .fetch_one(&mut **tx)
    .await?;

    for linkage in &recommendation.affected_categories {
        let category_id = active_category_ids.get(&linkage.category_slug).ok_or_else(|| {
            StoreError::Validation(format!(
                "recommendation '{}' links category '{}' missing from the active period",
                recommendation.title, linkage.category_slug
            ))
        })?;
        let link = RecommendationCostCategory {
            recommendation_id,
            cost_category_id: *category_id,
            impact_amount: linkage.impact_amount,
        };
        sqlx::query(
            "INSERT INTO recommendation_cost_categories
                 (recommendation_id, cost_category_id, impact_amount)
             VALUES ($1, $2, $3)",
        )
        .bind(link.recommendation_id)
        .bind(link.cost_category_id)
        .bind(link.impact_amount)
        .execute(&mut **tx)
        .await?;
    }

    for resource in &recommendation.resources {
        sqlx::query(
            "INSERT INTO program_resources
                 (recommendation_id, resource_type, title, content,
                  display_order, author, author_role)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(recommendation_id)
        .bind(&resource.resource_type)
        .bind(&resource.title)
        .bind(&resource.content)
        .bind(resource.display_order)
        .bind(resource.author.as_deref())
        .bind(resource.author_role.as_deref())
        .execute(&mut **tx)
        .await?;
    }

    Ok(recommendation.resources.len())
}
