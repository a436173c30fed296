//! Read and update operations behind the dashboard API.
//!
//! Every reader resolves a performance period first (named, or the active
//! one) and then works within that period's rows. Ordering rules are pure
//! comparators in `acpd-core`; readers fetch in id order and apply them with
//! a stable sort, so ties keep insertion order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Row};
use tracing::{info, warn};

use acpd_core::{
    cmp_categories, cmp_priority_then_savings, CategoryDischargingHospital, CategoryDrg,
    CategoryHospital, CostCategory, CostOpportunity, EfficiencyKpi, OpportunityType,
    PerformanceMetric, PerformancePeriod, PerformanceStatus, Priority, ProgramResource,
    Recommendation, RecommendationStatus, ResourceType,
};
use acpd_store::{
    CategoryRow, DischargingHospitalRow, DrgRow, HospitalRow, KpiRow, MetricRow, OpportunityRow,
    PeriodRow, ProgramResourceRow, RecommendationRow, StoreError, StoreResult,
};

pub const CRATE_NAME: &str = "acpd-insights";

/// Listing rows attach at most this many affected categories; the detail
/// view is unlimited.
const LIST_AFFECTED_LIMIT: i64 = 3;

const RECOMMENDATION_COLUMNS: &str =
    "id, title, description, status, priority, is_measurable, estimated_savings, \
     affected_lives, implementation_complexity, patient_cohort, cohort_size, \
     has_program_details, program_overview, video_url, can_convert_to_workflow, \
     workflow_type, created_at, updated_at, status_changed_at, status_changed_by";

const CATEGORY_COLUMNS: &str =
    "id, slug, category_name, period_id, spending_pmpm_actual, spending_pmpm_benchmark, \
     spending_variance_amount, spending_variance_percent, utilization_actual, \
     utilization_benchmark, utilization_variance_percent, utilization_unit, \
     performance_status, is_opportunity, is_strength, aco_rank, total_categories, \
     description, display_order";

#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    pub period: Option<String>,
    pub slug: Option<String>,
    pub status: Option<PerformanceStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationFilter {
    pub status: Option<RecommendationStatus>,
    pub priority: Option<Priority>,
}

/// The category listing: the resolved period plus its categories in
/// dashboard order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListing {
    pub period: PerformancePeriod,
    pub categories: Vec<CostCategory>,
}

/// One category with its linked recommendations and whatever drill-down
/// lists it has rows for. Empty drill-down lists are omitted from the
/// payload entirely, never sent as `[]`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: CostCategory,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospitals: Option<Vec<CategoryHospital>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drgs: Option<Vec<CategoryDrg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discharging_hospitals: Option<Vec<CategoryDischargingHospital>>,
}

/// Opportunity joined with its category's display fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityCard {
    #[serde(flatten)]
    pub opportunity: CostOpportunity,
    pub slug: String,
    pub category_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedCategory {
    pub cost_category_id: i64,
    pub period_id: i64,
    pub slug: String,
    pub category_name: String,
    pub impact_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSummary {
    #[serde(flatten)]
    pub recommendation: Recommendation,
    pub affected_categories: Vec<AffectedCategory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInsights {
    pub period: PerformancePeriod,
    pub metrics: Vec<PerformanceMetric>,
    pub overspending: Vec<OpportunityCard>,
    pub efficient: Vec<OpportunityCard>,
    pub kpis: Vec<EfficiencyKpi>,
    pub top_recommendations: Vec<RecommendationSummary>,
}

/// Full recommendation view. Program resources appear as three named
/// buckets, present only when the recommendation has program details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationDetail {
    #[serde(flatten)]
    pub recommendation: Recommendation,
    pub affected_categories: Vec<AffectedCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_practices: Option<Vec<ProgramResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testimonials: Option<Vec<ProgramResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_steps: Option<Vec<ProgramResource>>,
    pub allowed_next: Vec<RecommendationStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: i64,
    pub previous_status: RecommendationStatus,
    pub status: RecommendationStatus,
    pub transition_valid: bool,
    pub status_changed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
}

/// Resolves `period` to a stored period row: the named key when given,
/// otherwise the active period (most recently created wins if the flag is
/// ever duplicated out-of-band).
pub async fn resolve_period(
    pool: &PgPool,
    period: Option<&str>,
) -> StoreResult<PerformancePeriod> {
    let row: Option<PeriodRow> = match period {
        Some(key) => {
            sqlx::query_as(
                "SELECT id, period_key, label, start_date, end_date, is_active, created_at
                   FROM performance_periods
                  WHERE period_key = $1",
            )
            .bind(key)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, period_key, label, start_date, end_date, is_active, created_at
                   FROM performance_periods
                  WHERE is_active
                  ORDER BY created_at DESC, id DESC
                  LIMIT 1",
            )
            .fetch_optional(pool)
            .await?
        }
    };

    match row {
        Some(row) => Ok(row.into_domain()),
        None => Err(StoreError::NotFound(match period {
            Some(key) => format!("performance period '{key}'"),
            None => "active performance period".to_string(),
        })),
    }
}

/// Categories for one period, optionally narrowed by status, in dashboard
/// order: `display_order` when both sides of a comparison carry one, worst
/// absolute spending variance first otherwise.
pub async fn list_cost_categories(
    pool: &PgPool,
    filter: &CategoryFilter,
) -> StoreResult<CategoryListing> {
    let period = resolve_period(pool, filter.period.as_deref()).await?;

    let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
        "SELECT {CATEGORY_COLUMNS}
           FROM cost_categories
          WHERE period_id = $1
            AND ($2::text IS NULL OR slug = $2)
            AND ($3::text IS NULL OR performance_status = $3)
          ORDER BY id",
    ))
    .bind(period.id)
    .bind(filter.slug.as_deref())
    .bind(filter.status.map(PerformanceStatus::as_str))
    .fetch_all(pool)
    .await?;

    let mut categories = rows
        .into_iter()
        .map(CategoryRow::into_domain)
        .collect::<StoreResult<Vec<_>>>()?;
    categories.sort_by(cmp_categories);

    Ok(CategoryListing { period, categories })
}

/// One category resolved by period and slug, with its non-rejected linked
/// recommendations and any populated drill-down lists.
pub async fn cost_category_detail(
    pool: &PgPool,
    period: Option<&str>,
    slug: &str,
) -> StoreResult<CategoryDetail> {
    let period = resolve_period(pool, period).await?;

    let row: Option<CategoryRow> = sqlx::query_as(&format!(
        "SELECT {CATEGORY_COLUMNS}
           FROM cost_categories
          WHERE period_id = $1
            AND slug = $2",
    ))
    .bind(period.id)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    let category = row
        .ok_or_else(|| {
            StoreError::NotFound(format!(
                "cost category '{slug}' in period '{}'",
                period.period_key
            ))
        })?
        .into_domain()?;

    let recommendations = linked_recommendations(pool, category.id).await?;

    let hospital_rows: Vec<HospitalRow> = sqlx::query_as(
        "SELECT id, cost_category_id, hospital_name, spend, case_count, display_order
           FROM category_hospitals
          WHERE cost_category_id = $1
          ORDER BY display_order, spend DESC, id",
    )
    .bind(category.id)
    .fetch_all(pool)
    .await?;

    let drg_rows: Vec<DrgRow> = sqlx::query_as(
        "SELECT id, cost_category_id, drg_code, drg_description, total_spend,
                case_count, display_order
           FROM category_drgs
          WHERE cost_category_id = $1
          ORDER BY display_order, total_spend DESC, id",
    )
    .bind(category.id)
    .fetch_all(pool)
    .await?;

    let discharging_rows: Vec<DischargingHospitalRow> = sqlx::query_as(
        "SELECT id, cost_category_id, hospital_name, discharges, total_spend, display_order
           FROM category_discharging_hospitals
          WHERE cost_category_id = $1
          ORDER BY display_order, discharges DESC, id",
    )
    .bind(category.id)
    .fetch_all(pool)
    .await?;

    Ok(CategoryDetail {
        category,
        recommendations,
        hospitals: some_when_nonempty(
            hospital_rows.into_iter().map(HospitalRow::into_domain).collect(),
        ),
        drgs: some_when_nonempty(drg_rows.into_iter().map(DrgRow::into_domain).collect()),
        discharging_hospitals: some_when_nonempty(
            discharging_rows
                .into_iter()
                .map(DischargingHospitalRow::into_domain)
                .collect(),
        ),
    })
}

/// The dashboard's summary view for one period: headline metrics in
/// insertion order, dashboard-visible opportunities split by type,
/// efficiency KPIs, and the two biggest open high-priority recommendations.
pub async fn performance_insights(
    pool: &PgPool,
    period: Option<&str>,
) -> StoreResult<PerformanceInsights> {
    let period = resolve_period(pool, period).await?;

    let metric_rows: Vec<MetricRow> = sqlx::query_as(
        "SELECT id, period_id, metric_type, current_value, previous_value, change_percent,
                change_direction, benchmark_value, is_above_benchmark, display_format
           FROM performance_metrics
          WHERE period_id = $1
          ORDER BY id",
    )
    .bind(period.id)
    .fetch_all(pool)
    .await?;
    let metrics = metric_rows
        .into_iter()
        .map(MetricRow::into_domain)
        .collect::<StoreResult<Vec<_>>>()?;

    let cards = opportunity_cards(pool, period.id).await?;
    let (overspending, efficient) = split_cards(cards);

    let kpi_rows: Vec<KpiRow> = sqlx::query_as(
        "SELECT id, period_id, kpi_type, kpi_label, actual_value, aco_benchmark,
                milliman_benchmark, variance_percent, performance_status, display_format,
                display_order, aco_rank
           FROM efficiency_kpis
          WHERE period_id = $1
          ORDER BY display_order, id",
    )
    .bind(period.id)
    .fetch_all(pool)
    .await?;
    let kpis = kpi_rows
        .into_iter()
        .map(KpiRow::into_domain)
        .collect::<StoreResult<Vec<_>>>()?;

    let top_rows: Vec<RecommendationRow> = sqlx::query_as(&format!(
        "SELECT {RECOMMENDATION_COLUMNS}
           FROM recommendations
          WHERE status <> 'rejected'
            AND priority = 'high'
          ORDER BY estimated_savings DESC NULLS LAST, id
          LIMIT 2",
    ))
    .fetch_all(pool)
    .await?;
    let mut top_recommendations = Vec::with_capacity(top_rows.len());
    for row in top_rows {
        let recommendation = row.into_domain()?;
        let affected_categories = affected_categories(pool, recommendation.id, None).await?;
        top_recommendations.push(RecommendationSummary {
            recommendation,
            affected_categories,
        });
    }

    Ok(PerformanceInsights {
        period,
        metrics,
        overspending,
        efficient,
        kpis,
        top_recommendations,
    })
}

/// Recommendations narrowed by status and/or priority, ordered by priority
/// rank and then estimated savings with nulls last. Each row carries up to
/// three affected categories by descending impact.
pub async fn list_recommendations(
    pool: &PgPool,
    filter: &RecommendationFilter,
) -> StoreResult<Vec<RecommendationSummary>> {
    let rows: Vec<RecommendationRow> = sqlx::query_as(&format!(
        "SELECT {RECOMMENDATION_COLUMNS}
           FROM recommendations
          WHERE ($1::text IS NULL OR status = $1)
            AND ($2::text IS NULL OR priority = $2)
          ORDER BY id",
    ))
    .bind(filter.status.map(RecommendationStatus::as_str))
    .bind(filter.priority.map(Priority::as_str))
    .fetch_all(pool)
    .await?;

    let mut recommendations = rows
        .into_iter()
        .map(RecommendationRow::into_domain)
        .collect::<StoreResult<Vec<_>>>()?;
    recommendations.sort_by(|a, b| {
        cmp_priority_then_savings(a.priority, a.estimated_savings, b.priority, b.estimated_savings)
    });

    let mut summaries = Vec::with_capacity(recommendations.len());
    for recommendation in recommendations {
        let affected_categories =
            affected_categories(pool, recommendation.id, Some(LIST_AFFECTED_LIMIT)).await?;
        summaries.push(RecommendationSummary {
            recommendation,
            affected_categories,
        });
    }
    Ok(summaries)
}

/// One recommendation with its full affected-category list, bucketed program
/// resources, and the advisory next statuses from the current one.
pub async fn recommendation_detail(pool: &PgPool, id: i64) -> StoreResult<RecommendationDetail> {
    let row: Option<RecommendationRow> = sqlx::query_as(&format!(
        "SELECT {RECOMMENDATION_COLUMNS}
           FROM recommendations
          WHERE id = $1",
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let recommendation = row
        .ok_or_else(|| StoreError::NotFound(format!("recommendation {id}")))?
        .into_domain()?;

    let affected_categories = affected_categories(pool, id, None).await?;

    let (best_practices, testimonials, implementation_steps) =
        if recommendation.has_program_details {
            let resource_rows: Vec<ProgramResourceRow> = sqlx::query_as(
                "SELECT id, recommendation_id, resource_type, title, content, display_order,
                        author, author_role
                   FROM program_resources
                  WHERE recommendation_id = $1
                  ORDER BY display_order, id",
            )
            .bind(id)
            .fetch_all(pool)
            .await?;
            let resources = resource_rows
                .into_iter()
                .map(ProgramResourceRow::into_domain)
                .collect::<StoreResult<Vec<_>>>()?;
            let (best, stories, steps) = bucket_resources(resources);
            (Some(best), Some(stories), Some(steps))
        } else {
            (None, None, None)
        };

    let allowed_next = allowed_transitions(recommendation.status);

    Ok(RecommendationDetail {
        recommendation,
        affected_categories,
        best_practices,
        testimonials,
        implementation_steps,
        allowed_next,
    })
}

/// Applies a status change unconditionally (last write wins) and reports
/// whether the change followed the advisory transition graph. Re-asserting
/// the current status counts as valid.
pub async fn update_status(
    pool: &PgPool,
    id: i64,
    next: RecommendationStatus,
    changed_by: Option<&str>,
) -> StoreResult<StatusChange> {
    let mut tx = pool.begin().await?;

    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM recommendations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let current = current.ok_or_else(|| StoreError::NotFound(format!("recommendation {id}")))?;
    let previous_status = RecommendationStatus::parse(&current).ok_or_else(|| {
        StoreError::Validation(format!(
            "unknown status value {current:?} on recommendations row {id}"
        ))
    })?;

    let (status_changed_at, updated_at): (DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
        "UPDATE recommendations
            SET status = $2,
                status_changed_at = now(),
                status_changed_by = $3,
                updated_at = now()
          WHERE id = $1
          RETURNING status_changed_at, updated_at",
    )
    .bind(id)
    .bind(next.as_str())
    .bind(changed_by)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    let transition_valid = previous_status == next || previous_status.can_transition(next);
    if transition_valid {
        info!(
            recommendation = id,
            from = previous_status.as_str(),
            to = next.as_str(),
            "recommendation status updated"
        );
    } else {
        warn!(
            recommendation = id,
            from = previous_status.as_str(),
            to = next.as_str(),
            "recommendation status updated outside the advisory graph"
        );
    }

    Ok(StatusChange {
        id,
        previous_status,
        status: next,
        transition_valid,
        status_changed_at,
        updated_at,
        changed_by: changed_by.map(ToString::to_string),
    })
}

/// Advisory follow-up statuses, in canonical status order.
pub fn allowed_transitions(status: RecommendationStatus) -> Vec<RecommendationStatus> {
    RecommendationStatus::ALL
        .into_iter()
        .filter(|next| status.can_transition(*next))
        .collect()
}

/// Affected categories for one recommendation, biggest impact first with
/// null impacts last. `limit` of `None` means the whole list.
async fn affected_categories(
    pool: &PgPool,
    recommendation_id: i64,
    limit: Option<i64>,
) -> StoreResult<Vec<AffectedCategory>> {
    let rows = sqlx::query(
        "SELECT l.cost_category_id, l.impact_amount, c.period_id, c.slug, c.category_name
           FROM recommendation_cost_categories l
           JOIN cost_categories c ON c.id = l.cost_category_id
          WHERE l.recommendation_id = $1
          ORDER BY l.impact_amount DESC NULLS LAST, l.cost_category_id
          LIMIT $2",
    )
    .bind(recommendation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut affected = Vec::with_capacity(rows.len());
    for row in rows {
        affected.push(AffectedCategory {
            cost_category_id: row.try_get("cost_category_id")?,
            period_id: row.try_get("period_id")?,
            slug: row.try_get("slug")?,
            category_name: row.try_get("category_name")?,
            impact_amount: row.try_get("impact_amount")?,
        });
    }
    Ok(affected)
}

/// Recommendations linked to one category, excluding rejected ones, ordered
/// by priority rank and then savings.
async fn linked_recommendations(
    pool: &PgPool,
    category_id: i64,
) -> StoreResult<Vec<Recommendation>> {
    let rows: Vec<RecommendationRow> = sqlx::query_as(&format!(
        "SELECT r.{}
           FROM recommendations r
           JOIN recommendation_cost_categories l ON l.recommendation_id = r.id
          WHERE l.cost_category_id = $1
            AND r.status <> 'rejected'
          ORDER BY r.id",
        RECOMMENDATION_COLUMNS.replace(", ", ", r."),
    ))
    .bind(category_id)
    .fetch_all(pool)
    .await?;

    let mut recommendations = rows
        .into_iter()
        .map(RecommendationRow::into_domain)
        .collect::<StoreResult<Vec<_>>>()?;
    recommendations.sort_by(|a, b| {
        cmp_priority_then_savings(a.priority, a.estimated_savings, b.priority, b.estimated_savings)
    });
    Ok(recommendations)
}

async fn opportunity_cards(pool: &PgPool, period_id: i64) -> StoreResult<Vec<OpportunityCard>> {
    let rows = sqlx::query(
        "SELECT o.id, o.period_id, o.cost_category_id, o.opportunity_type,
                o.amount_variance, o.percent_variance, o.aco_rank, o.display_order,
                o.show_on_dashboard, c.slug, c.category_name
           FROM cost_opportunities o
           JOIN cost_categories c ON c.id = o.cost_category_id
          WHERE o.period_id = $1
            AND o.show_on_dashboard
          ORDER BY o.display_order, ABS(o.amount_variance) DESC, o.id",
    )
    .bind(period_id)
    .fetch_all(pool)
    .await?;

    let mut cards = Vec::with_capacity(rows.len());
    for row in rows {
        let opportunity = OpportunityRow::from_row(&row)?.into_domain()?;
        cards.push(OpportunityCard {
            opportunity,
            slug: row.try_get("slug")?,
            category_name: row.try_get("category_name")?,
        });
    }
    Ok(cards)
}

fn split_cards(cards: Vec<OpportunityCard>) -> (Vec<OpportunityCard>, Vec<OpportunityCard>) {
    let mut overspending = Vec::new();
    let mut efficient = Vec::new();
    for card in cards {
        match card.opportunity.opportunity_type {
            OpportunityType::Overspending => overspending.push(card),
            OpportunityType::Efficient => efficient.push(card),
        }
    }
    (overspending, efficient)
}

fn bucket_resources(
    resources: Vec<ProgramResource>,
) -> (Vec<ProgramResource>, Vec<ProgramResource>, Vec<ProgramResource>) {
    let mut best_practices = Vec::new();
    let mut testimonials = Vec::new();
    let mut implementation_steps = Vec::new();
    for resource in resources {
        match resource.resource_type {
            ResourceType::BestPractice => best_practices.push(resource),
            ResourceType::Testimonial => testimonials.push(resource),
            ResourceType::ImplementationStep => implementation_steps.push(resource),
        }
    }
    (best_practices, testimonials, implementation_steps)
}

fn some_when_nonempty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
