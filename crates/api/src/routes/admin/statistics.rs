//! Dashboard and report endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use crate::db::statistics::{Dashboard, ProductReport, SalesReport, StatisticsRepository, UserReport};
use crate::error::{AppError, Result};
use crate::state::AppState;

const MAX_REPORT_DAYS: i64 = 90;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/statistics/dashboard", get(dashboard))
        .route("/statistics/sales", get(sales))
        .route("/statistics/products", get(products))
        .route("/statistics/users", get(users))
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    #[serde(default = "default_days")]
    days: i64,
}

const fn default_days() -> i64 {
    7
}

impl DaysQuery {
    fn checked(&self) -> Result<i64> {
        if (1..=MAX_REPORT_DAYS).contains(&self.days) {
            Ok(self.days)
        } else {
            Err(AppError::bad_request(format!(
                "统计天数必须在1到{MAX_REPORT_DAYS}之间"
            )))
        }
    }
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>> {
    Ok(Json(StatisticsRepository::new(state.pool()).dashboard().await?))
}

async fn sales(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<SalesReport>> {
    let days = query.checked()?;
    Ok(Json(StatisticsRepository::new(state.pool()).sales(days).await?))
}

async fn products(State(state): State<AppState>) -> Result<Json<ProductReport>> {
    Ok(Json(StatisticsRepository::new(state.pool()).products().await?))
}

async fn users(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<UserReport>> {
    let days = query.checked()?;
    Ok(Json(StatisticsRepository::new(state.pool()).users(days).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_range() {
        assert_eq!(DaysQuery { days: 1 }.checked().ok(), Some(1));
        assert_eq!(DaysQuery { days: 90 }.checked().ok(), Some(90));
        assert!(DaysQuery { days: 0 }.checked().is_err());
        assert!(DaysQuery { days: 91 }.checked().is_err());
        assert_eq!(default_days(), 7);
    }
}
