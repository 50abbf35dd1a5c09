use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::localization::LocaleInfo;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn get_statistics(
    State(state): State<AppState>,
    locale: Option<Extension<LocaleInfo>>,
    Path(team_id): Path<String>,
    Query(q): Query<RangeQuery>,
) -> AppResult<Json<Value>> {
    let locale = locale.map(|Extension(l)| l).unwrap_or_default();
    let stats = state
        .ledger
        .statistics(&team_id, q.from, q.to, &locale)
        .await?;
    Ok(Json(json!({ "statistics": stats })))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> AppResult<Json<Value>> {
    let changed = state.ledger.reconcile(&team_id).await?;
    Ok(Json(json!({ "repaired": changed })))
}
