//! `/campaigns` and `/phone-numbers` handlers (spec §6).

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::sql::Record;
use crate::common::{phone, AppError};
use crate::domains::campaigns::{Campaign, PhoneNumber};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub description: Option<String>,
}

pub async fn create_campaign(
    State(state): State<AppState>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<(axum::http::StatusCode, Json<Campaign>), AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let campaign = Campaign::new(body.name, body.description);
    let campaign = campaign.insert(&state.ctx.db_pool).await?;
    Ok((axum::http::StatusCode::CREATED, Json(campaign)))
}

pub async fn list_campaigns(State(state): State<AppState>) -> Result<Json<Vec<Campaign>>, AppError> {
    let campaigns = Campaign::list(&state.ctx).await?;
    Ok(Json(campaigns))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, AppError> {
    let campaign = Campaign::find_by_id(id, &state.ctx.db_pool)
        .await
        .map_err(|_| AppError::not_found(format!("campaign {id} not found")))?;
    Ok(Json(campaign))
}

#[derive(Debug, Deserialize)]
pub struct AddPhoneNumbersRequest {
    pub campaign_id: Uuid,
    pub phone_numbers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddPhoneNumbersResponse {
    pub created_count: usize,
    pub created_numbers: Vec<String>,
    pub errors: Vec<String>,
}

pub async fn add_phone_numbers(
    State(state): State<AppState>,
    Json(body): Json<AddPhoneNumbersRequest>,
) -> Result<(axum::http::StatusCode, Json<AddPhoneNumbersResponse>), AppError> {
    Campaign::find_by_id(body.campaign_id, &state.ctx.db_pool)
        .await
        .map_err(|_| AppError::not_found(format!("campaign {} not found", body.campaign_id)))?;

    let mut created_numbers = Vec::new();
    let mut errors = Vec::new();

    for raw in body.phone_numbers {
        match phone::normalize(&raw) {
            Ok(normalized) => {
                let number = PhoneNumber::new(body.campaign_id.into(), normalized.clone());
                number.insert(&state.ctx.db_pool).await?;
                created_numbers.push(normalized);
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    Ok((
        axum::http::StatusCode::CREATED,
        Json(AddPhoneNumbersResponse {
            created_count: created_numbers.len(),
            created_numbers,
            errors,
        }),
    ))
}
