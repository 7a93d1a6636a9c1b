//! Wire types exchanged with the telephony provider.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the outbound `POST /api/initiate-call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallRequest {
    pub call_id: Uuid,
    pub phone_number: String,
    pub campaign_id: Uuid,
    pub campaign_name: String,
}

/// Body of the provider's 200 response to `initiate-call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallResponse {
    pub external_call_id: String,
}
