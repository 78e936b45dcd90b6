// libs/timeslot-cell/src/services/expiry.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::TimeSlotError;

/// Retires past-dated slots nobody booked. The whole sweep is one
/// conditional update: only AVAILABLE slots with a date before today are
/// touched, so it is idempotent and safe to run while bookings are in
/// flight. Booked slots are never expired.
pub struct ExpirySweepService {
    supabase: Arc<SupabaseClient>,
}

impl ExpirySweepService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Transition every past-dated AVAILABLE slot to EXPIRED. Returns the
    /// number of slots retired; a second run right after returns 0.
    pub async fn sweep(&self, auth_token: Option<&str>) -> Result<u32, TimeSlotError> {
        let today = Utc::now().date_naive();
        debug!("Expiring available slots dated before {}", today);

        let path = format!(
            "/rest/v1/time_slots?status=eq.available&slot_date=lt.{}",
            today
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                auth_token,
                Some(json!({
                    "status": "expired",
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(headers),
            )
            .await?;

        let expired = result.len() as u32;
        if expired > 0 {
            info!("Expired {} stale time slots", expired);
        }
        Ok(expired)
    }
}
