// libs/timeslot-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::Actor;

use crate::models::{TimeSlot, TimeSlotError, TimeSlotQuery};

pub struct TimeSlotService {
    supabase: Arc<SupabaseClient>,
}

impl TimeSlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fetch one slot. Slots outside the actor's organization look
    /// identical to missing ones.
    pub async fn get_slot(
        &self,
        actor: &Actor,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<TimeSlot, TimeSlotError> {
        let path = format!(
            "/rest/v1/time_slots?id=eq.{}&organization_id=eq.{}",
            slot_id, actor.organization_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result.into_iter().next().ok_or(TimeSlotError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| TimeSlotError::Database(format!("Failed to parse time slot: {}", e)))
    }

    /// List a doctor's slots over a date range, optionally only the
    /// bookable ones.
    pub async fn list_slots(
        &self,
        actor: &Actor,
        query: TimeSlotQuery,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, TimeSlotError> {
        debug!(
            "Listing slots for doctor {} from {} to {}",
            query.doctor_id, query.from_date, query.to_date
        );

        let mut path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&organization_id=eq.{}&slot_date=gte.{}&slot_date=lte.{}",
            query.doctor_id, actor.organization_id, query.from_date, query.to_date
        );
        if query.only_available {
            path.push_str("&status=eq.available");
        }
        path.push_str("&order=slot_date.asc,start_time.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<TimeSlot>, _>>()
            .map_err(|e| TimeSlotError::Database(format!("Failed to parse time slots: {}", e)))
    }

    /// The booking compare-and-set: one conditional PATCH that flips the
    /// slot to BOOKED only if it is still AVAILABLE. Zero updated rows
    /// means another writer got there first; there is no read-then-write
    /// window to lose.
    pub async fn claim_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<TimeSlot, TimeSlotError> {
        debug!("Claiming time slot {}", slot_id);

        let path = format!(
            "/rest/v1/time_slots?id=eq.{}&status=eq.available",
            slot_id
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
                Some(auth_token),
                Some(json!({
                    "status": "booked",
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(headers),
            )
            .await?;

        let row = result.into_iter().next().ok_or_else(|| {
            warn!("Time slot {} was not available at claim time", slot_id);
            TimeSlotError::Conflict("Time slot is no longer available".to_string())
        })?;

        let slot: TimeSlot = serde_json::from_value(row)
            .map_err(|e| TimeSlotError::Database(format!("Failed to parse time slot: {}", e)))?;

        info!("Time slot {} claimed", slot.id);
        Ok(slot)
    }

    /// Release a consumed slot back to AVAILABLE (early-cancellation
    /// path). Conditional on BOOKED, so repeated calls are harmless.
    pub async fn release_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, TimeSlotError> {
        debug!("Releasing time slot {}", slot_id);

        let path = format!("/rest/v1/time_slots?id=eq.{}&status=eq.booked", slot_id);
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
                Some(auth_token),
                Some(json!({
                    "status": "available",
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(headers),
            )
            .await?;

        let released = !result.is_empty();
        if released {
            info!("Time slot {} released", slot_id);
        }
        Ok(released)
    }
}
