// libs/appointment-cell/src/services/encounter.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Clinical-visit records live outside this engine. Starting a visit needs
/// exactly one capability from that world: create an encounter and get its
/// id back. A failed creation aborts the visit start.
#[async_trait]
pub trait EncounterGateway: Send + Sync {
    async fn create_encounter(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        organization_id: Uuid,
        reason_for_visit: Option<&str>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError>;
}

pub struct SupabaseEncounterGateway {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseEncounterGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl EncounterGateway for SupabaseEncounterGateway {
    async fn create_encounter(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        organization_id: Uuid,
        reason_for_visit: Option<&str>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        debug!(
            "Creating encounter for patient {} with doctor {}",
            patient_id, doctor_id
        );

        let encounter_data = json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "organization_id": organization_id,
            "reason_for_visit": reason_for_visit,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/encounters",
                Some(auth_token),
                Some(encounter_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::EncounterCreation(e.to_string()))?;

        let encounter_id = result
            .first()
            .and_then(|row| row.get("id"))
            .and_then(|id| id.as_str())
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| {
                AppointmentError::EncounterCreation(
                    "Encounter record missing from response".to_string(),
                )
            })?;

        info!("Encounter {} created for patient {}", encounter_id, patient_id);
        Ok(encounter_id)
    }
}
