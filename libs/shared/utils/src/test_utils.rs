use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Actor, ActorRole};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
        }
    }
}

pub struct TestActors;

impl TestActors {
    pub fn patient(organization_id: Uuid) -> Actor {
        Actor::new(Uuid::new_v4(), ActorRole::Patient, organization_id)
    }

    pub fn doctor(organization_id: Uuid) -> Actor {
        Actor::new(Uuid::new_v4(), ActorRole::Doctor, organization_id)
    }

    pub fn admin(organization_id: Uuid) -> Actor {
        Actor::new(Uuid::new_v4(), ActorRole::Admin, organization_id)
    }
}

/// Canned PostgREST row payloads matching the engine's serde formats.
pub struct MockRows;

impl MockRows {
    pub fn schedule(
        id: Uuid,
        doctor_id: Uuid,
        organization_id: Uuid,
        day_of_week: i32,
        start_time: &str,
        end_time: &str,
        slot_duration_minutes: i32,
        effective_from: NaiveDate,
    ) -> Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "organization_id": organization_id,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "slot_duration_minutes": slot_duration_minutes,
            "is_active": true,
            "effective_from": effective_from,
            "effective_until": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn time_slot(
        id: Uuid,
        schedule_id: Uuid,
        doctor_id: Uuid,
        organization_id: Uuid,
        slot_date: NaiveDate,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "schedule_id": schedule_id,
            "doctor_id": doctor_id,
            "organization_id": organization_id,
            "slot_date": slot_date,
            "start_time": start_time,
            "end_time": end_time,
            "status": status,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn appointment(
        id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
        organization_id: Uuid,
        time_slot_id: Uuid,
        appointment_date: NaiveDate,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "organization_id": organization_id,
            "time_slot_id": time_slot_id,
            "encounter_id": null,
            "appointment_date": appointment_date,
            "start_time": start_time,
            "end_time": end_time,
            "status": status,
            "reason_for_visit": "routine check-up",
            "cancellation_reason": null,
            "cancelled_at": null,
            "cancelled_by": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn schedule_exception(
        id: Uuid,
        doctor_id: Uuid,
        organization_id: Uuid,
        exception_date: NaiveDate,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "organization_id": organization_id,
            "exception_date": exception_date,
            "start_time": start_time,
            "end_time": end_time,
            "reason": "out of office",
            "is_active": true,
            "created_at": Utc::now().to_rfc3339()
        })
    }
}
