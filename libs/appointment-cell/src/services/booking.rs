// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::timefmt::format_time_of_day;
use shared_models::Actor;
use timeslot_cell::models::{TimeSlotError, TimeSlotStatus};
use timeslot_cell::services::slots::TimeSlotService;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentSortKey,
    AppointmentStatus, BookAppointmentRequest, CancelAppointmentRequest,
};
use crate::services::encounter::{EncounterGateway, SupabaseEncounterGateway};
use crate::services::lifecycle;

/// Cancellations strictly more than this far ahead of the appointment
/// start release the slot; anything later forfeits it.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    slots: TimeSlotService,
    encounters: Arc<dyn EncounterGateway>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let slots = TimeSlotService::with_client(Arc::clone(&supabase));
        let encounters = Arc::new(SupabaseEncounterGateway::with_client(Arc::clone(&supabase)));

        Self {
            supabase,
            slots,
            encounters,
        }
    }

    /// Assemble from shared parts; used by tests to substitute the
    /// encounter gateway.
    pub fn with_parts(
        supabase: Arc<SupabaseClient>,
        encounters: Arc<dyn EncounterGateway>,
    ) -> Self {
        let slots = TimeSlotService::with_client(Arc::clone(&supabase));
        Self {
            supabase,
            slots,
            encounters,
        }
    }

    /// Book an appointment by claiming an AVAILABLE slot. The claim is a
    /// conditional status flip executed before the appointment insert, so
    /// of two concurrent requests exactly one can get past it. If the
    /// insert then fails the claim is compensated.
    pub async fn book_appointment(
        &self,
        actor: &Actor,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} on slot {}",
            request.patient_id, request.time_slot_id
        );

        let slot = self
            .slots
            .get_slot(actor, request.time_slot_id, auth_token)
            .await
            .map_err(map_slot_error)?;

        if slot.status != TimeSlotStatus::Available {
            return Err(AppointmentError::SlotNotAvailable);
        }

        let claimed = self
            .slots
            .claim_slot(slot.id, auth_token)
            .await
            .map_err(map_slot_error)?;

        let now = Utc::now();
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": claimed.doctor_id,
            "organization_id": claimed.organization_id,
            "time_slot_id": claimed.id,
            "encounter_id": null,
            "appointment_date": claimed.slot_date,
            "start_time": format_time_of_day(&claimed.start_time),
            "end_time": format_time_of_day(&claimed.end_time),
            "status": AppointmentStatus::Scheduled.to_string(),
            "reason_for_visit": request.reason_for_visit,
            "cancellation_reason": null,
            "cancelled_at": null,
            "cancelled_by": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let insert_result: Result<Vec<Value>, _> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await;

        let rows = match insert_result {
            Ok(rows) => rows,
            Err(e) => {
                // The slot was already flipped; hand it back before failing.
                if let Err(release_err) = self.slots.release_slot(claimed.id, auth_token).await {
                    warn!(
                        "Failed to release slot {} after aborted booking: {}",
                        claimed.id, release_err
                    );
                }
                return Err(AppointmentError::Database(e.to_string()));
            }
        };

        let row = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Database("Failed to create appointment".to_string())
        })?;

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))?;

        info!(
            "Appointment {} booked on slot {} for patient {}",
            appointment.id, claimed.id, appointment.patient_id
        );
        Ok(appointment)
    }

    /// Cancel an appointment. Early cancellations (more than 24h before
    /// start) release the slot; late ones forfeit it. Reason, timestamp
    /// and actor are always recorded.
    pub async fn cancel_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {}", appointment_id);

        let appointment = self.get_appointment(actor, appointment_id, auth_token).await?;
        lifecycle::validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let now = Utc::now();
        let starts_at = appointment.starts_at();
        if starts_at < now {
            return Err(AppointmentError::Validation(
                "Cannot cancel an appointment whose start time has passed".to_string(),
            ));
        }

        let is_early = starts_at > now + ChronoDuration::hours(CANCELLATION_WINDOW_HOURS);

        let mut extra = Map::new();
        extra.insert("cancellation_reason".to_string(), json!(request.reason));
        extra.insert("cancelled_at".to_string(), json!(now.to_rfc3339()));
        extra.insert("cancelled_by".to_string(), json!(actor.id));

        let cancelled = self
            .write_transition(
                actor,
                &appointment,
                AppointmentStatus::Cancelled,
                extra,
                auth_token,
            )
            .await?;

        if is_early {
            let released = self
                .slots
                .release_slot(appointment.time_slot_id, auth_token)
                .await
                .map_err(map_slot_error)?;
            if released {
                info!(
                    "Appointment {} cancelled early, slot {} released",
                    appointment_id, appointment.time_slot_id
                );
            } else {
                warn!(
                    "Slot {} was not in BOOKED state when released",
                    appointment.time_slot_id
                );
            }
        } else {
            info!(
                "Appointment {} cancelled late, slot {} forfeited",
                appointment_id, appointment.time_slot_id
            );
        }

        Ok(cancelled)
    }

    /// Patient arrived at the clinic.
    pub async fn check_in(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Checking in appointment {}", appointment_id);

        let appointment = self.get_appointment(actor, appointment_id, auth_token).await?;
        self.write_transition(
            actor,
            &appointment,
            AppointmentStatus::CheckedIn,
            Map::new(),
            auth_token,
        )
        .await
    }

    /// Start the visit: create the clinical encounter, then move to
    /// IN_PROGRESS with the encounter linked. Encounter failure aborts
    /// the transition entirely.
    pub async fn start_visit(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Starting visit for appointment {}", appointment_id);

        let appointment = self.get_appointment(actor, appointment_id, auth_token).await?;
        lifecycle::validate_transition(appointment.status, AppointmentStatus::InProgress)?;

        let encounter_id = self
            .encounters
            .create_encounter(
                appointment.patient_id,
                appointment.doctor_id,
                appointment.organization_id,
                appointment.reason_for_visit.as_deref(),
                auth_token,
            )
            .await?;

        let mut extra = Map::new();
        extra.insert("encounter_id".to_string(), json!(encounter_id));

        let started = self
            .write_transition(
                actor,
                &appointment,
                AppointmentStatus::InProgress,
                extra,
                auth_token,
            )
            .await?;

        info!(
            "Visit started for appointment {} with encounter {}",
            appointment_id, encounter_id
        );
        Ok(started)
    }

    /// Visit finished. The slot was consumed at booking time and stays so.
    pub async fn complete(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Completing appointment {}", appointment_id);

        let appointment = self.get_appointment(actor, appointment_id, auth_token).await?;
        self.write_transition(
            actor,
            &appointment,
            AppointmentStatus::Completed,
            Map::new(),
            auth_token,
        )
        .await
    }

    /// Patient never showed up. The slot stays BOOKED, same forfeit as a
    /// late cancellation.
    pub async fn mark_no_show(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Marking appointment {} as no-show", appointment_id);

        let appointment = self.get_appointment(actor, appointment_id, auth_token).await?;
        self.write_transition(
            actor,
            &appointment,
            AppointmentStatus::NoShow,
            Map::new(),
            auth_token,
        )
        .await
    }

    /// Fetch one appointment. Records outside the actor's organization
    /// look identical to missing ones.
    pub async fn get_appointment(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&organization_id=eq.{}",
            appointment_id, actor.organization_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))
    }

    /// Search appointments with filters, free-text reason match,
    /// offset/limit pagination and a sort key/direction.
    pub async fn search_appointments(
        &self,
        actor: &Actor,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = vec![format!("organization_id=eq.{}", actor.organization_id)];

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!("appointment_date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!("appointment_date=lte.{}", to_date));
        }
        if let Some(text) = &query.search_text {
            query_parts.push(format!(
                "reason_for_visit=ilike.*{}*",
                urlencoding::encode(text)
            ));
        }

        let direction = query.sort_direction.as_order_suffix();
        let order = match query.sort_by {
            AppointmentSortKey::AppointmentDate => {
                format!("appointment_date.{},start_time.{}", direction, direction)
            }
            key => format!("{}.{}", key.as_column(), direction),
        };
        query_parts.push(format!("order={}", order));

        if let Some(limit) = query.pagination.limit {
            query_parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = query.pagination.offset {
            query_parts.push(format!("offset={}", offset));
        }

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointments: {}", e)))
    }

    /// The one place appointment status is written. Re-validates the
    /// transition, then updates conditionally on the status the caller
    /// read; a concurrent change makes the update match nothing and the
    /// transition is rejected instead of applied blindly.
    async fn write_transition(
        &self,
        actor: &Actor,
        appointment: &Appointment,
        to: AppointmentStatus,
        mut extra: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        lifecycle::validate_transition(appointment.status, to)?;

        extra.insert("status".to_string(), json!(to.to_string()));
        extra.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&organization_id=eq.{}&status=eq.{}",
            appointment.id, actor.organization_id, appointment.status
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
                Some(Value::Object(extra)),
                Some(headers),
            )
            .await?;

        let row = result.into_iter().next().ok_or_else(|| {
            warn!(
                "Appointment {} changed status concurrently, {} -> {} not applied",
                appointment.id, appointment.status, to
            );
            AppointmentError::InvalidTransition {
                from: appointment.status,
                to,
            }
        })?;

        let updated: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))?;

        info!(
            "Appointment {} transitioned {} -> {}",
            updated.id, appointment.status, updated.status
        );
        Ok(updated)
    }
}

fn map_slot_error(e: TimeSlotError) -> AppointmentError {
    match e {
        TimeSlotError::NotFound => AppointmentError::SlotNotFound,
        TimeSlotError::Conflict(_) => AppointmentError::SlotNotAvailable,
        other => AppointmentError::Database(other.to_string()),
    }
}
