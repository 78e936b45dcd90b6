// libs/schedule-cell/src/services/exception.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::timefmt::format_time_of_day;
use shared_models::Actor;

use crate::models::{
    AffectedAppointment, CreateScheduleExceptionRequest, ExceptionImpact, ScheduleError,
    ScheduleException,
};
use crate::services::overlap::windows_overlap;

pub struct ScheduleExceptionService {
    supabase: Arc<SupabaseClient>,
}

impl ScheduleExceptionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create a blackout for a doctor on one date. Active appointments
    /// caught in the window are returned flagged for notification, then
    /// every AVAILABLE slot in the window is blocked. Booked slots are
    /// left alone.
    pub async fn create_exception(
        &self,
        actor: &Actor,
        request: CreateScheduleExceptionRequest,
        auth_token: &str,
    ) -> Result<ExceptionImpact, ScheduleError> {
        debug!(
            "Creating schedule exception for doctor {} on {}",
            request.doctor_id, request.exception_date
        );

        match (request.start_time, request.end_time) {
            (Some(start), Some(end)) if start >= end => {
                return Err(ScheduleError::Validation(
                    "Start time must be before end time".to_string(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ScheduleError::Validation(
                    "Either both start and end time or neither must be given".to_string(),
                ));
            }
            _ => {}
        }

        let today = Utc::now().date_naive();
        if request.exception_date < today {
            return Err(ScheduleError::Validation(
                "Exception date cannot be in the past".to_string(),
            ));
        }

        // Affected appointments are computed before the exception exists so
        // the impact report reflects the state the caller acted on.
        let affected_appointments = self
            .find_affected_appointments(
                actor,
                request.doctor_id,
                request.exception_date,
                request.start_time,
                request.end_time,
                auth_token,
            )
            .await?;

        let exception_data = json!({
            "doctor_id": request.doctor_id,
            "organization_id": actor.organization_id,
            "exception_date": request.exception_date,
            "start_time": request.start_time.map(|t| format_time_of_day(&t)),
            "end_time": request.end_time.map(|t| format_time_of_day(&t)),
            "reason": request.reason,
            "is_active": true,
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
                "/rest/v1/schedule_exceptions",
                Some(auth_token),
                Some(exception_data),
                Some(headers),
            )
            .await?;

        let created = result.into_iter().next().ok_or_else(|| {
            ScheduleError::Database("Failed to create schedule exception".to_string())
        })?;

        let exception: ScheduleException = serde_json::from_value(created)
            .map_err(|e| ScheduleError::Database(format!("Failed to parse exception: {}", e)))?;

        let blocked = self
            .transition_slots_in_window(
                actor,
                exception.doctor_id,
                exception.exception_date,
                exception.start_time,
                exception.end_time,
                "available",
                "blocked",
                auth_token,
            )
            .await?;

        if !affected_appointments.is_empty() {
            warn!(
                "Exception {} overlaps {} active appointments requiring notification",
                exception.id,
                affected_appointments.len()
            );
        }
        info!(
            "Exception {} created for doctor {} on {} ({} slots blocked)",
            exception.id, exception.doctor_id, exception.exception_date, blocked
        );

        Ok(ExceptionImpact {
            exception,
            affected_appointments,
        })
    }

    /// Soft-delete an exception and release the slots it blocked. Slots
    /// that were consumed in the meantime stay as they are.
    pub async fn delete_exception(
        &self,
        actor: &Actor,
        exception_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        debug!("Deleting schedule exception {}", exception_id);

        let path = format!(
            "/rest/v1/schedule_exceptions?id=eq.{}&organization_id=eq.{}&is_active=eq.true",
            exception_id, actor.organization_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or(ScheduleError::ExceptionNotFound)?;

        let exception: ScheduleException = serde_json::from_value(row)
            .map_err(|e| ScheduleError::Database(format!("Failed to parse exception: {}", e)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!(
                    "/rest/v1/schedule_exceptions?id=eq.{}&organization_id=eq.{}",
                    exception_id, actor.organization_id
                ),
                Some(auth_token),
                Some(json!({ "is_active": false })),
                Some(headers),
            )
            .await?;

        let released = self
            .transition_slots_in_window(
                actor,
                exception.doctor_id,
                exception.exception_date,
                exception.start_time,
                exception.end_time,
                "blocked",
                "available",
                auth_token,
            )
            .await?;

        info!(
            "Exception {} removed ({} slots released)",
            exception_id, released
        );
        Ok(())
    }

    /// List active exceptions for a doctor and/or date range.
    pub async fn list_exceptions(
        &self,
        actor: &Actor,
        doctor_id: Option<Uuid>,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleException>, ScheduleError> {
        let mut path = format!(
            "/rest/v1/schedule_exceptions?organization_id=eq.{}&is_active=eq.true",
            actor.organization_id
        );
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(from) = from_date {
            path.push_str(&format!("&exception_date=gte.{}", from));
        }
        if let Some(to) = to_date {
            path.push_str(&format!("&exception_date=lte.{}", to));
        }
        path.push_str("&order=exception_date.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleException>, _>>()
            .map_err(|e| ScheduleError::Database(format!("Failed to parse exceptions: {}", e)))
    }

    async fn find_affected_appointments(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        date: NaiveDate,
        window_start: Option<NaiveTime>,
        window_end: Option<NaiveTime>,
        auth_token: &str,
    ) -> Result<Vec<AffectedAppointment>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&organization_id=eq.{}&appointment_date=eq.{}&status=in.(scheduled,checked_in)&order=start_time.asc",
            doctor_id, actor.organization_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let active: Vec<AffectedAppointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AffectedAppointment>, _>>()
            .map_err(|e| ScheduleError::Database(format!("Failed to parse appointments: {}", e)))?;

        let affected = active
            .into_iter()
            .filter(|appointment| match (window_start, window_end) {
                (Some(ws), Some(we)) => {
                    windows_overlap(appointment.start_time, appointment.end_time, ws, we)
                }
                // Whole-day exception hits every active appointment.
                _ => true,
            })
            .map(|mut appointment| {
                appointment.requires_notification = true;
                appointment
            })
            .collect();

        Ok(affected)
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition_slots_in_window(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        date: NaiveDate,
        window_start: Option<NaiveTime>,
        window_end: Option<NaiveTime>,
        from_status: &str,
        to_status: &str,
        auth_token: &str,
    ) -> Result<usize, ScheduleError> {
        // A whole-day exception blocks 00:00-23:59.
        let start = window_start.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let end = window_end.unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 0).unwrap());

        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&organization_id=eq.{}&slot_date=eq.{}&status=eq.{}&start_time=lt.{}&end_time=gt.{}",
            doctor_id,
            actor.organization_id,
            date,
            from_status,
            format_time_of_day(&end),
            format_time_of_day(&start)
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
                    "status": to_status,
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(headers),
            )
            .await?;

        Ok(result.len())
    }
}
