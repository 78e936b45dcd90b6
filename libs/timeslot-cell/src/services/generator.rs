// libs/timeslot-cell/src/services/generator.rs
use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use schedule_cell::models::{Schedule, ScheduleException};
use schedule_cell::services::overlap::{minutes_since_midnight, windows_overlap};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::timefmt::format_time_of_day;
use shared_models::Actor;

use crate::models::{TimeSlot, TimeSlotError};

pub struct SlotGenerationService {
    supabase: Arc<SupabaseClient>,
}

impl SlotGenerationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Expand a schedule into AVAILABLE slots over `[from_date, to_date]`
    /// inclusive. Dates outside the schedule's effective window or weekday
    /// are skipped; candidates overlapping an active exception are
    /// suppressed. Inserting into an already-generated range trips the
    /// `(doctor, date, start)` unique key and surfaces as Conflict.
    pub async fn generate_slots(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        from_date: NaiveDate,
        to_date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, TimeSlotError> {
        debug!(
            "Generating slots for schedule {} from {} to {}",
            schedule_id, from_date, to_date
        );

        if from_date > to_date {
            return Err(TimeSlotError::Validation(
                "from_date must not be after to_date".to_string(),
            ));
        }

        let schedule = self.get_schedule(actor, schedule_id, auth_token).await?;
        if !schedule.is_active {
            return Err(TimeSlotError::ScheduleInactive);
        }

        let exceptions = self
            .get_active_exceptions(actor, schedule.doctor_id, from_date, to_date, auth_token)
            .await?;

        let now = Utc::now();
        let mut rows: Vec<Value> = Vec::new();

        let mut date = from_date;
        while date <= to_date {
            if date_matches_schedule(&schedule, date) {
                let day_exceptions: Vec<&ScheduleException> = exceptions
                    .iter()
                    .filter(|e| e.exception_date == date)
                    .collect();

                for (slot_start, slot_end) in slots_for_day(
                    schedule.start_time,
                    schedule.end_time,
                    schedule.slot_duration_minutes,
                ) {
                    if is_suppressed(&day_exceptions, slot_start, slot_end) {
                        continue;
                    }

                    rows.push(json!({
                        "id": Uuid::new_v4(),
                        "schedule_id": schedule.id,
                        "doctor_id": schedule.doctor_id,
                        "organization_id": schedule.organization_id,
                        "slot_date": date,
                        "start_time": format_time_of_day(&slot_start),
                        "end_time": format_time_of_day(&slot_end),
                        "status": "available",
                        "created_at": now.to_rfc3339(),
                        "updated_at": now.to_rfc3339()
                    }));
                }
            }
            date += ChronoDuration::days(1);
        }

        if rows.is_empty() {
            info!(
                "No slots to generate for schedule {} in {}..{}",
                schedule_id, from_date, to_date
            );
            return Ok(vec![]);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/time_slots",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                shared_database::DbError::Conflict(_) => TimeSlotError::Conflict(
                    "Time slots already generated for this range".to_string(),
                ),
                other => TimeSlotError::Database(other.to_string()),
            })?;

        let slots: Vec<TimeSlot> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<TimeSlot>, _>>()
            .map_err(|e| TimeSlotError::Database(format!("Failed to parse time slots: {}", e)))?;

        info!(
            "Generated {} slots for schedule {} in {}..{}",
            slots.len(),
            schedule_id,
            from_date,
            to_date
        );
        Ok(slots)
    }

    async fn get_schedule(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<Schedule, TimeSlotError> {
        let path = format!(
            "/rest/v1/schedules?id=eq.{}&organization_id=eq.{}",
            schedule_id, actor.organization_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or(TimeSlotError::ScheduleNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| TimeSlotError::Database(format!("Failed to parse schedule: {}", e)))
    }

    async fn get_active_exceptions(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        from_date: NaiveDate,
        to_date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<ScheduleException>, TimeSlotError> {
        let path = format!(
            "/rest/v1/schedule_exceptions?doctor_id=eq.{}&organization_id=eq.{}&is_active=eq.true&exception_date=gte.{}&exception_date=lte.{}",
            doctor_id, actor.organization_id, from_date, to_date
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScheduleException>, _>>()
            .map_err(|e| TimeSlotError::Database(format!("Failed to parse exceptions: {}", e)))
    }
}

/// How many slots a window yields: `floor((end - start) / duration)`.
/// Exception suppression is deliberately not part of this number.
pub fn expected_slot_count(start: NaiveTime, end: NaiveTime, duration_minutes: i32) -> i32 {
    if duration_minutes <= 0 {
        return 0;
    }
    let window = minutes_since_midnight(end) - minutes_since_midnight(start);
    if window <= 0 {
        0
    } else {
        window / duration_minutes
    }
}

/// Candidate `[start, end)` pairs for one day. A trailing partial slot
/// that would overrun the window is never emitted.
pub fn slots_for_day(
    start: NaiveTime,
    end: NaiveTime,
    duration_minutes: i32,
) -> Vec<(NaiveTime, NaiveTime)> {
    let mut slots = Vec::new();
    if duration_minutes <= 0 {
        return slots;
    }

    let end_minutes = minutes_since_midnight(end);
    let mut cursor = minutes_since_midnight(start);

    while cursor + duration_minutes <= end_minutes {
        let slot_start = time_from_minutes(cursor);
        let slot_end = time_from_minutes(cursor + duration_minutes);
        slots.push((slot_start, slot_end));
        cursor += duration_minutes;
    }

    slots
}

fn time_from_minutes(minutes: i32) -> NaiveTime {
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
        .expect("minutes within a single day")
}

fn date_matches_schedule(schedule: &Schedule, date: NaiveDate) -> bool {
    let weekday = date.weekday().num_days_from_sunday() as i32;
    if weekday != schedule.day_of_week {
        return false;
    }
    if date < schedule.effective_from {
        return false;
    }
    match schedule.effective_until {
        Some(until) => date <= until,
        None => true,
    }
}

fn is_suppressed(
    exceptions: &[&ScheduleException],
    slot_start: NaiveTime,
    slot_end: NaiveTime,
) -> bool {
    exceptions.iter().any(|e| match (e.start_time, e.end_time) {
        (Some(ex_start), Some(ex_end)) => {
            windows_overlap(slot_start, slot_end, ex_start, ex_end)
        }
        // No window on the exception means the whole day is blocked.
        _ => true,
    })
}
