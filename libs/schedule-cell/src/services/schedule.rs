// libs/schedule-cell/src/services/schedule.rs
use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::timefmt::format_time_of_day;
use shared_models::Actor;

use crate::models::{CreateScheduleRequest, Schedule, ScheduleError, UpdateScheduleRequest};
use crate::services::overlap::windows_overlap;

pub const MIN_SLOT_DURATION_MINUTES: i32 = 5;
pub const MAX_SLOT_DURATION_MINUTES: i32 = 120;

pub struct ScheduleService {
    supabase: Arc<SupabaseClient>,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create a weekly schedule for a doctor after validating its window
    /// against every other active schedule on the same day of week.
    pub async fn create_schedule(
        &self,
        actor: &Actor,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<Schedule, ScheduleError> {
        debug!(
            "Creating schedule for doctor {} on day {}",
            request.doctor_id, request.day_of_week
        );

        validate_schedule_fields(
            request.day_of_week,
            request.start_time,
            request.end_time,
            request.slot_duration_minutes,
        )?;

        if let Some(until) = request.effective_until {
            if until < request.effective_from {
                return Err(ScheduleError::Validation(
                    "effective_until must not precede effective_from".to_string(),
                ));
            }
        }

        self.check_schedule_conflicts(
            actor,
            request.doctor_id,
            request.day_of_week,
            request.start_time,
            request.end_time,
            None,
            auth_token,
        )
        .await?;

        let now = Utc::now();
        let schedule_data = json!({
            "doctor_id": request.doctor_id,
            "organization_id": actor.organization_id,
            "day_of_week": request.day_of_week,
            "start_time": format_time_of_day(&request.start_time),
            "end_time": format_time_of_day(&request.end_time),
            "slot_duration_minutes": request.slot_duration_minutes,
            "is_active": true,
            "effective_from": request.effective_from,
            "effective_until": request.effective_until,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
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
                "/rest/v1/schedules",
                Some(auth_token),
                Some(schedule_data),
                Some(headers),
            )
            .await?;

        let created = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::Database("Failed to create schedule".to_string()))?;

        let schedule: Schedule = serde_json::from_value(created)
            .map_err(|e| ScheduleError::Database(format!("Failed to parse schedule: {}", e)))?;

        info!("Schedule {} created for doctor {}", schedule.id, schedule.doctor_id);
        Ok(schedule)
    }

    /// Update a schedule in place. Day or window changes re-run the
    /// conflict check with the record itself excluded.
    pub async fn update_schedule(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<Schedule, ScheduleError> {
        debug!("Updating schedule {}", schedule_id);

        let current = self.get_schedule(actor, schedule_id, auth_token).await?;

        let day_of_week = request.day_of_week.unwrap_or(current.day_of_week);
        let start_time = request.start_time.unwrap_or(current.start_time);
        let end_time = request.end_time.unwrap_or(current.end_time);
        let slot_duration = request
            .slot_duration_minutes
            .unwrap_or(current.slot_duration_minutes);

        validate_schedule_fields(day_of_week, start_time, end_time, slot_duration)?;

        let window_changed = day_of_week != current.day_of_week
            || start_time != current.start_time
            || end_time != current.end_time;

        if window_changed {
            self.check_schedule_conflicts(
                actor,
                current.doctor_id,
                day_of_week,
                start_time,
                end_time,
                Some(schedule_id),
                auth_token,
            )
            .await?;
        }

        let mut update_data = serde_json::Map::new();
        if request.day_of_week.is_some() {
            update_data.insert("day_of_week".to_string(), json!(day_of_week));
        }
        if request.start_time.is_some() {
            update_data.insert(
                "start_time".to_string(),
                json!(format_time_of_day(&start_time)),
            );
        }
        if request.end_time.is_some() {
            update_data.insert("end_time".to_string(), json!(format_time_of_day(&end_time)));
        }
        if request.slot_duration_minutes.is_some() {
            update_data.insert("slot_duration_minutes".to_string(), json!(slot_duration));
        }
        if let Some(from) = request.effective_from {
            update_data.insert("effective_from".to_string(), json!(from));
        }
        if let Some(until) = request.effective_until {
            update_data.insert("effective_until".to_string(), json!(until));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!(
            "/rest/v1/schedules?id=eq.{}&organization_id=eq.{}",
            schedule_id, actor.organization_id
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
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await?;

        let updated = result.into_iter().next().ok_or(ScheduleError::NotFound)?;

        let schedule: Schedule = serde_json::from_value(updated)
            .map_err(|e| ScheduleError::Database(format!("Failed to parse schedule: {}", e)))?;

        info!("Schedule {} updated", schedule.id);
        Ok(schedule)
    }

    /// Soft delete: mark the schedule inactive. Slots already generated
    /// from it keep existing.
    pub async fn delete_schedule(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        debug!("Deactivating schedule {}", schedule_id);

        let path = format!(
            "/rest/v1/schedules?id=eq.{}&organization_id=eq.{}&is_active=eq.true",
            schedule_id, actor.organization_id
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
                    "is_active": false,
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(headers),
            )
            .await?;

        if result.is_empty() {
            return Err(ScheduleError::NotFound);
        }

        info!("Schedule {} deactivated", schedule_id);
        Ok(())
    }

    /// Fetch one schedule. Records outside the actor's organization look
    /// identical to missing ones.
    pub async fn get_schedule(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<Schedule, ScheduleError> {
        let path = format!(
            "/rest/v1/schedules?id=eq.{}&organization_id=eq.{}",
            schedule_id, actor.organization_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result.into_iter().next().ok_or(ScheduleError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| ScheduleError::Database(format!("Failed to parse schedule: {}", e)))
    }

    /// List a doctor's active schedules, ordered by day and start time.
    pub async fn list_doctor_schedules(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Schedule>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedules?doctor_id=eq.{}&organization_id=eq.{}&is_active=eq.true&order=day_of_week.asc,start_time.asc",
            doctor_id, actor.organization_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Schedule>, _>>()
            .map_err(|e| ScheduleError::Database(format!("Failed to parse schedules: {}", e)))
    }

    async fn check_schedule_conflicts(
        &self,
        actor: &Actor,
        doctor_id: Uuid,
        day_of_week: i32,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        let mut path = format!(
            "/rest/v1/schedules?doctor_id=eq.{}&organization_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
            doctor_id, actor.organization_id, day_of_week
        );
        if let Some(id) = exclude_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        for row in existing {
            let other: Schedule = serde_json::from_value(row)
                .map_err(|e| ScheduleError::Database(format!("Failed to parse schedule: {}", e)))?;

            if windows_overlap(start_time, end_time, other.start_time, other.end_time) {
                warn!(
                    "Schedule conflict for doctor {} on day {}: {}-{} overlaps schedule {}",
                    doctor_id,
                    day_of_week,
                    format_time_of_day(&start_time),
                    format_time_of_day(&end_time),
                    other.id
                );
                return Err(ScheduleError::Conflict);
            }
        }

        Ok(())
    }
}

fn validate_schedule_fields(
    day_of_week: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    slot_duration_minutes: i32,
) -> Result<(), ScheduleError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(ScheduleError::Validation(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }

    if start_time >= end_time {
        return Err(ScheduleError::Validation(
            "Start time must be before end time".to_string(),
        ));
    }

    if !(MIN_SLOT_DURATION_MINUTES..=MAX_SLOT_DURATION_MINUTES).contains(&slot_duration_minutes) {
        return Err(ScheduleError::Validation(format!(
            "Slot duration must be between {} and {} minutes",
            MIN_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn rejects_out_of_range_day() {
        assert!(validate_schedule_fields(7, t(9, 0), t(12, 0), 30).is_err());
        assert!(validate_schedule_fields(-1, t(9, 0), t(12, 0), 30).is_err());
    }

    #[test]
    fn rejects_inverted_window() {
        assert!(validate_schedule_fields(1, t(12, 0), t(9, 0), 30).is_err());
        assert!(validate_schedule_fields(1, t(9, 0), t(9, 0), 30).is_err());
    }

    #[test]
    fn rejects_out_of_bounds_duration() {
        assert!(validate_schedule_fields(1, t(9, 0), t(12, 0), 4).is_err());
        assert!(validate_schedule_fields(1, t(9, 0), t(12, 0), 121).is_err());
        assert!(validate_schedule_fields(1, t(9, 0), t(12, 0), 5).is_ok());
        assert!(validate_schedule_fields(1, t(9, 0), t(12, 0), 120).is_ok());
    }
}
