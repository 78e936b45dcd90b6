use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use mockall::mock;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentSearchQuery, AppointmentStatus, BookAppointmentRequest,
    CancelAppointmentRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::encounter::EncounterGateway;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockRows, TestActors, TestConfig};

mock! {
    pub Encounters {}

    #[async_trait]
    impl EncounterGateway for Encounters {
        async fn create_encounter<'a>(
            &self,
            patient_id: Uuid,
            doctor_id: Uuid,
            organization_id: Uuid,
            reason_for_visit: Option<&'a str>,
            auth_token: &'a str,
        ) -> Result<Uuid, AppointmentError>;
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service_with(
    mock_server: &MockServer,
    encounters: Arc<dyn EncounterGateway>,
) -> AppointmentBookingService {
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();
    AppointmentBookingService::with_parts(Arc::new(SupabaseClient::new(&config)), encounters)
}

fn quiet_encounters() -> Arc<dyn EncounterGateway> {
    Arc::new(MockEncounters::new())
}

#[tokio::test]
async fn booking_claims_the_slot_and_copies_its_times() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let schedule_id = Uuid::new_v4();
    let actor = TestActors::patient(organization_id);
    let patient_id = actor.id;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::time_slot(
            slot_id,
            schedule_id,
            doctor_id,
            organization_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "available",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("status", "eq.available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::time_slot(
            slot_id,
            schedule_id,
            doctor_id,
            organization_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "booked",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([MockRows::appointment(
            Uuid::new_v4(),
            patient_id,
            doctor_id,
            organization_id,
            slot_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "scheduled",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let appointment = service
        .book_appointment(
            &actor,
            BookAppointmentRequest {
                patient_id,
                time_slot_id: slot_id,
                reason_for_visit: Some("persistent cough".to_string()),
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.time_slot_id, slot_id);
    assert_eq!(appointment.appointment_date, date(2026, 9, 1));
    assert_eq!(
        appointment.start_time,
        chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn concurrent_bookings_have_exactly_one_winner() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let actor = TestActors::patient(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::time_slot(
            slot_id,
            Uuid::new_v4(),
            doctor_id,
            organization_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "available",
        )])))
        .mount(&mock_server)
        .await;

    // The conditional flip succeeds exactly once; the loser's update
    // matches zero rows.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("status", "eq.available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::time_slot(
            slot_id,
            Uuid::new_v4(),
            doctor_id,
            organization_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "booked",
        )])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .with_priority(10)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([MockRows::appointment(
            Uuid::new_v4(),
            actor.id,
            doctor_id,
            organization_id,
            slot_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "scheduled",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());

    let request = BookAppointmentRequest {
        patient_id: actor.id,
        time_slot_id: slot_id,
        reason_for_visit: None,
    };

    let (first, second) = tokio::join!(
        service.book_appointment(&actor, request.clone(), "token"),
        service.book_appointment(&actor, request.clone(), "token"),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one booking must win the slot");

    let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
    assert_matches!(
        loser.as_ref().unwrap_err(),
        AppointmentError::SlotNotAvailable
    );
}

#[tokio::test]
async fn booking_a_blocked_slot_fails_without_claiming() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let actor = TestActors::patient(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::time_slot(
            slot_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            organization_id,
            date(2026, 9, 1),
            "09:00",
            "09:30",
            "blocked",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let result = service
        .book_appointment(
            &actor,
            BookAppointmentRequest {
                patient_id: actor.id,
                time_slot_id: slot_id,
                reason_for_visit: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn early_cancellation_releases_the_slot() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let actor = TestActors::patient(organization_id);

    // Starts in two days at 10:00, comfortably past the 24h window.
    let appointment_date = Utc::now().date_naive() + Duration::days(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            actor.id,
            Uuid::new_v4(),
            organization_id,
            slot_id,
            appointment_date,
            "10:00",
            "10:30",
            "scheduled",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            actor.id,
            Uuid::new_v4(),
            organization_id,
            slot_id,
            appointment_date,
            "10:00",
            "10:30",
            "cancelled",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(query_param("status", "eq.booked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::time_slot(
            slot_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            organization_id,
            appointment_date,
            "10:00",
            "10:30",
            "available",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let cancelled = service
        .cancel_appointment(
            &actor,
            appointment_id,
            CancelAppointmentRequest {
                reason: "schedule change".to_string(),
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn late_cancellation_forfeits_the_slot() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let actor = TestActors::patient(organization_id);

    // Starts in two hours: inside the 24h window, still in the future.
    let starts_at = Utc::now() + Duration::hours(2);
    let appointment_date = starts_at.date_naive();
    let start_time = starts_at.format("%H:%M").to_string();
    let end_time = (starts_at + Duration::minutes(30)).format("%H:%M").to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            actor.id,
            Uuid::new_v4(),
            organization_id,
            slot_id,
            appointment_date,
            &start_time,
            &end_time,
            "scheduled",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            actor.id,
            Uuid::new_v4(),
            organization_id,
            slot_id,
            appointment_date,
            &start_time,
            &end_time,
            "cancelled",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The slot is forfeited: no release may be attempted.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let cancelled = service
        .cancel_appointment(
            &actor,
            appointment_id,
            CancelAppointmentRequest {
                reason: "emergency".to_string(),
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn cancelling_a_past_appointment_fails() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let actor = TestActors::patient(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            actor.id,
            Uuid::new_v4(),
            organization_id,
            Uuid::new_v4(),
            Utc::now().date_naive() - Duration::days(1),
            "10:00",
            "10:30",
            "scheduled",
        )])))
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let result = service
        .cancel_appointment(
            &actor,
            appointment_id,
            CancelAppointmentRequest {
                reason: "too late".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[tokio::test]
async fn completing_a_scheduled_appointment_is_an_invalid_transition() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let actor = TestActors::doctor(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            Uuid::new_v4(),
            actor.id,
            organization_id,
            Uuid::new_v4(),
            date(2026, 9, 1),
            "10:00",
            "10:30",
            "scheduled",
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let result = service.complete(&actor, appointment_id, "token").await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Completed,
        })
    );
}

#[tokio::test]
async fn terminal_appointments_accept_no_transitions() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let actor = TestActors::doctor(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            Uuid::new_v4(),
            actor.id,
            organization_id,
            Uuid::new_v4(),
            Utc::now().date_naive() + Duration::days(3),
            "10:00",
            "10:30",
            "completed",
        )])))
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());

    assert_matches!(
        service.check_in(&actor, appointment_id, "token").await,
        Err(AppointmentError::InvalidTransition { .. })
    );
    assert_matches!(
        service
            .cancel_appointment(
                &actor,
                appointment_id,
                CancelAppointmentRequest {
                    reason: "change of plans".to_string(),
                },
                "token",
            )
            .await,
        Err(AppointmentError::InvalidTransition { .. })
    );
    assert_matches!(
        service.mark_no_show(&actor, appointment_id, "token").await,
        Err(AppointmentError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn start_visit_creates_and_links_an_encounter() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let encounter_id = Uuid::new_v4();
    let actor = TestActors::doctor(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            Uuid::new_v4(),
            actor.id,
            organization_id,
            Uuid::new_v4(),
            date(2026, 9, 1),
            "10:00",
            "10:30",
            "checked_in",
        )])))
        .mount(&mock_server)
        .await;

    let mut in_progress = MockRows::appointment(
        appointment_id,
        Uuid::new_v4(),
        actor.id,
        organization_id,
        Uuid::new_v4(),
        date(2026, 9, 1),
        "10:00",
        "10:30",
        "in_progress",
    );
    in_progress["encounter_id"] = json!(encounter_id);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.checked_in"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([in_progress])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut encounters = MockEncounters::new();
    encounters
        .expect_create_encounter()
        .times(1)
        .returning(move |_, _, _, _, _| Ok(encounter_id));

    let service = service_with(&mock_server, Arc::new(encounters));
    let started = service.start_visit(&actor, appointment_id, "token").await.unwrap();

    assert_eq!(started.status, AppointmentStatus::InProgress);
    assert_eq!(started.encounter_id, Some(encounter_id));
}

#[tokio::test]
async fn start_visit_aborts_when_encounter_creation_fails() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let actor = TestActors::doctor(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            appointment_id,
            Uuid::new_v4(),
            actor.id,
            organization_id,
            Uuid::new_v4(),
            date(2026, 9, 1),
            "10:00",
            "10:30",
            "checked_in",
        )])))
        .mount(&mock_server)
        .await;

    // The status write must never happen if the encounter fails.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut encounters = MockEncounters::new();
    encounters.expect_create_encounter().times(1).returning(|_, _, _, _, _| {
        Err(AppointmentError::EncounterCreation(
            "encounter service unavailable".to_string(),
        ))
    });

    let service = service_with(&mock_server, Arc::new(encounters));
    let result = service.start_visit(&actor, appointment_id, "token").await;

    assert_matches!(result, Err(AppointmentError::EncounterCreation(_)));
}

#[tokio::test]
async fn search_applies_filters_pagination_and_sort() {
    let mock_server = MockServer::start().await;
    let organization_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let actor = TestActors::admin(organization_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("organization_id", format!("eq.{}", organization_id)))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("status", "eq.completed"))
        .and(query_param("order", "appointment_date.desc,start_time.desc"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockRows::appointment(
            Uuid::new_v4(),
            patient_id,
            Uuid::new_v4(),
            organization_id,
            Uuid::new_v4(),
            date(2026, 7, 1),
            "10:00",
            "10:30",
            "completed",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let appointments = service
        .search_appointments(
            &actor,
            AppointmentSearchQuery {
                patient_id: Some(patient_id),
                status: Some(AppointmentStatus::Completed),
                pagination: shared_models::Pagination {
                    limit: Some(10),
                    offset: Some(20),
                },
                ..Default::default()
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn records_outside_the_actors_organization_are_not_found() {
    let mock_server = MockServer::start().await;
    let actor = TestActors::patient(Uuid::new_v4());

    // Org-scoped filter matches nothing: existence is not leaked.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = service_with(&mock_server, quiet_encounters());
    let result = service.get_appointment(&actor, Uuid::new_v4(), "token").await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}
