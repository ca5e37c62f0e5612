use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::{ExceptionKind, NewDateException, RuleInterval};
use scheduling_cell::services::{
    AvailabilityRuleStore, BookingStore, DateBlockService, DateExceptionStore, FixedClock,
    SupabaseScheduleStore,
};
use scheduling_cell::{ScheduleError, ScheduleSettings};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn store_for(server: &MockServer) -> SupabaseScheduleStore {
    SupabaseScheduleStore::new(&TestConfig::with_url(server.uri()).to_app_config())
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn list_rules_filters_by_professional() {
    let server = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let pid = professional_id.to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .and(query_param("professional_id", format!("eq.{}", pid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_rule_row(&pid, 1, "08:00:00", "12:00:00", true),
            MockSupabaseResponses::availability_rule_row(&pid, 1, "13:00:00", "18:00:00", false),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rules = store_for(&server).list_rules(professional_id).await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].start_time, hm(8, 0));
    assert!(!rules[1].active);
}

#[tokio::test]
async fn replace_day_rules_is_one_rpc_call() {
    let server = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let pid = professional_id.to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/replace_day_availability"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_json(json!({
            "p_professional_id": pid,
            "p_day_of_week": 3,
            "p_rules": [
                { "start_time": "08:00:00", "end_time": "12:00:00", "active": true },
                { "start_time": "13:00:00", "end_time": "20:00:00", "active": true }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_rule_row(&pid, 3, "08:00:00", "12:00:00", true),
            MockSupabaseResponses::availability_rule_row(&pid, 3, "13:00:00", "20:00:00", true),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let saved = store_for(&server)
        .with_auth_token(Some("user-token".to_string()))
        .replace_day_rules(
            professional_id,
            3,
            vec![
                RuleInterval::new(hm(8, 0), hm(12, 0)),
                RuleInterval::new(hm(13, 0), hm(20, 0)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(saved.len(), 2);
    assert!(saved.iter().all(|r| r.day_of_week == 3 && r.id.is_some()));
}

#[tokio::test]
async fn unique_violation_becomes_constraint_violation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/replace_day_availability"))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::constraint_violation()))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .replace_day_rules(Uuid::new_v4(), 1, vec![RuleInterval::new(hm(8, 0), hm(9, 0))])
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::ConstraintViolation(_));
    assert!(err.user_message().contains("Adjust or remove"));
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = store_for(&server).list_rules(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn exceptions_without_kind_are_inferred_from_note() {
    let server = MockServer::start().await;
    let pid = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/date_exceptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::date_exception_row(
                &Uuid::new_v4().to_string(), &pid,
                "2025-03-10T00:00:00Z", "2025-03-10T23:59:59Z", None, Some("holiday")
            ),
            MockSupabaseResponses::date_exception_row(
                &Uuid::new_v4().to_string(), &pid,
                "2025-03-11T09:00:00Z", "2025-03-11T09:15:00Z", None, Some("manual_slot_block")
            ),
            MockSupabaseResponses::date_exception_row(
                &Uuid::new_v4().to_string(), &pid,
                "2025-03-12T09:00:00Z", "2025-03-12T09:15:00Z", Some("manual_slot"), None
            ),
        ])))
        .mount(&server)
        .await;

    let exceptions = store_for(&server)
        .list_exceptions(
            pid.parse().unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
        )
        .await
        .unwrap();

    let kinds: Vec<ExceptionKind> = exceptions.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![ExceptionKind::FullDay, ExceptionKind::ManualSlot, ExceptionKind::ManualSlot]
    );
}

#[tokio::test]
async fn batch_insert_is_a_single_post() {
    let server = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let pid = professional_id.to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/date_exceptions"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::date_exception_row(
                &Uuid::new_v4().to_string(), &pid,
                "2025-03-10T00:00:00Z", "2025-03-10T23:59:59Z", Some("full_day"), None
            ),
            MockSupabaseResponses::date_exception_row(
                &Uuid::new_v4().to_string(), &pid,
                "2025-03-11T00:00:00Z", "2025-03-11T23:59:59Z", Some("full_day"), None
            ),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let batch: Vec<NewDateException> = [10, 11]
        .into_iter()
        .map(|day| NewDateException {
            professional_id,
            start_at: Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 3, day, 23, 59, 59).unwrap(),
            kind: ExceptionKind::FullDay,
            note: None,
        })
        .collect();

    let created = store_for(&server).insert_exceptions(batch).await.unwrap();
    assert_eq!(created.len(), 2);
}

fn block_service(store: SupabaseScheduleStore) -> DateBlockService {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    DateBlockService::new(Arc::new(store), Arc::new(clock), ScheduleSettings::default())
}

#[tokio::test]
async fn deleting_a_vanished_exception_is_not_found_and_unblock_swallows_it() {
    let server = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let exception_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/date_exceptions"))
        .and(query_param("id", format!("eq.{}", exception_id)))
        .and(query_param("professional_id", format!("eq.{}", professional_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert_matches!(
        store.delete_exception(professional_id, exception_id).await,
        Err(ScheduleError::NotFound(_))
    );
    assert!(block_service(store).unblock_date(professional_id, exception_id).await.is_ok());
}

#[tokio::test]
async fn missing_table_on_delete_is_not_mistaken_for_already_removed() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/date_exceptions"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "42P01",
            "message": "relation \"public.date_exceptions\" does not exist"
        })))
        .mount(&server)
        .await;

    let err = block_service(store_for(&server))
        .unblock_date(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::StoreRejected(_));
}

#[tokio::test]
async fn expired_token_is_unauthorized_not_an_outage() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "PGRST301",
            "message": "JWT expired"
        })))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .with_auth_token(Some("stale-token".to_string()))
        .list_rules(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::Unauthorized(_));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn undecodable_rows_are_rejected_not_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "unexpected": true }])))
        .mount(&server)
        .await;

    let err = store_for(&server).list_rules(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, ScheduleError::StoreRejected(_));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn bookings_query_only_occupying_statuses_in_range() {
    let server = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let pid = professional_id.to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("professional_id", format!("eq.{}", pid)))
        .and(query_param("status", "in.(confirmed,blocked)"))
        .and(query_param("start_at", "lt.2025-03-11T00:00:00Z"))
        .and(query_param("end_at", "gt.2025-03-10T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(), &pid,
                "2025-03-10T09:00:00Z", "2025-03-10T09:15:00Z", "confirmed"
            ),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let bookings = store_for(&server)
        .list_bookings(
            professional_id,
            Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bookings.len(), 1);
    assert!(bookings[0].status.occupies_time());
}

#[tokio::test]
async fn exclusion_violation_on_insert_is_a_constraint_violation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint \"appointments_no_overlap\""
        })))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .insert_appointment(scheduling_cell::models::NewAppointment {
            professional_id: Uuid::new_v4(),
            patient_id: None,
            start_at: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 3, 10, 9, 15, 0).unwrap(),
            status: scheduling_cell::models::AppointmentStatus::Confirmed,
            note: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ScheduleError::ConstraintViolation(_));
}
