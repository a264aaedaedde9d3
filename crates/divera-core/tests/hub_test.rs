#![allow(clippy::unwrap_used)]
// End-to-end tests for `Hub` against a wiremock Divera.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tracing_subscriber::layer::SubscriberExt;

use divera_core::{
    ActionOutcome, CoreError, EntityKey, Hub, ManualScheduler, PollIntervals, RecentLogs, Record,
    RecordId, RecordKind, RefreshOutcome, UnitConfig, UnitHealth, UnitId,
};

// ── Helpers ─────────────────────────────────────────────────────────

const UNIT: u64 = 100;

fn config(server: &MockServer) -> UnitConfig {
    let mut config = UnitConfig::new(UnitId(UNIT), "FF Musterstadt", SecretString::from("key"));
    config.base_url = Url::parse(&server.uri()).unwrap();
    config.timeout = Duration::from_secs(2);
    config
}

fn hub() -> (Hub, ManualScheduler) {
    let scheduler = ManualScheduler::new();
    (Hub::new(Arc::new(scheduler.clone())), scheduler)
}

fn pull(vehicles: Value, alarms: Value, access: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": {
            "ucr": { "100": { "usergroup_id": 4 } },
            "user": { "access": access },
            "cluster": { "id": 5, "name": "FF Musterstadt", "vehicle": vehicles, "status": [] },
            "alarm": { "items": alarms },
            "message_channel": { "items": [] }
        }
    }))
}

async fn mount_properties(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v2/using-vehicle-property/get/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .mount(server)
        .await;
}

fn vehicle_status(hub: &Hub, id: u64) -> Option<u64> {
    let entity = hub
        .session(UnitId(UNIT))
        .unwrap()
        .store()
        .get(&EntityKey::new(RecordKind::Vehicle, RecordId(id)))?;
    match &entity.record {
        Record::Vehicle(v) => Some(v.status_id),
        _ => None,
    }
}

/// Changed keys of collection records, without the per-unit ones.
fn record_keys(keys: &[EntityKey]) -> Vec<EntityKey> {
    keys.iter().copied().filter(|k| !k.kind.is_unit_scoped()).collect()
}

fn open_alarms(hub: &Hub) -> Option<usize> {
    let entity = hub
        .session(UnitId(UNIT))
        .unwrap()
        .store()
        .get(&EntityKey::new(RecordKind::OpenAlarms, RecordId(UNIT)))?;
    match &entity.record {
        Record::OpenAlarms(c) => Some(c.count),
        _ => None,
    }
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_creates_and_updates_vehicles() {
    let server = MockServer::start().await;
    mount_properties(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .and(query_param("ucr", "100"))
        .and(query_param("accesskey", "key"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(
            json!({
                "1": { "id": 1, "fmsstatus_id": 4 },
                "2": { "id": 2, "fmsstatus_id": 1 }
            }),
            json!([]),
            json!({}),
        ))
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    let first = hub.add_unit(config(&server)).await.unwrap();
    assert!(first.is_applied());
    assert_eq!(vehicle_status(&hub, 1), Some(2));
    assert_eq!(vehicle_status(&hub, 2), None);

    let mut changes = hub.session(UnitId(UNIT)).unwrap().subscribe_changes();
    assert_eq!(scheduler.tick().await, 1);

    let change = changes.recv().await.unwrap();
    assert_eq!(change.created, vec![EntityKey::new(RecordKind::Vehicle, RecordId(2))]);
    assert_eq!(record_keys(&change.updated), vec![EntityKey::new(RecordKind::Vehicle, RecordId(1))]);
    assert!(change.removed.is_empty());
    assert_eq!(vehicle_status(&hub, 1), Some(4));
    assert_eq!(vehicle_status(&hub, 2), Some(1));
}

#[tokio::test]
async fn test_open_alarm_switches_interval() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(
            json!([]),
            json!({ "9": { "id": 9, "title": "B3 Wohnhaus", "closed": false } }),
            json!({}),
        ))
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    let mut config = config(&server);
    config.intervals = PollIntervals::from_secs(120, 15).unwrap();
    hub.add_unit(config).await.unwrap();

    assert_eq!(
        scheduler.delays(),
        vec![("poll:100".to_string(), Duration::from_secs(15))]
    );
}

#[tokio::test]
async fn test_auth_failure_suspends_until_reconfigured() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .and(query_param("accesskey", "key"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .and(query_param("accesskey", "fresh"))
        .respond_with(pull(json!([]), json!([]), json!({})))
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    let result = hub.add_unit(config(&server)).await;
    assert!(matches!(result, Err(CoreError::Authentication { .. })));

    let session = hub.session(UnitId(UNIT)).unwrap();
    assert!(matches!(session.health(), UnitHealth::ReauthRequired { .. }));

    // Suspended ticks never reach the network.
    scheduler.tick().await;
    assert!(matches!(
        hub.refresh(UnitId(UNIT)).await.unwrap(),
        RefreshOutcome::Suspended
    ));

    let outcome = hub
        .reconfigure(UnitId(UNIT), Some(SecretString::from("fresh")), None)
        .await
        .unwrap();
    assert!(outcome.is_applied());
    assert_eq!(session.health(), UnitHealth::Online);
}

#[tokio::test]
async fn test_server_error_keeps_last_data() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();

    let err = hub.refresh(UnitId(UNIT)).await.unwrap_err();
    assert!(err.is_connection());

    let session = hub.session(UnitId(UNIT)).unwrap();
    assert!(matches!(session.health(), UnitHealth::Unavailable { .. }));
    assert!(!session.is_available());
    assert!(session.snapshot().is_some());
    assert_eq!(vehicle_status(&hub, 1), Some(2));
}

#[tokio::test]
async fn test_overlapping_refresh_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!([]), json!([]), json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!([]), json!([]), json!({})).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();

    let (first, second) = tokio::join!(hub.refresh(UnitId(UNIT)), hub.refresh(UnitId(UNIT)));
    let outcomes = [first.unwrap(), second.unwrap()];
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::Skipped))
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 1);
}

#[tokio::test]
async fn test_unreachable_unit_keeps_key_out_of_errors_and_logs() {
    const SECRET: &str = "TOPSECRETKEY";
    let logs = RecentLogs::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(logs.clone()));

    let mut config = UnitConfig::new(UnitId(UNIT), "FF Musterstadt", SecretString::from(SECRET));
    config.base_url = Url::parse("http://127.0.0.1:1/").unwrap();
    config.timeout = Duration::from_secs(2);

    let (hub, _scheduler) = hub();
    let err = hub.add_unit(config).await.unwrap_err();
    assert!(matches!(err, CoreError::Connection { .. }), "got: {err:?}");
    assert!(!err.to_string().contains(SECRET), "{err}");

    match hub.session(UnitId(UNIT)).unwrap().health() {
        UnitHealth::Unavailable { reason } => assert!(!reason.contains(SECRET), "{reason}"),
        other => panic!("expected Unavailable, got {other:?}"),
    }
    let lines = logs.lines();
    assert!(lines.iter().any(|l| l.level == "WARN"));
    assert!(lines.iter().all(|l| !l.message.contains(SECRET)));
}

#[tokio::test]
async fn test_setup_without_reachable_unit_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    let result = hub.setup(vec![config(&server)]).await;
    assert!(matches!(result, Err(CoreError::NoReachableUnit)));
    assert!(hub.units().is_empty());
    assert!(scheduler.is_empty());
}

#[tokio::test]
async fn test_vehicle_properties_are_merged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/using-vehicle-property/get/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "data": { "water": 1600 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();
    let snapshot = hub.session(UnitId(UNIT)).unwrap().snapshot().unwrap();
    let vehicle = snapshot.record(RecordKind::Vehicle, RecordId(1)).unwrap();
    assert_eq!(vehicle["properties"], json!({ "water": 1600 }));
}

// ── Actions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_vehicle_status_is_patched_without_poll() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(
            json!({ "123456": { "id": 123456, "fmsstatus_id": 2 } }),
            json!([]),
            json!({}),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/using-vehicles/set-status/123456"))
        .and(body_json(json!({ "status_id": 5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();

    let outcome = hub
        .call(
            UnitId(UNIT),
            "set_vehicle_status",
            json!({ "vehicle_id": 123456, "status_id": 5 }),
        )
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Patched { key, changes } => {
            assert_eq!(key, EntityKey::new(RecordKind::Vehicle, RecordId(123456)));
            assert_eq!(record_keys(&changes.updated), vec![key]);
        }
        other => panic!("expected Patched, got {other:?}"),
    }
    assert_eq!(vehicle_status(&hub, 123456), Some(5));
}

#[tokio::test]
async fn test_closing_alarm_updates_open_alarm_counter() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(
            json!([]),
            json!({
                "9": { "id": 9, "title": "B3 Wohnhaus", "closed": false },
                "10": { "id": 10, "title": "TH Ölspur", "closed": false }
            }),
            json!({}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/alarms/close/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();
    assert_eq!(open_alarms(&hub), Some(2));

    let outcome = hub
        .call(UnitId(UNIT), "close_alarm", json!({ "alarm_id": 9 }))
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Patched { changes, .. } => {
            assert!(changes.updated.contains(&EntityKey::new(RecordKind::OpenAlarms, RecordId(UNIT))));
        }
        other => panic!("expected Patched, got {other:?}"),
    }
    assert_eq!(open_alarms(&hub), Some(1));
}

#[tokio::test]
async fn test_per_unit_entities_follow_snapshot() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "ucr": { "100": { "usergroup_id": 4 } },
                "status": { "status_id": 1 },
                "cluster": { "id": 5, "name": "FF Musterstadt", "status": { "1": { "id": 1, "name": "Verfügbar" } } },
                "events": { "items": {
                    "3": { "id": 3, "title": "Dienstabend", "start": 4_102_444_800_u64, "end": 4_102_452_000_u64 },
                    "4": { "start": 0, "end": 0, "id": 4 }
                } }
            }
        })))
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();
    let session = hub.session(UnitId(UNIT)).unwrap();
    let store = session.store();

    let by_id = |unique_id: &str| {
        store
            .entities()
            .iter()
            .find(|e| e.unique_id == unique_id)
            .map(|e| (e.name(), e.state()))
    };
    assert_eq!(by_id("100_status"), Some(("Status FF Musterstadt".into(), "Verfügbar".into())));
    assert_eq!(by_id("100_cluster_address"), Some(("FF Musterstadt".into(), "100".into())));
    assert_eq!(by_id("100_calendar"), Some(("FF Musterstadt".into(), "off".into())));
    assert!(by_id("100_event_3").is_some());
    assert!(by_id("100_event_4").is_none());

    let calendar = store
        .get(&EntityKey::new(RecordKind::Calendar, RecordId(UNIT)))
        .unwrap();
    let Record::Calendar(calendar) = &calendar.record else {
        panic!("expected calendar");
    };
    let next = calendar.next_event(chrono::Utc::now()).unwrap();
    assert_eq!(next.title, "Dienstabend");
}

#[tokio::test]
async fn test_created_alarm_appears_after_next_poll() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!([]), json!([]), json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(
            json!([]),
            json!({ "77": { "id": 77, "title": "TH Baum", "closed": false } }),
            json!({}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/alarms"))
        .and(body_json(json!({
            "Alarm": { "title": "TH Baum", "notification_type": 3, "group": [11] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "data": { "id": 77 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();

    let outcome = hub
        .call(
            UnitId(UNIT),
            "create_alarm",
            json!({ "cluster_id": "5", "title": "TH Baum", "notification_type": 2, "group": "11" }),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::AwaitingPoll { .. }));

    let key = EntityKey::new(RecordKind::Alarm, RecordId(77));
    let session = hub.session(UnitId(UNIT)).unwrap();
    assert!(session.store().get(&key).is_none());

    scheduler.tick().await;
    assert!(session.store().get(&key).is_some());
    assert_eq!(session.open_alarm_count(), 1);
}

#[tokio::test]
async fn test_missing_permission_blocks_request() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!([]), json!([]), json!({ "alarm": false, "news": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/alarms"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();

    let result = hub
        .call(
            UnitId(UNIT),
            "create_alarm",
            json!({ "cluster_id": 5, "title": "Probe", "notification_type": 2 }),
        )
        .await;
    match result {
        Err(CoreError::PermissionDenied { permission, .. }) => assert_eq!(permission, "alarm"),
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn test_action_on_unknown_vehicle_is_not_sent() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!([]), json!([]), json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();

    let result = hub
        .call(
            UnitId(UNIT),
            "set_vehicle_crew",
            json!({ "vehicle_id": 4, "mode": "reset" }),
        )
        .await;
    assert!(matches!(result, Err(CoreError::RecordNotFound { .. })));
}

// ── Registry ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_locate_finds_unit_of_record() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .mount(&server)
        .await;

    let (hub, _scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();
    assert_eq!(hub.locate(RecordKind::Vehicle, RecordId(1)), Some(UnitId(UNIT)));
    assert_eq!(hub.locate(RecordKind::Vehicle, RecordId(2)), None);
    assert_eq!(hub.locate(RecordKind::Alarm, RecordId(1)), None);
}

#[tokio::test]
async fn test_reload_rebuilds_unit_from_config() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();
    hub.reload(UnitId(UNIT)).await.unwrap();

    assert_eq!(hub.units(), vec![UnitId(UNIT)]);
    assert_eq!(vehicle_status(&hub, 1), Some(2));
    assert_eq!(scheduler.len(), 1);
}

#[tokio::test]
async fn test_remove_unit_drops_entities_and_job() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .mount(&server)
        .await;

    let (hub, scheduler) = hub();
    hub.add_unit(config(&server)).await.unwrap();
    let session = hub.session(UnitId(UNIT)).unwrap();
    hub.remove_unit(UnitId(UNIT)).await.unwrap();

    assert!(hub.units().is_empty());
    assert_eq!(session.store().len(), 0);
    assert!(scheduler.is_empty());
    assert!(matches!(
        hub.remove_unit(UnitId(UNIT)).await,
        Err(CoreError::UnitNotFound { .. })
    ));
}

#[tokio::test]
async fn test_oneshot_runs_closure_against_ready_hub() {
    let server = MockServer::start().await;
    mount_properties(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/pull/all"))
        .respond_with(pull(json!({ "1": { "id": 1, "fmsstatus_id": 2 } }), json!([]), json!({})))
        .mount(&server)
        .await;

    let count = Hub::oneshot(vec![config(&server)], |hub| async move {
        Ok::<_, CoreError>(hub.entities(UnitId(UNIT))?.len())
    })
    .await
    .unwrap();
    assert_eq!(count, 1 + RecordKind::UNIT_SCOPED.len());
}
