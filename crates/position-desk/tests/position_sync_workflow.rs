use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use position_desk::config::GatewayConfig;
use position_desk::positions::codec;
use position_desk::positions::{
    CandidateForm, HttpPositionGateway, MemberForm, MemberId, MemberKind, MutationAction,
    PositionId, PositionSynchronizer, RequestState, SlotState, SyncError, SyncEvent,
    TestQuestionForm,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn positions_service() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/positions/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "number": "ENG-42",
            "name": "Engineer",
            "companyInfo": "Platform team",
            "instruction": "Answer every question",
            "about": "Backend services",
            "openDate": 1709251200,
            "closeDate": 1711929600,
            "candidats": [{
                "id": 11,
                "name": "Ada",
                "email": "ada@example.com",
                "positionId": 42
            }],
            "viewers": [],
            "tests": null
        })))
        .mount(&server)
        .await;
    server
}

fn synchronizer_for(server: &MockServer) -> PositionSynchronizer<HttpPositionGateway> {
    let config =
        GatewayConfig::new(server.uri(), Duration::from_secs(5)).expect("mock URL is valid");
    let gateway = HttpPositionGateway::new(&config).expect("client builds");
    PositionSynchronizer::new(Arc::new(gateway))
}

#[tokio::test]
async fn edits_flow_through_to_the_remote_service() {
    let server = positions_service().await;
    Mock::given(method("POST"))
        .and(path("/tests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 301 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/positions/42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/candidats/11"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut sync = synchronizer_for(&server);
    sync.load(PositionId(42)).await.expect("position loads");
    assert_eq!(sync.state(), SlotState::Ready);
    let open = sync.fields().map(|fields| codec::display_date(&fields.open_date));
    assert_eq!(open.as_deref(), Some("2024-03-01"));

    let question = sync
        .add_member(MemberForm::TestQuestion(TestQuestionForm {
            name: "Explain ownership".to_string(),
            time: "5".to_string(),
        }))
        .expect("question added");
    let mut fields = sync.fields().cloned().expect("fields loaded");
    fields.close_date = codec::from_form_date(
        NaiveDate::from_ymd_opt(2024, 4, 15).expect("valid close date"),
    );
    sync.update_fields(fields).expect("fields updated");
    let ada = sync.candidates().key_of(MemberId(11)).expect("Ada loaded");
    sync.remove_member(MemberKind::Candidate, ada)
        .expect("Ada removed");

    let events = sync.settle().await;

    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|event| !matches!(event, SyncEvent::RolledBack { .. })));
    assert_eq!(question.state(), RequestState::Succeeded);
    assert!(!sync.busy().is_busy());

    let snapshot = sync.snapshot().expect("position still loaded");
    assert!(snapshot.candidates.is_empty());
    assert_eq!(snapshot.tests.len(), 1);
    assert_eq!(snapshot.tests[0].id, MemberId(301));
    assert_eq!(snapshot.tests[0].time, 300);
    assert_eq!(snapshot.tests[0].position_id, PositionId(42));
    assert_eq!(codec::to_epoch_seconds(snapshot.close_date), 1_713_139_200);
}

#[tokio::test]
async fn rejected_candidate_disappears_after_settling() {
    let server = positions_service().await;
    Mock::given(method("POST"))
        .and(path("/candidats"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate email"))
        .mount(&server)
        .await;

    let mut sync = synchronizer_for(&server);
    sync.load(PositionId(42)).await.expect("position loads");

    let ticket = sync
        .add_member(MemberForm::Candidate(CandidateForm {
            name: "Ada Again".to_string(),
            email: "ada@example.com".to_string(),
            ..CandidateForm::default()
        }))
        .expect("candidate accepted locally");
    assert_eq!(sync.candidates().len(), 2);

    let events = sync.settle().await;

    assert_eq!(ticket.state(), RequestState::Failed);
    assert!(matches!(
        events.as_slice(),
        [SyncEvent::RolledBack {
            action: MutationAction::AddMember(MemberKind::Candidate),
            ..
        }]
    ));
    let names: Vec<&str> = sync.candidates().records().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Ada"]);
}

#[tokio::test]
async fn missing_position_leaves_the_slot_unusable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/positions/9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut sync = synchronizer_for(&server);
    let err = sync.load(PositionId(9)).await.expect_err("position missing");
    assert!(matches!(err, SyncError::Gateway(_)));
    assert_eq!(sync.state(), SlotState::LoadFailed);
    assert!(sync.snapshot().is_none());

    let err = sync
        .add_member(MemberForm::TestQuestion(TestQuestionForm {
            name: "Anything".to_string(),
            time: "1".to_string(),
        }))
        .expect_err("nothing to edit");
    assert!(matches!(err, SyncError::NotReady(SlotState::LoadFailed)));
}
