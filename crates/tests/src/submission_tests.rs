use pretty_assertions::assert_eq;
use portal::draft::{DraftStep, LocationSelection};
use portal::upload::{is_local_reference, AttachmentSource, StagedFile};
use shared_types::{ClaimStatus, PortalErrorKind, Priority};

use crate::common::{config_for, portal_for, signed_in, signed_out, spawn_backend, MockBackend};

fn png(name: &str) -> StagedFile {
    StagedFile::new(name, "image/png", vec![0x89, 0x50, 0x4e, 0x47])
}

fn parking_draft(portal: &portal::Portal) -> portal::draft::ClaimDraft {
    let mut draft = portal.new_draft();
    draft.select_service("smart-parking").unwrap();
    draft.set_title("Paiement refusé à l'horodateur").unwrap();
    draft
        .set_description("La borne a débité ma carte sans valider le ticket")
        .unwrap();
    draft.set_priority(Priority::High).unwrap();
    draft
        .set_location(LocationSelection {
            address: "Place des Nations Unies, Casablanca".into(),
            latitude: Some(33.5951),
            longitude: Some(-7.6187),
        })
        .unwrap();
    draft
}

fn fill_parking_fields(draft: &mut portal::draft::ClaimDraft) {
    draft.set_field("issueCategory", "payment_failure").unwrap();
    draft.set_field("spotNumber", "P-0042").unwrap();
    draft.set_field("licensePlate", "12345-A-6").unwrap();
    draft.set_field("transactionId", "TX_98765").unwrap();
}

#[tokio::test]
async fn parking_claim_submits_service_code_and_extra_data() {
    let (backend, base) = spawn_backend().await;
    let portal = portal_for(&base, signed_in());
    let mut draft = parking_draft(&portal);

    assert_eq!(portal.advance_draft(&mut draft).await.unwrap(), DraftStep::ServiceFields);
    fill_parking_fields(&mut draft);
    let step = portal.advance_draft(&mut draft).await.unwrap();

    let DraftStep::Submitted(receipt) = step else {
        panic!("expected submitted, got {step:?}");
    };
    assert_eq!(receipt.claim_id, "c-1");
    assert_eq!(receipt.claim_number.as_deref(), Some("SPK-0001"));

    let created = backend.created.lock().unwrap()[0].clone();
    assert_eq!(created["claim"]["serviceType"], "SPK");
    assert_eq!(created["claim"]["priority"], "high");
    assert_eq!(created["claim"]["extraData"]["transactionId"], "TX_98765");
    assert_eq!(created["claim"]["location"]["address"], "Place des Nations Unies, Casablanca");
    assert_eq!(created["user"]["email"], "amal.benali@example.ma");

    // The new claim is reconciled into the local store.
    let stored = portal.store().claim("c-1").unwrap();
    assert_eq!(stored.status, ClaimStatus::Submitted);
}

#[tokio::test]
async fn invalid_extra_field_blocks_submission() {
    let (backend, base) = spawn_backend().await;
    let portal = portal_for(&base, signed_in());
    let mut draft = parking_draft(&portal);
    portal.advance_draft(&mut draft).await.unwrap();
    fill_parking_fields(&mut draft);
    draft.set_field("spotNumber", "42").unwrap();

    let err = portal.advance_draft(&mut draft).await.unwrap_err();

    assert_eq!(err.kind, PortalErrorKind::Validation);
    assert!(err.field_errors.contains_key("spotNumber"));
    assert_eq!(draft.step(), &DraftStep::ServiceFields);
    assert_eq!(MockBackend::count(&backend.create_calls), 0);
}

#[tokio::test]
async fn attachments_upload_in_order() {
    let (backend, base) = spawn_backend().await;
    *backend.slow_upload.lock().unwrap() = Some("a.png".into());
    let portal = portal_for(&base, signed_in());

    let mut draft = portal.new_draft();
    draft.select_service("eau-potable").unwrap();
    draft.set_title("Fuite").unwrap();
    draft.set_description("Fuite sur la conduite principale").unwrap();
    draft.stage_files(vec![png("a.png"), png("b.png"), png("c.png")]).unwrap();

    let step = portal.advance_draft(&mut draft).await.unwrap();

    let DraftStep::Submitted(receipt) = step else {
        panic!("expected submitted");
    };
    assert_eq!(receipt.attachment_source, AttachmentSource::Remote);
    assert_eq!(MockBackend::count(&backend.upload_calls), 3);
    let created = backend.created.lock().unwrap()[0].clone();
    let urls: Vec<_> = created["claim"]["attachments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["url"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://cdn.test/claims/a.png",
            "https://cdn.test/claims/b.png",
            "https://cdn.test/claims/c.png",
        ]
    );
}

#[tokio::test]
async fn failed_upload_falls_back_to_local_references() {
    let (backend, base) = spawn_backend().await;
    backend.fail_uploads.store(true, std::sync::atomic::Ordering::SeqCst);
    let portal = portal_for(&base, signed_in());

    let mut draft = portal.new_draft();
    draft.select_service("tri-dechets").unwrap();
    draft.set_title("Bac débordant").unwrap();
    draft.set_description("Le bac de tri n'a pas été vidé").unwrap();
    draft.stage_files(vec![png("bac.png")]).unwrap();

    let step = portal.advance_draft(&mut draft).await.unwrap();

    let DraftStep::Submitted(receipt) = step else {
        panic!("expected submitted");
    };
    assert_eq!(receipt.attachment_source, AttachmentSource::LocalFallback);
    let created = backend.created.lock().unwrap()[0].clone();
    let url = created["claim"]["attachments"][0]["url"].as_str().unwrap();
    assert!(is_local_reference(url));
    assert_eq!(created["claim"]["serviceType"], "TRD");
}

#[tokio::test]
async fn signed_out_submission_is_an_auth_error() {
    let (backend, base) = spawn_backend().await;
    let portal = portal_for(&base, signed_out());

    let mut draft = portal.new_draft();
    draft.select_service("touriste").unwrap();
    draft.set_title("Information erronée").unwrap();
    draft.set_description("Horaires du musée incorrects").unwrap();
    draft.stage_files(vec![png("photo.png")]).unwrap();

    let err = portal.advance_draft(&mut draft).await.unwrap_err();

    assert_eq!(err.kind, PortalErrorKind::Auth);
    assert_eq!(draft.step(), &DraftStep::BaseInfo);
    assert_eq!(draft.last_error().unwrap().kind, PortalErrorKind::Auth);
    assert_eq!(MockBackend::count(&backend.upload_calls), 0);
    assert_eq!(MockBackend::count(&backend.create_calls), 0);
}

#[tokio::test]
async fn backend_rejection_keeps_the_draft() {
    let (backend, base) = spawn_backend().await;
    *backend.reject_create.lock().unwrap() = Some((422, "Adresse hors périmètre".into()));
    let portal = portal_for(&base, signed_in());

    let mut draft = portal.new_draft();
    draft.select_service("proprete-urbaine").unwrap();
    draft.set_title("Dépôt sauvage").unwrap();
    draft.set_description("Gravats abandonnés").unwrap();

    let err = portal.advance_draft(&mut draft).await.unwrap_err();

    assert_eq!(err.status, Some(422));
    assert_eq!(err.user_message(), "Adresse hors périmètre");
    assert_eq!(draft.step(), &DraftStep::BaseInfo);
    assert_eq!(draft.title(), "Dépôt sauvage");

    // Retry after the backend recovers.
    *backend.reject_create.lock().unwrap() = None;
    assert!(matches!(
        portal.advance_draft(&mut draft).await.unwrap(),
        DraftStep::Submitted(_)
    ));
}

#[tokio::test]
async fn submit_draft_runs_all_remaining_steps() {
    let (backend, base) = spawn_backend().await;
    let portal = portal_for(&base, signed_in());
    let mut draft = parking_draft(&portal);
    fill_parking_fields(&mut draft);

    let step = portal.submit_draft(&mut draft).await.unwrap();

    assert!(matches!(step, DraftStep::Submitted(_)));
    assert_eq!(MockBackend::count(&backend.create_calls), 1);
}

#[tokio::test]
async fn stalled_upload_times_out_into_local_fallback() {
    let (backend, base) = spawn_backend().await;
    backend.upload_delay_ms.store(3_000, std::sync::atomic::Ordering::SeqCst);
    let mut config = config_for(&base);
    config.api.timeout_secs = 1;
    let portal = portal::Portal::connect(config, signed_in()).unwrap();

    let mut draft = portal.new_draft();
    draft.select_service("eau-potable").unwrap();
    draft.set_title("Compteur bloqué").unwrap();
    draft.set_description("Le compteur ne tourne plus").unwrap();
    draft.stage_files(vec![png("compteur.png")]).unwrap();

    let step = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        portal.advance_draft(&mut draft),
    )
    .await
    .expect("submission should not hang")
    .unwrap();

    let DraftStep::Submitted(receipt) = step else {
        panic!("expected submitted");
    };
    assert_eq!(receipt.attachment_source, AttachmentSource::LocalFallback);
    assert_eq!(MockBackend::count(&backend.create_calls), 1);
}

#[tokio::test]
async fn configured_file_limit_cannot_exceed_five() {
    let (backend, base) = spawn_backend().await;
    let mut config = config_for(&base);
    config.uploads.max_files = 8;
    let portal = portal::Portal::connect(config, signed_in()).unwrap();

    let mut draft = portal.new_draft();
    draft.select_service("eau-potable").unwrap();
    draft.set_title("Fuite").unwrap();
    draft.set_description("Fuite sur la conduite principale").unwrap();
    let files = (0..8).map(|n| png(&format!("{n}.png"))).collect();
    assert_eq!(draft.stage_files(files).unwrap(), 3);

    let step = portal.advance_draft(&mut draft).await.unwrap();

    assert!(matches!(step, DraftStep::Submitted(_)));
    assert_eq!(MockBackend::count(&backend.upload_calls), 5);
}
