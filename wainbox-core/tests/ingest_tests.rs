// tests/ingest_tests.rs

use std::sync::Arc;
use serde_json::json;

use wainbox_common::models::{Direction, MessageStatus, MessageType};
use wainbox_common::traits::repository_traits::MessageRepository;
use wainbox_core::{
    eventbus::{ChatEvent, EventBus},
    ingest::{
        sources_from_dir, IngestionDriver, MessageOutcome, SourceOutcome, StatusOutcome,
    },
    repositories::InMemoryMessageRepository,
    test_utils::helpers::*,
    Error,
};

fn setup() -> (Arc<InMemoryMessageRepository>, Arc<EventBus>, IngestionDriver) {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let bus = Arc::new(EventBus::new());
    let driver = IngestionDriver::new(repo.clone(), bus.clone());
    (repo, bus, driver)
}

#[tokio::test]
async fn test_text_message_end_to_end() -> Result<(), Error> {
    let (repo, bus, driver) = setup();
    let mut rx = bus.subscribe(None).await;

    let payload = text_message_payload("wamid.1", "919937320320", "Ravi Kumar", "Hi", json!("1700000000"));
    let outcome = driver.process_value("wamid1.json", payload).await?;
    assert!(matches!(
        outcome,
        SourceOutcome::Messages { ref messages, .. }
            if messages == &vec![MessageOutcome::Inserted { external_id: "wamid.1".into() }]
    ));

    let stored = repo.find_by_external_id("wamid.1").await?.expect("message stored");
    assert_eq!(stored.conversation_id, "919937320320");
    assert_eq!(stored.text.as_deref(), Some("Hi"));
    assert_eq!(stored.timestamp.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    assert_eq!(stored.status, MessageStatus::Delivered);
    assert_eq!(stored.direction, Direction::Inbound);
    assert_eq!(stored.sender.name.as_deref(), Some("Ravi Kumar"));

    assert_eq!(rx.recv().await, Some(ChatEvent::NewMessage(stored)));
    Ok(())
}

#[tokio::test]
async fn test_double_ingest_is_idempotent() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    let payload = text_message_payload("wamid.1", "91999", "Ravi", "Hi", json!("1700000000"));

    driver.process_value("first.json", payload.clone()).await?;
    let before = repo.find_by_external_id("wamid.1").await?;
    let second = driver.process_value("again.json", payload).await?;

    assert!(matches!(
        second,
        SourceOutcome::Messages { ref messages, .. }
            if matches!(messages.as_slice(), [MessageOutcome::Duplicate { .. }])
    ));
    assert_eq!(repo.len(), 1);
    assert_eq!(repo.find_by_external_id("wamid.1").await?, before);
    Ok(())
}

#[tokio::test]
async fn test_string_and_number_timestamps_agree() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    driver
        .process_value("a.json", text_message_payload("wamid.s", "91999", "Ravi", "a", json!("1700000000")))
        .await?;
    driver
        .process_value("b.json", text_message_payload("wamid.n", "91999", "Ravi", "b", json!(1700000000)))
        .await?;

    let s = repo.find_by_external_id("wamid.s").await?.expect("string ts stored");
    let n = repo.find_by_external_id("wamid.n").await?.expect("number ts stored");
    assert_eq!(s.timestamp, n.timestamp);
    Ok(())
}

#[tokio::test]
async fn test_read_receipt_updates_status() -> Result<(), Error> {
    let (repo, bus, driver) = setup();
    driver
        .process_value("msg.json", text_message_payload("wamid.1", "91999", "Ravi", "Hi", json!("1700000000")))
        .await?;
    let mut rx = bus.subscribe(None).await;

    let outcome = driver
        .process_value("receipt.json", json!({"message_id": "wamid.1", "status": "read", "timestamp": "1700000300"}))
        .await?;
    assert!(matches!(outcome, SourceOutcome::Status { status: StatusOutcome::Applied { .. } }));

    let stored = repo.find_by_external_id("wamid.1").await?.expect("message stored");
    assert_eq!(stored.status, MessageStatus::Read);
    assert_eq!(stored.timestamp.timestamp(), 1_700_000_300);
    assert!(stored.processing_times.reconciled_at.is_some());
    assert_eq!(stored.text.as_deref(), Some("Hi"));

    assert_eq!(rx.recv().await, Some(ChatEvent::StatusUpdate(stored)));
    Ok(())
}

#[tokio::test]
async fn test_receipt_for_unknown_message_changes_nothing() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    driver
        .process_value("msg.json", text_message_payload("wamid.1", "91999", "Ravi", "Hi", json!("1700000000")))
        .await?;
    let before = repo.find_by_external_id("wamid.1").await?;

    let outcome = driver.process_value("r.json", status_payload("wamid.404", "read")).await?;
    assert_eq!(
        outcome,
        SourceOutcome::Status { status: StatusOutcome::NotFound { message_id: "wamid.404".into() } }
    );
    assert_eq!(repo.len(), 1);
    assert_eq!(repo.find_by_external_id("wamid.1").await?, before);
    Ok(())
}

#[tokio::test]
async fn test_image_message_gets_placeholder_text() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    driver
        .process_value("img.json", media_message_payload("wamid.img", "91999", "image"))
        .await?;

    let stored = repo.find_by_external_id("wamid.img").await?.expect("image stored");
    assert_eq!(stored.text.as_deref(), Some("[image message]"));
    assert_eq!(stored.message_type, MessageType::Image);
    Ok(())
}

#[tokio::test]
async fn test_relay_wrapper_diagnostics_are_kept() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    let webhook = text_message_payload("wamid.w", "91999", "Ravi", "Hi", json!("1754400000"));
    driver
        .process_value("wrapped.json", relay_wrapped("conv1-msg1-user", webhook))
        .await?;

    let stored = repo.find_by_external_id("wamid.w").await?.expect("wrapped message stored");
    assert_eq!(stored.payload_id.as_deref(), Some("conv1-msg1-user"));
    assert_eq!(stored.executed, Some(true));
    assert!(stored.processing_times.created_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_envelope_statuses_are_reconciled() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    driver
        .process_value("msg.json", text_message_payload("wamid.1", "91999", "Ravi", "Hi", json!("1700000000")))
        .await?;

    let with_status = json!({
        "entry": [{
            "changes": [{
                "field": "messages",
                "value": {
                    "statuses": [{"id": "wamid.1", "status": "read", "timestamp": "1700000500", "recipient_id": "91999"}]
                }
            }]
        }]
    });
    let outcome = driver.process_value("statuses.json", with_status).await?;
    assert!(matches!(
        outcome,
        SourceOutcome::Messages { ref statuses, .. }
            if matches!(statuses.as_slice(), [StatusOutcome::Applied { .. }])
    ));
    let stored = repo.find_by_external_id("wamid.1").await?.expect("message stored");
    assert_eq!(stored.status, MessageStatus::Read);
    Ok(())
}

#[tokio::test]
async fn test_directory_run_continues_past_malformed_file() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("01_message.json"),
        text_message_payload("wamid.A", "91999", "Ravi", "one", json!("1700000000")).to_string(),
    )?;
    std::fs::write(dir.path().join("02_broken.json"), "{\"entry\": [")?;
    std::fs::write(
        dir.path().join("03_message.json"),
        text_message_payload("wamid.B", "91888", "Asha", "three", json!("1700000060")).to_string(),
    )?;

    let sources = sources_from_dir(dir.path()).await?;
    let report = driver.run(&sources).await?;

    let labels: Vec<_> = report.sources.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["01_message.json", "02_broken.json", "03_message.json"]);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.inserted(), 2);
    assert_eq!(repo.len(), 2);

    let conversations = repo.list_conversations().await?;
    assert_eq!(conversations[0].conversation_id, "91888");
    Ok(())
}

#[tokio::test]
async fn test_bad_entries_fail_alone_within_a_batch() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    let mixed = json!({
        "entry": [{
            "id": null,
            "changes": [{
                "field": "messages",
                "value": {
                    "contacts": null,
                    "messages": [
                        {"from": "91999", "id": "wamid.good", "timestamp": "1700000000", "type": "text", "text": {"body": "Hi"}},
                        {"from": 91888, "id": "wamid.numeric-from", "timestamp": 1700000060, "type": "text", "text": {"body": "Yo"}},
                        {"from": "91999", "id": null, "timestamp": "1700000000", "type": "text"},
                        {"from": "91999", "id": "wamid.untyped", "timestamp": "1700000000", "type": null},
                        "not a message"
                    ],
                    "statuses": [{"id": "wamid.good", "status": "read", "timestamp": ""}, 17]
                }
            }]
        }]
    });

    let outcome = driver.process_value("mixed.json", mixed).await?;
    let SourceOutcome::Messages { messages, statuses } = outcome else {
        panic!("expected a message batch outcome");
    };
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0], MessageOutcome::Inserted { external_id: "wamid.good".into() });
    assert_eq!(messages[1], MessageOutcome::Inserted { external_id: "wamid.numeric-from".into() });
    assert!(messages[2..].iter().all(|m| matches!(m, MessageOutcome::Failed { .. })));
    assert_eq!(messages[3].external_id(), "wamid.untyped");

    assert!(matches!(statuses.as_slice(), [StatusOutcome::Applied { .. }, StatusOutcome::Failed { .. }]));

    assert_eq!(repo.len(), 2);
    let good = repo.find_by_external_id("wamid.good").await?.expect("good message stored");
    assert_eq!(good.sender.name.as_deref(), Some("Unknown"));
    assert_eq!(good.status, MessageStatus::Read);
    assert_eq!(good.timestamp.timestamp(), 1_700_000_000);
    let numeric = repo.find_by_external_id("wamid.numeric-from").await?.expect("numeric sender stored");
    assert_eq!(numeric.conversation_id, "91888");
    Ok(())
}

#[tokio::test]
async fn test_blank_receipt_timestamp_still_applies_status() -> Result<(), Error> {
    let (repo, _bus, driver) = setup();
    driver
        .process_value("msg.json", text_message_payload("wamid.1", "91999", "Ravi", "Hi", json!("1700000000")))
        .await?;

    for (label, ts) in [("empty.json", json!("")), ("zero.json", json!(0))] {
        let outcome = driver
            .process_value(label, json!({"message_id": "wamid.1", "status": "read", "timestamp": ts}))
            .await?;
        assert!(matches!(outcome, SourceOutcome::Status { status: StatusOutcome::Applied { .. } }));
    }

    let stored = repo.find_by_external_id("wamid.1").await?.expect("message stored");
    assert_eq!(stored.status, MessageStatus::Read);
    assert_eq!(stored.timestamp.timestamp(), 1_700_000_000);
    Ok(())
}

#[tokio::test]
async fn test_idle_subscriber_does_not_stall_ingestion() -> Result<(), Error> {
    let (repo, bus, driver) = setup();
    let _idle = bus.subscribe(Some(1)).await;

    let messages: Vec<_> = (0..4)
        .map(|i| json!({"from": "91999", "id": format!("wamid.{}", i), "timestamp": "1700000000", "type": "text", "text": {"body": "hi"}}))
        .collect();
    let batch = json!({"entry": [{"changes": [{"field": "messages", "value": {"messages": messages}}]}]});

    tokio::time::timeout(std::time::Duration::from_secs(2), driver.process_value("burst.json", batch))
        .await
        .expect("ingestion must not wait on an idle subscriber")?;

    assert_eq!(repo.len(), 4);
    assert_eq!(bus.subscriber_count().await, 0);
    Ok(())
}
