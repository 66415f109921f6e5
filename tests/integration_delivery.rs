mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{delivery_config, queue_config, sample_message, test_pool, MockTransport};
use postroom::config::DeliveryConfig;
use postroom::domain::{Address, OutgoingMessage, SendState, priority};
use postroom::error::QueueError;
use postroom::now_ts;
use postroom::services::{Mailer, ProcessOutcome, QueueHandler};
use postroom::transport::{Transport, TransportError};

fn mailer_with(
    handler: &Arc<QueueHandler>,
    transport: &Arc<MockTransport>,
    defaults: OutgoingMessage,
) -> Mailer {
    Mailer::new(
        Arc::clone(handler),
        Arc::clone(transport) as Arc<dyn postroom::transport::Transport>,
        defaults,
        &queue_config(),
        &delivery_config(),
    )
}

#[tokio::test]
async fn queued_message_is_delivered_and_archived() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::default());
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let outbox_id = mailer
        .queue_message(sample_message("hello"), priority::DEFAULT, None)
        .await
        .unwrap();

    let outcome = mailer.process_next().await.unwrap();
    match outcome {
        ProcessOutcome::Sent { outbox_id: sent_id, sentbox_id } => {
            assert_eq!(sent_id, outbox_id);
            assert!(sentbox_id > 0);
        }
        other => panic!("expected Sent, got {other:?}"),
    }

    assert_eq!(transport.delivered_count(), 1);
    assert!(handler.fetch_outbox().await.unwrap().is_empty());
    assert_eq!(handler.fetch_sentbox().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_delivery_records_error_and_backoff() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::failing(1, "smtp 451 try later"));
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let outbox_id = mailer
        .queue_message(sample_message("flaky"), priority::DEFAULT, None)
        .await
        .unwrap();

    let before = now_ts();
    let outcome = mailer.process_next().await.unwrap();
    let ProcessOutcome::Failed { outbox_id: failed_id, status } = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert_eq!(failed_id, outbox_id);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.state, SendState::Failed);
    assert_eq!(status.error, "delivery failed: smtp 451 try later");

    // First failure pushes the next try out by one backoff step.
    let record = handler.outbox().retrieve(outbox_id).await.unwrap().unwrap();
    assert!(record.last_action_ts >= before + 900);
    assert!(record.last_action_ts <= now_ts() + 900);

    // The row is invisible until the backoff expires.
    assert_eq!(handler.outbox().get_next_pending(9, now_ts()).await.unwrap(), None);
    assert_eq!(
        handler.outbox().get_next_pending(9, record.last_action_ts).await.unwrap(),
        Some(outbox_id)
    );
}

#[tokio::test]
async fn backoff_grows_linearly_with_attempts() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::failing(2, "connection refused"));
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let outbox_id = mailer
        .queue_message(sample_message("unlucky"), priority::DEFAULT, None)
        .await
        .unwrap();

    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::Failed { .. }));
    let first = handler.outbox().retrieve(outbox_id).await.unwrap().unwrap();

    // Make the row eligible again without waiting out the backoff.
    handler.outbox().touch_last_action(outbox_id, Some(now_ts() - 1)).await.unwrap();

    let before = now_ts();
    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::Failed { .. }));
    let second = handler.outbox().retrieve(outbox_id).await.unwrap().unwrap();

    assert_eq!(second.attempts, 2);
    assert!(second.last_action_ts >= before + 1800);
    assert!(second.last_action_ts > first.last_action_ts);
}

#[tokio::test]
async fn retry_after_backoff_succeeds_end_to_end() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::failing(1, "greylisted"));
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let outbox_id = mailer
        .queue_message(sample_message("eventually"), priority::DEFAULT, None)
        .await
        .unwrap();

    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::Failed { .. }));
    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::QueueEmpty));

    handler.outbox().touch_last_action(outbox_id, Some(now_ts() - 1)).await.unwrap();

    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::Sent { .. }));
    assert_eq!(transport.delivered_count(), 1);
    assert_eq!(handler.fetch_sentbox().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_rows_are_skipped() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::default());
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let outbox_id = mailer
        .queue_message(sample_message("dead letter"), priority::DEFAULT, None)
        .await
        .unwrap();

    handler.outbox().update_status(outbox_id, SendState::Failed, "gave up", 9).await.unwrap();
    handler.outbox().touch_last_action(outbox_id, Some(now_ts() - 1)).await.unwrap();

    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::QueueEmpty));
    assert_eq!(transport.delivered_count(), 0);

    // Still visible to operators, just never retried.
    let entries = handler.fetch_outbox().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status.attempts, 9);
}

#[tokio::test]
async fn rejected_messages_are_never_persisted() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::default());
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let mut message = sample_message("no recipients");
    message.to.clear();

    let err = mailer.queue_message(message, priority::DEFAULT, None).await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));

    assert!(handler.fetch_outbox().await.unwrap().is_empty());
}

#[tokio::test]
async fn direct_send_archives_at_system_priority() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::default());
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let report = mailer.send_message(sample_message("urgent"), true).await.unwrap();

    assert!(report.sent);
    assert!(report.sentbox_id.is_some());
    assert_eq!(report.status.state, SendState::Succeeded);
    assert_eq!(report.status.priority, priority::SYSTEM);

    // Bypasses the outbox entirely.
    assert!(handler.fetch_outbox().await.unwrap().is_empty());
    assert_eq!(handler.fetch_sentbox().await.unwrap().len(), 1);
}

#[tokio::test]
async fn direct_send_failure_is_reported_not_retried() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::failing(1, "mailbox full"));
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let report = mailer.send_message(sample_message("bounced"), true).await.unwrap();

    assert!(!report.sent);
    assert!(report.sentbox_id.is_none());
    assert!(report.status.error.contains("mailbox full"));
    // No retry bookkeeping for direct sends.
    assert_eq!(report.status.attempts, 0);

    assert!(handler.fetch_outbox().await.unwrap().is_empty());
    assert!(handler.fetch_sentbox().await.unwrap().is_empty());
}

#[tokio::test]
async fn template_fills_empty_fields_only() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::default());

    let defaults = OutgoingMessage {
        from: Address::new("noreply@example.org", "Postroom"),
        subject: "(no subject)".into(),
        ..Default::default()
    };
    let mailer = mailer_with(&handler, &transport, defaults);

    // From and subject come from the template, the recipient is the caller's.
    let message = OutgoingMessage {
        to: vec![Address::bare("user@example.org")],
        body: "<p>hi</p>".into(),
        ..Default::default()
    };
    mailer.queue_message(message, priority::DEFAULT, None).await.unwrap();

    // A caller-supplied From wins over the template.
    let mut custom = sample_message("custom sender");
    custom.from = Address::bare("alerts@example.org");
    mailer.queue_message(custom, priority::DEFAULT, None).await.unwrap();

    let entries = handler.fetch_outbox().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message.from.addr, "noreply@example.org");
    assert_eq!(entries[0].message.subject, "(no subject)");
    assert_eq!(entries[1].message.from.addr, "alerts@example.org");
}

/// Transport whose send never returns within any test-sized timeout.
#[derive(Debug, Default)]
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    fn validate(&self, _message: &OutgoingMessage) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, _message: &OutgoingMessage) -> Result<(), TransportError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(())
    }
}

#[tokio::test]
async fn hung_send_times_out_as_a_delivery_failure() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let mailer = Mailer::new(
        Arc::clone(&handler),
        Arc::new(StalledTransport),
        OutgoingMessage::default(),
        &queue_config(),
        &DeliveryConfig { worker_interval_secs: 1, send_timeout_secs: 1 },
    );

    let outbox_id = mailer
        .queue_message(sample_message("stuck"), priority::DEFAULT, None)
        .await
        .unwrap();

    let before = now_ts();
    let outcome = mailer.process_next().await.unwrap();
    let ProcessOutcome::Failed { outbox_id: failed_id, status } = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert_eq!(failed_id, outbox_id);
    assert_eq!(status.attempts, 1);
    assert!(status.error.contains("timed out after 1s"));

    // The timeout feeds the same backoff path as any other failure.
    let record = handler.outbox().retrieve(outbox_id).await.unwrap().unwrap();
    assert_eq!(record.state, SendState::Failed.as_i64());
    assert!(record.last_action_ts >= before + 900);
}

#[tokio::test]
async fn scheduled_messages_wait_for_their_time() {
    let pool = test_pool().await;
    let handler = Arc::new(QueueHandler::new(pool, &queue_config()));
    let transport = Arc::new(MockTransport::default());
    let mailer = mailer_with(&handler, &transport, OutgoingMessage::default());

    let outbox_id = mailer
        .queue_message(sample_message("digest"), priority::NEWSLETTER, Some(now_ts() + 3600))
        .await
        .unwrap();

    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::QueueEmpty));

    // Pull the scheduled time into the past and let the refresh promote it.
    handler.outbox().touch_last_action(outbox_id, Some(now_ts() - 1)).await.unwrap();

    assert!(matches!(mailer.process_next().await.unwrap(), ProcessOutcome::Sent { .. }));
    assert_eq!(transport.delivered_count(), 1);
}
