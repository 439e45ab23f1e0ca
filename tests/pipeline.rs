//! End-to-end pipeline behaviour against a recording transport.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::{Responder, framed, line_pipeline};
use rstest::{fixture, rstest};
use serial_test::serial;
use wirechain::{
    pipeline::{InboundEndpoint, OutboundEndpoint, Pipeline, PipelineError},
    transport::{Transport, WriteFlags},
};
use wirechain_testing::{LoggerHandle, RecordingTransport, logger};

struct Harness {
    transport: Arc<RecordingTransport>,
    responder: Responder,
    pipeline: Pipeline<Bytes, String>,
}

#[fixture]
fn harness() -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let responder = Responder::default();
    let pipeline = line_pipeline(
        Arc::clone(&transport) as Arc<dyn Transport>,
        responder.clone(),
    );
    Harness {
        transport,
        responder,
        pipeline,
    }
}

#[rstest]
#[tokio::test]
async fn lines_split_across_reads_are_answered_in_order(mut harness: Harness) {
    for chunk in ["hel", "lo\nwor", "ld\n"] {
        harness
            .pipeline
            .read(Bytes::from_static(chunk.as_bytes()))
            .expect("read");
    }
    harness.pipeline.flush().await.expect("flush");

    assert_eq!(harness.responder.lines(), ["hello", "world"]);
    assert_eq!(
        harness.transport.buffers(),
        [framed("echo: hello"), framed("echo: world")]
    );
}

#[rstest]
#[tokio::test]
async fn writes_enter_at_the_back(mut harness: Harness) {
    harness.pipeline.write("hi".to_owned()).await.expect("write");
    assert_eq!(harness.transport.written(), framed("hi"));
}

#[rstest]
#[tokio::test]
async fn close_follows_the_final_reply(mut harness: Harness) {
    harness
        .pipeline
        .read(Bytes::from_static(b"bye\n"))
        .expect("read");
    assert!(harness.pipeline.has_pending_writes());
    harness.pipeline.flush().await.expect("flush");

    assert_eq!(harness.transport.buffers(), [framed("echo: bye")]);
    assert_eq!(harness.transport.close_count(), 1);
    assert!(!harness.pipeline.has_pending_writes());
}

#[rstest]
#[tokio::test]
async fn explicit_close_reaches_the_transport(mut harness: Harness) {
    harness.pipeline.close().await.expect("close");
    assert_eq!(harness.transport.close_count(), 1);
    assert!(harness.transport.writes().is_empty());
}

#[rstest]
#[tokio::test]
async fn transport_failures_surface_to_the_writer(mut harness: Harness) {
    harness.transport.fail_writes(true);
    let err = harness
        .pipeline
        .write("lost".to_owned())
        .await
        .expect_err("write should fail");
    assert!(matches!(err, PipelineError::Transport(_)));
}

#[rstest]
#[tokio::test]
async fn failed_flush_keeps_later_operations_queued(mut harness: Harness) {
    harness
        .pipeline
        .read(Bytes::from_static(b"a\nb\n"))
        .expect("read");
    harness.transport.fail_writes(true);

    assert!(harness.pipeline.flush().await.is_err());
    assert!(harness.pipeline.has_pending_writes());

    harness.transport.fail_writes(false);
    harness.pipeline.flush().await.expect("flush");
    assert_eq!(harness.transport.buffers(), [framed("echo: b")]);
}

#[rstest]
#[tokio::test]
async fn write_flags_reach_the_transport(mut harness: Harness) {
    harness.pipeline.set_write_flags(WriteFlags::CORK);
    harness.pipeline.write("more".to_owned()).await.expect("write");

    let writes = harness.transport.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].1.contains(WriteFlags::CORK));
}

#[rstest]
#[serial(logging)]
#[tokio::test]
async fn removing_the_issuer_discards_its_queued_writes(
    mut harness: Harness,
    mut logger: LoggerHandle,
) {
    harness
        .pipeline
        .read(Bytes::from_static(b"orphan\n"))
        .expect("read");
    let responder: Responder = harness.pipeline.remove().expect("remove responder");
    assert_eq!(responder.lines(), ["orphan"]);

    harness.pipeline.flush().await.expect("flush");
    assert!(harness.transport.writes().is_empty());

    let mut discarded = false;
    while let Some(record) = logger.pop() {
        if record.args().contains("discarding operation from removed handler") {
            assert_eq!(record.level(), log::Level::Warn);
            discarded = true;
        }
    }
    assert!(discarded, "discarded operation was not logged");
}

#[rstest]
fn handler_names_follow_traversal_order(harness: Harness) {
    let inbound = harness.pipeline.inbound_names();
    let outbound = harness.pipeline.outbound_names();

    assert_eq!(inbound.len(), 2);
    assert!(inbound[0].ends_with("LineDecoder"));
    assert!(inbound[1].ends_with("Responder"));
    assert_eq!(outbound.len(), 2);
    assert!(outbound[0].ends_with("StringEncoder"));
    assert!(outbound[1].ends_with("LengthFieldPrepender"));
}
