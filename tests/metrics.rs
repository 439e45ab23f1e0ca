//! Metrics recorded by pipelines and connection managers.
#![cfg(feature = "metrics")]

mod common;

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use common::{Responder, line_pipeline};
use futures::executor::block_on;
use rstest::rstest;
use wirechain::{
    CONNECTIONS_MANAGED,
    ERRORS_TOTAL,
    FRAMES_PROCESSED,
    IDLE_DROPS_TOTAL,
    codec::LengthFieldPrepender,
    connection_manager::{ConnectionManager, ConnectionManagerConfig},
    pipeline::{InboundEndpoint, OutboundEndpoint, Pipeline},
    transport::Transport,
};
use wirechain_testing::{FakeConnection, ManualTimer, RecordingTransport, capture_metrics};

#[rstest]
fn frames_are_counted_per_direction() {
    let transport = Arc::new(RecordingTransport::default());
    let ((), metrics) = capture_metrics(|| {
        let mut pipeline = line_pipeline(Arc::clone(&transport) as Arc<dyn Transport>, Responder::default());
        pipeline.read(Bytes::from_static(b"one\n")).expect("read");
        pipeline.read(Bytes::from_static(b"two\nthree\n")).expect("read");
        block_on(pipeline.flush()).expect("flush");
    });

    assert_eq!(metrics.counter(FRAMES_PROCESSED, &[("direction", "inbound")]), 2);
    assert_eq!(metrics.counter(FRAMES_PROCESSED, &[("direction", "outbound")]), 3);
    assert_eq!(transport.buffers().len(), 3);
}

#[rstest]
fn oversized_frames_count_as_errors() {
    let transport = Arc::new(RecordingTransport::default());
    let (result, metrics) = capture_metrics(|| {
        let mut pipeline: Pipeline<(), Bytes> =
            Pipeline::with_transport(Arc::clone(&transport) as Arc<dyn Transport>);
        pipeline.add_back(LengthFieldPrepender::new(1).expect("valid field length"));
        block_on(pipeline.write(Bytes::from(vec![0u8; 300])))
    });

    assert!(result.is_err());
    assert_eq!(metrics.counter(ERRORS_TOTAL, &[]), 1);
    assert_eq!(metrics.counter(FRAMES_PROCESSED, &[("direction", "outbound")]), 0);
    assert!(transport.writes().is_empty());
}

#[rstest]
fn managed_connections_and_idle_drops_are_tracked() {
    let ((), metrics) = capture_metrics(|| {
        let mut manager = ConnectionManager::with_timer(
            ConnectionManagerConfig::new(Duration::from_secs(60)),
            ManualTimer::new(),
        )
        .expect("valid config");
        let keys: Vec<_> = [45, 50, 5]
            .map(|secs| FakeConnection::idle(Duration::from_secs(secs)))
            .into_iter()
            .map(|conn| manager.add_connection(conn as _, true))
            .collect();
        for key in keys {
            manager.on_deactivated(key);
        }
        assert_eq!(manager.drop_idle_connections(3), 2);
    });

    assert_eq!(metrics.gauge(CONNECTIONS_MANAGED), Some(1.0));
    assert_eq!(metrics.counter(IDLE_DROPS_TOTAL, &[]), 2);
}
