//! Echo server framing each reply with a two byte length.
//!
//! Every read is written straight back through a [`LengthFieldPrepender`].
//! Prometheus metrics are served on `127.0.0.1:9000`.
//!
//! ```text
//! cargo run --example length_field_echo
//! printf hello | nc 127.0.0.1 7878 | xxd
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use wirechain::{
    codec::LengthFieldPrepender,
    pipeline::{Handler, HandlerDir, InboundContext, Pipeline},
    server::{PipelineServer, ServerError},
    transport::Transport,
};

struct Echo;

impl Handler for Echo {
    type Rin = Bytes;
    type Rout = Bytes;
    type Win = Bytes;
    type Wout = Bytes;

    const DIRECTION: HandlerDir = HandlerDir::In;

    fn read(&mut self, ctx: &mut InboundContext<'_, Bytes, Bytes>, msg: Bytes) {
        info!(len = msg.len(), "echoing");
        ctx.fire_write(msg);
    }
}

fn echo_pipeline(transport: Arc<dyn Transport>) -> Pipeline<Bytes> {
    let mut pipeline = Pipeline::with_transport(transport);
    pipeline
        .add_back(
            LengthFieldPrepender::builder()
                .field_length(2)
                .build()
                .expect("valid field length"),
        )
        .add_back(Echo);
    pipeline
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt::init();

    let metrics_addr: SocketAddr = ([127, 0, 0, 1], 9000).into();
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("install prometheus exporter");

    PipelineServer::new(echo_pipeline)
        .idle_timeout(Duration::from_secs(30))
        .max_connections(1024)
        .bind("127.0.0.1:7878".parse().expect("invalid bind address"))?
        .run()
        .await
}
