//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use rstest::fixture;

use super::{Bound, PipelineServer};
use crate::{
    codec::LengthFieldPrepender,
    pipeline::{Handler, HandlerDir, InboundContext, Pipeline},
    transport::Transport,
};

/// Factory building [`echo_pipeline`]s.
pub type EchoFactory = fn(Arc<dyn Transport>) -> Pipeline<Bytes>;

/// Writes every buffer it reads back to the peer. Reading `quit` tears the
/// connection down instead.
pub struct Echo;

impl Handler for Echo {
    type Rin = Bytes;
    type Rout = Bytes;
    type Win = Bytes;
    type Wout = Bytes;

    const DIRECTION: HandlerDir = HandlerDir::In;

    fn read(&mut self, ctx: &mut InboundContext<'_, Bytes, Bytes>, msg: Bytes) {
        if msg.as_ref() == b"quit" {
            ctx.delete_pipeline();
            return;
        }
        ctx.fire_write(msg);
    }
}

/// Echo pipeline framing each reply with a two byte length.
pub fn echo_pipeline(transport: Arc<dyn Transport>) -> Pipeline<Bytes> {
    let mut pipeline = Pipeline::with_transport(transport);
    pipeline
        .add_back(LengthFieldPrepender::new(2).expect("valid field length"))
        .add_back(Echo);
    pipeline
}

#[fixture]
pub fn echo_factory() -> EchoFactory { echo_pipeline }

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents another process from claiming the
/// port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("Failed to get free listener address")
}

/// Bind a server built from `factory` to `listener`. Idle connections are
/// closed as soon as shutdown starts.
pub fn bind_server(factory: EchoFactory, listener: StdTcpListener) -> PipelineServer<EchoFactory, (), Bound> {
    PipelineServer::new(factory)
        .workers(1)
        .drain_grace(Duration::ZERO)
        .bind_listener(listener)
        .expect("Failed to bind")
}
