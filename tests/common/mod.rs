//! Handlers shared by the integration tests: a newline-delimited text
//! protocol answering each line with `echo: <line>`.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use wirechain::{
    codec::LengthFieldPrepender,
    pipeline::{Handler, HandlerDir, InboundContext, OutboundContext, Pipeline, PipelineError},
    transport::Transport,
};

/// Splits inbound bytes into lines, holding partial lines until their
/// terminator arrives.
#[derive(Default)]
pub struct LineDecoder {
    pending: BytesMut,
}

impl Handler for LineDecoder {
    type Rin = Bytes;
    type Rout = String;
    type Win = ();
    type Wout = ();

    const DIRECTION: HandlerDir = HandlerDir::In;

    fn read(&mut self, ctx: &mut InboundContext<'_, String, ()>, msg: Bytes) {
        self.pending.extend_from_slice(&msg);
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(end + 1);
            ctx.fire_read(String::from_utf8_lossy(&line[..end]).into_owned());
        }
    }
}

/// Encodes outbound strings as UTF-8.
pub struct StringEncoder;

#[async_trait]
impl Handler for StringEncoder {
    type Rin = ();
    type Rout = ();
    type Win = String;
    type Wout = Bytes;

    const DIRECTION: HandlerDir = HandlerDir::Out;

    async fn write(&mut self, ctx: &mut OutboundContext<'_, Bytes>, msg: String) -> Result<(), PipelineError> {
        ctx.fire_write(Bytes::from(msg)).await
    }
}

/// Answers every line and closes the connection on `bye`.
#[derive(Clone, Default)]
pub struct Responder {
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl Responder {
    pub fn lines(&self) -> Vec<String> { self.seen.lock().expect("seen lock").clone() }
}

impl Handler for Responder {
    type Rin = String;
    type Rout = String;
    type Win = String;
    type Wout = String;

    const DIRECTION: HandlerDir = HandlerDir::In;

    fn read(&mut self, ctx: &mut InboundContext<'_, String, String>, line: String) {
        self.seen.lock().expect("seen lock").push(line.clone());
        ctx.fire_write(format!("echo: {line}"));
        if line == "bye" {
            ctx.fire_close();
        }
    }
}

/// `[prepender(2), encoder, decoder, responder]`, front to back.
pub fn line_pipeline(transport: Arc<dyn Transport>, responder: Responder) -> Pipeline<Bytes, String> {
    let mut pipeline = Pipeline::with_transport(transport);
    pipeline
        .add_back(LengthFieldPrepender::new(2).expect("valid field length"))
        .add_back(StringEncoder)
        .add_back(LineDecoder::default())
        .add_back(responder);
    pipeline
}

/// `payload` framed with a two byte big-endian length.
pub fn framed(payload: &str) -> Vec<u8> {
    let len = u16::try_from(payload.len()).expect("short payload");
    [&len.to_be_bytes()[..], payload.as_bytes()].concat()
}
