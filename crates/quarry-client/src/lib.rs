//! Quarry Client
//!
//! Blocking client for the remote evaluator service. One operation:
//! send a QIR expression, receive a reduced expression or a server-side
//! error. Frames are length-delimited wire messages; the client is
//! agnostic to the query dialect the server compiles to.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use prost::Message;
use quarry_qir::Expression;
use quarry_wire::proto;
use quarry_wire::WireError;
use thiserror::Error;

/// An evaluation error.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("server error: {0}")]
    Server(String),

    #[error("empty reply from evaluator")]
    EmptyReply,
}

/// Something that can evaluate a QIR expression.
pub trait Evaluate {
    fn evaluate(&mut self, expr: &Expression) -> Result<Expression, ClientError>;
}

/// A connection to a remote evaluator.
pub struct RemoteEvaluator {
    stream: TcpStream,
}

impl RemoteEvaluator {
    /// The service's conventional port.
    pub const DEFAULT_PORT: u16 = 4242;

    /// Connect to an evaluator service.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::debug!(%peer, "connected to evaluator");
        }
        Ok(Self { stream })
    }
}

impl Evaluate for RemoteEvaluator {
    fn evaluate(&mut self, expr: &Expression) -> Result<Expression, ClientError> {
        let request: proto::Expression = expr.into();
        let frame = request.encode_length_delimited_to_vec();
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        tracing::trace!(bytes = frame.len(), "request sent");

        let reply_frame = read_frame(&mut self.stream)?;
        let reply = proto::EvaluateReply::decode(reply_frame.as_slice())?;
        tracing::trace!(bytes = reply_frame.len(), "reply received");

        match reply.result {
            Some(proto::evaluate_reply::Result::Expression(message)) => {
                Ok(message.try_into()?)
            }
            Some(proto::evaluate_reply::Result::Error(message)) => {
                Err(ClientError::Server(message))
            }
            None => Err(ClientError::EmptyReply),
        }
    }
}

/// Read one varint-length-delimited frame.
fn read_frame(reader: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len: u64 = 0;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        len |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "length prefix too long",
            ));
        }
    }

    let mut frame = vec![0u8; len as usize];
    reader.read_exact(&mut frame)?;
    Ok(frame)
}
