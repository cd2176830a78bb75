//! Blocking byte transport between master and apprentice.
//!
//! Connection setup and framing live outside this crate; the handlers only
//! need whole-buffer send and receive. Exactly one exchange is in flight at a
//! time and nothing is retried.

use std::io::{Read, Write};

use thiserror::Error;

/// Transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Request/response primitives consumed by the trap handlers.
///
/// Called from signal handlers, so implementations should stick to plain
/// `read(2)` / `write(2)` style calls.
pub trait Transport {
    /// Send all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Fill all of `buf`.
    fn receive(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Send a single byte.
    fn send_byte(&mut self, value: u8) -> Result<(), TransportError> {
        self.send(&[value])
    }

    /// Receive a single byte.
    fn receive_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        self.receive(&mut byte)?;
        Ok(byte[0])
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        (**self).receive(buf)
    }
}

/// Transport over any blocking byte stream (TCP, Unix socket, pipe pair).
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: Read + Write> StreamTransport<S> {
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.stream.read_exact(buf)?;
        Ok(())
    }
}
