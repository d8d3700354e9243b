#![forbid(unsafe_code)]

//! The transport seam.
//!
//! The runtime hands a [`WireRequest`] to a [`Transport`] and expects a
//! [`WireResponse`] that preserves per-action ids. How bytes move is the
//! implementor's concern.

use thiserror::Error;

use crate::wire::{WireRequest, WireResponse};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub trait Transport {
    /// Send one batch and wait for its response.
    ///
    /// # Errors
    ///
    /// A transport-level failure fails every action in the request.
    fn exchange(&mut self, request: &WireRequest) -> Result<WireResponse, TransportError>;
}

impl<F> Transport for F
where
    F: FnMut(&WireRequest) -> Result<WireResponse, TransportError>,
{
    fn exchange(&mut self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        self(request)
    }
}

/// A transport with no server behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn exchange(&mut self, _request: &WireRequest) -> Result<WireResponse, TransportError> {
        Err(TransportError::Unavailable("offline".into()))
    }
}
