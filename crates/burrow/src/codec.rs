//! Codecs mapping values to and from their on-disk byte form.
//!
//! The default codec composes textual JSON with an unpadded standard-alphabet
//! base64 wrapper. The wrapper keeps encoded payloads free of bytes that could
//! be confused with frame prefixes and fixes one canonical byte form
//! independent of the JSON encoder's whitespace choices. Any replacement codec
//! must be chosen at open time and used for the whole life of a data file.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encodes and decodes values of type `T` to and from bytes.
pub trait Codec<T> {
    /// Encodes a value into its byte form.
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    /// Decodes a value from its byte form.
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Textual JSON codec.
#[derive(Debug)]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a new JSON codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Wraps another codec's byte form in base64 (standard alphabet, no padding).
#[derive(Debug)]
pub struct Base64Codec<C> {
    delegate: C,
}

impl<C> Base64Codec<C> {
    /// Wraps `delegate` so its output is base64-framed on disk.
    pub fn wrap(delegate: C) -> Self {
        Self { delegate }
    }
}

impl<T, C> Codec<T> for Base64Codec<C>
where
    C: Codec<T>,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        let inner = self.delegate.encode(value)?;
        Ok(STANDARD_NO_PAD.encode(inner).into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        let inner = STANDARD_NO_PAD.decode(bytes)?;
        self.delegate.decode(&inner)
    }
}

/// The default on-disk codec: JSON wrapped in unpadded base64.
pub type Base64JsonCodec<T> = Base64Codec<JsonCodec<T>>;

impl<T> Base64JsonCodec<T> {
    /// Creates the default codec.
    pub fn new() -> Self {
        Base64Codec::wrap(JsonCodec::new())
    }
}

impl<T> Default for Base64JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}
