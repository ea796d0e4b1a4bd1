//! Ordered groups of envelopes sent as one transport unit.

use prost::Message as _;

use crate::envelope::Envelope;
use crate::error::EnvelopeError;
use crate::wire::{EnvelopeBatchProto, EnvelopeProto};

/// Ordered sequence of envelopes.
///
/// Order is transmission order and is preserved through encode/decode.
/// Entries may share correlation tokens; a batch can carry several unrelated
/// exchanges.
///
/// # Examples
///
/// ```
/// use courier_core::{Envelope, EnvelopeBatch};
///
/// let batch = EnvelopeBatch::new(vec![
///     Envelope::new("ping", "a", &b"1"[..], "peer-1"),
///     Envelope::new("ping", "b", &b"2"[..], "peer-1"),
/// ]);
///
/// let decoded = EnvelopeBatch::decode(&batch.encode()).expect("decode");
/// assert_eq!(decoded, batch);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvelopeBatch {
    envelopes: Vec<Envelope>,
}

impl EnvelopeBatch {
    /// Build a batch from envelopes in transmission order.
    pub fn new(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes }
    }

    /// One-element batch, the usual shape for a single outbound message.
    pub fn single(envelope: Envelope) -> Self {
        Self {
            envelopes: vec![envelope],
        }
    }

    /// Number of envelopes.
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Whether the batch holds no envelopes.
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Envelopes in transmission order.
    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    /// Iterate in transmission order.
    pub fn iter(&self) -> std::slice::Iter<'_, Envelope> {
        self.envelopes.iter()
    }

    /// Consume the batch, returning its envelopes in order.
    pub fn into_envelopes(self) -> Vec<Envelope> {
        self.envelopes
    }

    /// Encode to the wire format. An empty batch encodes to zero bytes.
    pub fn encode(&self) -> Vec<u8> {
        EnvelopeBatchProto {
            envelopes: self.envelopes.iter().map(Envelope::to_proto).collect(),
        }
        .encode_to_vec()
    }

    /// Decode from the wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if the batch or any element fails
    /// to parse. Nothing is returned for the elements that did parse.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let proto = EnvelopeBatchProto::decode(bytes)?;
        Ok(Self {
            envelopes: proto.envelopes.into_iter().map(Envelope::from).collect(),
        })
    }

    /// Decode bytes received from a connection, stamping every element with
    /// the transport's identity for that connection.
    ///
    /// # Errors
    ///
    /// Same as [`EnvelopeBatch::decode`].
    pub fn decode_from_peer(bytes: &[u8], sender_identity: &str) -> Result<Self, EnvelopeError> {
        let proto = EnvelopeBatchProto::decode(bytes)?;
        Ok(Self {
            envelopes: proto
                .envelopes
                .into_iter()
                .map(|proto| {
                    Envelope::from(EnvelopeProto {
                        sender_identity: sender_identity.to_string(),
                        ..proto
                    })
                })
                .collect(),
        })
    }
}

impl From<Vec<Envelope>> for EnvelopeBatch {
    fn from(envelopes: Vec<Envelope>) -> Self {
        Self::new(envelopes)
    }
}

impl FromIterator<Envelope> for EnvelopeBatch {
    fn from_iter<I: IntoIterator<Item = Envelope>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for EnvelopeBatch {
    type Item = Envelope;
    type IntoIter = std::vec::IntoIter<Envelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.envelopes.into_iter()
    }
}

impl<'a> IntoIterator for &'a EnvelopeBatch {
    type Item = &'a Envelope;
    type IntoIter = std::slice::Iter<'a, Envelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.envelopes.iter()
    }
}
