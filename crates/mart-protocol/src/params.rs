//! Query-string parameters for `/pub` and `/sub`.

use crate::codec::ProtocolError;
use mart_core::channel::RESERVED_IDENTITY_KEY;
use mart_core::{validate_channel_name, ChannelConfig, Marker};
use std::collections::HashSet;
use std::time::Duration;

/// Request limits enforced while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted payload in bytes.
    pub max_message_size: usize,
    /// Largest accepted channel capacity.
    pub max_channel_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            max_channel_size: 10_000,
        }
    }
}

/// Render a marker the way clients see it.
#[must_use]
pub fn format_marker(marker: Marker) -> String {
    marker.to_string()
}

/// Parse a marker sent by a client.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidEtag`] if `value` is not a decimal integer.
pub fn parse_marker(value: &str) -> Result<Marker, ProtocolError> {
    value
        .trim()
        .parse()
        .map_err(|e| ProtocolError::InvalidEtag(format!("{value:?}: {e}")))
}

/// Parameters of a `/pub` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishParams {
    /// Target channel.
    pub channel: String,
    /// Configuration applied if the request creates the channel.
    pub config: ChannelConfig,
}

impl PublishParams {
    /// Parse `/pub` query pairs. The first occurrence of a key wins.
    ///
    /// Missing `size` and `life` (nanoseconds) come from `defaults`, `one2one`
    /// is on only for the literal `true`, and an empty `key` means none.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is missing or invalid, or `size` or
    /// `life` does not parse or exceeds `limits`.
    pub fn from_pairs<I, K, V>(
        pairs: I,
        defaults: &ChannelConfig,
        limits: &Limits,
    ) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut channel: Option<String> = None;
        let mut size: Option<String> = None;
        let mut life: Option<String> = None;
        let mut one2one: Option<String> = None;
        let mut key: Option<String> = None;

        for (k, v) in pairs {
            let slot = match k.as_ref() {
                "channel" => &mut channel,
                "size" => &mut size,
                "life" => &mut life,
                "one2one" => &mut one2one,
                "key" => &mut key,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(v.as_ref().to_string());
            }
        }

        let channel = channel
            .filter(|c| !c.is_empty())
            .ok_or(ProtocolError::MissingChannel)?;
        validate_channel_name(&channel).map_err(|reason| ProtocolError::InvalidChannel {
            name: channel.clone(),
            reason,
        })?;

        let capacity = match size.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s
                .trim()
                .parse::<usize>()
                .map_err(|e| ProtocolError::InvalidSize(format!("{s:?}: {e}")))?,
            None => defaults.capacity,
        };
        if capacity > limits.max_channel_size {
            return Err(ProtocolError::SizeTooLarge {
                size: capacity,
                max: limits.max_channel_size,
            });
        }

        let life = match life.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s
                .trim()
                .parse::<u64>()
                .map(Duration::from_nanos)
                .map_err(|e| ProtocolError::InvalidLife(format!("{s:?}: {e}")))?,
            None => defaults.life,
        };

        let mut config = ChannelConfig::new(capacity)
            .with_life(life)
            .with_one2one(one2one.as_deref() == Some("true"));
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            config = config.with_key(key);
        }

        Ok(Self { channel, config })
    }

    /// Check a publish body against `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the body is too big.
    pub fn check_payload(&self, payload: &[u8], limits: &Limits) -> Result<(), ProtocolError> {
        if payload.len() > limits.max_message_size {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: limits.max_message_size,
            });
        }
        Ok(())
    }
}

/// Parameters of a `/sub` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeParams {
    /// Subscriber identity from `cid`.
    pub identity: Option<String>,
    /// Requested channels with the marker last seen on each, in request order.
    pub channels: Vec<(String, Marker)>,
}

impl SubscribeParams {
    /// Parse `/sub` query pairs.
    ///
    /// Every key other than `cid` names a channel; its value is the marker the
    /// client last saw there (`0` for none). Repeated keys keep their first
    /// value.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid channel name, a missing or malformed
    /// marker, or when no channel is named.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut identity = None;
        let mut channels = Vec::new();
        let mut seen = HashSet::new();

        for (k, v) in pairs {
            let (k, v) = (k.as_ref(), v.as_ref());
            if k == RESERVED_IDENTITY_KEY {
                if identity.is_none() && !v.is_empty() {
                    identity = Some(v.to_string());
                }
                continue;
            }
            if !seen.insert(k.to_string()) {
                continue;
            }
            validate_channel_name(k).map_err(|reason| ProtocolError::InvalidChannel {
                name: k.to_string(),
                reason,
            })?;
            if v.is_empty() {
                return Err(ProtocolError::MissingEtag(k.to_string()));
            }
            channels.push((k.to_string(), parse_marker(v)?));
        }

        if channels.is_empty() {
            return Err(ProtocolError::NoChannels);
        }
        Ok(Self { identity, channels })
    }
}
