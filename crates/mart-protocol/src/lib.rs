//! # mart-protocol
//!
//! Wire types for the mart HTTP/JSON transport.
//!
//! Requests carry their parameters in the query string; responses are small
//! JSON documents. Markers travel as decimal strings under the name `etag`.
//!
//! ## Endpoints
//!
//! - `/pub?channel=&size=&life=&one2one=&key=` - Publish the request body
//! - `/sub?cid=&<channel>=<etag>...` - Long-poll one or more channels
//!
//! ## Example
//!
//! ```rust
//! use mart_protocol::{codec, SubResponse, SubscribeParams};
//!
//! let params = SubscribeParams::from_pairs([("cid", "c1"), ("news", "0")]).unwrap();
//! assert_eq!(params.identity.as_deref(), Some("c1"));
//!
//! let body = codec::encode(&SubResponse::error("superseded")).unwrap();
//! let back: SubResponse = codec::decode(&body).unwrap();
//! assert_eq!(back.error.as_deref(), Some("superseded"));
//! ```

pub mod codec;
pub mod params;
pub mod responses;

pub use codec::{decode, encode, ProtocolError};
pub use params::{format_marker, parse_marker, Limits, PublishParams, SubscribeParams};
pub use responses::{ChanResponse, PubResponse, SubResponse};
