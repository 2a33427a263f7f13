//! Edge router core: path info, cache keys, routing decisions and thumbnail results.
//!
//! Everything in this crate is pure: no I/O, no clocks, no randomness. The
//! server crate wires these types to the network.

pub mod cache_key;
pub mod instance;
pub mod path_info;
pub mod routing;
pub mod schema;
pub mod thumbnail;

pub use cache_key::{CacheKey, MAX_CACHE_KEY_LEN};
pub use instance::Instance;
pub use path_info::{PathInfo, PathInfoError};
pub use routing::{Backend, RoutingDecision};
pub use schema::{decode_uuid_response, SchemaError, UuidRecord};
pub use thumbnail::{Image, ThumbnailResult, PLACEHOLDER_PNG};

