pub mod fingerprint;
pub mod time;

pub use fingerprint::text_sha1;
pub use time::{format_timestamp, parse_timestamp};
