pub mod feed_profile;

pub use feed_profile::{Credentials, FeedProfile};
