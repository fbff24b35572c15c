//! Shipped source adapters.
//!
//! Each adapter turns one kind of external feed into [`NormalizedItem`]s.
//! Both ship a fixture constructor (tests, offline runs) and an HTTP
//! constructor, and both are "bring your own source" templates: anything
//! implementing [`SourceAdapter`] plugs into the collector the same way.
//!
//! [`NormalizedItem`]: crate::collect::NormalizedItem
//! [`SourceAdapter`]: crate::collect::SourceAdapter

pub mod changelog;
pub mod maker_feed;

pub use changelog::ChangelogFeedAdapter;
pub use maker_feed::MakerFeedAdapter;
