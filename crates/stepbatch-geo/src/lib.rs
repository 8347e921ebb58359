//! stepbatch-geo: IP geolocation as a batch kind
//!
//! Address lookups are submitted to a [`Scheduler`](stepbatch_server::Scheduler)
//! through [`GeoLookup`]. Lookups made during one step are deduplicated,
//! split into pages of at most 100 addresses and sent to the provider's
//! batch endpoint. Results are cached until the `GeoBatch` data source is
//! invalidated.
//!
//! ```ignore
//! use stepbatch_geo::{GeoConfig, GeoLookup};
//!
//! let lookup = GeoLookup::from_config(&GeoConfig::default())?;
//! for (ip, result) in lookup.lookup_all(["1.1.1.1", "8.8.8.8"]).await {
//!     println!("{ip}: {result:?}");
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod info;
pub mod lookup;
pub mod provider;

pub use batch::{GeoBatch, MAX_PAGE_SIZE};
pub use config::{GeoConfig, GeoSettings};
pub use error::GeoError;
pub use info::{GeoInfo, GeoQuery};
pub use lookup::{lookup_descriptor, GeoLookup, GEO_BATCH};
pub use provider::{GeoProvider, IpApiProvider};
