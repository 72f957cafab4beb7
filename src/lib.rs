pub mod batch;
pub mod cluster;
pub mod config;
pub mod distance;
pub mod epsilon;
pub mod error;
pub mod filter;
pub mod geojson_io;
pub mod geometry;
pub mod merge;
pub mod overlap;
pub mod parcel;
pub mod partition;
pub mod pipeline;
pub mod superparcel;
pub mod utils;

pub use batch::{plan_work_items, run_batch, WorkItem, WorkResult};
pub use config::{EpsilonStrategy, SuperParcelConfig};
pub use error::{Result, SuperParcelError};
pub use parcel::{Parcel, ParcelId};
pub use pipeline::{build_superparcels, SuperParcelOutput};
pub use superparcel::{SuperParcel, SuperParcelBuilder};
