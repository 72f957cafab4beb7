use thiserror::Error;

use crate::parcel::ParcelId;

#[derive(Error, Debug)]
pub enum SuperParcelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parcel {id}: {reason}")]
    InvalidParcel { id: ParcelId, reason: String },

    #[error(
        "Insufficient samples for owner {owner:?}: distance matrix {rows}x{cols} has {valid} valid samples, {required} required"
    )]
    InsufficientSamples {
        owner: String,
        rows: usize,
        cols: usize,
        valid: usize,
        required: usize,
    },

    #[error("Cluster {cluster_id} has {members} members, below the minimum of {min_samples}")]
    UndersizedCluster {
        cluster_id: String,
        members: usize,
        min_samples: usize,
    },

    #[error("Dissolve produced an empty geometry for cluster {0}")]
    EmptyDissolve(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Work unit panicked: {0}")]
    WorkerPanic(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SuperParcelError>;
