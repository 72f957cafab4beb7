use std::fmt;

use log::{info, warn};

use crate::superparcel::SuperParcel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    EmptyGeometry,
    InvalidGeometry,
    BelowMinimumArea,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionReason::EmptyGeometry => "empty geometry",
            RejectionReason::InvalidGeometry => "invalid geometry",
            RejectionReason::BelowMinimumArea => "below minimum area",
        };
        f.write_str(s)
    }
}

/// A row excluded from the output, kept for diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedSuperParcel {
    pub superparcel: SuperParcel,
    pub reason: RejectionReason,
}

/// Splits rows into clean polygonal geometry and rejects.
#[derive(Debug, Clone, Default)]
pub struct InvalidGeometryFilter;

impl InvalidGeometryFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, row: &SuperParcel) -> Option<RejectionReason> {
        if row.geometry.is_empty() {
            Some(RejectionReason::EmptyGeometry)
        } else if !row.geometry.is_valid() {
            Some(RejectionReason::InvalidGeometry)
        } else {
            None
        }
    }

    pub fn filter(&self, rows: Vec<SuperParcel>) -> (Vec<SuperParcel>, Vec<RejectedSuperParcel>) {
        let total = rows.len();
        let mut kept = Vec::with_capacity(total);
        let mut rejected = Vec::new();
        for row in rows {
            match self.check(&row) {
                None => kept.push(row),
                Some(reason) => {
                    warn!("Rejecting {} ({}): {}", row.sp_id, row.cluster_id, reason);
                    rejected.push(RejectedSuperParcel {
                        superparcel: row,
                        reason,
                    });
                }
            }
        }
        if !rejected.is_empty() {
            info!("Geometry filter kept {} of {} rows", kept.len(), total);
        }
        (kept, rejected)
    }
}
