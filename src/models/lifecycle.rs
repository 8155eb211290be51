//! The legal states and transitions of an asset record.
//!
//! An asset is visible in exactly one state at a time: active (with its
//! source classification) or trashed. `Deleted` is terminal — the record no
//! longer exists and nothing transitions out of it.

use crate::models::asset::{PhotoAsset, SourceClass};
use thiserror::Error;

/// Where an asset currently sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetState {
    Active(SourceClass),
    Trashed,
    Deleted,
}

/// The operations that move an asset between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// `Active(event_temp)` -> `Active(cloud)`; clears the expiry.
    ConvertToPermanent,
    /// Any active asset -> `Trashed`.
    SoftDelete,
    /// `Trashed` -> `Active(cloud)`. Restore always normalizes the source
    /// class to `cloud` regardless of what it was before trashing.
    Restore,
    /// `Trashed` -> `Deleted`. Irreversible; refused for active assets.
    PermanentDelete,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transition {via:?} is not valid from state {from:?}")]
pub struct InvalidTransition {
    pub from: AssetState,
    pub via: Transition,
}

impl AssetState {
    /// Derive the state of a live record. `Deleted` never appears here
    /// because deleted records no longer exist.
    pub fn of(asset: &PhotoAsset) -> Self {
        if asset.status.trashed {
            AssetState::Trashed
        } else {
            AssetState::Active(asset.source_class)
        }
    }

    /// Apply a transition, returning the resulting state or an error when
    /// the transition is not legal from `self`.
    pub fn apply(self, via: Transition) -> Result<AssetState, InvalidTransition> {
        match (self, via) {
            (AssetState::Active(SourceClass::EventTemp), Transition::ConvertToPermanent) => {
                Ok(AssetState::Active(SourceClass::Cloud))
            }
            (AssetState::Active(_), Transition::SoftDelete) => Ok(AssetState::Trashed),
            (AssetState::Trashed, Transition::Restore) => Ok(AssetState::Active(SourceClass::Cloud)),
            (AssetState::Trashed, Transition::PermanentDelete) => Ok(AssetState::Deleted),
            (from, via) => Err(InvalidTransition { from, via }),
        }
    }
}
