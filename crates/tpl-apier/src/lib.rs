//! Administrative API over the tariff plan store.
//!
//! Besides plain account and rating profile management, [`Apier::get_cost`]
//! can price a call against a rating plan nobody is subscribed to yet. It
//! provisions a throwaway account and rating profile for that, each held by
//! a [`TempResource`] guard so they are removed again however the rating
//! ends.

pub mod apier;
pub mod cost;
pub mod duration;
pub mod error;
pub mod resource;

pub use apier::{
    rating_profile_id, Apier, AttrGetCost, AttrGetDataCost, AttrRemoveAccount,
    AttrRemoveRatingProfile, AttrSetAccount, AttrSetRatingProfile, RatingActivation, Responder,
    SIMULATOR_ACTIVATION, SIMULATOR_SUBJECT,
};
pub use cost::{
    CallCost, CallDescriptor, ChargingInterval, DataCost, DataSpan, EventCost, TimeSpan,
    DIRECTION_OUT, TOR_DATA, TOR_VOICE,
};
pub use duration::parse_duration_with_nanos;
pub use error::{ApierError, ApierResult};
pub use resource::TempResource;
