pub mod identity;
pub mod travel_request;
pub mod trip;

pub use identity::{Actor, IdentityId, SYSTEM_IDENTITY};
pub use travel_request::{
    Attachment, ChatMessage, HumanId, RequestStatus, StageTimestamps, TravelRequest,
    TravelRequestId, VendorMessage,
};
pub use trip::{TravelClass, TravelMode, TripDetails, TripDetailsPatch, TripLeg, TripType};
