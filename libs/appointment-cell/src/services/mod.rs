pub mod booking;
pub mod encounter;
pub mod lifecycle;

pub use booking::AppointmentBookingService;
pub use encounter::{EncounterGateway, SupabaseEncounterGateway};
