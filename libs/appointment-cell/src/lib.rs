pub mod models;
pub mod services;

pub use models::*;
pub use services::booking::AppointmentBookingService;
pub use services::encounter::{EncounterGateway, SupabaseEncounterGateway};
