pub mod expiry;
pub mod generator;
pub mod slots;

pub use expiry::ExpirySweepService;
pub use generator::SlotGenerationService;
pub use slots::TimeSlotService;
