pub mod availability;
pub mod overrides;
pub mod slots;
pub mod week;

pub use availability::AvailabilityService;
pub use overrides::OverrideService;
pub use slots::generate_slots;
pub use week::ScheduleService;
