pub mod booking;
pub mod lifecycle;
pub mod query;

pub use booking::BookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use query::AppointmentQueryService;
