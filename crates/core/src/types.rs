/// User identifiers are opaque strings issued by the REST backend.
pub type UserId = String;

/// Appointment identifiers are opaque strings issued by the REST backend.
pub type AppointmentId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
