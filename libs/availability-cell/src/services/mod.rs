pub mod archive;
pub mod calendar;
pub mod conflict;
pub mod slots;
pub mod time;

pub use archive::SlotArchiveSweep;
pub use calendar::{CalendarError, ExternalCalendar, GoogleCalendarClient, NoExternalCalendar};
pub use conflict::ConflictDetector;
pub use slots::SlotService;
