pub mod identifier;
pub mod record;
pub mod result;

pub use identifier::RollNumber;
pub use record::{ApplicantPayload, PortalResponse, PortalVerdict, ResultTableRow, StudentRecord};
pub use result::{
    BatchSummary, Query, QueryOutcome, ScrapeOptions, ScrapeResult, WorkResult, WorkUnit,
};
