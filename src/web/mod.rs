pub mod responses;
pub mod router;
pub mod state;
pub mod status;
pub mod uploads;

pub use responses::{ApiError, ApiJson};
pub use state::AppState;
pub use uploads::{FileFieldConfig, JsonOrMultipart, read_submission_form};
