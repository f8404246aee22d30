// =============================================================================
// GOOGLE APIS
// =============================================================================
//
// Sheets and Calendar clients implementing the core store traits, plus the
// OAuth2 credential providers they share. Both clients call
// `ensure_valid_credentials` before every request.

pub mod calendar_client;
pub mod google_api;
pub mod google_auth;
pub mod sheets_client;

pub use calendar_client::GoogleCalendarClient;
pub use google_auth::GoogleAuth;
pub use sheets_client::GoogleSheetsClient;
