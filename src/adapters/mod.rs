// Adapters layer: concrete clients for the Compute Studio REST and OAuth2 endpoints.

pub mod compute_studio;
pub mod oauth;

pub use compute_studio::{ComputeStudioClient, ComputeStudioProvider, PollingConfig};
pub use oauth::{OauthClient, OauthResponse};
