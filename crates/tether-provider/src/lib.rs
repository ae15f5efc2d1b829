//! # Provider Action Interface
//!
//! Core abstractions for talking to external CRM systems through an
//! integration gateway.
//!
//! Every provider action is a request/response pair
//! (`create-X`, `update-X`, `delete-X`, `get-X`) carrying a normalized JSON
//! payload. The gateway wraps provider responses in a common envelope, but
//! failure and duplicate-match payloads nest provider data several levels
//! deep, so callers must branch on response *shape*, not just HTTP status.
//! That parsing lives in [`response`].
//!
//! ## Example
//!
//! ```ignore
//! use tether_provider::{EntityKind, GatewayClient, GatewayConfig, ProviderActions, ProviderKind};
//!
//! let client = GatewayClient::new(GatewayConfig::new(ProviderKind::Salesforce, access_token))?;
//! let external_id = client.create(EntityKind::Account, &payload).await?;
//! ```

pub mod error;
pub mod http;
pub mod response;
pub mod traits;
pub mod types;

pub use error::{ProviderError, ProviderResult};
pub use http::{GatewayClient, GatewayConfig};
pub use response::{extract_duplicate_match, parse_failure, parse_mutation, parse_records};
pub use traits::ProviderActions;
pub use types::{EntityKind, ExternalRecord, ProviderKind};
