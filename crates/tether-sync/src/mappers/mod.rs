//! Provider-specific entity mappers.

mod hubspot;
mod salesforce;

pub use hubspot::{hubspot_registry, HsAccountMapper, HsContactMapper, HsDealMapper};
pub use salesforce::{
    salesforce_registry, SfAccountMapper, SfContactMapper, SfDealMapper, SfLeadMapper,
};
