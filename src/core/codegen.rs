//! Script generation — dispatch to resource handlers.
//!
//! Each resource type produces three scripts:
//! - check: report current state
//! - apply: converge to desired state
//! - state_query: query observable state for BLAKE3 hashing

use super::error::Result;
use super::types::{ResolvedResource, ResourceType};
use crate::resources;

/// Generate a check script for a resource.
pub fn check_script(resolved: &ResolvedResource) -> Result<String> {
    let r = &resolved.resource;
    match r.resource_type {
        ResourceType::Package => Ok(resources::package::check_script(r)),
        ResourceType::File => resources::file::check_script(r),
        ResourceType::Template => resources::template::check_script(r),
    }
}

/// Generate an apply script for a resource.
pub fn apply_script(resolved: &ResolvedResource) -> Result<String> {
    let r = &resolved.resource;
    let payload = resolved.payload.as_deref();
    match r.resource_type {
        ResourceType::Package => Ok(resources::package::apply_script(r)),
        ResourceType::File => resources::file::apply_script(r, payload),
        ResourceType::Template => resources::template::apply_script(r, payload),
    }
}

/// Generate a state query script for a resource.
pub fn state_query_script(resolved: &ResolvedResource) -> Result<String> {
    let r = &resolved.resource;
    match r.resource_type {
        ResourceType::Package => Ok(resources::package::state_query_script(r)),
        ResourceType::File => resources::file::state_query_script(r),
        ResourceType::Template => resources::template::state_query_script(r),
    }
}
