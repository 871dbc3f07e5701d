//! Job model and per-pipeline request/result payloads.

pub mod authenticity;
pub mod claim_research;
pub mod geolocation;
pub mod job;
pub mod report;
pub mod reverse_lookup;
pub mod step;
pub mod trace;

/// garde rule: rejects strings that are empty after trimming.
#[allow(clippy::ptr_arg)]
pub(crate) fn not_blank(value: &String, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}
