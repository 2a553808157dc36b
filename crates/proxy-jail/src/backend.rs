//! Ban backends.
//!
//! A backend turns "ban this address" into whatever the enforcing device
//! understands (an alias list entry, an address-list timeout, a table
//! insert). Adapters for specific devices live outside this crate.

use std::net::IpAddr;

/// Capability to block an address for a while.
///
/// Calls are fire-and-forget: implementations log and swallow their own
/// failures, so the engine cannot tell a ban from a failed attempt. Calls
/// are made from the serialized consumer, so a slow backend delays every
/// submitter.
pub trait BanBackend: Send + Sync {
    /// Blocks `ip` for `timeout_minutes`.
    fn ban_ip(&self, ip: IpAddr, timeout_minutes: u32);
}
