// Adapters layer: concrete I/O behind the domain ports
// (SSH/NETCONF, tunnel, templates, NATS, HTTP).

#[cfg(feature = "server")]
pub mod http;
pub mod nats;
pub mod netconf;
pub mod ssh;
pub mod templates;
pub mod tunnel;
