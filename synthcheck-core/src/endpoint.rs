//! OSC endpoint formatting
//!
//! The validator addresses the synthesizer through a liblo-style URL. The
//! host is always the local machine since the synthesizer is our child.

use std::fmt;

const SCHEME: &str = "osc.udp";
const HOST: &str = "localhost";

/// Format a port as the URL handed to the validator
///
/// Port 0 never comes out of a successful marker match, so it is treated as
/// a caller bug rather than a runtime condition.
pub fn build_endpoint(port: u16) -> String {
    debug_assert!(port != 0, "port 0 is not a bound OSC server port");
    format!("{SCHEME}://{HOST}:{port}/")
}

/// The port announced by the synthesizer, together with its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    port: u16,
    uri: String,
}

impl DiscoveredEndpoint {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            uri: build_endpoint(port),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Display for DiscoveredEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}
