//! Options sent with a join request.
//!
//! Join options can be built in code or deserialized from a configuration
//! file; any field left out takes its default.
//!
//! ```
//! use ensemble_client::JoinOptions;
//!
//! let opts = JoinOptions::new("chat")
//!     .heartbeat_rate(5.0)
//!     .principal("alice");
//! assert_eq!(opts.group_name, "chat");
//! assert!(opts.use_properties);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{EnsembleError, Result};
use crate::protocol::limits;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_RATE: f64 = 10.0;

/// Default transport list.
pub const DEFAULT_TRANSPORTS: &str = "DEERING";

/// Default property list used to build the protocol stack.
pub const DEFAULT_PROPERTIES: &str = "Gmp:Switch:Sync:Heal:Frag:Suspect:Flow:Slander";

/// Parameters for joining a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Heartbeat interval in seconds.
    pub heartbeat_rate: f64,
    pub transports: String,
    /// Explicit protocol stack; usually left to `properties`.
    pub protocol: Option<String>,
    pub group_name: String,
    pub properties: String,
    /// Build the stack from `properties` rather than `protocol`.
    pub use_properties: bool,
    pub use_group_daemon: bool,
    pub parameters: Option<String>,
    pub client: bool,
    pub debug: bool,
    /// Not supported by the service; must stay `None`.
    pub endpoint: Option<String>,
    pub principal: Option<String>,
    pub key: Option<[u8; limits::KEY]>,
    pub secure: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            heartbeat_rate: DEFAULT_HEARTBEAT_RATE,
            transports: DEFAULT_TRANSPORTS.to_string(),
            protocol: None,
            group_name: String::new(),
            properties: DEFAULT_PROPERTIES.to_string(),
            use_properties: true,
            use_group_daemon: false,
            parameters: None,
            client: false,
            debug: false,
            endpoint: None,
            principal: None,
            key: None,
            secure: false,
        }
    }
}

impl JoinOptions {
    /// Default options for `group`.
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group_name: group.into(),
            ..Self::default()
        }
    }

    pub fn heartbeat_rate(mut self, seconds: f64) -> Self {
        self.heartbeat_rate = seconds;
        self
    }

    pub fn transports(mut self, transports: impl Into<String>) -> Self {
        self.transports = transports.into();
        self
    }

    /// Use an explicit protocol stack instead of properties.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self.use_properties = false;
        self
    }

    /// Build the protocol stack from a property list.
    pub fn properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = properties.into();
        self.use_properties = true;
        self
    }

    pub fn use_group_daemon(mut self, enabled: bool) -> Self {
        self.use_group_daemon = enabled;
        self
    }

    pub fn parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }

    pub fn client(mut self, enabled: bool) -> Self {
        self.client = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn key(mut self, key: [u8; limits::KEY]) -> Self {
        self.key = Some(key);
        self
    }

    pub fn secure(mut self, enabled: bool) -> Self {
        self.secure = enabled;
        self
    }

    /// Check every field against what the service accepts.
    pub fn validate(&self) -> Result<()> {
        if self.group_name.is_empty() {
            return Err(EnsembleError::InvalidArgument(
                "group name is required".to_string(),
            ));
        }
        if self.endpoint.is_some() {
            return Err(EnsembleError::InvalidArgument(
                "endpoint cannot be set by the client".to_string(),
            ));
        }
        if !self.heartbeat_rate.is_finite() || self.heartbeat_rate <= 0.0 {
            return Err(EnsembleError::InvalidArgument(format!(
                "heartbeat rate {} must be a positive number of seconds",
                self.heartbeat_rate
            )));
        }

        check_text("group name", &self.group_name, limits::GROUP_NAME)?;
        check_text("transports", &self.transports, limits::TRANSPORT)?;
        check_text("properties", &self.properties, limits::PROPERTIES)?;
        if let Some(protocol) = &self.protocol {
            check_text("protocol", protocol, limits::PROTOCOL)?;
        }
        if let Some(parameters) = &self.parameters {
            check_text("parameters", parameters, limits::PARAMETERS)?;
        }
        if let Some(principal) = &self.principal {
            check_text("principal", principal, limits::PRINCIPAL)?;
        }
        Ok(())
    }
}

/// Reject text the wire cannot carry.
pub(crate) fn check_text(field: &str, text: &str, max: usize) -> Result<()> {
    if !text.is_ascii() {
        return Err(EnsembleError::InvalidArgument(format!(
            "{} must be ASCII",
            field
        )));
    }
    if text.len() > max {
        return Err(EnsembleError::InvalidArgument(format!(
            "{} is {} bytes, maximum is {}",
            field,
            text.len(),
            max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = JoinOptions::default();
        assert_eq!(opts.heartbeat_rate, 10.0);
        assert_eq!(opts.transports, "DEERING");
        assert_eq!(opts.properties, DEFAULT_PROPERTIES);
        assert!(opts.use_properties);
        assert!(opts.protocol.is_none());
        assert!(opts.key.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let opts = JoinOptions::new("g")
            .protocol("Top:Pt2pt:Mnak:Bottom")
            .client(true)
            .secure(true);
        assert!(!opts.use_properties);
        assert!(opts.client);
        assert!(opts.secure);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_group_name_required() {
        let err = JoinOptions::default().validate().unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidArgument(_)));
    }

    #[test]
    fn test_endpoint_rejected() {
        let mut opts = JoinOptions::new("g");
        opts.endpoint = Some("Endpt:x".to_string());
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_limits_enforced() {
        let opts = JoinOptions::new("g".repeat(65));
        assert!(opts.validate().is_err());

        let opts = JoinOptions::new("g").principal("p".repeat(33));
        assert!(opts.validate().is_err());

        let opts = JoinOptions::new("g").heartbeat_rate(0.0);
        assert!(opts.validate().is_err());
    }
}
