use serde::{Deserialize, Serialize};

/// Top-level configuration settings for the application.
///
/// Includes the messaging node's capabilities and the logging level.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub node: NodeSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for a messaging node.
///
/// Each capability activates only when its prerequisites are present:
/// requests and responses need `transport_identity` and `broker_address`,
/// publishing needs `publish_bind_address`, subscribing needs at least one
/// upstream address.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeSettings {
    pub transport_identity: Option<String>,
    pub broker_address: Option<String>,
    pub request: bool,
    pub request_timeout_ms: u64,
    pub respond: bool,
    pub publish_bind_address: Option<String>,
    pub subscribe_upstream_addresses: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub node: Option<PartialNodeSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialNodeSettings {
    pub transport_identity: Option<String>,
    pub broker_address: Option<String>,
    pub request: Option<bool>,
    pub request_timeout_ms: Option<u64>,
    pub respond: Option<bool>,
    pub publish_bind_address: Option<String>,
    pub subscribe_upstream_addresses: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Every capability is off by default; the request timeout defaults to 5000ms.
impl Default for Settings {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                transport_identity: None,
                broker_address: None,
                request: false,
                request_timeout_ms: 5000,
                respond: false,
                publish_bind_address: None,
                subscribe_upstream_addresses: Vec::new(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every value missing from `partial` with the default.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let node = partial.node;
        let logging = partial.logging;

        Settings {
            node: NodeSettings {
                transport_identity: node
                    .as_ref()
                    .and_then(|n| n.transport_identity.clone())
                    .or(default.node.transport_identity),
                broker_address: node
                    .as_ref()
                    .and_then(|n| n.broker_address.clone())
                    .or(default.node.broker_address),
                request: node
                    .as_ref()
                    .and_then(|n| n.request)
                    .unwrap_or(default.node.request),
                request_timeout_ms: node
                    .as_ref()
                    .and_then(|n| n.request_timeout_ms)
                    .unwrap_or(default.node.request_timeout_ms),
                respond: node
                    .as_ref()
                    .and_then(|n| n.respond)
                    .unwrap_or(default.node.respond),
                publish_bind_address: node
                    .as_ref()
                    .and_then(|n| n.publish_bind_address.clone())
                    .or(default.node.publish_bind_address),
                subscribe_upstream_addresses: node
                    .as_ref()
                    .and_then(|n| n.subscribe_upstream_addresses.clone())
                    .unwrap_or(default.node.subscribe_upstream_addresses),
            },
            logging: LoggingSettings {
                level: logging
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
