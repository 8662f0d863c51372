use crate::config::NodeSettings;
use crate::messaging::Requester;

/// Capabilities a node is built with. A capability is active iff its field
/// is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOptions {
    pub transport_identity: Option<String>,
    pub broker_address: Option<String>,
    pub request: Option<RequestOptions>,
    pub respond: bool,
    pub publish: Option<PublishOptions>,
    pub subscribe: Option<SubscribeOptions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub timeout_ms: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout_ms: Requester::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishOptions {
    pub bind_address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOptions {
    pub upstream_addresses: Vec<String>,
}

impl NodeOptions {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            transport_identity: Some(identity.into()),
            ..Self::default()
        }
    }

    pub fn broker(mut self, address: impl Into<String>) -> Self {
        self.broker_address = Some(address.into());
        self
    }

    pub fn request(mut self, timeout_ms: u64) -> Self {
        self.request = Some(RequestOptions { timeout_ms });
        self
    }

    pub fn respond(mut self) -> Self {
        self.respond = true;
        self
    }

    pub fn publish(mut self, bind_address: impl Into<String>) -> Self {
        self.publish = Some(PublishOptions {
            bind_address: bind_address.into(),
        });
        self
    }

    pub fn subscribe<I, S>(mut self, upstream_addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe = Some(SubscribeOptions {
            upstream_addresses: upstream_addresses.into_iter().map(Into::into).collect(),
        });
        self
    }

    fn needs_point_to_point(&self) -> bool {
        self.request.is_some() || self.respond
    }

    /// The identity and broker address the point-to-point capabilities need,
    /// `None` when neither capability is configured.
    pub(crate) fn point_to_point(&self) -> Result<Option<(&str, &str)>, String> {
        if !self.needs_point_to_point() {
            return Ok(None);
        }
        let identity = self
            .transport_identity
            .as_deref()
            .ok_or("requests and responses need a transport identity")?;
        let broker = self
            .broker_address
            .as_deref()
            .ok_or_else(|| format!("please provide a broker address for node '{identity}'"))?;
        Ok(Some((identity, broker)))
    }
}

impl From<&NodeSettings> for NodeOptions {
    fn from(settings: &NodeSettings) -> Self {
        Self {
            transport_identity: settings.transport_identity.clone(),
            broker_address: settings.broker_address.clone(),
            request: settings.request.then(|| RequestOptions {
                timeout_ms: settings.request_timeout_ms,
            }),
            respond: settings.respond,
            publish: settings
                .publish_bind_address
                .clone()
                .map(|bind_address| PublishOptions { bind_address }),
            subscribe: (!settings.subscribe_upstream_addresses.is_empty()).then(|| {
                SubscribeOptions {
                    upstream_addresses: settings.subscribe_upstream_addresses.clone(),
                }
            }),
        }
    }
}
