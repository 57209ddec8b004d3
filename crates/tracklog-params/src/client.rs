//! Remote access to a parameter registry

use crate::error::Result;
use crate::interface::ParametersInterface;
use crate::registry::{
    service_name, DECLARE_PARAMETER, GET_PARAMETER, LIST_PARAMETERS, SET_PARAMETER,
};
use crate::types::{ParameterDeclaration, ParameterName, ParameterRequest, ParameterValue, Reply};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use tracklog_core::Services;

/// Default time to wait for the registry to answer
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Client for a [`ParametersRegistry`](crate::ParametersRegistry) served under a namespace
pub struct ParametersClient {
    services: Arc<dyn Services>,
    namespace: String,
    timeout: Duration,
}

impl ParametersClient {
    /// Create a client for the registry served under `namespace`
    pub fn new(services: Arc<dyn Services>, namespace: impl Into<String>) -> Self {
        Self {
            services,
            namespace: namespace.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the per-request timeout (default [`DEFAULT_TIMEOUT`])
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Namespace the registry is served under
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn call<Req, Res>(&self, operation: &str, request: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let service = service_name(&self.namespace, operation);
        trace!(service = %service, "parameter request");
        let bytes = self
            .services
            .request(&service, &bincode::serialize(request)?, self.timeout)?;
        bincode::deserialize::<Reply<Res>>(&bytes)?
    }
}

impl ParametersInterface for ParametersClient {
    fn declare_parameter(&self, name: &str, value: ParameterValue) -> Result<()> {
        let request = ParameterRequest {
            name: name.to_string(),
            value,
        };
        self.call(DECLARE_PARAMETER, &request)
    }

    fn parameter(&self, name: &str) -> Result<ParameterValue> {
        let request = ParameterName {
            name: name.to_string(),
        };
        self.call(GET_PARAMETER, &request)
    }

    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<()> {
        let request = ParameterRequest {
            name: name.to_string(),
            value,
        };
        self.call(SET_PARAMETER, &request)
    }

    fn list_parameters(&self) -> Result<Vec<ParameterDeclaration>> {
        self.call(LIST_PARAMETERS, &())
    }
}

impl std::fmt::Debug for ParametersClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParametersClient")
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .finish()
    }
}
