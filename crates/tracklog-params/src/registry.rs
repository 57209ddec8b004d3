//! Parameter registry served over the bus

use crate::error::{ParameterError, Result};
use crate::interface::ParametersInterface;
use crate::types::{ParameterDeclaration, ParameterName, ParameterRequest, ParameterValue, Reply};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use tracklog_core::{ServiceHandler, Services};

pub(crate) const GET_PARAMETER: &str = "get_parameter";
pub(crate) const LIST_PARAMETERS: &str = "list_parameters";
pub(crate) const SET_PARAMETER: &str = "set_parameter";
pub(crate) const DECLARE_PARAMETER: &str = "declare_parameter";

/// Full service name for an operation under a namespace
pub(crate) fn service_name(namespace: &str, operation: &str) -> String {
    format!("{}/{operation}", namespace.trim_end_matches('/'))
}

#[derive(Default)]
struct Table {
    parameters: RwLock<IndexMap<String, ParameterValue>>,
}

impl Table {
    fn declare(&self, name: &str, value: ParameterValue) -> Reply<()> {
        let mut parameters = self.parameters.write().unwrap_or_else(PoisonError::into_inner);
        if parameters.contains_key(name) {
            return Err(ParameterError::AlreadyDeclared(name.to_string()));
        }
        debug!(name, type_name = %value.type_name, "parameter declared");
        parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn get(&self, name: &str) -> Reply<ParameterValue> {
        self.parameters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::NotDeclared(name.to_string()))
    }

    fn set(&self, name: &str, value: ParameterValue) -> Reply<()> {
        let mut parameters = self.parameters.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = parameters.get_mut(name) else {
            return Err(ParameterError::NotDeclared(name.to_string()));
        };
        if current.type_name != value.type_name {
            return Err(ParameterError::InvalidType {
                name: name.to_string(),
                declared: current.type_name.clone(),
                requested: value.type_name,
            });
        }
        *current = value;
        Ok(())
    }

    fn list(&self) -> Reply<Vec<ParameterDeclaration>> {
        let mut declarations: Vec<_> = self
            .parameters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, value)| ParameterDeclaration {
                name: name.clone(),
                type_name: value.type_name.clone(),
            })
            .collect();
        declarations.sort();
        Ok(declarations)
    }
}

/// Wrap a typed operation as a byte-level service handler
fn handler<Req, Res, F>(op: F) -> ServiceHandler
where
    Req: DeserializeOwned,
    Res: Serialize,
    F: Fn(Req) -> Reply<Res> + Send + Sync + 'static,
{
    Arc::new(move |bytes: &[u8]| {
        let reply = match bincode::deserialize::<Req>(bytes) {
            Ok(request) => op(request),
            Err(e) => Err(ParameterError::Unexpected(format!("malformed request: {e}"))),
        };
        bincode::serialize(&reply).unwrap_or_default()
    })
}

/// In-process parameter store
///
/// Usable directly through [`ParametersInterface`], and reachable by remote
/// [`ParametersClient`](crate::ParametersClient)s once [`serve`]d:
/// - `<namespace>/get_parameter`
/// - `<namespace>/list_parameters`
/// - `<namespace>/set_parameter`
/// - `<namespace>/declare_parameter`
///
/// [`serve`]: ParametersRegistry::serve
#[derive(Clone)]
pub struct ParametersRegistry {
    namespace: String,
    table: Arc<Table>,
}

impl ParametersRegistry {
    /// Create an empty registry for `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            table: Arc::new(Table::default()),
        }
    }

    /// Namespace the services are advertised under
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Advertise the four parameter services on `services`
    pub fn serve(&self, services: &dyn Services) -> Result<()> {
        let table = self.table.clone();
        services.advertise_service(
            &service_name(&self.namespace, GET_PARAMETER),
            handler(move |req: ParameterName| table.get(&req.name)),
        )?;

        let table = self.table.clone();
        services.advertise_service(
            &service_name(&self.namespace, LIST_PARAMETERS),
            handler(move |_: ()| table.list()),
        )?;

        let table = self.table.clone();
        services.advertise_service(
            &service_name(&self.namespace, SET_PARAMETER),
            handler(move |req: ParameterRequest| table.set(&req.name, req.value)),
        )?;

        let table = self.table.clone();
        services.advertise_service(
            &service_name(&self.namespace, DECLARE_PARAMETER),
            handler(move |req: ParameterRequest| table.declare(&req.name, req.value)),
        )?;

        debug!(namespace = %self.namespace, "parameter services advertised");
        Ok(())
    }
}

impl ParametersInterface for ParametersRegistry {
    fn declare_parameter(&self, name: &str, value: ParameterValue) -> Result<()> {
        self.table.declare(name, value)
    }

    fn parameter(&self, name: &str) -> Result<ParameterValue> {
        self.table.get(name)
    }

    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<()> {
        self.table.set(name, value)
    }

    fn list_parameters(&self) -> Result<Vec<ParameterDeclaration>> {
        self.table.list()
    }
}

impl std::fmt::Debug for ParametersRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .table
            .parameters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ParametersRegistry")
            .field("namespace", &self.namespace)
            .field("parameters", &count)
            .finish()
    }
}
