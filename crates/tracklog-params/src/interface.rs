use crate::error::Result;
use crate::types::{ParameterDeclaration, ParameterValue};
use serde::de::DeserializeOwned;

/// Operations shared by the local registry and the remote client
pub trait ParametersInterface {
    /// Declare a new parameter with its initial value
    ///
    /// Fails with `AlreadyDeclared` if the name is taken.
    fn declare_parameter(&self, name: &str, value: ParameterValue) -> Result<()>;

    /// Current value of a parameter
    fn parameter(&self, name: &str) -> Result<ParameterValue>;

    /// Replace the value of a declared parameter
    ///
    /// The new value must keep the declared type.
    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<()>;

    /// Every declared parameter, sorted by name
    fn list_parameters(&self) -> Result<Vec<ParameterDeclaration>>;

    /// Current value of a parameter, decoded
    fn parameter_as<T: DeserializeOwned>(&self, name: &str) -> Result<T>
    where
        Self: Sized,
    {
        self.parameter(name)?.decode()
    }
}
