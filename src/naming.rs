//! Generated names shared with the runtime layer.

use crate::config::WeaverConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorPair {
    pub getter: String,
    pub setter: String,
}

impl AccessorPair {
    pub fn for_field(field: &str, config: &WeaverConfig) -> Self {
        Self {
            getter: format!("{}{field}", config.getter_prefix),
            setter: format!("{}{field}", config.setter_prefix),
        }
    }
}

/// `com.example.Person` -> `com_example_PersonProxyInterface`.
pub fn proxy_interface_name(class_name: &str, config: &WeaverConfig) -> String {
    format!(
        "{}{}",
        class_name.replace(['.', '$'], "_"),
        config.proxy_interface_suffix
    )
}
