use serde::Deserialize;

const DEFAULT_TYPE_CAPACITY: usize = 16;
const DEFAULT_VALUE_CAPACITY: usize = 8;
const DEFAULT_HANDLER_CAPACITY: usize = 4;

/// Capacity hints used when the dispatcher materializes its containers.
///
/// Every field is a pre-allocation hint only; containers grow past it on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Initial capacity of the kind → bucket map.
    pub type_capacity: usize,
    /// Initial capacity of a bucket's value → list map, allocated on the first value handler.
    pub value_capacity: usize,
    /// Initial capacity of each handler list.
    pub handler_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            type_capacity: DEFAULT_TYPE_CAPACITY,
            value_capacity: DEFAULT_VALUE_CAPACITY,
            handler_capacity: DEFAULT_HANDLER_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub const fn type_capacity(mut self, capacity: usize) -> Self {
        self.type_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn value_capacity(mut self, capacity: usize) -> Self {
        self.value_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn handler_capacity(mut self, capacity: usize) -> Self {
        self.handler_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: DispatcherConfig =
            serde_json::from_value(json!({ "type_capacity": 128 })).expect("config deserialize");
        assert_eq!(cfg.type_capacity, 128);
        assert_eq!(cfg.value_capacity, DEFAULT_VALUE_CAPACITY);
        assert_eq!(cfg.handler_capacity, DEFAULT_HANDLER_CAPACITY);
    }

    #[test]
    fn setters_chain() {
        let cfg = DispatcherConfig::default().type_capacity(1).value_capacity(2).handler_capacity(3);
        assert_eq!(cfg, DispatcherConfig { type_capacity: 1, value_capacity: 2, handler_capacity: 3 });
    }
}
